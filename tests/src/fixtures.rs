//! Test fixtures shared by the integration and exploit suites.

use datashare_chaincode::prelude::*;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use rcgen::{CertificateParams, KeyPair, SerialNumber};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

lazy_static! {
    static ref CERTIFICATES: Mutex<HashMap<String, String>> = Mutex::new(HashMap::new());
}

/// Self-signed PEM certificate carrying `serial_hex` as its serial number.
pub fn certificate_pem(serial_hex: &str) -> String {
    CERTIFICATES
        .lock()
        .entry(serial_hex.to_string())
        .or_insert_with(|| {
            let serial = hex::decode(serial_hex).expect("serial must be hex");
            let mut params = CertificateParams::new(vec!["member.datashare.test".to_string()])
                .expect("certificate params");
            params.serial_number = Some(SerialNumber::from_slice(&serial));
            let key = KeyPair::generate().expect("key pair");
            params.self_signed(&key).expect("certificate").pem()
        })
        .clone()
}

/// A network member: certificate serial plus organization.
#[derive(Clone, Debug)]
pub struct Member {
    pub id: String,
    pub mspid: String,
}

impl Member {
    pub fn new(id: &str, mspid: &str) -> Self {
        Self {
            id: id.to_uppercase(),
            mspid: mspid.to_string(),
        }
    }

    /// Data owner.
    pub fn owner() -> Self {
        Self::new("0D47A0", "Org1MSP")
    }

    /// Data consumer in the same organization.
    pub fn consumer() -> Self {
        Self::new("0C0511", "Org1MSP")
    }

    /// Consumer from another organization.
    pub fn partner() -> Self {
        Self::new("0FA27E", "Org2MSP")
    }

    pub fn attacker() -> Self {
        Self::new("DEAD01", "Org2MSP")
    }

    pub fn credential(&self) -> SerializedIdentity {
        SerializedIdentity::new(self.mspid.clone(), certificate_pem(&self.id).into_bytes())
    }
}

/// One world state shared by every member's transactions.
pub struct Network {
    pub ledger: Arc<InMemoryLedger>,
    pub data: DataStateContract,
    pub shares: DataShareContract,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(InMemoryLedger::new()),
            data: DataStateContract::new(),
            shares: DataShareContract::new(),
        }
    }

    /// Transaction context invoked by `member`.
    pub fn as_member(&self, member: &Member) -> TxContext {
        TxContext::new(Arc::new(InMemoryStub::new(
            Arc::clone(&self.ledger),
            member.credential(),
        )))
    }
}

/// Data record payload keyed `P1_{data_type}_{business_id}`.
pub fn data_record(data_type: &str, business_id: &str) -> Value {
    json!({
        "businessId": business_id,
        "digest": format!("digest-{business_id}"),
        "signature": format!("sig-{business_id}"),
        "platformNo": "P1",
        "dataType": data_type,
        "encryptedFields": ["price"],
        "price": "ciphertext",
    })
}

/// Chain key of [`data_record`].
pub fn data_key(data_type: &str, business_id: &str) -> String {
    format!("P1_{data_type}_{business_id}")
}

/// Consent payload from `proposer` to `approver` for `target_key`.
pub fn consent_record(proposer: &Member, approver: &Member, target_key: &str) -> Value {
    json!({
        "businessId": format!("grant-{target_key}"),
        "digest": "consent-digest",
        "signature": "consent-sig",
        "targetKey": target_key,
        "proposerIdentity": proposer.id,
        "proposerPublicKey": "proposer-public-key",
        "approverIdentity": approver.id,
    })
}

/// Chain key of a consent record.
pub fn consent_key(proposer: &Member, approver: &Member, target_key: &str) -> String {
    format!("{}_{}_{target_key}", approver.id, proposer.id)
}

/// `base` with `extra`'s fields laid over it.
pub fn with(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}
