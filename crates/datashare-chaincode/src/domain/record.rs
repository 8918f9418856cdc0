//! # State Records
//!
//! One record struct shared by every variant. The fields common to all
//! records are typed members; variant fields live in [`StatePayload`];
//! anything else the caller supplied is carried verbatim in `extra`.
//!
//! Construction from caller input ([`StateRecord::materialize`]) derives
//! ownership from the caller. Reconstruction from persisted bytes
//! ([`StateRecord::restore`]) keeps the stored ownership untouched so that
//! authorization always runs against what the ledger holds.

use crate::domain::consent::ConsentStatus;
use crate::domain::fields::{
    self, APPROVER_IDENTITY, BUSINESS_ID, CHAIN_KEY, DATA_TYPE, DIGEST, ENCRYPTED_FIELDS,
    ENCRYPTED_KEY_FOR_PROPOSER, HANDLED_TIME, MEMBER_IDENTITY, ORG_MSP_ID, PLATFORM_NO,
    PROPOSER_IDENTITY, PROPOSER_PUBLIC_KEY, SIGNATURE, STATE_TYPE, STATUS, TARGET_KEY,
    UPLOADER_IDENTITY,
};
use crate::domain::identity::CallerIdentity;
use crate::domain::variant::{RecordKind, BASE_REQUIRED_FIELDS};
use crate::errors::{ChaincodeError, ChaincodeResult};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

// =============================================================================
// PAYLOADS
// =============================================================================

/// Fields of a Data record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFields {
    pub platform_no: String,
    pub data_type: String,
}

/// Fields of a DataShare (consent) record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataShareFields {
    /// Chain key of the Data record access is requested for.
    pub target_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposer_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposer_public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_key_for_proposer: Option<String>,
    pub status: ConsentStatus,
    /// Caller-supplied time of the approver's decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handled_time: Option<String>,
}

/// Variant-specific part of a record.
#[derive(Clone, Debug, PartialEq)]
pub enum StatePayload {
    Base,
    Data(DataFields),
    DataShare(DataShareFields),
}

impl StatePayload {
    fn kind(&self) -> RecordKind {
        match self {
            Self::Base => RecordKind::Base,
            Self::Data(_) => RecordKind::Data,
            Self::DataShare(_) => RecordKind::DataShare,
        }
    }

    fn to_fields(&self) -> ChaincodeResult<Map<String, Value>> {
        let value = match self {
            Self::Base => return Ok(Map::new()),
            Self::Data(data) => serde_json::to_value(data),
            Self::DataShare(share) => serde_json::to_value(share),
        }
        .map_err(|e| ChaincodeError::Serialization(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(ChaincodeError::Serialization(format!(
                "payload serialized to {other}"
            ))),
        }
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// A ledger record.
#[derive(Clone, Debug, PartialEq)]
pub struct StateRecord {
    pub business_id: String,
    pub digest: String,
    pub signature: String,
    /// Owner. Defaults to the creating caller unless delegated.
    pub member_identity: String,
    /// Always the creating caller.
    pub uploader_identity: String,
    pub org_msp_id: String,
    /// Names of fields encrypted off-chain.
    pub encrypted_fields: Vec<String>,
    pub payload: StatePayload,
    /// Caller-supplied fields without a typed home.
    pub extra: Map<String, Value>,
}

impl StateRecord {
    /// Build a new record of `kind` from caller input.
    ///
    /// Required fields are checked first (variant, then base). Fields named
    /// in `immutable` are dropped silently. `uploaderIdentity` and
    /// `orgMspId` always come from `caller`; `memberIdentity` does too unless
    /// the input delegates ownership.
    ///
    /// # Errors
    ///
    /// - `MissingField` for the first absent required field
    /// - `InvalidField` when `encryptedFields` is not an array of names
    pub fn materialize(
        caller: &CallerIdentity,
        kind: RecordKind,
        mut fields: Map<String, Value>,
        immutable: &[&str],
    ) -> ChaincodeResult<Self> {
        let variant = kind.variant();
        for field in variant.required_fields().iter().chain(BASE_REQUIRED_FIELDS) {
            if !fields.get(*field).is_some_and(fields::is_truthy) {
                return Err(ChaincodeError::missing(*field));
            }
        }
        for field in immutable {
            fields.remove(*field);
        }

        let member_identity =
            fields::take_text(&mut fields, MEMBER_IDENTITY).unwrap_or_else(|| caller.id.clone());
        for derived in [UPLOADER_IDENTITY, ORG_MSP_ID, STATE_TYPE, CHAIN_KEY] {
            fields.remove(derived);
        }
        let encrypted_fields = parse_encrypted_fields(fields.remove(ENCRYPTED_FIELDS))?;
        if kind == RecordKind::DataShare {
            // New consent records always start pending.
            fields.remove(STATUS);
        }

        let record = Self {
            business_id: fields::take_text(&mut fields, BUSINESS_ID).unwrap_or_default(),
            digest: fields::take_text(&mut fields, DIGEST).unwrap_or_default(),
            signature: fields::take_text(&mut fields, SIGNATURE).unwrap_or_default(),
            member_identity,
            uploader_identity: caller.id.clone(),
            org_msp_id: caller.mspid.clone(),
            encrypted_fields,
            payload: variant.extract_payload(&mut fields)?,
            extra: fields,
        };
        variant.validate(&record)?;
        Ok(record)
    }

    /// Rebuild a persisted record as `kind`.
    ///
    /// Ownership fields are taken from the document; absent ones become
    /// empty and therefore never match a caller.
    ///
    /// # Errors
    ///
    /// `InvalidField` on a malformed `encryptedFields` or `status`.
    pub fn restore(kind: RecordKind, mut fields: Map<String, Value>) -> ChaincodeResult<Self> {
        let variant = kind.variant();
        fields.remove(STATE_TYPE);
        fields.remove(CHAIN_KEY);
        Ok(Self {
            business_id: fields::take_text(&mut fields, BUSINESS_ID).unwrap_or_default(),
            digest: fields::take_text(&mut fields, DIGEST).unwrap_or_default(),
            signature: fields::take_text(&mut fields, SIGNATURE).unwrap_or_default(),
            member_identity: fields::take_text(&mut fields, MEMBER_IDENTITY).unwrap_or_default(),
            uploader_identity: fields::take_text(&mut fields, UPLOADER_IDENTITY)
                .unwrap_or_default(),
            org_msp_id: fields::take_text(&mut fields, ORG_MSP_ID).unwrap_or_default(),
            encrypted_fields: parse_encrypted_fields(fields.remove(ENCRYPTED_FIELDS))?,
            payload: variant.extract_payload(&mut fields)?,
            extra: fields,
        })
    }

    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    /// Composite-key namespace of this record's variant.
    #[must_use]
    pub fn chain_key_type(&self) -> String {
        self.kind().chain_key_type()
    }

    /// Text of a named field, if truthy.
    #[must_use]
    pub fn field_text(&self, name: &str) -> Option<String> {
        let typed = match (name, &self.payload) {
            (BUSINESS_ID, _) => Some(self.business_id.as_str()),
            (DIGEST, _) => Some(self.digest.as_str()),
            (SIGNATURE, _) => Some(self.signature.as_str()),
            (MEMBER_IDENTITY, _) => Some(self.member_identity.as_str()),
            (UPLOADER_IDENTITY, _) => Some(self.uploader_identity.as_str()),
            (ORG_MSP_ID, _) => Some(self.org_msp_id.as_str()),
            (PLATFORM_NO, StatePayload::Data(data)) => Some(data.platform_no.as_str()),
            (DATA_TYPE, StatePayload::Data(data)) => Some(data.data_type.as_str()),
            (TARGET_KEY, StatePayload::DataShare(share)) => Some(share.target_key.as_str()),
            (PROPOSER_IDENTITY, StatePayload::DataShare(share)) => {
                share.proposer_identity.as_deref()
            }
            (PROPOSER_PUBLIC_KEY, StatePayload::DataShare(share)) => {
                share.proposer_public_key.as_deref()
            }
            (APPROVER_IDENTITY, StatePayload::DataShare(share)) => {
                share.approver_identity.as_deref()
            }
            (ENCRYPTED_KEY_FOR_PROPOSER, StatePayload::DataShare(share)) => {
                share.encrypted_key_for_proposer.as_deref()
            }
            (STATUS, StatePayload::DataShare(share)) => Some(share.status.as_str()),
            (HANDLED_TIME, StatePayload::DataShare(share)) => share.handled_time.as_deref(),
            _ => return self.extra.get(name).and_then(fields::text_of),
        };
        typed.filter(|s| !s.is_empty()).map(str::to_string)
    }

    /// Ledger key: truthy chain-key field values in order, joined by `_`.
    ///
    /// # Errors
    ///
    /// `ChainKey` when every chain-key field is empty.
    pub fn chain_key(&self) -> ChaincodeResult<String> {
        let values: Vec<String> = self
            .kind()
            .variant()
            .chain_key_fields()
            .iter()
            .filter_map(|field| self.field_text(field))
            .collect();
        if values.is_empty() {
            return Err(ChaincodeError::ChainKey {
                key_type: self.chain_key_type(),
            });
        }
        Ok(values.join("_"))
    }

    // -------------------------------------------------------------------------
    // Authorization
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// `Authorization` when the caller's org differs from the stored org.
    pub fn is_submit_by_caller_org(&self, caller: &CallerIdentity) -> ChaincodeResult<()> {
        if self.org_msp_id != caller.mspid {
            return Err(ChaincodeError::Authorization(format!(
                "Invalid Organization MSP: {} != {}",
                self.org_msp_id, caller.mspid
            )));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `Authorization` when the caller is neither owner nor uploader.
    pub fn is_submit_by_caller(&self, caller: &CallerIdentity) -> ChaincodeResult<()> {
        if self.member_identity != caller.id && self.uploader_identity != caller.id {
            return Err(ChaincodeError::Authorization(format!(
                "Invalid member identity: {} != {}",
                self.member_identity, caller.id
            )));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    /// Persisted document form, with `stateType` and a freshly derived
    /// `chainKey`.
    ///
    /// # Errors
    ///
    /// `ChainKey` when no key can be derived.
    pub fn to_document(&self) -> ChaincodeResult<Map<String, Value>> {
        let mut doc = self.extra.clone();
        doc.insert(BUSINESS_ID.into(), Value::from(self.business_id.as_str()));
        doc.insert(DIGEST.into(), Value::from(self.digest.as_str()));
        doc.insert(SIGNATURE.into(), Value::from(self.signature.as_str()));
        doc.insert(MEMBER_IDENTITY.into(), Value::from(self.member_identity.as_str()));
        doc.insert(UPLOADER_IDENTITY.into(), Value::from(self.uploader_identity.as_str()));
        doc.insert(ORG_MSP_ID.into(), Value::from(self.org_msp_id.as_str()));
        doc.insert(
            ENCRYPTED_FIELDS.into(),
            Value::from(self.encrypted_fields.clone()),
        );
        doc.extend(self.payload.to_fields()?);
        if let Some(tag) = self.kind().variant().state_type() {
            doc.insert(STATE_TYPE.into(), Value::from(tag));
        }
        doc.insert(CHAIN_KEY.into(), Value::from(self.chain_key()?));
        Ok(doc)
    }

    /// # Errors
    ///
    /// As [`Self::to_document`].
    pub fn to_value(&self) -> ChaincodeResult<Value> {
        self.to_document().map(Value::Object)
    }

    /// UTF-8 JSON bytes as written to the ledger.
    ///
    /// # Errors
    ///
    /// As [`Self::to_document`].
    pub fn to_bytes(&self) -> ChaincodeResult<Vec<u8>> {
        serde_json::to_vec(&self.to_document()?)
            .map_err(|e| ChaincodeError::Serialization(e.to_string()))
    }

    // -------------------------------------------------------------------------
    // Typed patches
    // -------------------------------------------------------------------------

    /// Overwrite one top-level field. Names are matched literally; a dotted
    /// name such as `a.b` lands in `extra` under that exact key.
    ///
    /// # Errors
    ///
    /// - `InvalidField` when changing `stateType`
    /// - `InvalidField` when setting a consent `status`
    /// - `InvalidField` when the value has the wrong shape
    pub fn apply_field(&mut self, name: &str, value: Value) -> ChaincodeResult<()> {
        let text = || fields::text_of(&value);
        match (name, &mut self.payload) {
            (BUSINESS_ID, _) => self.business_id = text().unwrap_or_default(),
            (DIGEST, _) => self.digest = text().unwrap_or_default(),
            (SIGNATURE, _) => self.signature = text().unwrap_or_default(),
            (MEMBER_IDENTITY, _) => self.member_identity = text().unwrap_or_default(),
            (UPLOADER_IDENTITY, _) => self.uploader_identity = text().unwrap_or_default(),
            (ORG_MSP_ID, _) => self.org_msp_id = text().unwrap_or_default(),
            (ENCRYPTED_FIELDS, _) => {
                self.encrypted_fields = parse_encrypted_fields(Some(value))?;
            }
            (STATE_TYPE, _) => {
                return Err(ChaincodeError::invalid(
                    STATE_TYPE,
                    "record variant cannot be changed",
                ));
            }
            (CHAIN_KEY, _) => {
                debug!(value = %value, "ignoring chainKey patch; key is derived");
            }
            (PLATFORM_NO, StatePayload::Data(data)) => {
                data.platform_no = text().unwrap_or_default();
            }
            (DATA_TYPE, StatePayload::Data(data)) => data.data_type = text().unwrap_or_default(),
            (TARGET_KEY, StatePayload::DataShare(share)) => {
                share.target_key = text().unwrap_or_default();
            }
            (PROPOSER_IDENTITY, StatePayload::DataShare(share)) => {
                share.proposer_identity = text();
            }
            (PROPOSER_PUBLIC_KEY, StatePayload::DataShare(share)) => {
                share.proposer_public_key = text();
            }
            (APPROVER_IDENTITY, StatePayload::DataShare(share)) => {
                share.approver_identity = text();
            }
            (ENCRYPTED_KEY_FOR_PROPOSER, StatePayload::DataShare(share)) => {
                share.encrypted_key_for_proposer = text();
            }
            (STATUS, StatePayload::DataShare(_)) => {
                return Err(ChaincodeError::invalid(
                    STATUS,
                    "consent status changes only through the workflow",
                ));
            }
            (HANDLED_TIME, StatePayload::DataShare(share)) => share.handled_time = text(),
            _ => {
                self.extra.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    /// Shallow merge-overwrite of every entry in `patch`.
    ///
    /// # Errors
    ///
    /// As [`Self::apply_field`]; entries before the failing one stay applied.
    pub fn update_fields(&mut self, patch: Map<String, Value>) -> ChaincodeResult<()> {
        for (name, value) in patch {
            self.apply_field(&name, value)?;
        }
        Ok(())
    }

    /// Overlay the non-empty content of `other` onto `self`.
    ///
    /// Ownership (`memberIdentity`, `uploaderIdentity`, `orgMspId`), the
    /// consent status and this record's chain-key fields are left alone, so
    /// a merged record is always stored under the key it was loaded from.
    pub fn merge_from(&mut self, other: &StateRecord) {
        let key_fields = self.kind().variant().chain_key_fields();
        let mergeable = |name: &str| !key_fields.contains(&name);

        if mergeable(BUSINESS_ID) {
            overlay(&mut self.business_id, &other.business_id);
        }
        overlay(&mut self.digest, &other.digest);
        overlay(&mut self.signature, &other.signature);
        if !other.encrypted_fields.is_empty() {
            self.encrypted_fields = other.encrypted_fields.clone();
        }
        self.extra
            .extend(other.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        match (&mut self.payload, &other.payload) {
            (StatePayload::Data(mine), StatePayload::Data(theirs)) => {
                if mergeable(PLATFORM_NO) {
                    overlay(&mut mine.platform_no, &theirs.platform_no);
                }
                if mergeable(DATA_TYPE) {
                    overlay(&mut mine.data_type, &theirs.data_type);
                }
            }
            (StatePayload::DataShare(mine), StatePayload::DataShare(theirs)) => {
                if mergeable(TARGET_KEY) {
                    overlay(&mut mine.target_key, &theirs.target_key);
                }
                if mergeable(PROPOSER_IDENTITY) {
                    overlay_opt(&mut mine.proposer_identity, &theirs.proposer_identity);
                }
                if mergeable(APPROVER_IDENTITY) {
                    overlay_opt(&mut mine.approver_identity, &theirs.approver_identity);
                }
                overlay_opt(&mut mine.proposer_public_key, &theirs.proposer_public_key);
                overlay_opt(
                    &mut mine.encrypted_key_for_proposer,
                    &theirs.encrypted_key_for_proposer,
                );
                overlay_opt(&mut mine.handled_time, &theirs.handled_time);
            }
            _ => {}
        }
    }
}

impl Serialize for StateRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let doc = self.to_document().map_err(serde::ser::Error::custom)?;
        doc.serialize(serializer)
    }
}

fn overlay(target: &mut String, source: &str) {
    if !source.is_empty() {
        *target = source.to_string();
    }
}

fn overlay_opt(target: &mut Option<String>, source: &Option<String>) {
    if source.is_some() {
        target.clone_from(source);
    }
}

/// Falsy input means no encrypted fields; anything else must be an array
/// of field names.
fn parse_encrypted_fields(value: Option<Value>) -> ChaincodeResult<Vec<String>> {
    match value {
        None => Ok(Vec::new()),
        Some(v) if !fields::is_truthy(&v) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(name),
                other => Err(ChaincodeError::invalid(
                    ENCRYPTED_FIELDS,
                    format!("expected field name, got {other}"),
                )),
            })
            .collect(),
        Some(other) => Err(ChaincodeError::invalid(
            ENCRYPTED_FIELDS,
            format!("Invalid array field: {other}"),
        )),
    }
}

// =============================================================================
// TESTS
// =============================================================================
