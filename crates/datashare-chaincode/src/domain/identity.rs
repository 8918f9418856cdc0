//! # Caller Identity
//!
//! Derives the principal `{id, mspid}` of an invoking client from its
//! credential. `id` is the uppercase hex serial number of the X.509
//! certificate; `mspid` is the issuing organization.
//!
//! The certificate has already been verified by the host. Only the PEM
//! framing is normalized and the serial extracted here.

use crate::errors::{ChaincodeError, ChaincodeResult};
use crate::ports::outbound::Credential;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

lazy_static! {
    static ref PEM_FRAME: Regex = Regex::new(
        r"-----\s*BEGIN ?([^-]+?)-----([\s\S]*)-----\s*END ?([^-]+?)-----"
    )
    .expect("static PEM regex");
}

/// Authenticated principal of the current invocation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Uppercase certificate serial number.
    pub id: String,
    /// Organization (MSP) identifier.
    pub mspid: String,
}

impl CallerIdentity {
    /// Resolve the principal behind `credential`.
    ///
    /// # Errors
    ///
    /// `CertificateParse` when the PEM markers are missing or the DER body
    /// is not an X.509 certificate.
    pub fn from_credential(credential: &dyn Credential) -> ChaincodeResult<Self> {
        let raw = String::from_utf8_lossy(credential.raw_bytes());
        let id = certificate_serial(&raw).inspect_err(|err| {
            debug!(mspid = credential.org(), error = %err, "caller identity extraction failed");
        })?;
        Ok(Self {
            id,
            mspid: credential.org().to_string(),
        })
    }
}

/// Rebuild a PEM block so that the BEGIN and END markers sit on their own
/// lines with no surrounding whitespace, terminated by a newline.
///
/// # Errors
///
/// `CertificateParse` when no matched BEGIN/END pair is found.
pub fn normalize_pem(raw: &str) -> ChaincodeResult<String> {
    let captures = PEM_FRAME.captures(raw).ok_or_else(|| {
        ChaincodeError::CertificateParse(
            "Failed to find start line or end line of the certificate.".to_string(),
        )
    })?;
    let begin_label = captures[1].trim();
    let end_label = captures[3].trim();
    if begin_label != end_label {
        return Err(ChaincodeError::CertificateParse(format!(
            "mismatched PEM markers: BEGIN {begin_label} / END {end_label}"
        )));
    }
    let body = captures[2].split_whitespace().collect::<Vec<_>>().join("\n");
    Ok(format!(
        "-----BEGIN {begin_label}-----\n{body}\n-----END {end_label}-----\n"
    ))
}

/// Extract the uppercase hex serial number from a PEM certificate.
///
/// Leading zero octets (DER sign padding) are dropped.
///
/// # Errors
///
/// `CertificateParse` on malformed framing or DER.
pub fn certificate_serial(raw_pem: &str) -> ChaincodeResult<String> {
    let normalized = normalize_pem(raw_pem)?;
    let (_, pem) = x509_parser::pem::parse_x509_pem(normalized.as_bytes())
        .map_err(|e| ChaincodeError::CertificateParse(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| ChaincodeError::CertificateParse(e.to_string()))?;

    let raw_serial = cert.tbs_certificate.raw_serial();
    let significant = match raw_serial.iter().position(|b| *b != 0) {
        Some(start) => &raw_serial[start..],
        None => &raw_serial[raw_serial.len().saturating_sub(1)..],
    };
    if significant.is_empty() {
        return Err(ChaincodeError::CertificateParse(
            "certificate has an empty serial number".to_string(),
        ));
    }
    Ok(hex::encode_upper(significant))
}

// =============================================================================
// TESTS
// =============================================================================
