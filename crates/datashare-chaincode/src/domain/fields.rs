//! # Field Helpers
//!
//! Well-known record field names and the JSON truthiness rules used for
//! required-field checks, chain-key derivation and parameter linting.

use serde_json::{Map, Value};

pub const BUSINESS_ID: &str = "businessId";
pub const DIGEST: &str = "digest";
pub const SIGNATURE: &str = "signature";
pub const MEMBER_IDENTITY: &str = "memberIdentity";
pub const UPLOADER_IDENTITY: &str = "uploaderIdentity";
pub const ORG_MSP_ID: &str = "orgMspId";
pub const ENCRYPTED_FIELDS: &str = "encryptedFields";
pub const STATE_TYPE: &str = "stateType";
pub const CHAIN_KEY: &str = "chainKey";

pub const PLATFORM_NO: &str = "platformNo";
pub const DATA_TYPE: &str = "dataType";

pub const TARGET_KEY: &str = "targetKey";
pub const PROPOSER_IDENTITY: &str = "proposerIdentity";
pub const PROPOSER_PUBLIC_KEY: &str = "proposerPublicKey";
pub const APPROVER_IDENTITY: &str = "approverIdentity";
pub const ENCRYPTED_KEY_FOR_PROPOSER: &str = "encryptedKeyForProposer";
pub const STATUS: &str = "status";
pub const HANDLED_TIME: &str = "handledTime";

/// Fields a caller may never set on construction; they are derived.
pub const DEFAULT_IMMUTABLE_FIELDS: &[&str] = &[UPLOADER_IDENTITY, ORG_MSP_ID, CHAIN_KEY, STATE_TYPE];

/// JSON truthiness: `null`, `false`, `0`, `""` are falsy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Textual form of a truthy scalar. Strings are taken verbatim, numbers and
/// booleans are stringified, compound values are JSON-encoded.
#[must_use]
pub fn text_of(value: &Value) -> Option<String> {
    if !is_truthy(value) {
        return None;
    }
    Some(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Remove `key` from `fields` and return its text, if truthy.
pub fn take_text(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    fields.remove(key).as_ref().and_then(text_of)
}

/// Parse a string parameter as JSON, falling back to the raw string.
#[must_use]
pub fn lint_param(param: &str) -> Value {
    serde_json::from_str(param).unwrap_or_else(|_| Value::String(param.to_string()))
}

/// Sanitize composite-key attributes: drop falsy entries and the literal
/// `"null"`, stringify the rest.
#[must_use]
pub fn lint_keys(keys: &[Value]) -> Vec<String> {
    keys.iter()
        .filter(|k| is_truthy(k) && k.as_str() != Some("null"))
        .filter_map(text_of)
        .collect()
}

/// Rewrite literal NUL characters to the JSON escape text `\u0000`.
#[must_use]
pub fn escape_nul(raw: &str) -> String {
    raw.replace('\u{0}', "\\u0000")
}
