//! # Record Variants
//!
//! Every record shares one struct ([`StateRecord`]); what differs per
//! variant is injected through the [`StateVariant`] capability interface:
//! required fields, chain-key fields, payload extraction, validation and
//! workflow transitions.
//!
//! Persisted records are dispatched back to a variant by their `stateType`
//! tag through [`StateRegistry`].

use crate::domain::consent::{ConsentEvent, ConsentStatus};
use crate::domain::fields::{
    self, APPROVER_IDENTITY, BUSINESS_ID, DATA_TYPE, ENCRYPTED_KEY_FOR_PROPOSER, HANDLED_TIME,
    PLATFORM_NO, PROPOSER_IDENTITY, PROPOSER_PUBLIC_KEY, STATUS, TARGET_KEY,
};
use crate::domain::record::{DataFields, DataShareFields, StatePayload, StateRecord};
use crate::errors::{ChaincodeError, ChaincodeResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// `stateType` tag of Data records.
pub const DATA_STATE_TYPE: &str = "data";

/// `stateType` tag of DataShare (consent) records.
pub const DATA_SHARE_STATE_TYPE: &str = "data_share";

/// Fields every record must carry at creation.
pub const BASE_REQUIRED_FIELDS: &[&str] = &[fields::DIGEST, fields::SIGNATURE, BUSINESS_ID];

// =============================================================================
// CAPABILITY INTERFACE
// =============================================================================

/// Variant-specific behavior plugged into the shared record.
pub trait StateVariant: Send + Sync {
    /// The kind this variant implements.
    fn kind(&self) -> RecordKind;

    /// Discriminator written to `stateType`. `None` for the base variant.
    fn state_type(&self) -> Option<&'static str>;

    /// Fields this variant requires in addition to [`BASE_REQUIRED_FIELDS`].
    fn required_fields(&self) -> &'static [&'static str];

    /// Ordered fields whose values form the chain key.
    fn chain_key_fields(&self) -> &'static [&'static str];

    /// Move the variant's own fields out of `fields` into a typed payload.
    ///
    /// # Errors
    ///
    /// `InvalidField` when a payload field has the wrong shape.
    fn extract_payload(&self, fields: &mut Map<String, Value>) -> ChaincodeResult<StatePayload>;

    /// Variant invariants checked after construction.
    ///
    /// # Errors
    ///
    /// Variant-specific validation failures.
    fn validate(&self, _record: &StateRecord) -> ChaincodeResult<()> {
        Ok(())
    }

    /// Apply a workflow event to `record`.
    ///
    /// # Errors
    ///
    /// `InvalidState` for variants without a workflow or illegal transitions.
    fn transition(&self, _record: &mut StateRecord, event: ConsentEvent) -> ChaincodeResult<()> {
        Err(ChaincodeError::InvalidState {
            expected: "data_share record".to_string(),
            actual: format!("{} record receiving {event:?}", self.kind()),
        })
    }
}

// =============================================================================
// RECORD KINDS
// =============================================================================

/// The closed set of record variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Untagged base record keyed by `businessId`.
    Base,
    /// Business data record.
    Data,
    /// Consent record governing access to a Data record.
    DataShare,
}

impl RecordKind {
    /// Capability implementation for this kind.
    #[must_use]
    pub fn variant(self) -> &'static dyn StateVariant {
        match self {
            Self::Base => &BaseState,
            Self::Data => &DataState,
            Self::DataShare => &DataShareState,
        }
    }

    /// Composite-key namespace: chain-key field names, lowercased, joined by `~`.
    #[must_use]
    pub fn chain_key_type(self) -> String {
        self.variant()
            .chain_key_fields()
            .iter()
            .map(|f| f.to_lowercase())
            .collect::<Vec<_>>()
            .join("~")
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Data => write!(f, "data"),
            Self::DataShare => write!(f, "data_share"),
        }
    }
}

// =============================================================================
// VARIANT IMPLEMENTATIONS
// =============================================================================

/// Base record: keyed by `businessId` alone.
#[derive(Debug, Clone, Copy)]
pub struct BaseState;

impl StateVariant for BaseState {
    fn kind(&self) -> RecordKind {
        RecordKind::Base
    }

    fn state_type(&self) -> Option<&'static str> {
        None
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn chain_key_fields(&self) -> &'static [&'static str] {
        &[BUSINESS_ID]
    }

    fn extract_payload(&self, _fields: &mut Map<String, Value>) -> ChaincodeResult<StatePayload> {
        Ok(StatePayload::Base)
    }
}

/// Data record: keyed by platform, data type and business id.
#[derive(Debug, Clone, Copy)]
pub struct DataState;

impl StateVariant for DataState {
    fn kind(&self) -> RecordKind {
        RecordKind::Data
    }

    fn state_type(&self) -> Option<&'static str> {
        Some(DATA_STATE_TYPE)
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[PLATFORM_NO, DATA_TYPE]
    }

    fn chain_key_fields(&self) -> &'static [&'static str] {
        &[PLATFORM_NO, DATA_TYPE, BUSINESS_ID]
    }

    fn extract_payload(&self, fields: &mut Map<String, Value>) -> ChaincodeResult<StatePayload> {
        Ok(StatePayload::Data(DataFields {
            platform_no: fields::take_text(fields, PLATFORM_NO).unwrap_or_default(),
            data_type: fields::take_text(fields, DATA_TYPE).unwrap_or_default(),
        }))
    }
}

/// Consent record: keyed by approver, proposer and target record key.
#[derive(Debug, Clone, Copy)]
pub struct DataShareState;

impl StateVariant for DataShareState {
    fn kind(&self) -> RecordKind {
        RecordKind::DataShare
    }

    fn state_type(&self) -> Option<&'static str> {
        Some(DATA_SHARE_STATE_TYPE)
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[TARGET_KEY]
    }

    fn chain_key_fields(&self) -> &'static [&'static str] {
        &[APPROVER_IDENTITY, PROPOSER_IDENTITY, TARGET_KEY]
    }

    fn extract_payload(&self, fields: &mut Map<String, Value>) -> ChaincodeResult<StatePayload> {
        let status = match fields.remove(STATUS) {
            Some(value) if fields::is_truthy(&value) => {
                ConsentStatus::from_value(&value)?
            }
            _ => ConsentStatus::Pending,
        };
        Ok(StatePayload::DataShare(DataShareFields {
            target_key: fields::take_text(fields, TARGET_KEY).unwrap_or_default(),
            proposer_identity: fields::take_text(fields, PROPOSER_IDENTITY),
            proposer_public_key: fields::take_text(fields, PROPOSER_PUBLIC_KEY),
            approver_identity: fields::take_text(fields, APPROVER_IDENTITY),
            encrypted_key_for_proposer: fields::take_text(fields, ENCRYPTED_KEY_FOR_PROPOSER),
            status,
            handled_time: fields::take_text(fields, HANDLED_TIME),
        }))
    }

    fn transition(&self, record: &mut StateRecord, event: ConsentEvent) -> ChaincodeResult<()> {
        let share = record.share_fields_mut()?;
        share.status = share.status.on(event)?;
        Ok(())
    }
}

// =============================================================================
// TAG REGISTRY
// =============================================================================

/// Maps persisted `stateType` tags to record kinds.
///
/// Untagged documents decode as [`RecordKind::Base`]; tags without a
/// registration fall back to [`RecordKind::Data`].
#[derive(Debug, Clone)]
pub struct StateRegistry {
    by_tag: HashMap<&'static str, RecordKind>,
    untagged: RecordKind,
    fallback: RecordKind,
}

impl Default for StateRegistry {
    fn default() -> Self {
        let mut registry = Self {
            by_tag: HashMap::new(),
            untagged: RecordKind::Base,
            fallback: RecordKind::Data,
        };
        registry.register(RecordKind::Data);
        registry.register(RecordKind::DataShare);
        registry
    }
}

impl StateRegistry {
    /// Register `kind` under its `stateType` tag. Untagged kinds are ignored.
    pub fn register(&mut self, kind: RecordKind) {
        if let Some(tag) = kind.variant().state_type() {
            self.by_tag.insert(tag, kind);
        }
    }

    /// Kind to decode a document carrying `tag` as.
    #[must_use]
    pub fn resolve(&self, tag: Option<&str>) -> RecordKind {
        match tag {
            None | Some("") => self.untagged,
            Some(tag) => self.by_tag.get(tag).copied().unwrap_or(self.fallback),
        }
    }

    /// Kind for a raw JSON document, by its `stateType` field.
    #[must_use]
    pub fn resolve_document(&self, doc: &Map<String, Value>) -> RecordKind {
        self.resolve(doc.get(fields::STATE_TYPE).and_then(Value::as_str))
    }
}
