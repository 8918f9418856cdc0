//! # Consent Workflow
//!
//! State machine embedded in DataShare records:
//!
//! ```text
//!            request()                approve()
//!   (new) ──────────────→ pending ──────────────→ approved
//!     │                      │
//!     │ share()              │ reject()
//!     └──────→ approved      └──────────────────→ rejected
//! ```
//!
//! `approved` and `rejected` are terminal. The transitions here check
//! record contents and the caller passed in; approver identity for
//! approve/reject is checked by the contract against the stored record.

use crate::domain::fields::{
    APPROVER_IDENTITY, ENCRYPTED_KEY_FOR_PROPOSER, MEMBER_IDENTITY, PROPOSER_IDENTITY, PROPOSER_PUBLIC_KEY,
};
use crate::domain::identity::CallerIdentity;
use crate::domain::record::{DataShareFields, StatePayload, StateRecord};
use crate::domain::variant::RecordKind;
use crate::errors::{ChaincodeError, ChaincodeResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// =============================================================================
// STATUS & EVENTS
// =============================================================================

/// Consent status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    /// Awaiting the approver's decision.
    #[default]
    Pending,
    /// Approver granted access. Terminal.
    Approved,
    /// Approver refused access. Terminal.
    Rejected,
}

/// Workflow events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsentEvent {
    /// Proposer asks for access.
    Request,
    /// Approver grants access without a prior request.
    Share,
    /// Approver grants a pending request.
    Approve,
    /// Approver refuses a pending request.
    Reject,
}

impl ConsentStatus {
    /// Wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// True for `approved` and `rejected`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Parse a persisted or patched status value.
    ///
    /// # Errors
    ///
    /// `InvalidField` for anything other than the three wire strings.
    pub fn from_value(value: &Value) -> ChaincodeResult<Self> {
        match value.as_str() {
            Some("pending") => Ok(Self::Pending),
            Some("approved") => Ok(Self::Approved),
            Some("rejected") => Ok(Self::Rejected),
            _ => Err(ChaincodeError::invalid(
                crate::domain::fields::STATUS,
                format!("unknown consent status {value}"),
            )),
        }
    }

    /// Transition table. Every event requires `pending`.
    ///
    /// # Errors
    ///
    /// `InvalidState` from a terminal status.
    pub fn on(self, event: ConsentEvent) -> ChaincodeResult<Self> {
        match (self, event) {
            (Self::Pending, ConsentEvent::Request) => Ok(Self::Pending),
            (Self::Pending, ConsentEvent::Share | ConsentEvent::Approve) => Ok(Self::Approved),
            (Self::Pending, ConsentEvent::Reject) => Ok(Self::Rejected),
            (status, _) => Err(ChaincodeError::InvalidState {
                expected: Self::Pending.as_str().to_string(),
                actual: status.as_str().to_string(),
            }),
        }
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// WORKFLOW ON DATASHARE RECORDS
// =============================================================================

impl StateRecord {
    /// Consent payload of a DataShare record.
    ///
    /// # Errors
    ///
    /// `InvalidState` for other variants.
    pub fn share_fields(&self) -> ChaincodeResult<&DataShareFields> {
        match &self.payload {
            StatePayload::DataShare(share) => Ok(share),
            _ => Err(not_a_consent(self.kind())),
        }
    }

    /// Mutable consent payload of a DataShare record.
    ///
    /// # Errors
    ///
    /// `InvalidState` for other variants.
    pub fn share_fields_mut(&mut self) -> ChaincodeResult<&mut DataShareFields> {
        let kind = self.kind();
        match &mut self.payload {
            StatePayload::DataShare(share) => Ok(share),
            _ => Err(not_a_consent(kind)),
        }
    }

    /// Current consent status.
    ///
    /// # Errors
    ///
    /// `InvalidState` for other variants.
    pub fn consent_status(&self) -> ChaincodeResult<ConsentStatus> {
        Ok(self.share_fields()?.status)
    }

    /// Proposer-initiated request. Leaves the record `pending`.
    ///
    /// `target` is the stored document under `targetKey`, if any.
    ///
    /// # Errors
    ///
    /// - `MissingField` without proposer public key or identity
    /// - `Authorization` when the proposer is not the caller
    /// - `MissingField` without an approver identity
    /// - `NotFound` when the target record does not exist
    /// - `Mismatch` when the target's owner is not the declared approver
    pub fn request(&mut self, caller: &CallerIdentity, target: Option<&Value>) -> ChaincodeResult<()> {
        let share = self.share_fields()?;
        if share.proposer_public_key.is_none() {
            return Err(ChaincodeError::missing(PROPOSER_PUBLIC_KEY));
        }
        let Some(proposer) = share.proposer_identity.as_deref() else {
            return Err(ChaincodeError::missing(PROPOSER_IDENTITY));
        };
        if proposer != caller.id {
            return Err(ChaincodeError::Authorization(format!(
                "Invalid proposer identity for data sharing: {proposer} != {}",
                caller.id
            )));
        }
        let Some(approver) = share.approver_identity.as_deref() else {
            return Err(ChaincodeError::missing(APPROVER_IDENTITY));
        };
        let target = target.ok_or_else(|| {
            ChaincodeError::NotFound(format!("State[{}]", share.target_key))
        })?;
        let owner = target
            .get(MEMBER_IDENTITY)
            .and_then(crate::domain::fields::text_of);
        if owner.as_deref() != Some(approver) {
            return Err(ChaincodeError::Mismatch(format!(
                "State[{}] not belong to {}",
                share.target_key,
                owner.unwrap_or_default()
            )));
        }
        self.apply_event(ConsentEvent::Request)
    }

    /// Approver-initiated grant. Moves straight to `approved`.
    ///
    /// # Errors
    ///
    /// - `MissingField` without the encrypted key or proposer information
    /// - `Authorization` when the approver is not the caller
    pub fn share(&mut self, caller: &CallerIdentity) -> ChaincodeResult<()> {
        let share = self.share_fields()?;
        if share.encrypted_key_for_proposer.is_none() {
            return Err(ChaincodeError::missing(ENCRYPTED_KEY_FOR_PROPOSER));
        }
        let approver = share.approver_identity.as_deref().unwrap_or_default();
        if approver != caller.id {
            return Err(ChaincodeError::Authorization(format!(
                "Approver[{approver}] not match Caller[{}]",
                caller.id
            )));
        }
        if share.proposer_identity.is_none() {
            return Err(ChaincodeError::missing(PROPOSER_IDENTITY));
        }
        if share.proposer_public_key.is_none() {
            return Err(ChaincodeError::missing(PROPOSER_PUBLIC_KEY));
        }
        self.apply_event(ConsentEvent::Share)
    }

    /// Grant a pending request, merging every field `update` carries.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless `pending`
    /// - `MissingField` when `update` lacks the encrypted key
    pub fn approve(&mut self, update: &StateRecord) -> ChaincodeResult<()> {
        self.consent_status()?.on(ConsentEvent::Approve)?;
        if update.share_fields()?.encrypted_key_for_proposer.is_none() {
            return Err(ChaincodeError::missing(ENCRYPTED_KEY_FOR_PROPOSER));
        }
        self.merge_from(update);
        self.apply_event(ConsentEvent::Approve)
    }

    /// Refuse a pending request. `handled_time` is stored verbatim.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `pending`.
    pub fn reject(&mut self, handled_time: impl Into<String>) -> ChaincodeResult<()> {
        self.apply_event(ConsentEvent::Reject)?;
        self.share_fields_mut()?.handled_time = Some(handled_time.into());
        Ok(())
    }

    /// Approver declared on the record.
    #[must_use]
    pub fn approver_identity(&self) -> Option<&str> {
        self.share_fields()
            .ok()
            .and_then(|s| s.approver_identity.as_deref())
    }

    /// Proposer declared on the record.
    #[must_use]
    pub fn proposer_identity(&self) -> Option<&str> {
        self.share_fields()
            .ok()
            .and_then(|s| s.proposer_identity.as_deref())
    }

    fn apply_event(&mut self, event: ConsentEvent) -> ChaincodeResult<()> {
        let variant = self.kind().variant();
        variant.transition(self, event)
    }
}

fn not_a_consent(kind: RecordKind) -> ChaincodeError {
    ChaincodeError::InvalidState {
        expected: "data_share record".to_string(),
        actual: format!("{kind} record"),
    }
}

// =============================================================================
// TESTS
// =============================================================================
