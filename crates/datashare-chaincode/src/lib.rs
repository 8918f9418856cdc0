//! # DataShare Chaincode
//!
//! Identity-aware record persistence and a two-party consent workflow on
//! top of an ordered key-value ledger world state.
//!
//! ## Purpose
//!
//! Records are JSON documents stored under a chain key derived from their
//! variant's key fields. Every record carries the identity of the member
//! that wrote it, resolved from the invoking client's X.509 certificate,
//! and only that member (or organization) may change it.
//!
//! DataShare records implement the consent workflow: a proposer requests
//! access to a Data record, and the record's owner approves or rejects.
//! Owners may also share directly.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | Ownership re-derived from the caller, never from payloads | `domain/record.rs` - `StateRecord::materialize()` |
//! | Immutable fields survive updates | `domain/record.rs` - `StateRecord::update_fields()` |
//! | Consent transitions only leave `pending` | `domain/consent.rs` - `ConsentStatus::on()` |
//! | Iterators are always closed | `service/iterator.rs` - `drain_iterator()` |
//!
//! ## Layout
//!
//! | Layer | Location | Purpose |
//! |-------|----------|---------|
//! | Domain | `domain/` | Records, variants, consent, identity, queries |
//! | Ports | `ports/` | `DataStateApi`, `DataShareApi`, `ChaincodeStub` |
//! | Service | `service/` | Repository and the two contracts |
//! | Adapters | `adapters/` | In-memory ledger stub |
//!
//! ## Usage Example
//!
//! ```ignore
//! use datashare_chaincode::prelude::*;
//!
//! let ctx = TxContext::new(stub);
//! let contract = DataShareContract::new();
//! let grants = contract.request(&ctx, &payload).await?;
//! ```

// Crate-level lints
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// =============================================================================
// MODULES
// =============================================================================

pub mod adapters;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod service;
pub mod telemetry;


// =============================================================================
// PRELUDE
// =============================================================================

/// Convenient re-exports for common usage.
pub mod prelude {
    // Domain
    pub use crate::domain::{
        CallerIdentity, CompositeKeyQuery, ConsentEvent, ConsentStatus, DataFields,
        DataShareFields, PagedStates, QueryMetadata, RecordKind, RichQuery, StatePayload,
        StateRecord, StateRegistry, StateVariant,
    };

    // Ports
    pub use crate::ports::inbound::{DataShareApi, DataStateApi, UploadAndShare};
    pub use crate::ports::outbound::{
        ChaincodeStub, Credential, LedgerEntry, PagedIterator, SerializedIdentity, StateIterator,
    };

    // Service
    pub use crate::service::{
        DataShareContract, DataStateContract, StateInput, StateRepository, TxContext,
    };

    // Adapters
    pub use crate::adapters::{InMemoryLedger, InMemoryStub};

    // Ambient
    pub use crate::config::ChaincodeConfig;
    pub use crate::errors::{ChaincodeError, ChaincodeResult, LedgerError};
    pub use crate::telemetry::init_tracing;
}

// =============================================================================
// CRATE INFO
// =============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// TESTS
// =============================================================================
