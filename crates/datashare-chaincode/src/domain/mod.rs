//! # Domain Layer (Inner Hexagon)
//!
//! Records, their variants, the consent state machine and caller identity.
//! No I/O and no async: everything here operates on values handed in by
//! the service layer.

pub mod consent;
pub mod fields;
pub mod identity;
pub mod query;
pub mod record;
pub mod variant;

pub use consent::{ConsentEvent, ConsentStatus};
pub use identity::CallerIdentity;
pub use query::{CompositeKeyQuery, PagedStates, QueryMetadata, RichQuery, DEFAULT_PAGE_SIZE};
pub use record::{DataFields, DataShareFields, StatePayload, StateRecord};
pub use variant::{RecordKind, StateRegistry, StateVariant};
