//! # Service Layer
//!
//! Implements the driving ports on top of the host stub:
//!
//! 1. `StateRepository` persists and queries records of one variant
//! 2. `DataStateContract` exposes the generic record operations
//! 3. `DataShareContract` runs the consent workflow

pub mod context;
pub mod data_contract;
pub mod iterator;
pub mod repository;
pub mod share_contract;

pub use context::TxContext;
pub use data_contract::DataStateContract;
pub use iterator::drain_iterator;
pub use repository::{StateInput, StateRepository, BASE_INDEX};
pub use share_contract::{DataShareContract, DATA_SHARE_INDEX};
