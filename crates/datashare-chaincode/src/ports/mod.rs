//! # Ports Layer (Middle Hexagon)
//!
//! - **Driving Ports (Inbound)**: `DataStateApi`, `DataShareApi`
//! - **Driven Ports (Outbound)**: `ChaincodeStub`, `StateIterator`, `Credential`

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
