//! # Adapters Layer (Outer Hexagon)
//!
//! Implementations of the driven ports. The peer supplies the production
//! stub; the in-memory ledger serves tests and local tooling.

pub mod memory_ledger;

pub use memory_ledger::{composite_key, InMemoryLedger, InMemoryStub};
