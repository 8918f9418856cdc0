//! # Ownership Attacks
//!
//! Attempts to act on records the caller does not own. Every check runs
//! against the stored record, so forged payload fields must not help.

pub mod consent_forgery;
pub mod ownership_forgery;
