//! # Integration Flows
//!
//! Both contracts running against one shared world state, driven by
//! several members with real certificates.

pub mod consent_flows;
pub mod record_flows;
