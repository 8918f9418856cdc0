//! Chaincode configuration from environment variables.

use crate::domain::query::DEFAULT_PAGE_SIZE;
use std::env;

/// Runtime settings shared by repositories and contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaincodeConfig {
    /// Service name attached to log output
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Page size for listings that do not specify one
    pub default_page_size: u32,
}

impl Default for ChaincodeConfig {
    fn default() -> Self {
        Self {
            service_name: "datashare-chaincode".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ChaincodeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DS_SERVICE_NAME`: Service name (default: datashare-chaincode)
    /// - `DS_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `DS_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `DS_PAGE_SIZE`: Default page size (default: 10)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("DS_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: lookup("DS_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            json_logs: lookup("DS_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.json_logs),

            default_page_size: lookup("DS_PAGE_SIZE")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.default_page_size),
        }
    }
}
