//! Log subscriber setup.
//!
//! Installs a `tracing-subscriber` fmt subscriber filtered by the configured
//! level, in plain or JSON form.

use crate::config::ChaincodeConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Returns `false` when a subscriber is already installed or the level
/// filter cannot be parsed; the existing subscriber stays in place.
pub fn init_tracing(config: &ChaincodeConfig) -> bool {
    let Ok(filter) = EnvFilter::try_new(&config.log_level) else {
        return false;
    };

    let installed = if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(
            service = %config.service_name,
            json = config.json_logs,
            "tracing initialized"
        );
    }
    installed
}
