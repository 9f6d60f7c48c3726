//! Log subscriber setup for hosts embedding the engine.

use echoes_core::EchoesConfig;
use tracing_subscriber::EnvFilter;

/// Build the log filter: `RUST_LOG` when set, otherwise `general.log_level`.
#[must_use]
pub fn env_filter(config: &EchoesConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.general.log_level))
}

/// Install a global `fmt` subscriber.
///
/// Emits JSON lines when `telemetry.json_logs` is set. Returns `false` when a
/// global subscriber was already installed, which is common in tests.
pub fn init_tracing(config: &EchoesConfig) -> bool {
    let filter = env_filter(config);
    let installed = if config.telemetry.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_level(true)
            .try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_reported() {
        let config = EchoesConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
