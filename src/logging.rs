//! Process-wide `tracing` subscriber setup.
//!
//! Filter precedence: the `TESTWEAVER_LOG_LEVEL` environment variable, then
//! `[logging] level` from the config, then `info`. Logs go to stderr so
//! command output on stdout stays clean.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV_VAR: &str = "TESTWEAVER_LOG_LEVEL";

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
