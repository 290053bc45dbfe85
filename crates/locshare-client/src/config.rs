//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so an empty environment gives the cadence
//! a phone client would use.

use std::path::PathBuf;
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory holding the secret store database.
    /// Env: `LOCSHARE_DATA_DIR`
    /// Default: platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Time between two location fan-outs.
    /// Env: `LOCSHARE_FANOUT_INTERVAL_SECS`
    /// Default: `20`
    pub fanout_interval: Duration,

    /// Time between two retrievals of recent updates.
    /// Env: `LOCSHARE_RETRIEVAL_INTERVAL_SECS`
    /// Default: `5`
    pub retrieval_interval: Duration,

    /// How many records one retrieval asks for.
    /// Env: `LOCSHARE_RETRIEVAL_LIMIT`
    /// Default: `10`
    pub retrieval_limit: u32,

    /// Upper bound for the delay after repeated failures.
    /// Env: `LOCSHARE_MAX_BACKOFF_SECS`
    /// Default: `300`
    pub max_backoff: Duration,

    /// Per-request HTTP timeout.
    /// Env: `LOCSHARE_HTTP_TIMEOUT_SECS`
    /// Default: `15`
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            fanout_interval: Duration::from_secs(20),
            retrieval_interval: Duration::from_secs(5),
            retrieval_limit: 10,
            max_backoff: Duration::from_secs(300),
            http_timeout: Duration::from_secs(15),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("LOCSHARE_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(secs) = seconds(&lookup, "LOCSHARE_FANOUT_INTERVAL_SECS") {
            config.fanout_interval = secs;
        }
        if let Some(secs) = seconds(&lookup, "LOCSHARE_RETRIEVAL_INTERVAL_SECS") {
            config.retrieval_interval = secs;
        }
        if let Some(secs) = seconds(&lookup, "LOCSHARE_MAX_BACKOFF_SECS") {
            config.max_backoff = secs;
        }
        if let Some(secs) = seconds(&lookup, "LOCSHARE_HTTP_TIMEOUT_SECS") {
            config.http_timeout = secs;
        }

        if let Some(val) = lookup("LOCSHARE_RETRIEVAL_LIMIT") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.retrieval_limit = n,
                _ => tracing::warn!(value = %val, "Invalid LOCSHARE_RETRIEVAL_LIMIT, using default"),
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter.

        config
    }
}

/// Positive whole seconds; anything else is ignored with a warning.
fn seconds(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    let val = lookup(name)?;
    match val.parse::<u64>() {
        Ok(n) if n > 0 => Some(Duration::from_secs(n)),
        _ => {
            tracing::warn!(var = name, value = %val, "Invalid duration, using default");
            None
        }
    }
}
