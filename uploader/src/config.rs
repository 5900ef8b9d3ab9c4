//! Uploader configuration.
//!
//! Compile-time defaults live in constants. [`UploaderConfig::from_env`]
//! overrides them from the environment (and a `.env` file, if present);
//! CLI flags override both.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Upload API base URL used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Interval between two job-status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Pause before the wizard auto-advances after a successful step.
pub const ADVANCE_DELAY: Duration = Duration::from_millis(600);

/// Batches with more rows than this are tracked by polling the job.
///
/// Smaller batches only show the "queued" confirmation.
pub const ASYNC_THRESHOLD: usize = 50;

/// Maximum failed records listed in a report before "and N more".
pub const REPORT_ERROR_LIMIT: usize = 10;

/// Maximum file size accepted by the parser (in bytes).
///
/// 10 MB limit.
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// How long the stub API keeps finished jobs before answering 404.
pub const JOB_TTL: Duration = Duration::from_secs(15 * 60);

/// Maximum logs kept by the log broadcaster channel.
pub const MAX_LOG_ENTRIES: usize = 100;

/// Runtime configuration of the uploader.
#[derive(Debug, Clone, PartialEq)]
pub struct UploaderConfig {
    pub api_url: String,
    pub poll_interval: Duration,
    pub advance_delay: Duration,
    pub async_threshold: usize,
    pub report_limit: usize,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval: POLL_INTERVAL,
            advance_delay: ADVANCE_DELAY,
            async_threshold: ASYNC_THRESHOLD,
            report_limit: REPORT_ERROR_LIMIT,
        }
    }
}

impl UploaderConfig {
    /// Load from `ROSTERLOAD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try loading .env file
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("ROSTERLOAD_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ms) = lookup("ROSTERLOAD_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(parse_number("ROSTERLOAD_POLL_INTERVAL_MS", &ms)?);
        }
        if let Some(rows) = lookup("ROSTERLOAD_ASYNC_THRESHOLD") {
            config.async_threshold = parse_number("ROSTERLOAD_ASYNC_THRESHOLD", &rows)? as usize;
        }

        Ok(config)
    }

    /// Set the API base URL (trailing slashes removed).
    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
