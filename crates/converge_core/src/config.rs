//! Engine configuration.
//!
//! [`EngineConfig`] carries every tunable the planner and executor read.
//! It deserializes from JSON (missing fields take their defaults) and can be
//! overridden from `CONVERGE_*` environment variables.

use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON for [`EngineConfig`].
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override could not be parsed.
    #[error("invalid value '{value}' for {key}")]
    InvalidOverride {
        /// Environment variable name.
        key: &'static str,
        /// Raw value found.
        value: String,
    },

    /// A value is outside its permitted range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Retry behaviour for transient provider errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first one.
    pub max_attempts: u32,
    /// Wait before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single wait, in milliseconds.
    pub max_backoff_ms: u64,
    /// Growth factor applied to the wait after every failed attempt.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

/// When recorded state is re-read from providers during planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Records older than this are refreshed before diffing.
    pub staleness_secs: u64,
    /// Refresh every record regardless of age.
    pub full_refresh: bool,
}

impl RefreshConfig {
    /// Staleness threshold as a [`Duration`].
    #[must_use]
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 300,
            full_refresh: false,
        }
    }
}

/// Top-level configuration for a reconciliation engine.
///
/// # Example
///
/// ```
/// use converge_core::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "concurrency": 4, "retry": { "max_attempts": 5 } }"#)?;
/// assert_eq!(config.concurrency, 4);
/// assert_eq!(config.retry.max_attempts, 5);
/// assert_eq!(config.retry.multiplier, 2.0);
/// # Ok::<(), converge_core::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of provider operations in flight at once.
    pub concurrency: usize,
    /// Retry policy for transient failures.
    pub retry: RetryConfig,
    /// Refresh policy used while planning.
    pub refresh: RefreshConfig,
    /// Location of the file-backed state store. In-memory when unset.
    pub state_path: Option<PathBuf>,
    /// Re-plan an in-place update as a replacement when the provider
    /// rejects it.
    pub replace_on_unsupported_update: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            retry: RetryConfig::default(),
            refresh: RefreshConfig::default(),
            state_path: None,
            replace_on_unsupported_update: true,
        }
    }
}

impl EngineConfig {
    /// Environment variable overriding [`EngineConfig::concurrency`].
    pub const ENV_CONCURRENCY: &'static str = "CONVERGE_CONCURRENCY";
    /// Environment variable overriding [`RetryConfig::max_attempts`].
    pub const ENV_MAX_ATTEMPTS: &'static str = "CONVERGE_MAX_ATTEMPTS";
    /// Environment variable overriding [`RefreshConfig::staleness_secs`].
    pub const ENV_STALENESS_SECS: &'static str = "CONVERGE_STALENESS_SECS";
    /// Environment variable overriding [`RefreshConfig::full_refresh`].
    pub const ENV_FULL_REFRESH: &'static str = "CONVERGE_FULL_REFRESH";
    /// Environment variable overriding [`EngineConfig::state_path`].
    pub const ENV_STATE_PATH: &'static str = "CONVERGE_STATE_PATH";

    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`EngineConfig::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Applies `CONVERGE_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] when a variable is set to an
    /// unparseable value.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Same semantics as [`EngineConfig::with_env_overrides`], but the
    /// source of values is injectable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for unparseable values and
    /// [`ConfigError::Invalid`] if the result fails validation.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(Self::ENV_CONCURRENCY) {
            self.concurrency = parse_override(Self::ENV_CONCURRENCY, value)?;
        }
        if let Some(value) = lookup(Self::ENV_MAX_ATTEMPTS) {
            self.retry.max_attempts = parse_override(Self::ENV_MAX_ATTEMPTS, value)?;
        }
        if let Some(value) = lookup(Self::ENV_STALENESS_SECS) {
            self.refresh.staleness_secs = parse_override(Self::ENV_STALENESS_SECS, value)?;
        }
        if let Some(value) = lookup(Self::ENV_FULL_REFRESH) {
            self.refresh.full_refresh = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidOverride {
                        key: Self::ENV_FULL_REFRESH,
                        value,
                    });
                }
            };
        }
        if let Some(value) = lookup(Self::ENV_STATE_PATH)
            && !value.is_empty()
        {
            self.state_path = Some(PathBuf::from(value));
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

fn parse_override<T: core::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { key, value })
}
