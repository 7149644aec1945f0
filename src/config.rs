//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it changes:
//!
//! ```toml
//! max_attempts = 5
//! attempt_timeout_ms = 2000
//! max_concurrency = 16
//!
//! [backoff]
//! unit_ms = 500
//!
//! [client.default_headers]
//! Accept = "application/json"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::error::{Result, VolleyError};

/// What to do with a templated item whose placeholders do not satisfy the URL template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidItemPolicy {
    /// Emit a failed record with a configuration error in the item's slot.
    #[default]
    Report,
    /// Log a warning and leave the item out of the output entirely.
    Drop,
}

/// Configuration for the fetch engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Attempts per request, including the first one
    pub max_attempts: u32,

    /// Timeout for each individual attempt in milliseconds
    pub attempt_timeout_ms: u64,

    /// Delay between attempts
    pub backoff: BackoffConfig,

    /// Maximum number of requests in flight at once. None means no limit.
    pub max_concurrency: Option<usize>,

    /// Deadline for a whole batch in milliseconds. Requests still running when it elapses
    /// finish as cancelled; completed results are kept.
    pub batch_deadline_ms: Option<u64>,

    /// Handling of templated items that cannot be rendered
    pub invalid_item_policy: InvalidItemPolicy,

    /// Field holding the record list in paged responses
    pub results_field: String,

    /// Shared HTTP client settings
    pub client: ClientConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout_ms: 10_000,
            backoff: BackoffConfig::default(),
            max_concurrency: None,
            batch_deadline_ms: None,
            invalid_item_policy: InvalidItemPolicy::default(),
            results_field: "results".to_string(),
            client: ClientConfig::default(),
        }
    }
}

/// Exponential backoff settings: the wait after failed attempt `n` is `unit_ms * base^n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base: u32,
    pub unit_ms: u64,
    /// Upper bound for a single wait
    pub max_delay_ms: Option<u64>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: 2,
            unit_ms: 1000,
            max_delay_ms: None,
        }
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        let policy = BackoffPolicy::new(config.base, Duration::from_millis(config.unit_ms));
        match config.max_delay_ms {
            Some(max) => policy.with_max_delay(Duration::from_millis(max)),
            None => policy,
        }
    }
}

/// Settings for the single shared HTTP client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
}

impl FetchConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FetchConfig =
            toml::from_str(content).map_err(|e| VolleyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VolleyError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(VolleyError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(VolleyError::Config(
                "attempt_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.backoff.base == 0 {
            return Err(VolleyError::Config(
                "backoff.base must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency == Some(0) {
            return Err(VolleyError::Config(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }
        if self.results_field.is_empty() {
            return Err(VolleyError::Config(
                "results_field must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        self.batch_deadline_ms.map(Duration::from_millis)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        (&self.backoff).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.attempt_timeout(), Duration::from_secs(10));
        assert_eq!(config.backoff_policy().delay(1), Duration::from_secs(2));
        assert_eq!(config.invalid_item_policy, InvalidItemPolicy::Report);
        assert_eq!(config.results_field, "results");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FetchConfig::from_toml_str(
            r#"
            max_attempts = 5
            invalid_item_policy = "drop"

            [backoff]
            unit_ms = 10
            max_delay_ms = 50

            [client.default_headers]
            Accept = "application/json"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.attempt_timeout_ms, 10_000);
        assert_eq!(config.backoff.base, 2);
        assert_eq!(config.invalid_item_policy, InvalidItemPolicy::Drop);
        assert_eq!(config.client.default_headers["Accept"], "application/json");
        assert_eq!(config.backoff_policy().delay(3), Duration::from_millis(50));
    }

    #[test]
    fn test_validation_errors() {
        for toml in [
            "max_attempts = 0",
            "attempt_timeout_ms = 0",
            "max_concurrency = 0",
            "results_field = \"\"",
            "[backoff]\nbase = 0",
        ] {
            let err = FetchConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, VolleyError::Config(_)), "{toml}");
        }
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let err = FetchConfig::from_toml_str("max_attempts = \"three\"").unwrap_err();
        assert!(matches!(err, VolleyError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "attempt_timeout_ms = 250\nbatch_deadline_ms = 1000").unwrap();

        let config = FetchConfig::from_file(file.path()).unwrap();
        assert_eq!(config.attempt_timeout(), Duration::from_millis(250));
        assert_eq!(config.batch_deadline(), Some(Duration::from_secs(1)));

        let missing = FetchConfig::from_file(Path::new("/definitely/not/here.toml"));
        assert!(missing.is_err());
    }
}
