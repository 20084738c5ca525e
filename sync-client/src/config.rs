//! Engine options.
//!
//! Options are loaded from a TOML file; every field is optional and falls
//! back to the default listed on it.
//!
//! ```toml
//! session = "default"
//! account_id = "4915112345678@c.us"
//! enable_polling = true
//! chat_poll_interval_ms = 10000
//!
//! [reconnect]
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sync_core::{PolicyError, RetryPolicy};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Remote session to mirror (default: "default").
    #[serde(default = "default_session")]
    pub session: String,
    /// Local account id; learned from the session when unset.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Run the periodic pulls (default: true).
    #[serde(default = "default_true")]
    pub enable_polling: bool,
    /// Raise new-message notifications (default: true).
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    /// Chat list poll interval (default: 10 s).
    #[serde(default = "default_chat_poll_interval_ms")]
    pub chat_poll_interval_ms: u64,
    /// Foreground chat message poll interval (default: 3 s).
    #[serde(default = "default_message_poll_interval_ms")]
    pub message_poll_interval_ms: u64,
    /// Push event debounce window (default: 50 ms).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Push events per batch before a forced flush (default: 100).
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Lifetime of cached remote reads (default: 5 s).
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Cached entries before FIFO eviction (default: 100).
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Messages requested per chat fetch (default: 50).
    #[serde(default = "default_message_page_size")]
    pub message_page_size: usize,
    /// Messages kept per chat (default: 500).
    #[serde(default = "default_max_messages_per_chat")]
    pub max_messages_per_chat: usize,
    /// Idle time before the session is reported offline (default: 30 s).
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Idle and typing-expiry check interval (default: 5 s).
    #[serde(default = "default_activity_check_ms")]
    pub activity_check_ms: u64,
    /// Foreground chat presence re-subscription interval (default: 5 min).
    #[serde(default = "default_presence_resubscribe_ms")]
    pub presence_resubscribe_ms: u64,
    /// Typing indicator lifetime without refresh (default: 30 s).
    #[serde(default = "default_typing_expiry_ms")]
    pub typing_expiry_ms: u64,
    /// Backoff for remote calls.
    #[serde(default = "default_retry")]
    pub retry: BackoffConfig,
    /// Backoff for push channel reconnects. `max_attempts` is not used
    /// here: the channel is retried until shutdown.
    #[serde(default = "default_reconnect")]
    pub reconnect: BackoffConfig,
}

/// Backoff parameters as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay cap.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor between delays.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Apply ±25% jitter.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl BackoffConfig {
    /// The policy these parameters describe.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

impl From<RetryPolicy> for BackoffConfig {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter: policy.jitter,
        }
    }
}

// Default value functions
fn default_session() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_chat_poll_interval_ms() -> u64 {
    10_000
}

fn default_message_poll_interval_ms() -> u64 {
    3_000
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_max_batch() -> usize {
    100
}

fn default_cache_ttl_ms() -> u64 {
    5_000
}

fn default_cache_capacity() -> usize {
    sync_core::cache::DEFAULT_CAPACITY
}

fn default_message_page_size() -> usize {
    50
}

fn default_max_messages_per_chat() -> usize {
    sync_core::store::DEFAULT_MAX_PER_CHAT
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_activity_check_ms() -> u64 {
    5_000
}

fn default_presence_resubscribe_ms() -> u64 {
    5 * 60 * 1000
}

fn default_typing_expiry_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    RetryPolicy::standard().max_attempts
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_retry() -> BackoffConfig {
    RetryPolicy::standard().into()
}

fn default_reconnect() -> BackoffConfig {
    RetryPolicy::reconnect().into()
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            session: default_session(),
            account_id: None,
            enable_polling: true,
            notifications_enabled: true,
            chat_poll_interval_ms: default_chat_poll_interval_ms(),
            message_poll_interval_ms: default_message_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
            max_batch: default_max_batch(),
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_capacity: default_cache_capacity(),
            message_page_size: default_message_page_size(),
            max_messages_per_chat: default_max_messages_per_chat(),
            idle_timeout_ms: default_idle_timeout_ms(),
            activity_check_ms: default_activity_check_ms(),
            presence_resubscribe_ms: default_presence_resubscribe_ms(),
            typing_expiry_ms: default_typing_expiry_ms(),
            retry: default_retry(),
            reconnect: default_reconnect(),
        }
    }
}

impl EngineOptions {
    /// Parse and validate options from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Load and validate options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Policy for push channel reconnects, never running out of attempts.
    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: u32::MAX,
            ..self.reconnect.policy()
        }
    }

    /// Render the options as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check intervals, capacities and backoff policies.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("chat_poll_interval_ms", self.chat_poll_interval_ms),
            ("message_poll_interval_ms", self.message_poll_interval_ms),
            ("debounce_ms", self.debounce_ms),
            ("cache_ttl_ms", self.cache_ttl_ms),
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("activity_check_ms", self.activity_check_ms),
            ("presence_resubscribe_ms", self.presence_resubscribe_ms),
            ("typing_expiry_ms", self.typing_expiry_ms),
            ("max_batch", self.max_batch as u64),
            ("cache_capacity", self.cache_capacity as u64),
            ("message_page_size", self.message_page_size as u64),
            ("max_messages_per_chat", self.max_messages_per_chat as u64),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.session.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "session",
                reason: "must not be empty".to_string(),
            });
        }
        self.retry
            .policy()
            .validate()
            .map_err(|source| ConfigError::Policy {
                field: "retry",
                source,
            })?;
        self.reconnect_policy()
            .validate()
            .map_err(|source| ConfigError::Policy {
                field: "reconnect",
                source,
            })?;
        Ok(())
    }

    /// Chat list poll interval.
    pub fn chat_poll_interval(&self) -> Duration {
        Duration::from_millis(self.chat_poll_interval_ms)
    }

    /// Message poll interval.
    pub fn message_poll_interval(&self) -> Duration {
        Duration::from_millis(self.message_poll_interval_ms)
    }

    /// Push event debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Cache entry lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Activity check interval.
    pub fn activity_check(&self) -> Duration {
        Duration::from_millis(self.activity_check_ms)
    }

    /// Presence re-subscription interval.
    pub fn presence_resubscribe(&self) -> Duration {
        Duration::from_millis(self.presence_resubscribe_ms)
    }

    /// Typing indicator lifetime.
    pub fn typing_expiry(&self) -> Duration {
        Duration::from_millis(self.typing_expiry_ms)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Failed to render configuration.
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    /// A field has an unusable value.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// A backoff section is inconsistent.
    #[error("invalid {field} policy: {source}")]
    Policy {
        /// Offending section.
        field: &'static str,
        /// Policy validation failure.
        source: PolicyError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let options = EngineOptions::from_toml_str("").unwrap();
        assert_eq!(options, EngineOptions::default());
        assert_eq!(options.chat_poll_interval(), Duration::from_secs(10));
        assert_eq!(options.message_poll_interval(), Duration::from_secs(3));
        assert_eq!(options.debounce(), Duration::from_millis(50));
        assert_eq!(options.cache_capacity, 100);
        assert_eq!(options.reconnect.policy().max_attempts, u32::MAX);
        assert_eq!(options.retry.policy(), RetryPolicy::standard());
    }

    #[test]
    fn partial_config_overrides_fields() {
        let options = EngineOptions::from_toml_str(
            r#"
            session = "work"
            account_id = "4915@c.us"
            enable_polling = false

            [reconnect]
            initial_delay_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(options.session, "work");
        assert_eq!(options.account_id.as_deref(), Some("4915@c.us"));
        assert!(!options.enable_polling);
        assert!(options.notifications_enabled);
        assert_eq!(options.reconnect.initial_delay_ms, 500);
        assert_eq!(options.reconnect.max_delay_ms, 30_000);
    }

    #[test]
    fn reconnect_attempt_limit_is_ignored() {
        let options = EngineOptions::from_toml_str(
            r#"
            [reconnect]
            max_attempts = 0
            initial_delay_ms = 250
            "#,
        )
        .unwrap();
        let policy = options.reconnect_policy();
        assert_eq!(policy.max_attempts, u32::MAX);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert!(policy.allows_retry(1_000));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = EngineOptions::from_toml_str("chat_poll_interval_ms = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "chat_poll_interval_ms",
                ..
            }
        ));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = EngineOptions::from_toml_str("cache_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "cache_capacity", .. }));
    }

    #[test]
    fn inconsistent_policy_is_rejected() {
        let err = EngineOptions::from_toml_str(
            r#"
            [retry]
            initial_delay_ms = 60000
            max_delay_ms = 1000
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Policy {
                field: "retry",
                source: PolicyError::InitialAboveMax
            }
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineOptions::from_toml_str("enable_polling = ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "debounce_ms = 80").unwrap();

        let options = EngineOptions::load(file.path()).unwrap();
        assert_eq!(options.debounce(), Duration::from_millis(80));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineOptions::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn rendered_toml_round_trips() {
        let mut options = EngineOptions::default();
        options.account_id = Some("1@c.us".into());
        let text = options.to_toml_string().unwrap();
        assert_eq!(EngineOptions::from_toml_str(&text).unwrap(), options);
    }
}
