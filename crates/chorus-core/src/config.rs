//! Client configuration
//!
//! Values come from three layers, later layers winning: built-in defaults, a
//! TOML file, and `CHORUS_*` environment variables. The merged result must
//! pass [`ClientConfig::validate`] before a session is built from it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "CHORUS_";

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File that was read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed
    #[error("Invalid value for {key}: {value:?}")]
    Env {
        /// Environment variable name
        key: String,
        /// Raw value
        value: String,
    },

    /// Merged values are inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Configuration for channel reconnection behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on the delay between attempts, in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
    /// Whether to reset the attempt count after a successful connection
    pub reset_on_success: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            reset_on_success: true,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `failed` consecutive failures.
    pub fn allows_attempt(&self, failed: u32) -> bool {
        self.max_attempts.map_or(true, |max| failed < max)
    }
}

/// Local limits on user-authored content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentLimits {
    /// Maximum post length in Unicode code points
    pub max_post_chars: usize,
    /// Maximum attached image size in bytes
    pub max_image_bytes: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            max_post_chars: 500,
            max_image_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST API
    pub api_base_url: String,
    /// URL of the broadcast channel endpoint
    pub channel_url: String,
    /// Bound on every REST call, in milliseconds
    pub request_timeout_ms: u64,
    /// Bound on waiting for a channel publish acknowledgement, in milliseconds
    pub publish_ack_timeout_ms: u64,
    /// Capacity of the channel event fan-out buffer
    pub event_buffer: usize,
    /// Reconnect policy for the broadcast channel
    pub reconnect: ReconnectConfig,
    /// Content limits applied before submission
    pub limits: ContentLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            channel_url: "ws://localhost:3000/ws".to_string(),
            request_timeout_ms: 10_000,
            publish_ack_timeout_ms: 10_000,
            event_buffer: 256,
            reconnect: ReconnectConfig::default(),
            limits: ContentLimits::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file. Missing keys keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from `path` if it exists, otherwise start from defaults; then apply
    /// environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with `CHORUS_*` environment variables.
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_vars(std::env::vars())
    }

    /// Merge with an explicit set of `(name, value)` pairs. Unknown
    /// `CHORUS_*` names are ignored.
    pub fn merge_vars<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "API_BASE_URL" => self.api_base_url = value,
                "CHANNEL_URL" => self.channel_url = value,
                "REQUEST_TIMEOUT_MS" => self.request_timeout_ms = parse_var(&key, &value)?,
                "PUBLISH_ACK_TIMEOUT_MS" => {
                    self.publish_ack_timeout_ms = parse_var(&key, &value)?
                }
                "EVENT_BUFFER" => self.event_buffer = parse_var(&key, &value)?,
                "RECONNECT_MAX_ATTEMPTS" => {
                    self.reconnect.max_attempts = Some(parse_var(&key, &value)?)
                }
                "RECONNECT_BASE_DELAY_MS" => {
                    self.reconnect.base_delay_ms = parse_var(&key, &value)?
                }
                "RECONNECT_MAX_DELAY_MS" => self.reconnect.max_delay_ms = parse_var(&key, &value)?,
                "MAX_POST_CHARS" => self.limits.max_post_chars = parse_var(&key, &value)?,
                "MAX_IMAGE_BYTES" => self.limits.max_image_bytes = parse_var(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("api_base_url", &self.api_base_url),
            ("channel_url", &self.channel_url),
        ] {
            if url.trim().is_empty() {
                return Err(ConfigError::invalid(format!("{name} must not be empty")));
            }
        }
        if !(self.channel_url.starts_with("ws://") || self.channel_url.starts_with("wss://")) {
            return Err(ConfigError::invalid(format!(
                "channel_url must use ws:// or wss://, got {}",
                self.channel_url
            )));
        }
        if self.request_timeout_ms == 0 || self.publish_ack_timeout_ms == 0 {
            return Err(ConfigError::invalid("timeouts must be greater than zero"));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::invalid("event_buffer must be greater than zero"));
        }
        if self.reconnect.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid("backoff_multiplier must be at least 1.0"));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::invalid(
                "reconnect base_delay_ms exceeds max_delay_ms",
            ));
        }
        if self.limits.max_post_chars == 0 {
            return Err(ConfigError::invalid("max_post_chars must be greater than zero"));
        }
        Ok(())
    }

    /// REST call bound.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Publish acknowledgement bound.
    pub fn publish_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_ack_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}
