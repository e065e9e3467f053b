//! Configuration types for osnova-likes

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for [`LikesCollector`](crate::LikesCollector)
///
/// Fields are organized into logical sub-configs:
/// - [`queue`](QueueConfig): request pacing and retry policy
/// - [`api`](ApiConfig): platform endpoints and API versions
/// - [`auth`](AuthConfig): token relay and refresh policy
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Request queue pacing
    #[serde(default)]
    pub queue: QueueConfig,

    /// Platform API endpoints
    #[serde(default)]
    pub api: ApiConfig,

    /// Access token refresh
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// Missing keys fall back to their defaults, so `{}` is a valid file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the queue cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue.period.is_zero() {
            return Err(Error::Config {
                message: "queue period must be greater than zero".to_string(),
                key: Some("queue.period".to_string()),
            });
        }
        if self.queue.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "at least one attempt per task is required".to_string(),
                key: Some("queue.retry.max_attempts".to_string()),
            });
        }
        Ok(())
    }
}

/// Request queue configuration
///
/// The platform allows roughly three requests per second; the default period
/// leaves headroom because the API is known to throttle earlier than that.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Interval between queue ticks; at most one task starts per tick (default: 900ms)
    #[serde(default = "default_period", with = "millis_serde")]
    pub period: Duration,

    /// Retry policy applied to every task
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry behavior for failed tasks
///
/// Backoff is fixed: every retry waits the same `delay`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts per task, including the first (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts (default: 5 seconds)
    #[serde(default = "default_retry_delay", with = "millis_serde")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_retry_delay(),
        }
    }
}

/// Platform endpoint configuration
///
/// `{site}` in the base templates is replaced with the target site
/// (e.g. `dtf.ru`). Templates without the placeholder are used verbatim, which
/// is how tests point the client at a local mock server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Versioned API root (default: "https://api.{site}")
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Site root used by the cookie likers endpoint (default: "https://{site}")
    #[serde(default = "default_site_base")]
    pub site_base: String,

    /// API version for comments and reactions (default: "2.5")
    ///
    /// 2.5 returns pagination cursors; 2.31 does not.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// API version for profile lookups (default: "2.31")
    ///
    /// 2.5 reports a bogus comment counter, so profiles use 2.31.
    #[serde(default = "default_profile_api_version")]
    pub profile_api_version: String,

    /// Avatar CDN template, `{uuid}` is replaced with the image uuid
    #[serde(default = "default_avatar_template")]
    pub avatar_template: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "millis_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            site_base: default_site_base(),
            api_version: default_api_version(),
            profile_api_version: default_profile_api_version(),
            avatar_template: default_avatar_template(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Token relay configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Relay that exchanges a refresh token for an access token
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Minimum remaining validity before a token is refreshed (default: 10 minutes)
    #[serde(default = "default_refresh_window", with = "millis_serde")]
    pub refresh_window: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            refresh_window: default_refresh_window(),
        }
    }
}

fn default_period() -> Duration {
    Duration::from_millis(900)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(5000)
}

fn default_api_base() -> String {
    "https://api.{site}".to_string()
}

fn default_site_base() -> String {
    "https://{site}".to_string()
}

fn default_api_version() -> String {
    "2.5".to_string()
}

fn default_profile_api_version() -> String {
    "2.31".to_string()
}

fn default_avatar_template() -> String {
    "https://leonardo.osnova.io/{uuid}/-/scale_crop/200x200/-/format/webp/".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_relay_url() -> String {
    "http://localhost:5000/".to_string()
}

fn default_refresh_window() -> Duration {
    Duration::from_secs(10 * 60)
}

// Durations are stored as integer milliseconds
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
