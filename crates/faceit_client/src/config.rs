// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use flightline::retry::{Backoff, RetryPolicy};
use serde::Deserialize;

/// The public Data API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://open.faceit.com/data/v4";

/// A configuration value that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid setting `{setting}`: {reason}")]
pub struct ConfigError {
    setting: &'static str,
    reason: String,
}

impl ConfigError {
    fn new(setting: &'static str, reason: impl Into<String>) -> Self {
        Self {
            setting,
            reason: reason.into(),
        }
    }

    pub(crate) fn client(reason: impl Into<String>) -> Self {
        Self::new("http_client", reason)
    }

    /// Name of the offending setting.
    #[must_use]
    pub fn setting(&self) -> &'static str {
        self.setting
    }
}

/// Configuration of a [`FaceitClient`][crate::FaceitClient].
///
/// Only the API key has no usable default.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use faceit_client::FaceitClientConfig;
///
/// let config = FaceitClientConfig {
///     max_in_flight: 2,
///     ..FaceitClientConfig::new("my-api-key")
/// };
/// assert_eq!(config.cache_ttl(), Duration::from_secs(45));
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaceitClientConfig {
    /// Server-side API key, sent as a bearer token.
    pub api_key: String,
    /// Data API root; resource paths are appended to it.
    pub base_url: String,
    /// How long successful answers are cached.
    pub cache_ttl_ms: u64,
    /// Maximum number of cached answers.
    pub max_cache_entries: usize,
    /// Maximum number of API calls in flight at once.
    pub max_in_flight: usize,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Time limit for a single attempt.
    pub attempt_timeout_ms: u64,
    /// Wait after the n-th transient failure is `n * retry_step_ms`.
    pub retry_step_ms: u64,
    /// Wait after the first rate-limit rejection; doubles after each further one.
    pub rate_limit_base_ms: u64,
    /// Upper bound for rate-limit waits, including server-provided `Retry-After` values.
    pub rate_limit_max_ms: u64,
}

impl FaceitClientConfig {
    /// Default configuration for `api_key`.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Checks that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first unusable setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::new("api_key", "must not be empty"));
        }
        self.base_url()?;
        if self.max_cache_entries == 0 {
            return Err(ConfigError::new("max_cache_entries", "must be at least 1"));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::new("max_in_flight", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::new("max_attempts", "must be at least 1"));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConfigError::new("attempt_timeout_ms", "must be positive"));
        }
        if self.rate_limit_base_ms > self.rate_limit_max_ms {
            return Err(ConfigError::new(
                "rate_limit_base_ms",
                format!("must not exceed rate_limit_max_ms ({})", self.rate_limit_max_ms),
            ));
        }
        Ok(())
    }

    /// The parsed API root.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `base_url` is not an absolute HTTP(S) URL.
    pub fn base_url(&self) -> Result<reqwest::Url, ConfigError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|error| ConfigError::new("base_url", error.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::new("base_url", format!("unsupported scheme {other:?}"))),
        }
    }

    /// Time-to-live of cached answers.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Upper bound for rate-limit waits.
    #[must_use]
    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.rate_limit_max_ms)
    }

    /// The retry policy for API calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .max_attempts(self.max_attempts)
            .attempt_timeout(Duration::from_millis(self.attempt_timeout_ms))
            .transient_backoff(Backoff::Linear(Duration::from_millis(self.retry_step_ms)))
            .rate_limit_backoff(Backoff::Exponential {
                base: Duration::from_millis(self.rate_limit_base_ms),
                max: self.max_rate_limit_wait(),
            })
    }
}

impl Default for FaceitClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            cache_ttl_ms: 45_000,
            max_cache_entries: 500,
            max_in_flight: 4,
            max_attempts: 4,
            attempt_timeout_ms: 10_000,
            retry_step_ms: 1_000,
            rate_limit_base_ms: 1_000,
            rate_limit_max_ms: 30_000,
        }
    }
}

impl std::fmt::Debug for FaceitClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceitClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("cache_ttl_ms", &self.cache_ttl_ms)
            .field("max_cache_entries", &self.max_cache_entries)
            .field("max_in_flight", &self.max_in_flight)
            .field("max_attempts", &self.max_attempts)
            .field("attempt_timeout_ms", &self.attempt_timeout_ms)
            .field("retry_step_ms", &self.retry_step_ms)
            .field("rate_limit_base_ms", &self.rate_limit_base_ms)
            .field("rate_limit_max_ms", &self.rate_limit_max_ms)
            .finish()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_need_only_a_key() {
        assert_eq!(
            FaceitClientConfig::default().validate().unwrap_err().setting(),
            "api_key"
        );
        FaceitClientConfig::new("key").validate().unwrap();
    }

    #[rstest]
    #[case::zero_in_flight(FaceitClientConfig { max_in_flight: 0, ..FaceitClientConfig::new("key") }, "max_in_flight")]
    #[case::zero_entries(FaceitClientConfig { max_cache_entries: 0, ..FaceitClientConfig::new("key") }, "max_cache_entries")]
    #[case::zero_attempts(FaceitClientConfig { max_attempts: 0, ..FaceitClientConfig::new("key") }, "max_attempts")]
    #[case::zero_timeout(FaceitClientConfig { attempt_timeout_ms: 0, ..FaceitClientConfig::new("key") }, "attempt_timeout_ms")]
    #[case::bad_url(FaceitClientConfig { base_url: "ftp://faceit".to_owned(), ..FaceitClientConfig::new("key") }, "base_url")]
    #[case::base_above_max(FaceitClientConfig { rate_limit_base_ms: 60_000, ..FaceitClientConfig::new("key") }, "rate_limit_base_ms")]
    fn rejects_unusable_settings(#[case] config: FaceitClientConfig, #[case] setting: &str) {
        assert_eq!(config.validate().unwrap_err().setting(), setting);
    }

    #[test]
    fn debug_hides_the_api_key() {
        let rendered = format!("{:?}", FaceitClientConfig::new("super-secret"));
        assert!(!rendered.contains("super-secret"), "{rendered}");
    }

    #[test]
    fn retry_policy_follows_settings() {
        let policy = FaceitClientConfig {
            max_attempts: 6,
            attempt_timeout_ms: 2_500,
            ..FaceitClientConfig::new("key")
        }
        .retry_policy();

        assert_eq!(policy.get_max_attempts(), 6);
        assert_eq!(policy.get_attempt_timeout(), Duration::from_millis(2_500));
    }

    #[test]
    fn deserializes_partial_json() {
        let config: FaceitClientConfig = serde_json::from_str(r#"{"api_key": "k", "max_in_flight": 8}"#).unwrap();
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
