// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Gateway configuration.
//!
//! Settings come from three layers, each overriding the previous one:
//!
//! 1. built-in defaults,
//! 2. an optional JSON file named by `ELO_GATEWAY_CONFIG`,
//! 3. individual `ELO_GATEWAY_*` environment variables.
//!
//! The merged result is validated before the gateway starts.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderName;
use flightline::retry::{Backoff, RetryPolicy};
use serde::Deserialize;

/// Environment variable naming the JSON configuration file.
pub const CONFIG_FILE_VAR: &str = "ELO_GATEWAY_CONFIG";

const ENV_PREFIX: &str = "ELO_GATEWAY_";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`GatewayConfig`].
    #[error("failed to parse config file {path}")]
    Parse {
        /// Path of the file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// An environment variable held a value of the wrong shape.
    #[error("environment variable {var} has invalid value {value:?}")]
    Env {
        /// Name of the variable.
        var: String,
        /// The rejected value.
        value: String,
    },

    /// A setting is out of range or malformed.
    #[error("invalid setting `{setting}`: {reason}")]
    Invalid {
        /// Name of the setting.
        setting: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Where cached lookups are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum CacheBackend {
    /// In-process memory; lost on restart and private to this process.
    #[default]
    Memory,

    /// A SQLite database file, shared by every process pointing at it.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

/// Complete gateway configuration.
///
/// Every field has a default, so an empty JSON object is a valid configuration file.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use elo_gateway::config::GatewayConfig;
///
/// let config: GatewayConfig = serde_json::from_str(r#"{"min_interval_ms": 500}"#).unwrap();
/// assert_eq!(config.min_interval(), Duration::from_millis(500));
/// assert_eq!(config.cache_ttl(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Socket address the HTTP server binds to.
    pub listen: String,
    /// Live ELO endpoint; the nickname is appended as the `nickname` query parameter.
    pub upstream_url: String,
    /// Minimum spacing between the starts of consecutive upstream calls.
    pub min_interval_ms: u64,
    /// Attempts per upstream lookup, including the first.
    pub max_attempts: u32,
    /// Time limit for a single upstream attempt.
    pub attempt_timeout_ms: u64,
    /// Wait after a rate-limited attempt.
    pub rate_limit_backoff_ms: u64,
    /// Wait after the n-th transient failure is `n * retry_step_ms`.
    pub retry_step_ms: u64,
    /// How long successful lookups are cached.
    pub cache_ttl_ms: u64,
    /// Cache storage backend.
    pub cache: CacheBackend,
    /// How often expired cache entries are purged.
    pub purge_interval_ms: u64,
    /// Extra request headers browsers may send, beyond the standard set.
    pub activity_headers: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_owned(),
            upstream_url: "https://faceit.lcrypt.eu/".to_owned(),
            min_interval_ms: 2_000,
            max_attempts: 3,
            attempt_timeout_ms: 8_000,
            rate_limit_backoff_ms: 15_000,
            retry_step_ms: 3_000,
            cache_ttl_ms: 30_000,
            cache: CacheBackend::Memory,
            purge_interval_ms: 60_000,
            activity_headers: vec!["x-activity-locale".to_owned(), "x-activity-storage-id".to_owned()],
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, an environment override is
    /// malformed, or the merged configuration fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|var| std::env::var(var).ok())
    }

    /// Loads configuration, resolving environment variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`load`][Self::load].
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_FILE_VAR) {
            Some(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file without applying overrides or validating.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty());

        if let Some(value) = var("LISTEN") {
            self.listen = value;
        }
        if let Some(value) = var("UPSTREAM_URL") {
            self.upstream_url = value;
        }
        override_number(&mut self.min_interval_ms, "MIN_INTERVAL_MS", var("MIN_INTERVAL_MS"))?;
        override_number(&mut self.max_attempts, "MAX_ATTEMPTS", var("MAX_ATTEMPTS"))?;
        override_number(&mut self.attempt_timeout_ms, "ATTEMPT_TIMEOUT_MS", var("ATTEMPT_TIMEOUT_MS"))?;
        override_number(
            &mut self.rate_limit_backoff_ms,
            "RATE_LIMIT_BACKOFF_MS",
            var("RATE_LIMIT_BACKOFF_MS"),
        )?;
        override_number(&mut self.retry_step_ms, "RETRY_STEP_MS", var("RETRY_STEP_MS"))?;
        override_number(&mut self.cache_ttl_ms, "CACHE_TTL_MS", var("CACHE_TTL_MS"))?;
        override_number(&mut self.purge_interval_ms, "PURGE_INTERVAL_MS", var("PURGE_INTERVAL_MS"))?;
        if let Some(path) = var("CACHE_PATH") {
            self.cache = CacheBackend::Sqlite { path: path.into() };
        }
        if let Some(headers) = var("ACTIVITY_HEADERS") {
            self.activity_headers = headers
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect();
        }
        Ok(())
    }

    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        self.upstream_url()?;
        self.activity_header_names()?;

        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(invalid("attempt_timeout_ms", "must be greater than 0"));
        }
        if self.cache_ttl_ms == 0 {
            return Err(invalid("cache_ttl_ms", "must be greater than 0"));
        }
        if self.purge_interval_ms == 0 {
            return Err(invalid("purge_interval_ms", "must be greater than 0"));
        }
        Ok(())
    }

    /// The parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `listen` is not a socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|error| invalid("listen", format!("{error}: {:?}", self.listen)))
    }

    /// The parsed upstream URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `upstream_url` is not an absolute HTTP(S) URL.
    pub fn upstream_url(&self) -> Result<reqwest::Url, ConfigError> {
        let url = reqwest::Url::parse(&self.upstream_url).map_err(|error| invalid("upstream_url", error.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid("upstream_url", format!("unsupported scheme {other:?}"))),
        }
    }

    /// The activity headers as validated header names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any entry is not a valid header name.
    pub fn activity_header_names(&self) -> Result<Vec<HeaderName>, ConfigError> {
        self.activity_headers
            .iter()
            .map(|name| {
                HeaderName::from_str(name).map_err(|error| invalid("activity_headers", format!("{name:?}: {error}")))
            })
            .collect()
    }

    /// Minimum spacing between upstream call starts.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Time-to-live of cached lookups.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Interval between purges of expired cache entries.
    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        Duration::from_millis(self.purge_interval_ms)
    }

    /// The retry policy for upstream lookups.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .max_attempts(self.max_attempts)
            .attempt_timeout(Duration::from_millis(self.attempt_timeout_ms))
            .transient_backoff(Backoff::Linear(Duration::from_millis(self.retry_step_ms)))
            .rate_limit_backoff(Backoff::Constant(Duration::from_millis(self.rate_limit_backoff_ms)))
    }
}

fn override_number<T: FromStr>(target: &mut T, name: &str, value: Option<String>) -> Result<(), ConfigError> {
    if let Some(value) = value {
        *target = value.trim().parse().map_err(|_parse_error| ConfigError::Env {
            var: format!("{ENV_PREFIX}{name}"),
            value,
        })?;
    }
    Ok(())
}

fn invalid(setting: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        setting,
        reason: reason.into(),
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = GatewayConfig::load_with(env(&[])).unwrap();

        assert_eq!(config.min_interval(), Duration::from_secs(2));
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.cache, CacheBackend::Memory);
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::new()
                .max_attempts(3)
                .attempt_timeout(Duration::from_secs(8))
                .transient_backoff(Backoff::Linear(Duration::from_secs(3)))
                .rate_limit_backoff(Backoff::Constant(Duration::from_secs(15)))
        );
        assert_eq!(
            config.activity_header_names().unwrap(),
            ["x-activity-locale", "x-activity-storage-id"]
        );
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = GatewayConfig::load_with(env(&[
            ("ELO_GATEWAY_LISTEN", "127.0.0.1:9000"),
            ("ELO_GATEWAY_MIN_INTERVAL_MS", "250"),
            ("ELO_GATEWAY_MAX_ATTEMPTS", " 5 "),
            ("ELO_GATEWAY_CACHE_PATH", "/tmp/elo.sqlite"),
            ("ELO_GATEWAY_ACTIVITY_HEADERS", "x-one, x-two,"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr().unwrap(), "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.min_interval(), Duration::from_millis(250));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(
            config.cache,
            CacheBackend::Sqlite {
                path: "/tmp/elo.sqlite".into()
            }
        );
        assert_eq!(config.activity_headers, ["x-one", "x-two"]);
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let error = GatewayConfig::load_with(env(&[("ELO_GATEWAY_CACHE_TTL_MS", "soon")])).unwrap_err();

        assert_eq!(
            error.to_string(),
            "environment variable ELO_GATEWAY_CACHE_TTL_MS has invalid value \"soon\""
        );
    }

    #[test]
    fn file_layer_sits_between_defaults_and_environment() {
        let path = std::env::temp_dir().join(format!("elo-gateway-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"min_interval_ms": 1000, "retry_step_ms": 500, "cache": {"kind": "sqlite", "path": "cache.db"}}"#,
        )
        .unwrap();
        let path_str = path.to_string_lossy().into_owned();

        let config = GatewayConfig::load_with(env(&[
            (CONFIG_FILE_VAR, path_str.as_str()),
            ("ELO_GATEWAY_MIN_INTERVAL_MS", "3000"),
        ]))
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.min_interval_ms, 3_000);
        assert_eq!(config.retry_step_ms, 500);
        assert_eq!(config.cache, CacheBackend::Sqlite { path: "cache.db".into() });
    }

    #[test]
    fn missing_file_is_reported() {
        let error = GatewayConfig::load_with(env(&[(CONFIG_FILE_VAR, "/nonexistent/elo.json")])).unwrap_err();
        assert!(matches!(error, ConfigError::Read { .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = serde_json::from_str::<GatewayConfig>(r#"{"min_intervall_ms": 1}"#).unwrap_err();
        assert!(error.to_string().contains("min_intervall_ms"));
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let cases = [
            GatewayConfig {
                max_attempts: 0,
                ..GatewayConfig::default()
            },
            GatewayConfig {
                listen: "not an address".to_owned(),
                ..GatewayConfig::default()
            },
            GatewayConfig {
                upstream_url: "ftp://example.com".to_owned(),
                ..GatewayConfig::default()
            },
            GatewayConfig {
                activity_headers: vec!["bad header".to_owned()],
                ..GatewayConfig::default()
            },
            GatewayConfig {
                cache_ttl_ms: 0,
                ..GatewayConfig::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { .. })),
                "{config:?} should be rejected"
            );
        }
    }
}
