// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The live ELO endpoint and the classification of its responses.

use std::time::Duration;

use flightline::retry::{Recover, RecoveryInfo};
use reqwest::{StatusCode, Url};
use serde_json::Value;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ERROR_BODY: usize = 200;

/// Why a single upstream attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum UpstreamError {
    /// The upstream asked us to slow down (HTTP 429 or an explicit rate-limit message).
    #[error("upstream rate limited the request: {0}")]
    RateLimited(String),

    /// The upstream answered with an unexpected status.
    #[error("upstream returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// The request never produced a response.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// The upstream answered 2xx with a body that is not JSON.
    #[error("upstream returned an invalid body: {0}")]
    InvalidBody(String),
}

impl UpstreamError {
    /// Returns `true` for rate-limit rejections.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

impl Recover for UpstreamError {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::RateLimited(_) => RecoveryInfo::rate_limited(),
            Self::Status { .. } | Self::Transport(_) | Self::InvalidBody(_) => RecoveryInfo::retry(),
        }
    }
}

/// A source of live ELO payloads keyed by nickname.
///
/// Implementations perform exactly one attempt per call; retries, pacing and caching are
/// layered on top by the [`Gateway`][crate::Gateway].
pub trait Upstream: Send + Sync + 'static {
    /// Fetches the raw JSON payload for `nickname`.
    fn fetch(&self, nickname: &str) -> impl Future<Output = Result<Value, UpstreamError>> + Send;
}

/// [`Upstream`] calling `GET {url}?nickname=<nickname>` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    url: Url,
}

impl HttpUpstream {
    /// Creates an upstream for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (for example, no TLS backend).
    pub fn new(url: Url) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url })
    }

    /// Creates an upstream sharing an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    /// The endpoint URL, without the nickname parameter.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Upstream for HttpUpstream {
    async fn fetch(&self, nickname: &str) -> Result<Value, UpstreamError> {
        let response = self
            .client
            .get(self.url.clone())
            .query(&[("nickname", nickname)])
            .send()
            .await
            .map_err(|error| UpstreamError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| UpstreamError::Transport(error.to_string()))?;

        classify(status, &body)
    }
}

/// Turns an upstream response into a payload or a classified failure.
///
/// - 429, or any non-2xx body mentioning "rate limit", is a rate-limit rejection.
/// - Other non-2xx statuses are transient failures.
/// - A 2xx body must be JSON. If it is an object whose `error` field is a string mentioning
///   "rate limit", the upstream is signalling throttling in-band. Anything else, including
///   domain "not found" bodies, is a success and returned verbatim.
pub(crate) fn classify(status: StatusCode, body: &str) -> Result<Value, UpstreamError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(UpstreamError::RateLimited(format!("HTTP {}", status.as_u16())));
    }

    if !status.is_success() {
        if mentions_rate_limit(body) {
            return Err(UpstreamError::RateLimited(excerpt(body)));
        }
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body: excerpt(body),
        });
    }

    let payload: Value = serde_json::from_str(body).map_err(|error| UpstreamError::InvalidBody(error.to_string()))?;

    match payload.get("error").and_then(Value::as_str) {
        Some(message) if mentions_rate_limit(message) => Err(UpstreamError::RateLimited(excerpt(message))),
        _ => Ok(payload),
    }
}

fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("rate-limit") || lower.contains("too many requests")
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use flightline::retry::RecoveryKind;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(429, "")]
    #[case(503, "Rate limit exceeded, slow down")]
    #[case(200, r#"{"error": "Rate limit reached"}"#)]
    #[case(200, r#"{"error": "too many requests"}"#)]
    fn rate_limit_signals(#[case] status: u16, #[case] body: &str) {
        let error = classify(StatusCode::from_u16(status).unwrap(), body).unwrap_err();
        assert!(error.is_rate_limited(), "{error:?}");
        assert_eq!(error.recovery().kind(), RecoveryKind::RateLimited);
    }

    #[rstest]
    #[case(500, "internal error")]
    #[case(502, "<html>bad gateway</html>")]
    #[case(404, "not here")]
    fn other_statuses_are_transient(#[case] status: u16, #[case] body: &str) {
        let error = classify(StatusCode::from_u16(status).unwrap(), body).unwrap_err();
        assert_eq!(
            error,
            UpstreamError::Status {
                status,
                body: body.to_owned()
            }
        );
        assert_eq!(error.recovery().kind(), RecoveryKind::Retry);
    }

    #[test]
    fn invalid_json_is_transient() {
        let error = classify(StatusCode::OK, "<html>maintenance</html>").unwrap_err();
        assert!(matches!(error, UpstreamError::InvalidBody(_)));
        assert_eq!(error.recovery().kind(), RecoveryKind::Retry);
    }

    #[test]
    fn live_payload_is_returned_verbatim() {
        let body = r#"{"current":{"present":true,"status":"LIVE","map":"de_mirage"},"playing":"FaceIt Europe 5v5 Queue"}"#;
        assert_eq!(
            classify(StatusCode::OK, body).unwrap(),
            json!({
                "current": {"present": true, "status": "LIVE", "map": "de_mirage"},
                "playing": "FaceIt Europe 5v5 Queue"
            })
        );
    }

    #[rstest]
    #[case(r#"{"message": "player not found"}"#)]
    #[case(r#"{"error": "player not found"}"#)]
    #[case(r#"{"error": true, "code": 7}"#)]
    #[case("[]")]
    fn domain_level_errors_are_successes(#[case] body: &str) {
        let expected: Value = serde_json::from_str(body).unwrap();
        assert_eq!(classify(StatusCode::OK, body).unwrap(), expected);
    }

    #[test]
    fn long_bodies_are_shortened() {
        let body = "x".repeat(500);
        let UpstreamError::Status { body: kept, .. } = classify(StatusCode::BAD_GATEWAY, &body).unwrap_err() else {
            panic!("expected a status error");
        };
        assert_eq!(kept.len(), MAX_ERROR_BODY + 3);
        assert!(kept.ends_with("..."));
    }
}
