// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde_json::Value;

use crate::config::{ConfigError, FaceitClientConfig};
use crate::error::FaceitError;
use crate::request::ApiRequest;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ERROR_BODY: usize = 200;

/// Sends a single Data API request.
///
/// Implementations perform exactly one attempt; caching, coalescing, concurrency limits and
/// retries are layered on top by the [`FaceitClient`][crate::FaceitClient].
pub trait Transport: Send + Sync + 'static {
    /// Performs `request` and returns the decoded JSON body.
    fn send(&self, request: &ApiRequest) -> impl Future<Output = Result<Value, FaceitError>> + Send;
}

/// [`Transport`] over HTTPS with bearer authentication.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    max_retry_after: Duration,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("max_retry_after", &self.max_retry_after)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport for the API root and key in `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid or the HTTP client cannot be
    /// built.
    pub fn new(config: &FaceitClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| ConfigError::client(error.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url()?,
            api_key: config.api_key.clone(),
            max_retry_after: config.max_rate_limit_wait(),
        })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, FaceitError> {
        let mut url = self.base_url.clone();
        request
            .append_to(&mut url)
            .map_err(|()| FaceitError::Transport(format!("{} cannot carry a path", self.base_url)))?;
        Ok(url)
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<Value, FaceitError> {
        let response = self
            .client
            .get(self.url_for(request)?)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| FaceitError::Transport(error.to_string()))?;

        let status = response.status();
        let retry_after = retry_after(response.headers(), self.max_retry_after);
        let body = response
            .text()
            .await
            .map_err(|error| FaceitError::Transport(error.to_string()))?;

        classify(request, status, retry_after, &body)
    }
}

/// Maps a response to a payload or a classified failure.
pub(crate) fn classify(
    request: &ApiRequest,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> Result<Value, FaceitError> {
    match status {
        StatusCode::NOT_FOUND => Err(FaceitError::NotFound(request.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FaceitError::Unauthorized(status.as_u16())),
        StatusCode::TOO_MANY_REQUESTS => Err(FaceitError::RateLimited { retry_after }),
        status if status.is_success() => {
            serde_json::from_str(body).map_err(|error| FaceitError::InvalidBody(error.to_string()))
        }
        status => Err(FaceitError::Status {
            status: status.as_u16(),
            body: excerpt(body),
        }),
    }
}

/// Reads a `Retry-After` given in seconds, capped at `max`. HTTP dates are ignored.
fn retry_after(headers: &HeaderMap, max: Duration) -> Option<Duration> {
    let seconds: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(seconds).min(max))
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}
