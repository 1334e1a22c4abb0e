// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! HTTP transport for the [`Gateway`].

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderName, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::Gateway;
use crate::nickname::InvalidNickname;
use crate::upstream::Upstream;

/// Lookup request body.
#[derive(Debug, Deserialize)]
struct ResolveRequest {
    nickname: String,
}

/// Client errors, answered with `{"error": "<reason>"}`.
#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("invalid request body: {0}")]
    Body(String),

    #[error(transparent)]
    Nickname(#[from] InvalidNickname),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the gateway router.
///
/// - `POST /` and `POST /get-lcrypt-elo` take `{"nickname": "..."}` and answer with the
///   upstream payload or the soft error object, both with status 200. Malformed bodies and
///   invalid nicknames get status 400.
/// - `GET /health` reports queue depth and in-flight lookups.
///
/// Browsers may call from any origin; `activity_headers` are allowed in addition to the
/// standard request headers.
pub fn router<U: Upstream>(gateway: Arc<Gateway<U>>, activity_headers: &[HeaderName]) -> Router {
    Router::new()
        .route("/", post(resolve::<U>))
        .route("/get-lcrypt-elo", post(resolve::<U>))
        .route("/health", get(health::<U>))
        .layer(cors(activity_headers))
        .with_state(gateway)
}

fn cors(activity_headers: &[HeaderName]) -> CorsLayer {
    let mut headers = vec![
        header::AUTHORIZATION,
        HeaderName::from_static("x-client-info"),
        HeaderName::from_static("apikey"),
        header::CONTENT_TYPE,
    ];
    headers.extend(activity_headers.iter().cloned());

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(headers)
}

async fn resolve<U: Upstream>(
    State(gateway): State<Arc<Gateway<U>>>,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::Body(rejection.body_text()))?;
    let payload = gateway.resolve(&request.nickname).await?;
    Ok(Json(payload).into_response())
}

async fn health<U: Upstream>(State(gateway): State<Arc<Gateway<U>>>) -> Response {
    let stats = gateway.stats();
    Json(json!({
        "status": "ok",
        "queued": stats.queued,
        "inFlight": stats.in_flight,
    }))
    .into_response()
}
