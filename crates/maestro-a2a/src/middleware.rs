//! Bearer authentication for agent execution requests.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Bearer credential policy for agent execution.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Accepted keys. Empty = any bearer credential is accepted.
    pub api_keys: Vec<String>,
}

impl AuthConfig {
    /// Policy accepting exactly `api_keys`, or any bearer when empty.
    pub fn new(api_keys: Vec<String>) -> Self {
        Self { api_keys }
    }

    /// Returns true if specific keys are enforced.
    pub fn validates_keys(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

/// Extract the credential from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
}

/// Auth middleware: agent execution (POST) requires a bearer credential.
///
/// Discovery and health endpoints stay open. Token validation beyond key
/// matching belongs to the identity provider in front of this server.
pub async fn bearer_auth(
    State(auth): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    match bearer_token(request.headers()) {
        Some(token) if !auth.validates_keys() || auth.api_keys.contains(&token) => {
            next.run(request).await
        }
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected request: invalid API key");
            (StatusCode::UNAUTHORIZED, "Invalid API key").into_response()
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request: missing bearer token");
            (StatusCode::UNAUTHORIZED, "Bearer token required").into_response()
        }
    }
}
