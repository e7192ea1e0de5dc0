pub mod auth;
pub mod session;

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::server::AppState;

// Common response type used by all handlers
type ApiResponse = (StatusCode, Json<serde_json::Value>);

pub fn success_response<T: Serialize>(data: T) -> ApiResponse {
    (
        StatusCode::OK,
        Json(json!({
            "data": data,
            "error": null
        })),
    )
}

pub fn error_response(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> ApiResponse {
    (
        status,
        Json(json!({
            "data": null,
            "error": {
                "code": code,
                "message": message.into()
            }
        })),
    )
}

/// Pull the bearer token out of the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

pub fn missing_bearer() -> ApiResponse {
    error_response(
        StatusCode::UNAUTHORIZED,
        "missing_token",
        "Authorization bearer token required",
    )
}

/// Resolve the bearer token's user. A token-classified failure forces a
/// local token-cache sweep before the 401 goes out.
pub(crate) async fn authenticated_user(
    state: &AppState,
    token: &str,
) -> Result<crate::primitives::AuthUser, ApiResponse> {
    match state.provider.get_user(token).await {
        Ok(user) => Ok(user),
        Err(err) => {
            let err = crate::errors::AuthError::from(err);
            let _ = crate::errors::handle_critical_auth_error(&err, &state.cleaner, || {}).await;
            Err(error_response(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                err.to_string(),
            ))
        }
    }
}

/// Health check handler
pub async fn health_handler(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let storage_ok = state.0.storage.exists("health-check").await.is_ok();

    success_response(json!({
        "status": if storage_ok { "healthy" } else { "unhealthy" },
        "storage": storage_ok,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
