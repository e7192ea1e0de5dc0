use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::handlers::{error_response, success_response};
use crate::errors::{with_error_handler, AuthError};
use crate::primitives::Session;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    /// Session to check; when absent, the locally cached session is used.
    pub session: Option<Session>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token pair delivered out-of-band (invitation or recovery link).
#[derive(Debug, Deserialize)]
pub struct AdoptSessionRequest {
    pub access_token: String,
    pub refresh_token: String,
}

/// Session validation handler.
///
/// Always answers 200: validity, refresh pressure, and failures are all
/// encoded in the returned check.
pub async fn validate_handler(
    state: Extension<Arc<AppState>>,
    Json(request): Json<ValidateRequest>,
) -> impl IntoResponse {
    let check = state.0.validator.validate(request.session).await;
    success_response(check)
}

/// Refresh handler with bounded retry and corrupted-token cleanup.
pub async fn refresh_handler(
    state: Extension<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> impl IntoResponse {
    let check = state.0.recovery.recover(&request.refresh_token).await;
    if let Some(session) = &check.session {
        state.0.handler.on_token_refreshed(session).await;
    }
    success_response(check)
}

/// Adopt an externally delivered token pair.
///
/// The pair comes from an invitation or recovery email and is consumed
/// exactly once; neither token is ever logged. A token-classified rejection
/// (expired or already-consumed link) also sweeps the local token cache.
pub async fn adopt_session_handler(
    state: Extension<Arc<AppState>>,
    Json(request): Json<AdoptSessionRequest>,
) -> impl IntoResponse {
    let adopted = with_error_handler(
        async {
            state
                .0
                .provider
                .set_session(&request.access_token, &request.refresh_token)
                .await
                .map_err(AuthError::from)
        },
        &state.0.cleaner,
        || {},
    )
    .await;

    match adopted {
        Ok(Some(session)) => {
            state.0.handler.on_signed_in(&session).await;
            info!(user_id = %session.user.id, "Adopted external session");
            success_response(session)
        }
        Ok(None) => error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_session_tokens",
            "Token pair rejected by the identity provider",
        ),
        Err(err) => {
            warn!(%err, "Failed to adopt external session");
            error_response(StatusCode::BAD_GATEWAY, "provider_error", err.to_string())
        }
    }
}
