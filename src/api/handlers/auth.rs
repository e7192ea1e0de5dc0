use std::sync::Arc;

use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::api::handlers::{
    authenticated_user, bearer_token, error_response, missing_bearer, success_response,
};
use crate::primitives::Role;
use crate::provider::SignOutScope;
use crate::server::AppState;
use crate::signin::{Credentials, LoginIntent, SignInError};

/// Login request body. The optional role declares which flow the UI wants.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    /// "local" or "global" (default)
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecoverRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub new_password: String,
}

fn signin_error_status(err: &SignInError) -> StatusCode {
    match err {
        SignInError::InvalidCredentials | SignInError::EmailNotConfirmed => {
            StatusCode::UNAUTHORIZED
        }
        SignInError::CompanyNotFound => StatusCode::NOT_FOUND,
        SignInError::ProvisioningFailed(_)
        | SignInError::RetryFailed(_)
        | SignInError::MissingUserData
        | SignInError::Provider(_)
        | SignInError::Directory(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Login handler
///
/// Routes the credentials through the sign-in flow matching the declared
/// role and returns the reconciled outcome.
pub async fn login_handler(
    state: Extension<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    let intent = LoginIntent::from_role(request.role);
    let credentials = Credentials {
        email: request.email,
        password: request.password,
    };

    match state.0.signin.sign_in(intent, &credentials).await {
        Ok(outcome) => success_response(outcome),
        Err(err) => {
            warn!(email = %credentials.email, code = err.code(), "Sign-in failed: {err}");
            error_response(signin_error_status(&err), err.code(), err.user_message())
        }
    }
}

/// Logout handler
///
/// Signs the bearer token out at the provider, then sweeps the local token
/// cache regardless of whether the provider call succeeded.
pub async fn logout_handler(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LogoutRequest>,
) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return missing_bearer();
    };

    let scope = match request.scope.as_deref() {
        Some("local") => SignOutScope::Local,
        _ => SignOutScope::Global,
    };

    if let Err(err) = state.0.provider.sign_out(token, scope).await {
        warn!(%err, "Provider sign-out failed, clearing local state anyway");
    }
    state.0.cleaner.clear_local_session().await;
    state.0.handler.on_signed_out().await;
    info!("Signed out");

    success_response(json!({ "signed_out": true }))
}

/// Password-recovery handler. Always answers uniformly so the endpoint
/// cannot be used to probe which addresses exist.
pub async fn recover_handler(
    state: Extension<Arc<AppState>>,
    Json(request): Json<RecoverRequest>,
) -> impl IntoResponse {
    match state.0.account.request_password_reset(&request.email).await {
        Ok(()) => success_response(json!({ "sent": true })),
        Err(err) => {
            warn!(%err, "Password recovery request failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                "recovery_failed",
                "Não foi possível enviar o e-mail de recuperação.",
            )
        }
    }
}

/// Password-change handler for the signed-in user. Clears the directory's
/// needs-password-change flag for provisioned accounts.
pub async fn password_handler(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PasswordRequest>,
) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return missing_bearer();
    };

    let user = match authenticated_user(&state.0, token).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state
        .0
        .account
        .change_password(token, &user, &request.new_password)
        .await
    {
        Ok(()) => success_response(json!({ "changed": true })),
        Err(err) => {
            warn!(user_id = %user.id, %err, "Password change failed");
            error_response(StatusCode::BAD_GATEWAY, "password_change_failed", err.to_string())
        }
    }
}

/// Role-context handler: who the bearer is, with company/collaborator rows.
pub async fn context_handler(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return missing_bearer();
    };

    let user = match authenticated_user(&state.0, token).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    let context = state.0.resolver.resolve(&user).await;
    success_response(json!({
        "user": user,
        "context": context,
    }))
}
