use std::future::Future;

use thiserror::Error;
use tracing::{info, warn};

use crate::session::cleanup::SessionCleaner;
use crate::utils::TimeoutError;

/// Structured classification of identity-provider failures.
///
/// The provider reports errors as free-form text; that text is parsed into
/// this enum exactly once, at the HTTP boundary, so everything downstream can
/// match on codes instead of substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// Refresh token missing on the provider side.
    RefreshTokenNotFound,
    /// Refresh token present but rejected.
    InvalidRefreshToken,
    /// Access token expired or failed verification.
    JwtExpired,
    /// OAuth-style grant rejection covering corrupted token state.
    InvalidGrant,
    /// Wrong email/password combination.
    InvalidCredentials,
    /// Account exists but the email was never confirmed.
    EmailNotConfirmed,
    /// Provider asked us to back off.
    RateLimited,
    /// Call abandoned after the configured deadline.
    Timeout,
    /// Anything the parser does not recognize.
    Other,
}

impl ProviderErrorCode {
    /// Parse a provider error message into a code.
    ///
    /// The token-failure phrases are the fixed set the provider is known to
    /// emit for corrupted or expired token state; nothing else (including an
    /// empty message) classifies as a token error.
    pub fn classify(message: &str) -> Self {
        const REFRESH_NOT_FOUND: &[&str] = &["refresh_token_not_found"];
        const INVALID_REFRESH: &[&str] = &[
            "Invalid Refresh Token",
            "Refresh Token Not Found",
            "refresh token is invalid",
        ];
        const JWT_EXPIRED: &[&str] = &["JWT expired", "Token has expired or is invalid"];
        const INVALID_GRANT: &[&str] = &["invalid_grant"];

        let contains_any = |phrases: &[&str]| phrases.iter().any(|p| message.contains(p));

        if contains_any(REFRESH_NOT_FOUND) {
            ProviderErrorCode::RefreshTokenNotFound
        } else if contains_any(INVALID_REFRESH) {
            ProviderErrorCode::InvalidRefreshToken
        } else if contains_any(JWT_EXPIRED) {
            ProviderErrorCode::JwtExpired
        } else if contains_any(INVALID_GRANT) {
            ProviderErrorCode::InvalidGrant
        } else if message.contains("Invalid login credentials") {
            ProviderErrorCode::InvalidCredentials
        } else if message.contains("Email not confirmed") {
            ProviderErrorCode::EmailNotConfirmed
        } else if message.contains("rate limit") || message.contains("Too many requests") {
            ProviderErrorCode::RateLimited
        } else {
            ProviderErrorCode::Other
        }
    }

    /// Whether this code represents corrupted or expired token state that
    /// requires a forced local cleanup.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            ProviderErrorCode::RefreshTokenNotFound
                | ProviderErrorCode::InvalidRefreshToken
                | ProviderErrorCode::JwtExpired
                | ProviderErrorCode::InvalidGrant
        )
    }
}

/// Error reported by the identity provider, carrying both the structured
/// code and the provider's original message (surfaced verbatim to callers
/// that need it).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
    pub status: Option<u16>,
}

impl ProviderError {
    /// Build an error from a raw provider message, classifying it once.
    pub fn from_message(message: impl Into<String>, status: Option<u16>) -> Self {
        let message = message.into();
        Self {
            code: ProviderErrorCode::classify(&message),
            message,
            status,
        }
    }

    /// Transport-level failure (connection refused, DNS, TLS).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: ProviderErrorCode::Other,
            message: message.into(),
            status: None,
        }
    }
}

impl From<TimeoutError> for ProviderError {
    fn from(err: TimeoutError) -> Self {
        Self {
            code: ProviderErrorCode::Timeout,
            message: err.to_string(),
            status: None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.to_string())
    }
}

/// Top-level error for auth operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    #[error(transparent)]
    Directory(#[from] crate::directory::DirectoryError),

    #[error("no user data returned by the identity provider")]
    MissingUserData,
}

impl AuthError {
    /// The provider error code, when the failure came from the provider.
    pub fn provider_code(&self) -> Option<ProviderErrorCode> {
        match self {
            AuthError::Provider(err) => Some(err.code),
            _ => None,
        }
    }

    /// Whether this failure indicates corrupted token state.
    pub fn is_token_error(&self) -> bool {
        self.provider_code()
            .map(|code| code.is_token_error())
            .unwrap_or(false)
    }
}

/// Handle an error that may indicate corrupted token state.
///
/// Token-classified errors trigger a forced local cleanup followed by the
/// caller's state-clear callback, and report `true` ("was handled"). Any
/// other error reports `false` and is the caller's problem again.
pub async fn handle_critical_auth_error(
    error: &AuthError,
    cleaner: &SessionCleaner,
    on_clear: impl FnOnce(),
) -> bool {
    if !error.is_token_error() {
        return false;
    }

    warn!(%error, "Critical token error detected, forcing session cleanup");
    cleaner.force_clean_corrupted_tokens(None).await;
    on_clear();
    info!("Corrupted session state cleared");
    true
}

/// Run an operation, absorbing token-classified failures.
///
/// A handled error yields `Ok(None)`, signalling "aborted, do not propagate";
/// every other error propagates to the caller untouched.
pub async fn with_error_handler<T, F>(
    operation: F,
    cleaner: &SessionCleaner,
    on_clear: impl FnOnce(),
) -> Result<Option<T>, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    match operation.await {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            if handle_critical_auth_error(&err, cleaner, on_clear).await {
                Ok(None)
            } else {
                Err(err)
            }
        }
    }
}
