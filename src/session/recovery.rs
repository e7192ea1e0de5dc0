use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::AuthError;
use crate::session::cleanup::SessionCleaner;
use crate::session::validation::{SessionCheck, SessionValidator};

/// Refresh retry policy: attempts are capped and spaced by exponential
/// backoff starting at one second.
pub const MAX_REFRESH_ATTEMPTS: u32 = 2;
pub const BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Session recovery service.
///
/// The only place refreshes are retried. After the final failure a
/// token-classified error forces a local cleanup so the caller cannot get
/// stuck holding corrupted tokens.
pub struct RecoveryService {
    validator: Arc<SessionValidator>,
    cleaner: SessionCleaner,
    max_attempts: u32,
    backoff_base: Duration,
}

impl RecoveryService {
    pub fn new(validator: Arc<SessionValidator>, cleaner: SessionCleaner) -> Self {
        Self {
            validator,
            cleaner,
            max_attempts: MAX_REFRESH_ATTEMPTS,
            backoff_base: BACKOFF_BASE,
        }
    }

    /// Override the retry limits (from configuration).
    pub fn with_settings(mut self, max_attempts: u32, backoff_base: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.backoff_base = backoff_base;
        self
    }

    /// Try to turn a stale refresh token into a live session.
    pub async fn recover(&self, refresh_token: &str) -> SessionCheck {
        let mut delay = self.backoff_base;
        let mut last_error: Option<AuthError> = None;

        for attempt in 1..=self.max_attempts {
            match self.validator.refresh_session(refresh_token).await {
                Ok(session) => {
                    info!(attempt, "Session refresh succeeded");
                    return self.validator.validate(Some(session)).await;
                }
                Err(err) => {
                    warn!(attempt, %err, "Session refresh attempt failed");
                    last_error = Some(err);
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        let error = match last_error {
            Some(err) => {
                if err.is_token_error() {
                    self.cleaner.force_clean_corrupted_tokens(None).await;
                }
                err.to_string()
            }
            None => "session refresh never attempted".to_string(),
        };

        SessionCheck {
            is_valid: false,
            needs_refresh: false,
            session: None,
            user: None,
            error: Some(error),
        }
    }

    pub fn cleaner(&self) -> &SessionCleaner {
        &self.cleaner
    }
}
