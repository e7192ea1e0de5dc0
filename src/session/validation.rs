use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::AuthError;
use crate::primitives::{AuthUser, Session};
use crate::provider::IdentityProvider;
use crate::session::SessionCache;
use crate::utils::with_timeout;

/// Sessions this close to expiry (in seconds) are refreshed pre-emptively.
pub const REFRESH_BUFFER_SECS: i64 = 300;

/// Outcome of a session validation attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCheck {
    pub is_valid: bool,
    pub needs_refresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionCheck {
    fn valid(session: Session) -> Self {
        let user = session.user.clone();
        Self {
            is_valid: true,
            needs_refresh: false,
            session: Some(session),
            user: Some(user),
            error: None,
        }
    }

    fn needs_refresh(session: Session) -> Self {
        let user = session.user.clone();
        Self {
            is_valid: false,
            needs_refresh: true,
            session: Some(session),
            user: Some(user),
            error: None,
        }
    }

    /// No session exists. Deliberately not an error.
    fn missing() -> Self {
        Self {
            is_valid: false,
            needs_refresh: false,
            session: None,
            user: None,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            is_valid: false,
            needs_refresh: false,
            session: None,
            user: None,
            error: Some(message),
        }
    }
}

/// Inspect a session locally, without any network traffic.
///
/// Expired sessions, sessions inside the pre-emptive refresh window, and
/// sessions with an empty token string all report invalid + needs-refresh.
pub fn check_local(session: &Session) -> SessionCheck {
    if session.access_token.is_empty() || session.refresh_token.is_empty() {
        debug!("Session rejected: empty token string");
        return SessionCheck::needs_refresh(session.clone());
    }

    let remaining = session.expires_at - Utc::now().timestamp();
    if remaining <= 0 {
        debug!(remaining, "Session rejected: expired");
        return SessionCheck::needs_refresh(session.clone());
    }
    if remaining < REFRESH_BUFFER_SECS {
        debug!(remaining, "Session inside refresh window");
        return SessionCheck::needs_refresh(session.clone());
    }

    SessionCheck::valid(session.clone())
}

/// Session validation service.
///
/// Decides valid / needs-refresh / invalid for a given or cached session and
/// performs single-shot refreshes. A timeout is treated identically to a
/// provider-reported error; retry policy lives one layer up in the recovery
/// service.
pub struct SessionValidator {
    provider: Arc<dyn IdentityProvider>,
    cache: SessionCache,
    timeout: Duration,
}

impl SessionValidator {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        cache: SessionCache,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            timeout,
        }
    }

    /// Validate the given session, or the cached current session when none
    /// is supplied. Absence of a session is reported, not raised.
    pub async fn validate(&self, session: Option<Session>) -> SessionCheck {
        match session {
            Some(session) => check_local(&session),
            None => {
                let loaded = with_timeout(self.timeout, self.cache.load()).await;
                match loaded {
                    Ok(Some(session)) => check_local(&session),
                    Ok(None) => SessionCheck::missing(),
                    Err(err) => SessionCheck::failed(err.to_string()),
                }
            }
        }
    }

    /// Exchange a refresh token for a new session and cache it.
    ///
    /// The structured result is for the recovery layer; `refresh` wraps it
    /// into a `SessionCheck` with the provider's message verbatim.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let session = with_timeout(self.timeout, self.provider.refresh_session(refresh_token))
            .await
            .map_err(AuthError::from)?;

        if let Err(err) = self.cache.store(&session).await {
            warn!(%err, "Refreshed session could not be cached");
        }
        Ok(session)
    }

    /// Refresh and report the outcome in validation shape.
    pub async fn refresh(&self, refresh_token: &str) -> SessionCheck {
        match self.refresh_session(refresh_token).await {
            Ok(session) => SessionCheck::valid(session),
            Err(err) => SessionCheck::failed(err.to_string()),
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::errors::{ProviderError, ProviderErrorCode};
    use crate::primitives::MetadataPatch;
    use crate::provider::SignOutScope;
    use crate::storage::MemoryStorage;
    use crate::test_support::{session_expiring_in, FakeIdentityProvider};

    /// Provider whose refresh call never answers within any test deadline.
    struct StalledProvider {
        inner: FakeIdentityProvider,
    }

    #[async_trait]
    impl IdentityProvider for StalledProvider {
        async fn sign_in_with_password(
            &self,
            email: &str,
            password: &str,
        ) -> Result<Session, ProviderError> {
            self.inner.sign_in_with_password(email, password).await
        }

        async fn sign_up(
            &self,
            email: &str,
            password: &str,
            metadata: &MetadataPatch,
        ) -> Result<Session, ProviderError> {
            self.inner.sign_up(email, password, metadata).await
        }

        async fn sign_out(
            &self,
            access_token: &str,
            scope: SignOutScope,
        ) -> Result<(), ProviderError> {
            self.inner.sign_out(access_token, scope).await
        }

        async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.inner.refresh_session(refresh_token).await
        }

        async fn get_user(&self, access_token: &str) -> Result<AuthUser, ProviderError> {
            self.inner.get_user(access_token).await
        }

        async fn update_user_metadata(
            &self,
            access_token: &str,
            patch: &MetadataPatch,
        ) -> Result<AuthUser, ProviderError> {
            self.inner.update_user_metadata(access_token, patch).await
        }

        async fn update_password(
            &self,
            access_token: &str,
            new_password: &str,
        ) -> Result<(), ProviderError> {
            self.inner.update_password(access_token, new_password).await
        }

        async fn reset_password_for_email(&self, email: &str) -> Result<(), ProviderError> {
            self.inner.reset_password_for_email(email).await
        }

        async fn set_session(
            &self,
            access_token: &str,
            refresh_token: &str,
        ) -> Result<Session, ProviderError> {
            self.inner.set_session(access_token, refresh_token).await
        }
    }

    fn validator(provider: Arc<FakeIdentityProvider>) -> SessionValidator {
        SessionValidator::new(
            provider,
            SessionCache::new(Arc::new(MemoryStorage::new())),
            Duration::from_secs(7),
        )
    }

    #[test]
    fn expired_session_needs_refresh() {
        let check = check_local(&session_expiring_in(-10));
        assert!(!check.is_valid);
        assert!(check.needs_refresh);
        assert!(check.error.is_none());
    }

    #[test]
    fn session_inside_buffer_needs_refresh() {
        // 299s left: inside the 300s pre-emptive window.
        let check = check_local(&session_expiring_in(REFRESH_BUFFER_SECS - 1));
        assert!(!check.is_valid);
        assert!(check.needs_refresh);
    }

    #[test]
    fn session_outside_buffer_is_valid() {
        let check = check_local(&session_expiring_in(3600));
        assert!(check.is_valid);
        assert!(!check.needs_refresh);
        assert!(check.user.is_some());
    }

    #[test]
    fn empty_token_invalidates_regardless_of_expiry() {
        let mut session = session_expiring_in(3600);
        session.refresh_token.clear();
        let check = check_local(&session);
        assert!(!check.is_valid);
        assert!(check.needs_refresh);

        let mut session = session_expiring_in(3600);
        session.access_token.clear();
        assert!(check_local(&session).needs_refresh);
    }

    #[tokio::test]
    async fn validate_without_session_or_cache_reports_missing() {
        let validator = validator(Arc::new(FakeIdentityProvider::new()));
        let check = validator.validate(None).await;
        assert!(!check.is_valid);
        assert!(!check.needs_refresh);
        assert!(check.error.is_none());
    }

    #[tokio::test]
    async fn validate_uses_cached_session() {
        let validator = validator(Arc::new(FakeIdentityProvider::new()));
        validator
            .cache()
            .store(&session_expiring_in(3600))
            .await
            .unwrap();

        let check = validator.validate(None).await;
        assert!(check.is_valid);
    }

    #[tokio::test]
    async fn refresh_caches_new_session() {
        let provider = Arc::new(FakeIdentityProvider::new());
        provider.add_account("u@example.com", "pw");
        let validator = validator(Arc::clone(&provider));

        let check = validator.refresh("refresh-u@example.com").await;
        assert!(check.is_valid);
        assert!(validator.cache().load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn refresh_timeout_classifies_as_timeout_error() {
        let provider = Arc::new(StalledProvider {
            inner: FakeIdentityProvider::new(),
        });
        let validator = SessionValidator::new(
            provider,
            SessionCache::new(Arc::new(MemoryStorage::new())),
            Duration::from_millis(10),
        );

        let result = validator.refresh_session("refresh-u@example.com").await;
        match result {
            Err(AuthError::Provider(err)) => {
                assert_eq!(err.code, ProviderErrorCode::Timeout);
            }
            other => panic!("expected a provider timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_surfaces_provider_message_verbatim() {
        let provider = Arc::new(FakeIdentityProvider::new());
        provider.fail_next_refresh("Invalid Refresh Token: Refresh Token Not Found");
        let validator = validator(Arc::clone(&provider));

        let check = validator.refresh("stale").await;
        assert!(!check.is_valid);
        assert_eq!(
            check.error.as_deref(),
            Some("Invalid Refresh Token: Refresh Token Not Found")
        );
    }
}
