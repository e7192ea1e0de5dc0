use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::primitives::Session;
use crate::session::cleanup::SessionCleaner;
use crate::session::recovery::RecoveryService;
use crate::session::validation::SessionValidator;
use crate::session::SessionCache;

/// Interval between background session health checks.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(120);

/// Session lifecycle events fanned out to interested subscribers.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn { user_id: String },
    TokenRefreshed { user_id: String },
    SignedOut,
}

/// Reacts to session lifecycle transitions: caches fresh sessions, sweeps
/// on sign-out, and broadcasts the corresponding event.
#[derive(Clone)]
pub struct AuthStateHandler {
    cache: SessionCache,
    cleaner: SessionCleaner,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthStateHandler {
    pub fn new(cache: SessionCache, cleaner: SessionCleaner) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            cache,
            cleaner,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub async fn on_signed_in(&self, session: &Session) {
        if let Err(err) = self.cache.store(session).await {
            warn!(%err, "Could not cache session on sign-in");
        }
        let _ = self.events.send(AuthEvent::SignedIn {
            user_id: session.user.id.clone(),
        });
    }

    pub async fn on_token_refreshed(&self, session: &Session) {
        if let Err(err) = self.cache.store(session).await {
            warn!(%err, "Could not cache refreshed session");
        }
        let _ = self.events.send(AuthEvent::TokenRefreshed {
            user_id: session.user.id.clone(),
        });
    }

    pub async fn on_signed_out(&self) {
        self.cleaner.clear_local_session().await;
        let _ = self.events.send(AuthEvent::SignedOut);
    }
}

/// Background session health check.
///
/// Every tick it validates the cached session and runs recovery when a
/// refresh is due. Non-critical failures are deliberately swallowed so a
/// transient network blip cannot cascade into a spurious logout loop;
/// token-classified failures have already been cleaned up by the recovery
/// layer and only need the sign-out broadcast.
pub struct SessionMonitor {
    validator: Arc<SessionValidator>,
    recovery: Arc<RecoveryService>,
    handler: AuthStateHandler,
    interval: Duration,
}

impl SessionMonitor {
    pub fn new(
        validator: Arc<SessionValidator>,
        recovery: Arc<RecoveryService>,
        handler: AuthStateHandler,
        interval: Duration,
    ) -> Self {
        Self {
            validator,
            recovery,
            handler,
            interval,
        }
    }

    /// Spawn the monitor loop on the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; skip it so startup isn't
            // racing the initial sign-in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }

    /// One health-check pass. Public so tests (and shutdown paths) can
    /// drive it directly.
    pub async fn run_once(&self) {
        let check = self.validator.validate(None).await;

        if check.is_valid {
            debug!("Session health check: ok");
            return;
        }

        let Some(session) = check.session else {
            // No session at all; nothing to maintain.
            return;
        };

        if !check.needs_refresh {
            return;
        }

        info!("Session health check: refresh due");
        let refreshed = self.recovery.recover(&session.refresh_token).await;
        match refreshed.session {
            Some(session) if refreshed.is_valid => {
                self.handler.on_token_refreshed(&session).await;
            }
            _ => {
                if let Some(error) = &refreshed.error {
                    warn!(error, "Background refresh failed");
                }
                // Cache gone means recovery classified it as token
                // corruption and swept; reflect that to subscribers.
                if let Ok(None) = self.validator.cache().load().await {
                    let _ = self.handler.events.send(AuthEvent::SignedOut);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::IdentityProvider;
    use crate::storage::{MemoryStorage, Storage};
    use crate::test_support::{session_expiring_in, FakeIdentityProvider};

    struct Fixture {
        provider: Arc<FakeIdentityProvider>,
        storage: Arc<MemoryStorage>,
        monitor: SessionMonitor,
        handler: AuthStateHandler,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(FakeIdentityProvider::new());
        let storage = Arc::new(MemoryStorage::new());
        let cache = SessionCache::new(Arc::clone(&storage) as Arc<dyn Storage>);
        let cleaner = SessionCleaner::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::clone(&provider) as Arc<dyn IdentityProvider>,
        );
        let validator = Arc::new(SessionValidator::new(
            Arc::clone(&provider) as Arc<dyn IdentityProvider>,
            cache.clone(),
            Duration::from_secs(7),
        ));
        let recovery = Arc::new(
            RecoveryService::new(Arc::clone(&validator), cleaner.clone())
                .with_settings(2, Duration::from_millis(1)),
        );
        let handler = AuthStateHandler::new(cache, cleaner);
        let monitor = SessionMonitor::new(
            validator,
            recovery,
            handler.clone(),
            Duration::from_secs(120),
        );
        Fixture {
            provider,
            storage,
            monitor,
            handler,
        }
    }

    #[tokio::test]
    async fn healthy_session_is_left_alone() {
        let f = fixture();
        f.handler.on_signed_in(&session_expiring_in(3600)).await;

        f.monitor.run_once().await;
        assert_eq!(f.provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn expiring_session_is_refreshed_and_recached() {
        let f = fixture();
        f.provider.add_account("u@example.com", "pw");
        f.handler.on_signed_in(&session_expiring_in(60)).await;

        let mut events = f.handler.subscribe();
        f.monitor.run_once().await;

        assert_eq!(f.provider.refresh_calls(), 1);
        assert!(matches!(
            events.try_recv().unwrap(),
            AuthEvent::TokenRefreshed { .. }
        ));
    }

    #[tokio::test]
    async fn corrupted_tokens_broadcast_sign_out() {
        let f = fixture();
        // Session cached, but the provider does not know the account, so
        // every refresh reports refresh_token_not_found.
        f.handler.on_signed_in(&session_expiring_in(60)).await;

        let mut events = f.handler.subscribe();
        f.monitor.run_once().await;

        assert!(!f.storage.exists("sb-current-session").await.unwrap());
        assert!(matches!(events.try_recv().unwrap(), AuthEvent::SignedOut));
    }

    #[tokio::test]
    async fn missing_session_is_a_no_op() {
        let f = fixture();
        f.monitor.run_once().await;
        assert_eq!(f.provider.refresh_calls(), 0);
    }
}
