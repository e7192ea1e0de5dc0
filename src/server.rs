use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::info;

use crate::account::AccountService;
use crate::api::routes::create_router;
use crate::config::AuthConfig;
use crate::directory::resolver::RoleResolver;
use crate::directory::rest::RestDirectoryStore;
use crate::directory::DirectoryStore;
use crate::functions::HttpFunctionsClient;
use crate::provider::http::HttpIdentityProvider;
use crate::provider::IdentityProvider;
use crate::session::cleanup::SessionCleaner;
use crate::session::monitor::{AuthStateHandler, SessionMonitor};
use crate::session::recovery::RecoveryService;
use crate::session::{SessionCache, SessionValidator};
use crate::signin::company::CompanySignIn;
use crate::signin::default::DefaultSignIn;
use crate::signin::producer::ProducerSignIn;
use crate::signin::SignInService;
use crate::storage::{create_storage, Storage};

/// Application state
pub struct AppState {
    /// Storage backend for the local token cache
    pub storage: Arc<dyn Storage>,
    /// Identity provider client
    pub provider: Arc<dyn IdentityProvider>,
    /// Role-routed sign-in flows
    pub signin: SignInService,
    /// Session validation
    pub validator: Arc<SessionValidator>,
    /// Bounded refresh with cleanup
    pub recovery: Arc<RecoveryService>,
    /// Token cache sweeper
    pub cleaner: SessionCleaner,
    /// Role context resolution
    pub resolver: Arc<RoleResolver>,
    /// Password management
    pub account: AccountService,
    /// Auth state transitions and event fan-out
    pub handler: AuthStateHandler,
    /// Configuration
    pub config: AuthConfig,
}

/// Start the auth gateway: wire the services, spawn the session monitor,
/// and serve until a shutdown signal arrives.
pub async fn start_server(config: AuthConfig) -> eyre::Result<()> {
    let storage = create_storage(&config.storage)?;

    let provider: Arc<dyn IdentityProvider> =
        Arc::new(HttpIdentityProvider::new(&config.provider));
    let directory: Arc<dyn DirectoryStore> =
        Arc::new(RestDirectoryStore::new(&config.directory));
    let provisioner = Arc::new(HttpFunctionsClient::new(&config.functions));

    let cache = SessionCache::new(Arc::clone(&storage));
    let cleaner = SessionCleaner::new(Arc::clone(&storage), Arc::clone(&provider));
    let validator = Arc::new(SessionValidator::new(
        Arc::clone(&provider),
        cache.clone(),
        Duration::from_secs(config.provider.timeout_secs),
    ));
    let recovery = Arc::new(
        RecoveryService::new(Arc::clone(&validator), cleaner.clone()).with_settings(
            config.session.refresh_max_attempts,
            Duration::from_millis(config.session.refresh_backoff_ms),
        ),
    );
    let resolver = Arc::new(RoleResolver::new(
        Arc::clone(&directory),
        Duration::from_secs(config.session.role_cache_ttl_secs),
    ));
    let handler = AuthStateHandler::new(cache, cleaner.clone());

    let signin = SignInService::new(
        Box::new(ProducerSignIn::new(Arc::clone(&provider))),
        Box::new(CompanySignIn::new(
            Arc::clone(&provider),
            Arc::clone(&directory),
            provisioner,
        )),
        Box::new(DefaultSignIn::new(
            Arc::clone(&provider),
            Arc::clone(&directory),
        )),
        handler.clone(),
    );
    let account = AccountService::new(Arc::clone(&provider), Arc::clone(&directory));

    let monitor = SessionMonitor::new(
        Arc::clone(&validator),
        Arc::clone(&recovery),
        handler.clone(),
        Duration::from_secs(config.session.monitor_interval_secs),
    );
    let monitor_handle = monitor.spawn();

    let state = Arc::new(AppState {
        storage,
        provider,
        signin,
        validator,
        recovery,
        cleaner,
        resolver,
        account,
        handler,
        config: config.clone(),
    });

    let app = create_router(Arc::clone(&state), &config);

    let addr = config.listen_addr;
    info!("Auth gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor_handle.abort();

    Ok(())
}

/// Wait for a shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                let _ = signal.recv().await;
            }
            Err(err) => tracing::error!(%err, "Failed to install signal handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, shutting down");
}
