use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::auth::{
    context_handler, login_handler, logout_handler, password_handler, recover_handler,
};
use crate::api::handlers::health_handler;
use crate::api::handlers::session::{adopt_session_handler, refresh_handler, validate_handler};
use crate::config::AuthConfig;
use crate::server::AppState;

/// Creates and configures the router with all routes and middleware
pub fn create_router(state: Arc<AppState>, config: &AuthConfig) -> Router {
    // Configure the CORS layer
    let cors_layer = if config.cors.allow_all_origins {
        CorsLayer::permissive()
    } else {
        let mut layer = CorsLayer::new();

        for origin in &config.cors.allowed_origins {
            if let Ok(value) = origin.parse::<axum::http::HeaderValue>() {
                layer = layer.allow_origin(value);
            }
        }

        let methods: Vec<axum::http::Method> = config
            .cors
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        layer = layer.allow_methods(methods);

        layer = layer.allow_headers(
            config
                .cors
                .allowed_headers
                .iter()
                .filter_map(|h| h.parse::<axum::http::HeaderName>().ok())
                .collect::<Vec<_>>(),
        );

        layer.max_age(Duration::from_secs(config.cors.max_age))
    };

    Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/validate", post(validate_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/session", post(adopt_session_handler))
        .route("/auth/recover", post(recover_handler))
        .route("/auth/password", post(password_handler))
        .route("/auth/context", get(context_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(Extension(state))
}
