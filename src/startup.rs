use crate::config::SseConfig;
use crate::db::PollStore;
use crate::polls::{cast_vote, get_current_poll, health};
use crate::sse::{Broadcaster, Registry, poll_updates_sse};
use axum::{
    Router,
    extract::Extension,
    http::{
        Method, StatusCode,
        header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PollStore>,
    pub registry: Registry,
    pub broadcaster: Broadcaster,
    pub sse: SseConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn PollStore>, sse: SseConfig) -> Self {
        let registry = Registry::new();
        let broadcaster = Broadcaster::new(store.clone(), registry.clone(), sse.push_timeout);

        AppState {
            store,
            registry,
            broadcaster,
            sse,
        }
    }
}

pub fn app(app_state: AppState) -> Router {
    Router::new()
        .route("/api/poll", get(get_current_poll))
        .route("/api/poll/vote", post(cast_vote))
        .route("/api/sse/poll", get(poll_updates_sse))
        .route("/api/health", get(health))
        .layer(Extension(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE, ACCEPT, CACHE_CONTROL]),
        )
        .layer(TraceLayer::new_for_http())
        .fallback(handler_404)
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}

/// Resolves on Ctrl-C or SIGTERM, after closing every open stream so the server can drain.
pub async fn shutdown_signal(registry: Registry) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let closed = registry.close_all();
    info!(closed, "shutting down, closed live connections");
}
