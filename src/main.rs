use crate::config::Config;
use crate::db::{PgPollStore, init_db, seed_default_poll, spawn_health_check};
use crate::startup::{AppState, app, shutdown_signal};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[macro_use]
extern crate tracing;

mod config;
mod db;
mod error;
mod polls;
mod sse;
mod startup;

#[tokio::main]
async fn main() {
    // initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let pool = init_db(&config.database_url, config.db_max_connections)
        .await
        .expect("Unable to connect to the database");
    spawn_health_check(pool.clone());

    if config.seed_default_poll {
        match seed_default_poll(&pool).await {
            Ok(true) => info!("created default poll"),
            Ok(false) => {}
            Err(e) => warn!("failed to seed default poll: {}", e),
        }
    }

    let app_state = AppState::new(Arc::new(PgPollStore::new(pool)), config.sse);
    let registry = app_state.registry.clone();
    let app = app(app_state);

    let addr = config.bind_addr;
    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Unable to spawn tcp listener");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(registry))
    .await
    .unwrap();
}
