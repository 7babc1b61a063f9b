use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use riptide::config::Config;
use riptide::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    tracing::info!(
        app_registry = ?config.app_registry_driver,
        rate_limiter = ?config.rate_limiter_driver,
        presence = ?config.presence_storage_driver,
        "riptide configured"
    );

    let state = AppState::new(config);

    // Periodic stats snapshots for the range endpoint.
    if state.config.stats_enabled {
        let stats = state.stats.clone();
        let every = Duration::from_secs(state.config.stats_snapshot_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                stats.take_snapshots();
            }
        });
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(riptide::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "riptide listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .expect("server error");
}

/// Wait for Ctrl-C, then flip the closing flag so readiness fails and new
/// upgrades are refused while in-flight requests drain.
async fn shutdown_signal(state: AppState) {
    let _ = tokio::signal::ctrl_c().await;
    state.closing.store(true, Ordering::Relaxed);
    tracing::info!("shutdown requested, draining");
}
