pub mod api;

use crate::error::Result;
use crate::services::{Db, KrakenClient, Snapshotter};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<KrakenClient>,
    pub db: Db,
    pub snapshotter: Arc<Snapshotter<KrakenClient>>,
}

/// Start the axum server. Shutdown (ctrl-c) stops the listener after a
/// bounded grace period; in-flight pipeline runs are not awaited.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/status", get(api::get_status_handler))
        .route("/api/pairs", get(api::get_pairs_handler))
        .route("/api/pairs/{pair}", get(api::get_pair_detail_handler))
        .route("/api/historical", get(api::get_historical_handler))
        .route("/api/db", get(api::get_db_handler))
        .route("/api/save", post(api::save_handler))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "Server listening");
    info!("Registered routes:");
    info!("  GET  /api/status");
    info!("  GET  /api/pairs");
    info!("  GET  /api/pairs/{{pair}}");
    info!("  GET  /api/historical?date=YYYY-MM-DD");
    info!("  GET  /api/db");
    info!("  POST /api/save");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received, stopping listener");
}
