mod auth;
mod booking;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;

use std::sync::Arc;

use crate::{
    booking::{notify::LogNotifier, pg_store::PgStore, BookingService},
    config::Config,
    models::AppState,
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url, cfg.db_max_connections).await?;

    let booking = BookingService::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(LogNotifier),
        cfg.booking_horizon_weeks,
    );

    let state = AppState {
        db: pool,
        session_ttl_hours: cfg.session_ttl_hours,
        booking,
    };

    // Browser clients call the API cross-origin; preflight must pass.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(
        horizon_weeks = cfg.booking_horizon_weeks,
        "Listening on http://{}",
        cfg.bind_addr
    );
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
