use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use citabot::config::AppConfig;
use citabot::handlers;
use citabot::services::gateways::http::{
    HttpBookingGateway, HttpCatalogGateway, HttpIntentExtractor,
};
use citabot::state::{AppState, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    let port = config.port;
    tracing::info!(
        window_start = %config.window.start,
        window_end = %config.window.end,
        "booking window configured"
    );

    let state = Arc::new(AppState {
        catalog: Box::new(HttpCatalogGateway::new(config.catalog_url.clone())),
        booking: Box::new(HttpBookingGateway::new(config.booking_url.clone())),
        intents: Box::new(HttpIntentExtractor::new(config.intent_url.clone())),
        sessions: SessionStore::new(),
        config,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/conversations",
            post(handlers::chat::create_conversation),
        )
        .route(
            "/api/conversations/:id",
            get(handlers::chat::get_conversation).delete(handlers::chat::cancel_conversation),
        )
        .route(
            "/api/conversations/:id/events",
            post(handlers::chat::post_event),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
