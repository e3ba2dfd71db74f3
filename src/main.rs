use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipvote::{
    api, auth,
    broadcast::{self, TOTALS_HEARTBEAT, TOTALS_MIN_INTERVAL},
    catalog::CatalogStore,
    chat::{ChatConfig, ChatSupervisor, WsConnector},
    config::AppConfig,
    state::AppState,
    ws,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipvote=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting clipvote...");

    let config = AppConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());

    let store = CatalogStore::file(config.clips_path.clone());
    let mut state = AppState::load(store).await;

    // Chat voting is optional; without credentials the host can still run clips
    let chat = ChatConfig::from_env()
        .map(|chat_config| Arc::new(ChatSupervisor::new(chat_config, Arc::new(WsConnector))));
    if let Some(chat) = &chat {
        state = state.with_chat(chat.clone());
    }
    let state = Arc::new(state);

    if let Some(chat) = &chat {
        chat.spawn(state.clone());
    }

    // Live totals for overlays, woken by votes instead of polling
    broadcast::spawn_totals_broadcaster(state.clone(), TOTALS_MIN_INTERVAL, TOTALS_HEARTBEAT);
    broadcast::spawn_chat_status_broadcaster(state.clone());

    // Protected host routes (with HTTP Basic Auth)
    let host_routes = Router::new()
        .route("/host/ws", get(ws::host_ws_handler))
        .layer(middleware::from_fn_with_state(
            auth_config.clone(),
            auth::host_auth_middleware,
        ));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/session", get(api::get_session))
        .route("/api/config", get(api::get_config))
        .route("/rank/{label}", get(api::get_rank_image))
        .merge(host_routes)
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on http://{}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
