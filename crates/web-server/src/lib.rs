use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use orchestrator::TradingService;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;

/// The shared application state that all handlers can access.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TradingService>,
}

/// Builds the API router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/trading/:user_id/start", post(handlers::start_trading))
        .route("/api/slots/available", get(handlers::available_slot))
        .route("/api/instances/:slot/status", get(handlers::instance_status))
        .route("/api/instances/:slot/stop", post(handlers::stop_instance))
        .route("/api/instances/:slot/terminal/stop", post(handlers::stop_terminal))
        .route("/api/instances/:slot/pair", post(handlers::set_pair))
        .route("/api/instances/:slot/connection", get(handlers::check_connection))
        .route("/api/connections", get(handlers::connections))
        .with_state(state)
        .layer(cors)
        // Logs every incoming request.
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024))
}

/// Serves the API on `addr` until the listener fails.
///
/// Tracing is initialised by the binary before this is called.
pub async fn run_server(service: Arc<TradingService>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(Arc::new(AppState { service }));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server started and listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
