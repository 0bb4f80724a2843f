pub mod error;
pub mod middleware;
pub mod probe;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use error::{ApiError, ErrorDetail, ErrorResponse};
pub use probe::{DependencyProbe, DependencyStatus};
pub use state::{ApiMetrics, AppState, SharedState};

/// Build the Axum router with all routes and the traffic-control middleware.
pub fn build_router(state: SharedState) -> Router {
    apply_middleware(api_routes(), state)
}

/// Routes served by the API, without middleware or state attached.
pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health::health_check))
        // Prometheus metrics
        .route("/api/metrics", get(routes::metrics::get_metrics))
        // Circuit breaker administration
        .route("/api/admin/breakers", get(routes::breakers::list_breakers))
        .route("/api/admin/breakers/reset", post(routes::breakers::reset_all_breakers))
        .route("/api/admin/breakers/{name}", get(routes::breakers::get_breaker))
        .route(
            "/api/admin/breakers/{name}/reset",
            post(routes::breakers::reset_breaker),
        )
}

/// Wrap `router` in rate limiting, request logging and CORS, then attach state.
///
/// Rate limiting runs inside request logging so rejected requests are still
/// logged and counted.
pub fn apply_middleware(router: Router<SharedState>, state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::log_requests,
        ))
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the specified address.
///
/// Runs until ctrl-c is received, then drains in-flight requests.
pub async fn run_server(state: SharedState, listen_addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("go2 API server listening on {}", listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("go2 API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

/// Convenience function to create a SharedState from an AppConfig.
pub fn new_shared_state(config: go2_common::AppConfig) -> anyhow::Result<SharedState> {
    Ok(Arc::new(AppState::new(config)?))
}
