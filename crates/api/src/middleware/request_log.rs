use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

use crate::state::SharedState;

/// Log every request with its latency and feed the request metrics.
pub async fn log_requests(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();
    let latency_ms = elapsed.as_secs_f64() * 1000.0;

    state.metrics.requests_total.inc();
    state
        .metrics
        .request_duration
        .with_label_values(&[method.as_str(), status.as_str()])
        .observe(elapsed.as_secs_f64());

    if status.is_server_error() {
        warn!(
            method = %method,
            path = %path,
            status_code = status.as_u16(),
            latency_ms,
            "request completed with server error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status_code = status.as_u16(),
            latency_ms,
            "request completed"
        );
    }

    response
}
