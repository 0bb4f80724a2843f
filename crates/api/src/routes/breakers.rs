use axum::extract::{Path, State};
use axum::Json;
use go2_resilience::{CircuitBreakerStats, CircuitState};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::SharedState;

/// GET /api/admin/breakers
pub async fn list_breakers(State(state): State<SharedState>) -> Json<Vec<CircuitBreakerStats>> {
    Json(state.breakers.stats())
}

/// GET /api/admin/breakers/{name}
pub async fn get_breaker(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<CircuitBreakerStats>, ApiError> {
    state
        .breakers
        .lookup(&name)
        .map(|breaker| Json(breaker.stats()))
        .ok_or(ApiError::NotFound {
            resource: "Circuit breaker",
            identifier: name,
        })
}

/// POST /api/admin/breakers/{name}/reset
///
/// Force a breaker back to closed with zeroed counters.
pub async fn reset_breaker(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.breakers.reset(&name) {
        return Err(ApiError::NotFound {
            resource: "Circuit breaker",
            identifier: name,
        });
    }

    tracing::info!(breaker = %name, "circuit breaker reset via admin API");

    Ok(Json(json!({
        "status": "reset",
        "breaker": name,
        "state": CircuitState::Closed,
    })))
}

/// POST /api/admin/breakers/reset
///
/// Reset every known breaker.
pub async fn reset_all_breakers(State(state): State<SharedState>) -> Json<Value> {
    let breakers = state.breakers.names();
    state.breakers.reset_all();

    tracing::info!(count = breakers.len(), "all circuit breakers reset via admin API");

    Json(json!({
        "status": "reset",
        "breakers": breakers,
        "state": CircuitState::Closed,
    }))
}
