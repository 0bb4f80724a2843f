pub mod breakers;
pub mod health;
pub mod metrics;

use axum::Json;
use serde_json::{json, Value};

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "go2",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}
