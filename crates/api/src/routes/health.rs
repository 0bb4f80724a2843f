use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use go2_resilience::{DefaultValueFallback, GracefulDegradation};
use serde_json::{json, Value};

use crate::probe::DependencyStatus;
use crate::state::SharedState;

/// GET /health
///
/// Reports uptime, version and the status of every registered dependency.
/// Dependencies are checked through their circuit breakers, so an open
/// breaker reports `unavailable` without calling the dependency. The
/// endpoint answers 200 either way; `status` is `degraded` when any
/// dependency is unavailable.
pub async fn health_check(State(state): State<SharedState>) -> Json<Value> {
    let mut dependencies = BTreeMap::new();

    for probe in &state.probes {
        let check = GracefulDegradation::new(
            &state.breakers,
            probe.name(),
            DefaultValueFallback::new(DependencyStatus::Unavailable),
        );
        let status = check
            .execute(|| async {
                probe.check().await?;
                Ok::<_, anyhow::Error>(DependencyStatus::Up)
            })
            .await;
        dependencies.insert(probe.name().to_string(), status);
    }

    let degraded = dependencies
        .values()
        .any(|status| *status == DependencyStatus::Unavailable);

    Json(json!({
        "status": if degraded { "degraded" } else { "healthy" },
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.server.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "dependencies": dependencies,
        "circuit_breakers": state.breakers.stats(),
    }))
}
