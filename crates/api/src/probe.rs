use async_trait::async_trait;
use serde::Serialize;

/// A downstream dependency the health endpoint reports on.
///
/// Each probe is called through the registry breaker named after it, so a
/// dependency that keeps failing stops being called until its recovery
/// timeout has elapsed.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    Up,
    Unavailable,
}
