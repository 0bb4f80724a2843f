use anyhow::Result;
use go2_common::AppConfig;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config/go2.yaml";

fn init_tracing() {
    // RUST_LOG wins, then LOG_LEVEL, then info.
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| EnvFilter::try_new(level.to_lowercase()).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"));

    let simple = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("simple"))
        .unwrap_or(false);

    if simple {
        fmt().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).json().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!(config_path = %config_path, "starting go2 API");

    let mut config = AppConfig::load(&config_path)?;
    if let Ok(port) = std::env::var("PORT") {
        config.server.override_port(&port)?;
    }

    info!(
        listen = %config.server.listen,
        environment = %config.server.environment,
        rate_limit_enabled = config.rate_limit.enabled,
        "configuration loaded"
    );

    let listen = config.server.listen.clone();
    let state = go2_api::new_shared_state(config)?;

    go2_api::run_server(state, &listen).await
}
