//! VisionDist - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(&config.log_level, config.log_json)?;

    info!("=== VisionDist v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        persist = config.persist,
        data_dir = %config.data_dir.display(),
        replay = config.replay_path.is_some(),
        "Starting distance and posture monitor..."
    );

    run_server(config).await
}
