//! aquant trading - intraday A-share signal engine.
//!
//! Runs the market monitor and the dashboard API. With
//! `AQUANT_REPLAY_ONLY=1` it replays the configured recording instead and
//! prints the summary as JSON.

use anyhow::Result;
use aquant_common::config::Config;
use aquant_common::logging::init_logging;
use aquant_trading::{run_replay, SignalService};

fn replay_only() -> bool {
    std::env::var("AQUANT_REPLAY_ONLY")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    config.validate()?;

    tracing::info!("aquant trading v{}", env!("CARGO_PKG_VERSION"));

    if replay_only() {
        let summary = run_replay(&config)?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let service = SignalService::new(config)?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
