//! aquant trading - intraday A-share signal engine.
//!
//! Polls market snapshots, scores 半路 (halfway breakout) and 低吸 (dip buy)
//! setups, tracks market sentiment, the board ladder, the emotion cycle and
//! theme rotation, and arbitrates everything into buy/sell/wait decisions.
//! Signals only: nothing here places orders.
//!
//! # Modules
//!
//! - [`data`]: ticks, candles, snapshots and quote providers
//! - [`detector`]: halfway breakout, dip buy and DDE scoring
//! - [`market`]: sentiment, board ladder, cycle phase, theme heat
//! - [`strategy`]: orchestrator and paper position book
//! - [`monitor`]: the polling loop and its clock-free core
//! - [`replay`]: recorded sessions through the same pipeline
//! - [`journal`], [`watchlist`]: persistence
//! - [`routes`]: dashboard HTTP API

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod detector;
pub mod journal;
pub mod market;
pub mod monitor;
pub mod replay;
pub mod routes;
pub mod strategy;
pub mod watchlist;

use anyhow::{Context, Result};
use aquant_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::data::{FallbackProvider, QuoteProvider, ReplayProvider, SampleProvider};
use crate::journal::SignalJournal;
use crate::monitor::MarketMonitor;
use crate::replay::{ReplayRunner, ReplaySummary};
use crate::routes::AppState;
use crate::watchlist::Watchlist;

/// Quote source for the live monitor: the replay file when configured,
/// otherwise the sample market, always behind a sample fallback.
pub fn build_provider(config: &Config) -> Result<Arc<dyn QuoteProvider>> {
    let sample: Arc<dyn QuoteProvider> = Arc::new(SampleProvider::new(config.data.sample_size));

    let primary: Arc<dyn QuoteProvider> = match config.replay_path() {
        Some(path) => Arc::new(ReplayProvider::from_path(&path)?),
        None => {
            tracing::info!(size = config.data.sample_size, "No replay file configured, using sample market");
            Arc::new(SampleProvider::new(config.data.sample_size))
        }
    };

    Ok(Arc::new(FallbackProvider::new(primary, sample)))
}

/// Replay the configured recording and return its summary.
pub fn run_replay(config: &Config) -> Result<ReplaySummary> {
    let path = config
        .replay_path()
        .context("Replay requested but no replay path is configured (data.replay_path / AQUANT_REPLAY_PATH)")?;
    let provider = ReplayProvider::from_path(&path)?;
    let watch = Watchlist::load(&config.watchlist_path())?.symbols();

    let mut runner = ReplayRunner::new(config).with_watchlist(watch);
    Ok(runner.run(&provider))
}

/// Monitor plus HTTP API.
pub struct SignalService {
    config: Config,
    monitor: Arc<MarketMonitor>,
}

impl SignalService {
    pub fn new(config: Config) -> Result<Self> {
        let provider = build_provider(&config)?;
        let watchlist = Arc::new(RwLock::new(Watchlist::load(&config.watchlist_path())?));
        let journal = if config.data.journal_enabled {
            Some(Arc::new(SignalJournal::open(&config.journal_path())?))
        } else {
            None
        };

        let monitor = Arc::new(MarketMonitor::from_config(&config, provider, watchlist, journal)?);
        Ok(Self { config, monitor })
    }

    pub fn monitor(&self) -> Arc<MarketMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Run the monitor and serve the API until Ctrl-C.
    pub async fn start(self) -> Result<()> {
        let monitor = Arc::clone(&self.monitor);
        let handle = monitor.handle();
        let monitor_task = tokio::spawn(async move {
            if let Err(e) = monitor.run().await {
                tracing::error!(error = %e, "Monitor failed");
            }
        });

        let addr: SocketAddr = self
            .config
            .bind_address()
            .parse()
            .with_context(|| format!("Invalid bind address {}", self.config.bind_address()))?;
        let state = Arc::new(AppState::new(self.config.clone(), Arc::clone(&self.monitor)));
        let app = routes::build_router(state);

        tracing::info!(address = %addr, "Starting HTTP server");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to listen for shutdown signal");
                }
                tracing::info!("Shutdown requested");
            })
            .await?;

        handle.stop().await;
        if let Err(e) = monitor_task.await {
            tracing::warn!(error = %e, "Monitor task did not exit cleanly");
        }
        Ok(())
    }
}
