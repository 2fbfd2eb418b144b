//! Intraday market monitor.
//!
//! The monitor polls the quote provider on a fixed interval during the
//! A-share sessions and pushes each snapshot through [`MonitorCore`]:
//! tick history, sentiment and cycle phase, theme ranking, detectors,
//! orchestration and the signal filter. Emitted decisions are journaled
//! and broadcast as [`MonitorEvent`]s. A cron schedule closes the trading
//! day (board ladder roll, cycle commit, daily resets).
//!
//! # Lifecycle
//!
//! `Idle` → `Running` → `Stopping` (after [`MonitorHandle::stop`]) → `Stopped`.
//! The loop exits on its next wake-up once the stop flag is set.

mod engine;
mod filter;

pub use engine::{CycleOutcome, DaySummary, MarketView, MonitorCore, DEFAULT_CAPITAL};
pub use filter::{SignalFilter, Suppression};

use anyhow::{Context, Result};
use aquant_common::config::Config;
use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::data::{exchange_offset, parse_hhmm, QuoteProvider};
use crate::journal::SignalJournal;
use crate::market::MarketPhase;
use crate::strategy::{Action, Decision};
use crate::watchlist::Watchlist;

/// Daily candles requested per symbol for the dip detector.
const CANDLE_LOOKBACK: usize = 30;

// ============================================================================
// Configuration
// ============================================================================

/// Monitor loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub morning_start: NaiveTime,
    pub morning_end: NaiveTime,
    pub afternoon_start: NaiveTime,
    pub afternoon_end: NaiveTime,
    /// Cron expression (with seconds) on the exchange clock
    pub eod_schedule: String,
    pub max_symbols_per_cycle: usize,
    pub dedup_window_secs: u64,
    pub max_signals_per_symbol: usize,
    /// Decisions kept in memory
    pub history_size: usize,
    /// Ticks kept per symbol
    pub tick_window: usize,
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            morning_start: hm(9, 30),
            morning_end: hm(11, 30),
            afternoon_start: hm(13, 0),
            afternoon_end: hm(15, 0),
            eod_schedule: "0 5 15 * * Mon-Fri".to_string(),
            max_symbols_per_cycle: 50,
            dedup_window_secs: 300,
            max_signals_per_symbol: 3,
            history_size: 200,
            tick_window: 120,
        }
    }
}

impl MonitorConfig {
    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        let d = Self::default();
        let m = &config.trading.monitor;
        Self {
            interval_secs: m.interval_secs.unwrap_or(d.interval_secs),
            morning_start: parse_hhmm(m.morning_start.as_deref(), d.morning_start),
            morning_end: parse_hhmm(m.morning_end.as_deref(), d.morning_end),
            afternoon_start: parse_hhmm(m.afternoon_start.as_deref(), d.afternoon_start),
            afternoon_end: parse_hhmm(m.afternoon_end.as_deref(), d.afternoon_end),
            eod_schedule: m.eod_schedule.clone().unwrap_or(d.eod_schedule.clone()),
            max_symbols_per_cycle: m.max_symbols_per_cycle.unwrap_or(d.max_symbols_per_cycle),
            dedup_window_secs: m.dedup_window_secs.unwrap_or(d.dedup_window_secs),
            max_signals_per_symbol: m.max_signals_per_symbol.unwrap_or(d.max_signals_per_symbol),
            history_size: m.history_size.unwrap_or(d.history_size),
            ..d
        }
    }

    /// Whether `now` falls in a weekday trading session on the exchange clock.
    pub fn is_trading_hours(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&exchange_offset());
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let t = local.time();
        (t >= self.morning_start && t <= self.morning_end)
            || (t >= self.afternoon_start && t <= self.afternoon_end)
    }

    fn eod(&self) -> Result<Schedule> {
        Schedule::from_str(&self.eod_schedule)
            .with_context(|| format!("Invalid eod_schedule cron: {}", self.eod_schedule))
    }
}

// ============================================================================
// State and Events
// ============================================================================

/// Monitor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Events broadcast by the monitor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    Started,
    Stopped,
    CycleCompleted {
        timestamp: DateTime<Utc>,
        ticks: usize,
        decisions: usize,
        phase: Option<MarketPhase>,
    },
    Decision(Decision),
    Rotation {
        entered: Vec<String>,
        exited: Vec<String>,
    },
    DayClosed(DaySummary),
    Error {
        message: String,
    },
}

/// Running counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorStats {
    pub cycles: u64,
    pub decisions: u64,
    pub buys: u64,
    pub sells: u64,
    pub suppressed: u64,
    pub errors: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Status report for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub provider: String,
    pub interval_secs: u64,
    pub trading_hours: bool,
    pub watchlist_size: usize,
    pub holdings: usize,
    pub buys_today: usize,
    pub exposure: f64,
    pub realized_pnl: f64,
    pub phase: Option<MarketPhase>,
    #[serde(flatten)]
    pub stats: MonitorStats,
}

/// Cloneable stop control for a running monitor.
#[derive(Clone)]
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    state: Arc<RwLock<MonitorState>>,
}

impl MonitorHandle {
    /// Ask the loop to exit at its next wake-up.
    pub async fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_one();
        let mut state = self.state.write().await;
        if *state == MonitorState::Running {
            *state = MonitorState::Stopping;
            info!("Monitor stopping...");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Live polling loop around a [`MonitorCore`].
pub struct MarketMonitor {
    config: MonitorConfig,
    provider: Arc<dyn QuoteProvider>,
    core: Arc<Mutex<MonitorCore>>,
    watchlist: Arc<RwLock<Watchlist>>,
    journal: Option<Arc<SignalJournal>>,
    state: Arc<RwLock<MonitorState>>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    stats: Arc<RwLock<MonitorStats>>,
    eod: Schedule,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl MarketMonitor {
    /// Build a monitor from config. Fails on an invalid cron expression.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn QuoteProvider>,
        watchlist: Arc<RwLock<Watchlist>>,
        journal: Option<Arc<SignalJournal>>,
    ) -> Result<Self> {
        Self::new(
            MonitorConfig::from_config(config),
            MonitorCore::from_config(config),
            provider,
            watchlist,
            journal,
        )
    }

    pub fn new(
        config: MonitorConfig,
        core: MonitorCore,
        provider: Arc<dyn QuoteProvider>,
        watchlist: Arc<RwLock<Watchlist>>,
        journal: Option<Arc<SignalJournal>>,
    ) -> Result<Self> {
        let eod = config.eod()?;
        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            config,
            provider,
            core: Arc::new(Mutex::new(core)),
            watchlist,
            journal,
            state: Arc::new(RwLock::new(MonitorState::Idle)),
            stop: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            stats: Arc::new(RwLock::new(MonitorStats::default())),
            eod,
            event_tx,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Subscribe to monitor events
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            stop: Arc::clone(&self.stop),
            wake: Arc::clone(&self.wake),
            state: Arc::clone(&self.state),
        }
    }

    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }

    pub fn watchlist(&self) -> Arc<RwLock<Watchlist>> {
        Arc::clone(&self.watchlist)
    }

    pub fn journal(&self) -> Option<Arc<SignalJournal>> {
        self.journal.clone()
    }

    /// Market state after the latest cycle.
    pub async fn market(&self) -> Option<MarketView> {
        self.core.lock().await.market().cloned()
    }

    /// Latest emitted decisions held in memory, newest first.
    pub async fn recent_decisions(&self, limit: usize) -> Vec<Decision> {
        self.core.lock().await.recent_decisions(limit)
    }

    pub async fn stats(&self) -> MonitorStats {
        self.stats.read().await.clone()
    }

    pub async fn status(&self) -> MonitorStatus {
        let watchlist_size = self.watchlist.read().await.len();
        let (holdings, buys_today, exposure, realized_pnl, phase) = {
            let core = self.core.lock().await;
            let book = core.book();
            (
                book.len(),
                book.buys_today(),
                book.exposure(),
                book.realized_pnl(),
                core.market().map(|m| m.phase),
            )
        };

        MonitorStatus {
            state: self.state().await,
            provider: self.provider.name().to_string(),
            interval_secs: self.config.interval_secs,
            trading_hours: self.config.is_trading_hours(Utc::now()),
            watchlist_size,
            holdings,
            buys_today,
            exposure,
            realized_pnl,
            phase,
            stats: self.stats().await,
        }
    }

    /// Fetch a snapshot and run it through the pipeline.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let watch = self.watchlist.read().await.symbols();
        // Sentiment needs the whole market, not just the watchlist
        let snapshot = self
            .provider
            .fetch_snapshot(&[])
            .await
            .with_context(|| format!("{} snapshot fetch failed", self.provider.name()))?;

        let date = snapshot.trade_date();
        let missing = {
            let core = self.core.lock().await;
            let candidates = core.candidates(&snapshot, &watch);
            core.missing_candles(&candidates, date)
        };
        let mut fetched = Vec::with_capacity(missing.len());
        for symbol in missing {
            let candles = match self.provider.fetch_daily_candles(&symbol, CANDLE_LOOKBACK).await {
                Ok(candles) => candles,
                Err(e) => {
                    debug!(symbol = %symbol, error = %e, "No daily candles");
                    Vec::new()
                }
            };
            fetched.push((symbol, candles));
        }

        let outcome = {
            let mut core = self.core.lock().await;
            for (symbol, candles) in fetched {
                core.store_candles(date, &symbol, candles);
            }
            core.process(snapshot, &watch)
        };

        self.publish(&outcome).await;
        Ok(outcome)
    }

    /// Journal, broadcast and count a cycle's results.
    async fn publish(&self, outcome: &CycleOutcome) {
        if let Some(summary) = &outcome.rolled {
            let _ = self.event_tx.send(MonitorEvent::DayClosed(summary.clone()));
        }

        for decision in &outcome.decisions {
            if let Some(journal) = &self.journal {
                if let Err(e) = journal.record(decision).await {
                    warn!(id = %decision.id, error = %e, "Failed to journal decision");
                }
            }
            if decision.is_actionable() {
                info!(
                    symbol = %decision.symbol,
                    action = decision.action.as_str(),
                    score = decision.score,
                    fraction = decision.position_fraction,
                    "Signal emitted"
                );
            }
            let _ = self.event_tx.send(MonitorEvent::Decision(decision.clone()));
        }

        if outcome.rotation.has_rotation() {
            let _ = self.event_tx.send(MonitorEvent::Rotation {
                entered: outcome.rotation.entered.clone(),
                exited: outcome.rotation.exited.clone(),
            });
        }
        let _ = self.event_tx.send(MonitorEvent::CycleCompleted {
            timestamp: outcome.timestamp,
            ticks: outcome.ticks,
            decisions: outcome.decisions.len(),
            phase: outcome.phase,
        });

        let mut stats = self.stats.write().await;
        stats.cycles += 1;
        stats.decisions += outcome.decisions.len() as u64;
        stats.buys += outcome.decisions.iter().filter(|d| d.action == Action::Buy).count() as u64;
        stats.sells += outcome.decisions.iter().filter(|d| d.action == Action::Sell).count() as u64;
        stats.suppressed += outcome.suppressed as u64;
        stats.last_cycle_at = Some(Utc::now());
    }

    /// Close the trading day now.
    pub async fn end_of_day(&self) -> Option<DaySummary> {
        let summary = self.core.lock().await.end_of_day();
        if let Some(summary) = &summary {
            let _ = self.event_tx.send(MonitorEvent::DayClosed(summary.clone()));
        }
        summary
    }

    fn next_eod(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.eod
            .after(&after.with_timezone(&exchange_offset()))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    async fn record_error(&self, message: String) {
        let mut stats = self.stats.write().await;
        stats.errors += 1;
        stats.last_error = Some(message.clone());
        drop(stats);
        let _ = self.event_tx.send(MonitorEvent::Error { message });
    }

    /// Run until stopped.
    pub async fn run(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            *state = MonitorState::Running;
        }
        let _ = self.event_tx.send(MonitorEvent::Started);
        info!(
            provider = self.provider.name(),
            interval_secs = self.config.interval_secs,
            eod = %self.config.eod_schedule,
            "Monitor started"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut next_eod = self.next_eod(Utc::now());

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            let now = Utc::now();
            if next_eod.is_some_and(|at| now >= at) {
                self.end_of_day().await;
                next_eod = self.next_eod(now);
            }

            if !self.config.is_trading_hours(now) {
                debug!("Outside trading hours, skipping cycle");
                continue;
            }

            if let Err(e) = self.run_cycle().await {
                warn!(error = %e, "Monitor cycle failed");
                self.record_error(format!("{:#}", e)).await;
            }
        }

        {
            let mut state = self.state.write().await;
            *state = MonitorState::Stopped;
        }
        let _ = self.event_tx.send(MonitorEvent::Stopped);
        info!("Monitor stopped");

        Ok(())
    }
}
