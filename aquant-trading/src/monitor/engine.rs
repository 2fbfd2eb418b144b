//! Clock-free cycle logic shared by the live monitor and replays.

use aquant_common::config::Config;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

use super::filter::SignalFilter;
use super::MonitorConfig;
use crate::data::{bare_code, Candle, MarketSnapshot, TickHistory};
use crate::detector::{DetectorSignal, DipBuyConfig, DipBuyDetector, HalfwayConfig, HalfwayDetector};
use crate::market::{
    BoardLadder, CycleConfig, CycleManager, LadderEntry, MarketPhase, MarketSentiment,
    RotationReport, SectorHeat, SentimentAnalyzer, ThemeConfig, ThemeTracker,
};
use crate::strategy::{Action, Decision, MarketContext, OrchestratorConfig, PositionBook, StrategyOrchestrator};

/// Starting capital when none is configured (CNY).
pub const DEFAULT_CAPITAL: f64 = 1_000_000.0;

/// Ladder leaders shown in the market view.
const LADDER_LEADERS: usize = 10;

/// Market state after the latest cycle, as served to the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketView {
    pub timestamp: DateTime<Utc>,
    pub trade_date: NaiveDate,
    pub sentiment: MarketSentiment,
    /// Intraday phase
    pub phase: MarketPhase,
    pub committed_phase: MarketPhase,
    pub position_multiplier: f64,
    pub top_sectors: Vec<SectorHeat>,
    pub hot_sectors: Vec<String>,
    pub ladder: Vec<LadderEntry>,
}

/// Result of processing one snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub timestamp: DateTime<Utc>,
    pub ticks: usize,
    /// Ticks dropped as invalid
    pub dropped: usize,
    /// Symbols run through the detectors
    pub evaluated: usize,
    /// Detector signals that triggered
    pub signals: Vec<DetectorSignal>,
    /// Decisions that passed the filter
    pub decisions: Vec<Decision>,
    pub suppressed: usize,
    pub phase: Option<MarketPhase>,
    pub rotation: RotationReport,
    /// Set when a new trading date forced the previous day closed
    pub rolled: Option<DaySummary>,
}

/// End-of-day roll result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub score: f64,
    pub phase: MarketPhase,
    pub limit_up_count: usize,
    pub max_streak: u32,
    pub holdings: usize,
    pub realized_pnl: f64,
}

/// Detectors, market managers, orchestrator and book driven one snapshot at a time.
pub struct MonitorCore {
    max_symbols: usize,
    history_size: usize,
    history: TickHistory,
    ladder: BoardLadder,
    analyzer: SentimentAnalyzer,
    cycle: CycleManager,
    themes: ThemeTracker,
    halfway: HalfwayDetector,
    dip: DipBuyDetector,
    orchestrator: StrategyOrchestrator,
    book: PositionBook,
    filter: SignalFilter,
    candles: HashMap<String, Vec<Candle>>,
    candles_date: Option<NaiveDate>,
    last_snapshot: Option<MarketSnapshot>,
    market: Option<MarketView>,
    current_date: Option<NaiveDate>,
    rolled_date: Option<NaiveDate>,
    recent: VecDeque<Decision>,
}

impl MonitorCore {
    pub fn from_config(config: &Config) -> Self {
        let monitor = MonitorConfig::from_config(config);
        let orchestrator = OrchestratorConfig::from_config(config);
        let capital = config.trading.capital.unwrap_or(DEFAULT_CAPITAL);

        Self {
            max_symbols: monitor.max_symbols_per_cycle,
            history_size: monitor.history_size,
            history: TickHistory::new(monitor.tick_window),
            ladder: BoardLadder::new(),
            analyzer: SentimentAnalyzer::new(),
            cycle: CycleManager::new(CycleConfig::from_config(config)),
            themes: ThemeTracker::new(ThemeConfig::from_config(config)),
            halfway: HalfwayDetector::new(HalfwayConfig::from_config(config)),
            dip: DipBuyDetector::new(DipBuyConfig::from_config(config)),
            book: PositionBook::new(capital, orchestrator.max_total_exposure),
            orchestrator: StrategyOrchestrator::new(orchestrator),
            filter: SignalFilter::new(monitor.dedup_window_secs, monitor.max_signals_per_symbol),
            candles: HashMap::new(),
            candles_date: None,
            last_snapshot: None,
            market: None,
            current_date: None,
            rolled_date: None,
            recent: VecDeque::new(),
        }
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    pub fn ladder(&self) -> &BoardLadder {
        &self.ladder
    }

    pub fn cycle(&self) -> &CycleManager {
        &self.cycle
    }

    pub fn market(&self) -> Option<&MarketView> {
        self.market.as_ref()
    }

    pub fn current_date(&self) -> Option<NaiveDate> {
        self.current_date
    }

    /// Latest emitted decisions, newest first.
    pub fn recent_decisions(&self, limit: usize) -> Vec<Decision> {
        self.recent.iter().rev().take(limit).cloned().collect()
    }

    /// Symbols to run detectors on: watchlist symbols present in the
    /// snapshot, or the whole snapshot when the watchlist is empty, capped.
    /// Watchlist entries match on bare code, so `000003` selects `000003.SZ`.
    pub fn candidates(&self, snapshot: &MarketSnapshot, watch: &[String]) -> Vec<String> {
        let codes: HashSet<&str> = watch.iter().map(|s| bare_code(s)).collect();
        let symbols = snapshot
            .ticks
            .iter()
            .filter(|t| codes.is_empty() || codes.contains(bare_code(&t.symbol)))
            .filter(|t| !self.book.is_holding(&t.symbol))
            .map(|t| t.symbol.clone());
        symbols.take(self.max_symbols).collect()
    }

    /// Symbols without daily candles cached for `date`.
    pub fn missing_candles(&self, symbols: &[String], date: NaiveDate) -> Vec<String> {
        if self.candles_date != Some(date) {
            return symbols.to_vec();
        }
        symbols
            .iter()
            .filter(|s| !self.candles.contains_key(*s))
            .cloned()
            .collect()
    }

    /// Cache daily candles for `date`. An empty series is cached too, so a
    /// symbol without history is not fetched again the same day.
    pub fn store_candles(&mut self, date: NaiveDate, symbol: &str, candles: Vec<Candle>) {
        if self.candles_date != Some(date) {
            self.candles.clear();
            self.candles_date = Some(date);
        }
        self.candles.insert(symbol.to_string(), candles);
    }

    /// Run one snapshot through the pipeline.
    pub fn process(&mut self, mut snapshot: MarketSnapshot, watch: &[String]) -> CycleOutcome {
        let mut outcome = CycleOutcome {
            timestamp: snapshot.timestamp,
            dropped: snapshot.retain_valid(),
            ticks: snapshot.len(),
            ..CycleOutcome::default()
        };
        if snapshot.is_empty() {
            debug!("Empty snapshot, nothing to evaluate");
            return outcome;
        }

        let date = snapshot.trade_date();
        if self.current_date.is_some_and(|d| d < date) {
            outcome.rolled = self.end_of_day();
        }
        self.current_date = Some(date);
        self.book.roll_day(date);

        for tick in &snapshot.ticks {
            self.history.record(tick);
        }

        // Market state
        let sentiment = self.analyzer.analyze(&snapshot, &self.ladder);
        let phase = self.cycle.update_intraday(sentiment.score);
        let ranked = self.themes.rank(&snapshot, &self.ladder);
        outcome.rotation = self.themes.detect_rotation(&ranked);
        outcome.phase = Some(phase);
        if outcome.rotation.has_rotation() {
            info!(
                entered = ?outcome.rotation.entered,
                exited = ?outcome.rotation.exited,
                "Sector rotation"
            );
        }
        let ctx = MarketContext::new(sentiment.clone(), &self.cycle, &self.themes);

        let mut candidates = Vec::new();

        // Exits first, so freed capacity is visible to entries
        let held: Vec<String> = self.book.holdings().map(|h| h.symbol.clone()).collect();
        for symbol in held {
            let Some(tick) = snapshot.get(&symbol) else {
                continue;
            };
            self.book.mark(&symbol, tick.price);
            let Some(holding) = self.book.holding(&symbol) else {
                continue;
            };
            let decision = self.orchestrator.evaluate_exit(tick, holding, &ctx, date);
            if decision.is_actionable() {
                candidates.push(decision);
            }
        }

        let symbols = self.candidates(&snapshot, watch);
        outcome.evaluated = symbols.len();
        for symbol in &symbols {
            let Some(tick) = snapshot.get(symbol) else {
                continue;
            };
            let candles = self.candles.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
            let hot = ctx.is_hot(tick.sector.as_deref());
            let signals = vec![
                self.halfway.evaluate(tick, &self.history),
                self.dip.evaluate(tick, &self.history, candles, hot),
            ];
            outcome
                .signals
                .extend(signals.iter().filter(|s| s.triggered).cloned());

            let decision = self.orchestrator.evaluate_entry(tick, &signals, &ctx, &self.book);
            // Untriggered waits are noise
            if decision.is_actionable() || !decision.triggers.is_empty() {
                candidates.push(decision);
            }
        }

        for mut decision in candidates {
            if self.filter.check(&decision, date).is_err() {
                outcome.suppressed += 1;
                continue;
            }
            self.apply(&mut decision, &snapshot, date);
            self.remember(decision.clone());
            outcome.decisions.push(decision);
        }

        self.market = Some(MarketView {
            timestamp: snapshot.timestamp,
            trade_date: date,
            sentiment,
            phase,
            committed_phase: self.cycle.committed_phase(),
            position_multiplier: self.cycle.position_multiplier(),
            top_sectors: ranked.into_iter().take(self.themes.config().top_n).collect(),
            hot_sectors: self.themes.hot_sectors(),
            ladder: self.ladder.leaders(LADDER_LEADERS),
        });
        self.last_snapshot = Some(snapshot);

        debug!(
            ticks = outcome.ticks,
            evaluated = outcome.evaluated,
            decisions = outcome.decisions.len(),
            suppressed = outcome.suppressed,
            phase = %phase,
            "Cycle processed"
        );
        outcome
    }

    /// Book the decision. A buy or sell the book refuses becomes a wait.
    fn apply(&mut self, decision: &mut Decision, snapshot: &MarketSnapshot, date: NaiveDate) {
        match decision.action {
            Action::Buy => {
                let name = snapshot
                    .get(&decision.symbol)
                    .map(|t| t.name.as_str())
                    .unwrap_or_default();
                if let Err(e) = self.book.open(
                    &decision.symbol,
                    name,
                    decision.price,
                    decision.position_fraction,
                    date,
                ) {
                    warn!(symbol = %decision.symbol, error = %e, "Buy not booked");
                    decision.action = Action::Wait;
                    decision.position_fraction = 0.0;
                    decision.reasons.push(format!("not booked: {}", e));
                }
            }
            Action::Sell => {
                if let Err(e) = self.book.close(&decision.symbol, decision.price, date) {
                    warn!(symbol = %decision.symbol, error = %e, "Sell not booked");
                    decision.action = Action::Wait;
                    decision.position_fraction = 0.0;
                    decision.reasons.push(format!("not booked: {}", e));
                }
            }
            Action::Wait => {}
        }
    }

    fn remember(&mut self, decision: Decision) {
        self.recent.push_back(decision);
        while self.recent.len() > self.history_size {
            self.recent.pop_front();
        }
    }

    /// Close the current trading day from the last snapshot: roll the
    /// board ladder, commit the cycle score, reset per-day state.
    /// Returns `None` when there is nothing to roll or the day is already rolled.
    pub fn end_of_day(&mut self) -> Option<DaySummary> {
        let snapshot = self.last_snapshot.as_ref()?;
        let date = snapshot.trade_date();
        if self.rolled_date == Some(date) {
            return None;
        }

        self.ladder.roll_day(date, snapshot);
        let score = self
            .market
            .as_ref()
            .map(|m| m.sentiment.score)
            .unwrap_or_else(|| self.analyzer.analyze(snapshot, &self.ladder).score);
        let phase = self.cycle.commit_day(date, score);

        if let Some(next) = date.succ_opt() {
            self.book.roll_day(next);
            self.filter.reset(next);
        }
        self.history.clear();
        self.rolled_date = Some(date);

        let summary = DaySummary {
            date,
            score,
            phase,
            limit_up_count: self.ladder.len(),
            max_streak: self.ladder.max_streak(),
            holdings: self.book.len(),
            realized_pnl: self.book.realized_pnl(),
        };
        info!(
            date = %date,
            score,
            phase = %phase,
            limit_ups = summary.limit_up_count,
            max_streak = summary.max_streak,
            "Trading day closed"
        );
        Some(summary)
    }
}
