//! Replay of recorded sessions through the monitor pipeline.
//!
//! Snapshots run back to back with no session gating. A change of trading
//! date between two snapshots closes the previous day exactly like the
//! live end-of-day schedule would.

use aquant_common::config::Config;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::data::ReplayProvider;
use crate::market::MarketPhase;
use crate::monitor::{DaySummary, MonitorCore};
use crate::strategy::{Action, Decision};

/// Totals of a replay run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub snapshots: usize,
    /// Emitted decisions
    pub decisions: usize,
    pub buys: usize,
    pub sells: usize,
    /// Waits carrying at least one veto
    pub vetoed: usize,
    pub suppressed: usize,
    /// Triggered detector signals
    pub signals: usize,
    pub dropped_ticks: usize,
    /// Snapshots per intraday phase
    pub phases: HashMap<MarketPhase, usize>,
    pub days: Vec<DaySummary>,
    pub open_positions: usize,
    pub realized_pnl: f64,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl ReplaySummary {
    fn count(&mut self, decision: &Decision) {
        self.decisions += 1;
        match decision.action {
            Action::Buy => self.buys += 1,
            Action::Sell => self.sells += 1,
            Action::Wait if !decision.vetoes.is_empty() => self.vetoed += 1,
            Action::Wait => {}
        }
    }
}

/// Drives recorded snapshots through a [`MonitorCore`].
pub struct ReplayRunner {
    core: MonitorCore,
    watch: Vec<String>,
    decisions: Vec<Decision>,
}

impl ReplayRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            core: MonitorCore::from_config(config),
            watch: Vec::new(),
            decisions: Vec::new(),
        }
    }

    /// Restrict detectors to these symbols.
    pub fn with_watchlist(mut self, symbols: Vec<String>) -> Self {
        self.watch = symbols;
        self
    }

    pub fn core(&self) -> &MonitorCore {
        &self.core
    }

    /// Every decision emitted so far, in order.
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Replay every snapshot of `provider`, then close the last day.
    pub fn run(&mut self, provider: &ReplayProvider) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        let mut current: Option<NaiveDate> = None;

        for snapshot in provider.snapshots() {
            let date = snapshot.trade_date();
            if current.is_some_and(|d| d != date) {
                summary.days.extend(self.core.end_of_day());
            }
            current = Some(date);

            for symbol in self.core.missing_candles(&self.symbols(snapshot), date) {
                let candles = provider.candles(&symbol).to_vec();
                self.core.store_candles(date, &symbol, candles);
            }

            let outcome = self.core.process(snapshot.clone(), &self.watch);
            summary.snapshots += 1;
            summary.dropped_ticks += outcome.dropped;
            summary.suppressed += outcome.suppressed;
            summary.signals += outcome.signals.len();
            if let Some(phase) = outcome.phase {
                *summary.phases.entry(phase).or_insert(0) += 1;
            }
            summary.days.extend(outcome.rolled);
            for decision in outcome.decisions {
                summary.count(&decision);
                self.decisions.push(decision);
            }

            summary.first_timestamp.get_or_insert(snapshot.timestamp);
            summary.last_timestamp = Some(snapshot.timestamp);
        }

        summary.days.extend(self.core.end_of_day());
        summary.open_positions = self.core.book().len();
        summary.realized_pnl = self.core.book().realized_pnl();

        info!(
            snapshots = summary.snapshots,
            decisions = summary.decisions,
            buys = summary.buys,
            sells = summary.sells,
            vetoed = summary.vetoed,
            days = summary.days.len(),
            "Replay finished"
        );
        summary
    }

    fn symbols(&self, snapshot: &crate::data::MarketSnapshot) -> Vec<String> {
        self.core.candidates(snapshot, &self.watch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Candle, MarketSnapshot, Tick};
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-10T01:45:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn snap(at: DateTime<Utc>, ticks: Vec<Tick>) -> MarketSnapshot {
        MarketSnapshot::new(at, ticks.into_iter().map(|t| t.at(at)).collect())
    }

    #[test]
    fn test_empty_replay() {
        let mut runner = ReplayRunner::new(&Config::default());
        let summary = runner.run(&ReplayProvider::from_snapshots(Vec::new()));
        assert_eq!(summary.snapshots, 0);
        assert!(summary.days.is_empty());
        assert!(summary.first_timestamp.is_none());
    }

    #[test]
    fn test_date_change_closes_days() {
        let ticks = || {
            vec![
                Tick::new("600001.SH", 10.0, 11.0).with_sector("AI算力"),
                Tick::new("600002.SH", 10.0, 10.2).with_sector("AI算力"),
                Tick::new("000003.SZ", 10.0, 9.9).with_sector("地产"),
            ]
        };
        let snapshots = vec![
            snap(t0(), ticks()),
            snap(t0() + Duration::minutes(5), ticks()),
            snap(t0() + Duration::days(3), ticks()),
        ];
        let candles = vec![Candle {
            symbol: "600002.SH".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 9).unwrap(),
            open: 9.8,
            high: 10.1,
            low: 9.7,
            close: 10.0,
            volume: 1_000_000.0,
            amount: 10_000_000.0,
            pre_close: Some(9.8),
        }];
        let provider = ReplayProvider::from_snapshots(snapshots).with_candles(candles);

        let mut runner = ReplayRunner::new(&Config::default());
        let summary = runner.run(&provider);

        assert_eq!(summary.snapshots, 3);
        assert_eq!(summary.phases.values().sum::<usize>(), 3);
        assert_eq!(summary.days.len(), 2);
        assert_eq!(summary.days[0].date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert_eq!(summary.days[1].date, NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());
        // Sealed both days
        assert_eq!(runner.core().ladder().streak("600001.SH"), 2);
        assert_eq!(summary.first_timestamp, Some(t0()));
        assert_eq!(summary.decisions, runner.decisions().len());
    }

    #[test]
    fn test_summary_counts_actions() {
        let mut summary = ReplaySummary::default();
        let base = Decision {
            id: uuid::Uuid::new_v4(),
            symbol: "600000.SH".into(),
            action: Action::Buy,
            score: 80.0,
            position_fraction: 0.1,
            vetoes: vec![],
            reasons: vec![],
            triggers: vec![],
            price: 10.0,
            timestamp: t0(),
        };
        summary.count(&base);
        summary.count(&Decision {
            action: Action::Wait,
            vetoes: vec![crate::strategy::Veto::LowSentiment],
            ..base.clone()
        });
        summary.count(&Decision {
            action: Action::Sell,
            ..base.clone()
        });
        summary.count(&Decision {
            action: Action::Wait,
            ..base
        });

        assert_eq!(summary.decisions, 4);
        assert_eq!((summary.buys, summary.sells, summary.vetoed), (1, 1, 1));
    }
}
