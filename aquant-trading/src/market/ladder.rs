//! 连板梯队: consecutive limit-up day counts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::data::MarketSnapshot;

/// One rung of the ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderEntry {
    pub symbol: String,
    pub name: String,
    /// Consecutive limit-up closes, including the last rolled day
    pub streak: u32,
}

/// End-of-day record of limit-up streaks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardLadder {
    entries: HashMap<String, LadderEntry>,
    last_date: Option<NaiveDate>,
}

impl BoardLadder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close out a trading day from its final snapshot.
    ///
    /// Stocks sealed at limit-up extend their streak, everything else drops
    /// off. Rolling the same date twice is a no-op; returns whether the
    /// ladder changed.
    pub fn roll_day(&mut self, date: NaiveDate, snapshot: &MarketSnapshot) -> bool {
        if self.last_date == Some(date) {
            return false;
        }

        let mut next = HashMap::new();
        for tick in snapshot.ticks.iter().filter(|t| t.is_limit_up()) {
            let streak = self.streak(&tick.symbol) + 1;
            next.insert(
                tick.symbol.clone(),
                LadderEntry {
                    symbol: tick.symbol.clone(),
                    name: tick.name.clone(),
                    streak,
                },
            );
        }

        self.entries = next;
        self.last_date = Some(date);

        info!(
            date = %date,
            limit_ups = self.entries.len(),
            max_streak = self.max_streak(),
            "Board ladder rolled"
        );
        true
    }

    pub fn streak(&self, symbol: &str) -> u32 {
        self.entries.get(symbol).map(|e| e.streak).unwrap_or(0)
    }

    pub fn max_streak(&self) -> u32 {
        self.entries.values().map(|e| e.streak).max().unwrap_or(0)
    }

    /// Highest streaks first; ties broken by symbol.
    pub fn leaders(&self, n: usize) -> Vec<LadderEntry> {
        let mut all: Vec<LadderEntry> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| b.streak.cmp(&a.streak).then_with(|| a.symbol.cmp(&b.symbol)));
        all.truncate(n);
        all
    }

    /// Number of stocks at each streak height.
    pub fn tiers(&self) -> BTreeMap<u32, usize> {
        let mut tiers = BTreeMap::new();
        for entry in self.entries.values() {
            *tiers.entry(entry.streak).or_insert(0) += 1;
        }
        tiers
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
