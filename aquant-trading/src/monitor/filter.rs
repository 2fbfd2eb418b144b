//! Signal deduplication and daily caps for emitted decisions.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::strategy::{Action, Decision};

/// Why a decision was not emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suppression {
    /// Same symbol and action inside the dedup window
    Duplicate,
    /// Symbol already hit its per-day signal count
    DailyLimit,
}

/// Per symbol+action dedup window plus a per-symbol daily cap.
///
/// Windows are measured on decision timestamps, so recorded sessions
/// filter the same way live ones do.
#[derive(Debug, Clone)]
pub struct SignalFilter {
    dedup_window: Duration,
    max_signals_per_symbol: usize,
    /// (symbol, action) -> last accepted time
    recent: HashMap<(String, Action), DateTime<Utc>>,
    /// symbol -> accepted today
    daily_counts: HashMap<String, usize>,
    date: Option<NaiveDate>,
}

impl SignalFilter {
    pub fn new(dedup_window_secs: u64, max_signals_per_symbol: usize) -> Self {
        Self {
            dedup_window: Duration::seconds(dedup_window_secs as i64),
            max_signals_per_symbol,
            recent: HashMap::new(),
            daily_counts: HashMap::new(),
            date: None,
        }
    }

    /// Check a decision and record it when accepted.
    pub fn check(&mut self, decision: &Decision, date: NaiveDate) -> Result<(), Suppression> {
        if self.date != Some(date) {
            self.reset(date);
        }

        let key = (decision.symbol.clone(), decision.action);
        if let Some(last) = self.recent.get(&key) {
            if decision.timestamp.signed_duration_since(*last) < self.dedup_window {
                debug!(
                    symbol = %decision.symbol,
                    action = decision.action.as_str(),
                    "Decision suppressed: duplicate within window"
                );
                return Err(Suppression::Duplicate);
            }
        }

        let count = self.daily_counts.get(&decision.symbol).copied().unwrap_or(0);
        // Exits are never capped
        if decision.action != Action::Sell && count >= self.max_signals_per_symbol {
            debug!(
                symbol = %decision.symbol,
                count,
                "Decision suppressed: daily limit reached"
            );
            return Err(Suppression::DailyLimit);
        }

        self.recent.insert(key, decision.timestamp);
        *self.daily_counts.entry(decision.symbol.clone()).or_insert(0) += 1;
        Ok(())
    }

    /// Clear per-day counts and windows.
    pub fn reset(&mut self, date: NaiveDate) {
        self.recent.clear();
        self.daily_counts.clear();
        self.date = Some(date);
    }

    pub fn count(&self, symbol: &str) -> usize {
        self.daily_counts.get(symbol).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn decision(symbol: &str, action: Action, at: DateTime<Utc>) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            action,
            score: 70.0,
            position_fraction: 0.1,
            vetoes: vec![],
            reasons: vec![],
            triggers: vec![],
            price: 10.0,
            timestamp: at,
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-10T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn test_dedup_per_symbol_and_action() {
        let mut filter = SignalFilter::new(300, 10);
        assert!(filter.check(&decision("600000", Action::Wait, t0()), day()).is_ok());
        assert_eq!(
            filter.check(&decision("600000", Action::Wait, t0() + Duration::seconds(60)), day()),
            Err(Suppression::Duplicate)
        );
        // Different action, different key
        assert!(filter
            .check(&decision("600000", Action::Buy, t0() + Duration::seconds(60)), day())
            .is_ok());
        assert!(filter
            .check(&decision("600000", Action::Wait, t0() + Duration::seconds(301)), day())
            .is_ok());
    }

    #[test]
    fn test_daily_cap_and_reset() {
        let mut filter = SignalFilter::new(0, 2);
        assert!(filter.check(&decision("600000", Action::Wait, t0()), day()).is_ok());
        assert!(filter
            .check(&decision("600000", Action::Buy, t0() + Duration::seconds(1)), day())
            .is_ok());
        assert_eq!(
            filter.check(&decision("600000", Action::Wait, t0() + Duration::seconds(2)), day()),
            Err(Suppression::DailyLimit)
        );
        assert!(filter
            .check(&decision("600000", Action::Sell, t0() + Duration::seconds(3)), day())
            .is_ok());
        assert_eq!(filter.count("600000"), 3);

        let next = day().succ_opt().unwrap();
        assert!(filter
            .check(&decision("600000", Action::Wait, t0() + Duration::days(1)), next)
            .is_ok());
        assert_eq!(filter.count("600000"), 1);
    }
}
