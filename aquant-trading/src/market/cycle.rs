//! 情绪周期: short-term market cycle.
//!
//! Daily sentiment scores are classified into five phases. The first
//! matching rule wins:
//!
//! 1. score ≤ `ice_threshold` → Ice
//! 2. score ≥ `climax_threshold` → Climax
//! 3. previous phase Climax/Fermentation and the score fell at least
//!    `ebb_drop` below the recent peak → Ebb
//! 4. previous phase Ice/Ebb and the score is rising → Recovery
//! 5. score ≥ `ferment_threshold` and rising → Fermentation
//! 6. otherwise the previous phase holds

use aquant_common::config::Config;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::RollingWindow;

/// Days of committed scores kept.
const HISTORY_DAYS: usize = 20;
/// Days looked back when finding the recent peak.
const PEAK_LOOKBACK: usize = 5;

/// Market cycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPhase {
    Ice,
    Recovery,
    Fermentation,
    Climax,
    Ebb,
}

impl MarketPhase {
    /// Position size multiplier for the phase.
    pub fn position_multiplier(&self) -> f64 {
        match self {
            Self::Ice => 0.2,
            Self::Recovery => 0.6,
            Self::Fermentation => 1.0,
            Self::Climax => 0.7,
            Self::Ebb => 0.3,
        }
    }

    /// Phases where opening new positions is discouraged.
    pub fn is_cold(&self) -> bool {
        matches!(self, Self::Ice | Self::Ebb)
    }
}

impl std::fmt::Display for MarketPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ice => write!(f, "冰点"),
            Self::Recovery => write!(f, "修复"),
            Self::Fermentation => write!(f, "发酵"),
            Self::Climax => write!(f, "高潮"),
            Self::Ebb => write!(f, "退潮"),
        }
    }
}

/// Cycle thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    pub ice_threshold: f64,
    pub ferment_threshold: f64,
    pub climax_threshold: f64,
    /// Drop from the recent peak that marks an ebb
    pub ebb_drop: f64,
    /// Allow new positions during Ice/Ebb
    pub aggressive: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            ice_threshold: 25.0,
            ferment_threshold: 55.0,
            climax_threshold: 80.0,
            ebb_drop: 15.0,
            aggressive: false,
        }
    }
}

impl CycleConfig {
    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        let d = Self::default();
        let c = &config.trading.cycle;
        Self {
            ice_threshold: c.ice_threshold.unwrap_or(d.ice_threshold),
            ferment_threshold: c.ferment_threshold.unwrap_or(d.ferment_threshold),
            climax_threshold: c.climax_threshold.unwrap_or(d.climax_threshold),
            ebb_drop: c.ebb_drop.unwrap_or(d.ebb_drop),
            aggressive: c.aggressive.unwrap_or(d.aggressive),
        }
    }
}

/// A committed trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyScore {
    pub date: NaiveDate,
    pub score: f64,
    pub phase: MarketPhase,
}

/// Tracks the cycle phase across days.
#[derive(Debug, Clone)]
pub struct CycleManager {
    config: CycleConfig,
    history: RollingWindow<DailyScore>,
    phase: MarketPhase,
    intraday: Option<MarketPhase>,
}

impl Default for CycleManager {
    fn default() -> Self {
        Self::new(CycleConfig::default())
    }
}

impl CycleManager {
    pub fn new(config: CycleConfig) -> Self {
        Self {
            config,
            history: RollingWindow::new(HISTORY_DAYS),
            phase: MarketPhase::Recovery,
            intraday: None,
        }
    }

    fn classify(&self, score: f64) -> MarketPhase {
        let cfg = &self.config;
        let prev_score = self.history.last().map(|d| d.score);
        let rising = prev_score.is_some_and(|p| score > p);
        let peak = self
            .history
            .iter()
            .rev()
            .take(PEAK_LOOKBACK)
            .map(|d| d.score)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));

        if score <= cfg.ice_threshold {
            MarketPhase::Ice
        } else if score >= cfg.climax_threshold {
            MarketPhase::Climax
        } else if matches!(self.phase, MarketPhase::Climax | MarketPhase::Fermentation)
            && peak.is_some_and(|p| p - score >= cfg.ebb_drop)
        {
            MarketPhase::Ebb
        } else if self.phase.is_cold() && rising {
            MarketPhase::Recovery
        } else if score >= cfg.ferment_threshold && rising {
            MarketPhase::Fermentation
        } else {
            self.phase
        }
    }

    /// Provisional phase for an intraday score. History is not touched.
    pub fn update_intraday(&mut self, score: f64) -> MarketPhase {
        let phase = self.classify(score);
        self.intraday = Some(phase);
        phase
    }

    /// Commit the closing score of a day. A date already committed is ignored.
    pub fn commit_day(&mut self, date: NaiveDate, score: f64) -> MarketPhase {
        if self.history.last().is_some_and(|d| d.date >= date) {
            return self.phase;
        }

        let phase = self.classify(score);
        if phase != self.phase {
            info!(date = %date, score, from = %self.phase, to = %phase, "Market phase changed");
        }
        self.history.push(DailyScore { date, score, phase });
        self.phase = phase;
        self.intraday = None;
        phase
    }

    /// Intraday phase when one was computed today, otherwise the committed phase.
    pub fn phase(&self) -> MarketPhase {
        self.intraday.unwrap_or(self.phase)
    }

    pub fn committed_phase(&self) -> MarketPhase {
        self.phase
    }

    pub fn position_multiplier(&self) -> f64 {
        self.phase().position_multiplier()
    }

    pub fn allows_new_positions(&self) -> bool {
        self.config.aggressive || !self.phase().is_cold()
    }

    pub fn history(&self) -> Vec<DailyScore> {
        self.history.iter().copied().collect()
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_full_cycle() {
        let mut cycle = CycleManager::default();
        assert_eq!(cycle.commit_day(day(1), 20.0), MarketPhase::Ice);
        assert!(!cycle.allows_new_positions());
        assert_eq!(cycle.commit_day(day(2), 35.0), MarketPhase::Recovery);
        assert_eq!(cycle.commit_day(day(3), 60.0), MarketPhase::Fermentation);
        assert_eq!(cycle.commit_day(day(6), 85.0), MarketPhase::Climax);
        assert_eq!(cycle.commit_day(day(7), 68.0), MarketPhase::Ebb);
        assert!((cycle.position_multiplier() - 0.3).abs() < 1e-9);
        assert_eq!(cycle.commit_day(day(8), 72.0), MarketPhase::Recovery);
    }

    #[test]
    fn test_flat_scores_keep_phase() {
        let mut cycle = CycleManager::default();
        cycle.commit_day(day(1), 60.0);
        assert_eq!(cycle.committed_phase(), MarketPhase::Recovery);
        // Not rising: stays put
        assert_eq!(cycle.commit_day(day(2), 58.0), MarketPhase::Recovery);
    }

    #[test]
    fn test_intraday_is_provisional() {
        let mut cycle = CycleManager::default();
        cycle.commit_day(day(1), 50.0);

        assert_eq!(cycle.update_intraday(15.0), MarketPhase::Ice);
        assert_eq!(cycle.phase(), MarketPhase::Ice);
        assert_eq!(cycle.committed_phase(), MarketPhase::Recovery);
        assert_eq!(cycle.history().len(), 1);

        // Committing clears the provisional phase
        cycle.commit_day(day(2), 58.0);
        assert_eq!(cycle.phase(), MarketPhase::Fermentation);
    }

    #[test]
    fn test_same_day_commit_ignored() {
        let mut cycle = CycleManager::default();
        cycle.commit_day(day(1), 20.0);
        assert_eq!(cycle.commit_day(day(1), 90.0), MarketPhase::Ice);
        assert_eq!(cycle.history().len(), 1);
    }

    #[test]
    fn test_aggressive_allows_cold_entries() {
        let mut cycle = CycleManager::new(CycleConfig {
            aggressive: true,
            ..CycleConfig::default()
        });
        cycle.commit_day(day(1), 10.0);
        assert_eq!(cycle.phase(), MarketPhase::Ice);
        assert!(cycle.allows_new_positions());
    }
}
