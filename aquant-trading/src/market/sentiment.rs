//! Market-wide sentiment (情绪) scoring.
//!
//! # Score composition
//!
//! | Component                               | Weight |
//! |-----------------------------------------|--------|
//! | up ratio                                | 30     |
//! | limit balance (ups vs ups + downs)      | 25     |
//! | seal rate (1 - broken rate)             | 20     |
//! | ladder height (capped at 7 boards)      | 15     |
//! | average change (-3% .. +3%)             | 10     |
//!
//! An empty snapshot scores a neutral 50.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ladder::BoardLadder;
use crate::data::MarketSnapshot;
use crate::detector::ramp;

/// Streak height at which the ladder component saturates.
const LADDER_CAP: f64 = 7.0;

/// Neutral score for an empty market.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Aggregate market breadth and limit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSentiment {
    pub timestamp: DateTime<Utc>,
    pub total: usize,
    pub up_count: usize,
    pub down_count: usize,
    pub flat_count: usize,
    pub limit_up_count: usize,
    pub limit_down_count: usize,
    /// 炸板: touched limit-up, not sealed
    pub broken_board_count: usize,
    /// Broken boards over all stocks that touched limit-up
    pub broken_rate: f64,
    pub up_ratio: f64,
    pub avg_change_pct: f64,
    pub max_consecutive_boards: u32,
    pub total_amount: f64,
    /// 0-100
    pub score: f64,
}

impl MarketSentiment {
    /// Sentiment of an empty market.
    pub fn neutral(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            total: 0,
            up_count: 0,
            down_count: 0,
            flat_count: 0,
            limit_up_count: 0,
            limit_down_count: 0,
            broken_board_count: 0,
            broken_rate: 0.0,
            up_ratio: 0.0,
            avg_change_pct: 0.0,
            max_consecutive_boards: 0,
            total_amount: 0.0,
            score: NEUTRAL_SCORE,
        }
    }
}

impl Default for MarketSentiment {
    fn default() -> Self {
        Self::neutral(Utc::now())
    }
}

/// Computes [`MarketSentiment`] from a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, snapshot: &MarketSnapshot, ladder: &BoardLadder) -> MarketSentiment {
        let mut s = MarketSentiment::neutral(snapshot.timestamp);
        s.max_consecutive_boards = ladder.max_streak();

        if snapshot.is_empty() {
            return s;
        }

        let mut change_sum = 0.0;
        for tick in &snapshot.ticks {
            let change = tick.change_pct();
            change_sum += change;
            s.total_amount += tick.amount;

            if tick.price > tick.pre_close {
                s.up_count += 1;
            } else if tick.price < tick.pre_close {
                s.down_count += 1;
            } else {
                s.flat_count += 1;
            }

            if tick.is_limit_up() {
                s.limit_up_count += 1;
            } else if tick.is_broken_board() {
                s.broken_board_count += 1;
            }
            if tick.is_limit_down() {
                s.limit_down_count += 1;
            }
        }

        s.total = snapshot.len();
        s.up_ratio = s.up_count as f64 / s.total as f64;
        s.avg_change_pct = change_sum / s.total as f64;

        let touched = s.limit_up_count + s.broken_board_count;
        s.broken_rate = if touched > 0 {
            s.broken_board_count as f64 / touched as f64
        } else {
            0.0
        };

        let limits = s.limit_up_count + s.limit_down_count;
        let limit_balance = if limits > 0 {
            s.limit_up_count as f64 / limits as f64
        } else {
            0.5
        };
        let seal_rate = if touched > 0 { 1.0 - s.broken_rate } else { 0.5 };
        let ladder_height = (s.max_consecutive_boards as f64 / LADDER_CAP).min(1.0);

        s.score = 30.0 * s.up_ratio
            + 25.0 * limit_balance
            + 20.0 * seal_rate
            + 15.0 * ladder_height
            + 10.0 * ramp(s.avg_change_pct, -3.0, 3.0);

        s
    }
}
