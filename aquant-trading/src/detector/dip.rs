//! 低吸 (dip buy) detector.
//!
//! Buys a quiet pullback in a stock that has already proven strength.
//! Strength comes from the daily context: yesterday's limit-up close, a
//! short-term uptrend (close > MA5 > MA10), or membership of a hot sector.
//! The intraday part wants a real pullback from the high that settles on
//! a support level (VWAP or MA5) while volume dries up.
//!
//! Score weights: context 30, pullback depth 20, support proximity 20,
//! volume shrink 20, DDE 10.

use aquant_common::config::Config;
use serde::{Deserialize, Serialize};

use super::dde::{dde_factor, dde_ratio};
use super::{ramp, DetectorSignal, SignalKind};
use crate::data::{sma_close, Candle, Tick, TickHistory};

/// Ticks averaged as the "recent" volume when checking for shrinkage.
const RECENT_VOLUME_TICKS: usize = 3;

/// Dip-buy thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DipBuyConfig {
    /// Minimum pullback from the intraday high (%)
    pub min_pullback_pct: f64,
    pub min_change_pct: f64,
    pub max_change_pct: f64,
    /// Maximum distance from VWAP or MA5 (%)
    pub support_tolerance_pct: f64,
    /// Recent interval volume must be at most this fraction of the window mean
    pub shrink_ratio: f64,
    /// DDE ratio floor (% of turnover)
    pub max_dde_outflow_ratio: f64,
    pub min_score: f64,
}

impl Default for DipBuyConfig {
    fn default() -> Self {
        Self {
            min_pullback_pct: 3.0,
            min_change_pct: -6.0,
            max_change_pct: 3.0,
            support_tolerance_pct: 1.0,
            shrink_ratio: 0.8,
            max_dde_outflow_ratio: -5.0,
            min_score: 55.0,
        }
    }
}

impl DipBuyConfig {
    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        let d = Self::default();
        let s = &config.trading.dip;
        Self {
            min_pullback_pct: s.min_pullback_pct.unwrap_or(d.min_pullback_pct),
            min_change_pct: s.min_change_pct.unwrap_or(d.min_change_pct),
            max_change_pct: s.max_change_pct.unwrap_or(d.max_change_pct),
            support_tolerance_pct: s.support_tolerance_pct.unwrap_or(d.support_tolerance_pct),
            shrink_ratio: s.shrink_ratio.unwrap_or(d.shrink_ratio),
            max_dde_outflow_ratio: s.max_dde_outflow_ratio.unwrap_or(d.max_dde_outflow_ratio),
            min_score: s.min_score.unwrap_or(d.min_score),
        }
    }
}

/// Why a stock counts as strong.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Context {
    PreviousLimitUp,
    HotSector,
    Uptrend,
}

impl Context {
    fn strength(&self) -> f64 {
        match self {
            Self::PreviousLimitUp => 1.0,
            Self::HotSector => 0.8,
            Self::Uptrend => 0.7,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::PreviousLimitUp => "previous day limit-up",
            Self::HotSector => "hot sector",
            Self::Uptrend => "close > MA5 > MA10",
        }
    }
}

/// Dip-buy detector.
#[derive(Debug, Clone, Default)]
pub struct DipBuyDetector {
    config: DipBuyConfig,
}

impl DipBuyDetector {
    pub fn new(config: DipBuyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DipBuyConfig {
        &self.config
    }

    /// Strongest context that applies. `candles` must exclude today.
    fn context(&self, tick: &Tick, candles: &[Candle], hot_sector: bool) -> Option<Context> {
        let board = tick.board();
        if candles.last().is_some_and(|c| c.is_limit_up_close(board)) {
            return Some(Context::PreviousLimitUp);
        }
        if hot_sector {
            return Some(Context::HotSector);
        }
        match (sma_close(candles, 5), sma_close(candles, 10), candles.last()) {
            (Some(ma5), Some(ma10), Some(last)) if ma5 > ma10 && last.close > ma5 => {
                Some(Context::Uptrend)
            }
            _ => None,
        }
    }

    /// Evaluate a tick against its intraday history and daily candles.
    pub fn evaluate(
        &self,
        tick: &Tick,
        history: &TickHistory,
        candles: &[Candle],
        hot_sector: bool,
    ) -> DetectorSignal {
        let cfg = &self.config;
        let mut signal = DetectorSignal::new(&tick.symbol, SignalKind::DipBuy, tick.price, tick.timestamp);

        let today = tick.trade_date();
        let past: Vec<Candle> = candles.iter().filter(|c| c.date < today).cloned().collect();

        let Some(context) = self.context(tick, &past, hot_sector) else {
            signal.reasons.push("no strength context".into());
            return signal;
        };

        let mut blocked = Vec::new();

        let high = history
            .high(&tick.symbol)
            .map_or(tick.high, |h| h.max(tick.high));
        let pullback = if high > 0.0 {
            (high - tick.price) / high * 100.0
        } else {
            0.0
        };
        if pullback < cfg.min_pullback_pct {
            blocked.push(format!(
                "pullback {:.2}% below {:.1}%",
                pullback, cfg.min_pullback_pct
            ));
        }

        let change = tick.change_pct();
        if change < cfg.min_change_pct || change > cfg.max_change_pct {
            blocked.push(format!(
                "change {:.2}% outside [{:.1}%, {:.1}%]",
                change, cfg.min_change_pct, cfg.max_change_pct
            ));
        }

        // Nearest support among VWAP and MA5.
        let mut supports = vec![("VWAP", tick.vwap())];
        if let Some(ma5) = sma_close(&past, 5) {
            supports.push(("MA5", ma5));
        }
        let (support_name, support_distance) = supports
            .iter()
            .map(|(name, level)| (*name, ((tick.price - level) / level * 100.0).abs()))
            .fold(("VWAP", f64::MAX), |best, cur| if cur.1 < best.1 { cur } else { best });
        if support_distance > cfg.support_tolerance_pct {
            blocked.push(format!(
                "{:.2}% away from nearest support ({})",
                support_distance, support_name
            ));
        }

        let volumes = history.interval_volumes(&tick.symbol);
        let shrink = if volumes.len() > RECENT_VOLUME_TICKS {
            let window_mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
            let recent = &volumes[volumes.len() - RECENT_VOLUME_TICKS..];
            let recent_mean = recent.iter().sum::<f64>() / RECENT_VOLUME_TICKS as f64;
            if window_mean > 0.0 {
                Some(recent_mean / window_mean)
            } else {
                None
            }
        } else {
            None
        };
        match shrink {
            None => blocked.push("insufficient history for volume check".into()),
            Some(ratio) if ratio > cfg.shrink_ratio => blocked.push(format!(
                "volume not shrinking ({:.2} > {:.2})",
                ratio, cfg.shrink_ratio
            )),
            Some(_) => {}
        }

        if let Some(ratio) = dde_ratio(tick) {
            if ratio < cfg.max_dde_outflow_ratio {
                blocked.push(format!("large-order outflow {:.2}% of turnover", ratio));
            }
        }

        let pullback_score = ramp(pullback, 0.0, cfg.min_pullback_pct * 2.0);
        let support_score =
            (1.0 - support_distance / cfg.support_tolerance_pct.max(f64::EPSILON)).clamp(0.0, 1.0);
        let shrink_score = shrink
            .filter(|r| *r <= cfg.shrink_ratio)
            .map(|r| 1.0 - 0.5 * r / cfg.shrink_ratio.max(f64::EPSILON))
            .unwrap_or(0.0);

        signal.score = 30.0 * context.strength()
            + 20.0 * pullback_score
            + 20.0 * support_score
            + 20.0 * shrink_score
            + 10.0 * dde_factor(tick);

        if !blocked.is_empty() {
            signal.reasons = blocked;
            return signal;
        }

        signal.reasons.push(context.describe().to_string());
        signal
            .reasons
            .push(format!("pulled back {:.2}% from {:.2}", pullback, high));
        signal.reasons.push(format!(
            "{:.2}% from {} support",
            support_distance, support_name
        ));
        if let Some(ratio) = shrink {
            signal.reasons.push(format!("volume shrinking to {:.0}%", ratio * 100.0));
        }

        if signal.score >= cfg.min_score {
            signal.triggered = true;
        } else {
            signal
                .reasons
                .push(format!("score {:.1} below {:.0}", signal.score, cfg.min_score));
        }

        signal
    }
}
