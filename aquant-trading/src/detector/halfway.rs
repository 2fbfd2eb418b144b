//! 半路 (halfway) breakout detector.
//!
//! Looks for a stock running up intraday on expanding volume that is
//! already well into its daily range but not yet sealed at limit-up.
//!
//! # Hard conditions
//!
//! - Not an ST stock and not already at limit-up
//! - Today's change sits inside a band expressed as a fraction of the
//!   board limit (so 3%-7.5% on the main board, 6%-15% on ChiNext)
//! - Volume ratio (量比) high enough, price above VWAP plus a premium
//! - Short-term momentum over the last few ticks
//! - Enough room left to the limit-up price, no oversized gap open
//! - Before the afternoon cutoff time
//!
//! # Score
//!
//! | Component     | Weight |
//! |---------------|--------|
//! | band position | 25     |
//! | volume ratio  | 25     |
//! | momentum      | 25     |
//! | VWAP premium  | 15     |
//! | DDE flow      | 10     |

use aquant_common::config::Config;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::dde::dde_factor;
use super::{ramp, DetectorSignal, SignalKind};
use crate::data::{parse_hhmm, pct_change, Board, Tick, TickHistory};

/// Halfway breakout thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HalfwayConfig {
    /// Lower edge of the change band, as a fraction of the board limit
    pub min_band_fraction: f64,
    /// Upper edge of the change band, as a fraction of the board limit
    pub max_band_fraction: f64,
    pub min_volume_ratio: f64,
    /// Required premium over VWAP (%)
    pub vwap_premium_pct: f64,
    /// Lookback for momentum, in ticks
    pub momentum_ticks: usize,
    pub min_momentum_pct: f64,
    pub min_room_to_limit_pct: f64,
    pub max_gap_pct: f64,
    /// No new triggers after this exchange time
    pub latest_time: NaiveTime,
    pub min_score: f64,
}

fn default_latest_time() -> NaiveTime {
    NaiveTime::from_hms_opt(14, 30, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for HalfwayConfig {
    fn default() -> Self {
        Self {
            min_band_fraction: 0.3,
            max_band_fraction: 0.75,
            min_volume_ratio: 1.8,
            vwap_premium_pct: 0.5,
            momentum_ticks: 5,
            min_momentum_pct: 1.0,
            min_room_to_limit_pct: 1.5,
            max_gap_pct: 5.0,
            latest_time: default_latest_time(),
            min_score: 60.0,
        }
    }
}

impl HalfwayConfig {
    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        let d = Self::default();
        let h = &config.trading.halfway;
        Self {
            min_band_fraction: h.min_band_fraction.unwrap_or(d.min_band_fraction),
            max_band_fraction: h.max_band_fraction.unwrap_or(d.max_band_fraction),
            min_volume_ratio: h.min_volume_ratio.unwrap_or(d.min_volume_ratio),
            vwap_premium_pct: h.vwap_premium_pct.unwrap_or(d.vwap_premium_pct),
            momentum_ticks: h.momentum_ticks.unwrap_or(d.momentum_ticks),
            min_momentum_pct: h.min_momentum_pct.unwrap_or(d.min_momentum_pct),
            min_room_to_limit_pct: h.min_room_to_limit_pct.unwrap_or(d.min_room_to_limit_pct),
            max_gap_pct: h.max_gap_pct.unwrap_or(d.max_gap_pct),
            latest_time: parse_hhmm(h.latest_time.as_deref(), d.latest_time),
            min_score: h.min_score.unwrap_or(d.min_score),
        }
    }
}

/// Halfway breakout detector.
#[derive(Debug, Clone, Default)]
pub struct HalfwayDetector {
    config: HalfwayConfig,
}

impl HalfwayDetector {
    pub fn new(config: HalfwayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HalfwayConfig {
        &self.config
    }

    /// Evaluate a tick. `history` should already contain the tick.
    pub fn evaluate(&self, tick: &Tick, history: &TickHistory) -> DetectorSignal {
        let cfg = &self.config;
        let mut signal =
            DetectorSignal::new(&tick.symbol, SignalKind::HalfwayBreakout, tick.price, tick.timestamp);

        let board = tick.board();
        if board == Board::St {
            signal.reasons.push("ST stock excluded".into());
            return signal;
        }
        if tick.is_limit_up() {
            signal.reasons.push("already sealed at limit-up".into());
            return signal;
        }

        let mut blocked = Vec::new();

        let limit = board.limit_pct();
        let change = tick.change_pct();
        let band_fraction = change / limit;
        if band_fraction < cfg.min_band_fraction || band_fraction > cfg.max_band_fraction {
            blocked.push(format!(
                "change {:.2}% outside band [{:.1}%, {:.1}%]",
                change,
                cfg.min_band_fraction * limit,
                cfg.max_band_fraction * limit
            ));
        }

        let vwap = tick.vwap();
        let premium = pct_change(vwap, tick.price);
        if premium < cfg.vwap_premium_pct {
            blocked.push(format!(
                "price {:.2} not above VWAP {:.2} by {:.1}%",
                tick.price, vwap, cfg.vwap_premium_pct
            ));
        }

        if tick.exchange_time() > cfg.latest_time {
            blocked.push(format!("after cutoff {}", cfg.latest_time.format("%H:%M")));
        }

        let momentum = history.momentum_pct(&tick.symbol, cfg.momentum_ticks);
        match momentum {
            None => blocked.push(format!(
                "insufficient history ({} ticks, need {})",
                history.len(&tick.symbol),
                cfg.momentum_ticks + 1
            )),
            Some(m) if m < cfg.min_momentum_pct => {
                blocked.push(format!("momentum {:.2}% below {:.1}%", m, cfg.min_momentum_pct))
            }
            Some(_) => {}
        }

        let volume_ratio = tick.volume_ratio.unwrap_or(0.0);
        if volume_ratio < cfg.min_volume_ratio {
            blocked.push(format!(
                "volume ratio {:.2} below {:.1}",
                volume_ratio, cfg.min_volume_ratio
            ));
        }

        let room = tick.room_to_limit_up_pct();
        if room < cfg.min_room_to_limit_pct {
            blocked.push(format!("only {:.2}% room to limit-up", room));
        }

        let gap = tick.gap_pct();
        if gap > cfg.max_gap_pct {
            blocked.push(format!("gap open {:.2}% too high", gap));
        }

        // Score is reported even when blocked so the journal shows how close it came.
        let band_center = (cfg.min_band_fraction + cfg.max_band_fraction) / 2.0;
        let half_width = ((cfg.max_band_fraction - cfg.min_band_fraction) / 2.0).max(f64::EPSILON);
        let band_score = (1.0 - (band_fraction - band_center).abs() / half_width).clamp(0.0, 1.0);
        let volume_score = ramp(volume_ratio, 1.0, 3.0);
        let momentum_score = momentum
            .map(|m| ramp(m, 0.0, cfg.min_momentum_pct * 2.0))
            .unwrap_or(0.0);
        let vwap_score = ramp(premium, 0.0, 3.0);

        signal.score = 25.0 * band_score
            + 25.0 * volume_score
            + 25.0 * momentum_score
            + 15.0 * vwap_score
            + 10.0 * dde_factor(tick);

        if !blocked.is_empty() {
            signal.reasons = blocked;
            return signal;
        }

        signal.reasons.push(format!(
            "change {:.2}% ({:.0}% of {} limit)",
            change,
            band_fraction * 100.0,
            board
        ));
        signal.reasons.push(format!("volume ratio {:.2}", volume_ratio));
        if let Some(m) = momentum {
            signal
                .reasons
                .push(format!("momentum {:.2}% over {} ticks", m, cfg.momentum_ticks));
        }
        signal.reasons.push(format!("{:.2}% above VWAP", premium));

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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    /// 10:00 on the exchange clock.
    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-10T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn running_tick(symbol: &str, price: f64, secs: i64) -> Tick {
        Tick::new(symbol, 10.0, price)
            .with_ohlc(10.0, price, 9.95)
            .with_volume(100_000.0 + secs as f64 * 1000.0, (100_000.0 + secs as f64 * 1000.0) * 10.3)
            .with_volume_ratio(2.5)
            .at(base_time() + Duration::seconds(secs))
    }

    fn history_for(symbol: &str, prices: &[f64]) -> (TickHistory, Tick) {
        let mut history = TickHistory::new(30);
        let mut last = None;
        for (i, p) in prices.iter().enumerate() {
            let tick = running_tick(symbol, *p, i as i64 * 3);
            history.record(&tick);
            last = Some(tick);
        }
        (history, last.unwrap())
    }

    #[test]
    fn test_triggers_on_clean_run() {
        let detector = HalfwayDetector::default();
        let (history, tick) = history_for("600000", &[10.20, 10.25, 10.30, 10.38, 10.45, 10.50]);

        let signal = detector.evaluate(&tick, &history);
        assert!(signal.triggered, "reasons: {:?}", signal.reasons);
        assert!(signal.score >= 60.0);
        assert_eq!(signal.kind, SignalKind::HalfwayBreakout);
    }

    #[test]
    fn test_insufficient_history_blocks() {
        let detector = HalfwayDetector::default();
        let (history, tick) = history_for("600000", &[10.40, 10.50]);

        let signal = detector.evaluate(&tick, &history);
        assert!(!signal.triggered);
        assert!(signal.reasons.iter().any(|r| r.contains("insufficient history")));
    }

    #[test]
    fn test_st_and_limit_up_are_excluded() {
        let detector = HalfwayDetector::default();
        let (history, tick) = history_for("600000", &[10.20, 10.25, 10.30, 10.38, 10.45, 10.50]);

        let st = tick.clone().with_name("ST测试");
        let signal = detector.evaluate(&st, &history);
        assert!(!signal.triggered);
        assert_eq!(signal.score, 0.0);

        let mut sealed = tick;
        sealed.price = 11.0;
        let signal = detector.evaluate(&sealed, &history);
        assert!(!signal.triggered);
        assert!(signal.reasons[0].contains("limit-up"));
    }

    #[test]
    fn test_band_scales_with_board() {
        let detector = HalfwayDetector::default();
        // +5% is below the ChiNext band (6%-15%)
        let (history, tick) = history_for("300001", &[10.20, 10.25, 10.30, 10.38, 10.45, 10.50]);
        let signal = detector.evaluate(&tick, &history);
        assert!(!signal.triggered);
        assert!(signal.reasons.iter().any(|r| r.contains("outside band")));
    }

    #[test]
    fn test_cutoff_time() {
        let detector = HalfwayDetector::default();
        let (history, tick) = history_for("600000", &[10.20, 10.25, 10.30, 10.38, 10.45, 10.50]);
        // 14:45 exchange time
        let late = tick.at(base_time() + Duration::minutes(285));
        let signal = detector.evaluate(&late, &history);
        assert!(!signal.triggered);
        assert!(signal.reasons.iter().any(|r| r.contains("cutoff")));
    }

    #[test]
    fn test_below_vwap_blocks() {
        let detector = HalfwayDetector::default();
        let (history, mut tick) = history_for("600000", &[10.20, 10.25, 10.30, 10.38, 10.45, 10.50]);
        tick.amount = tick.volume * 10.55;
        let signal = detector.evaluate(&tick, &history);
        assert!(!signal.triggered);
        assert!(signal.reasons.iter().any(|r| r.contains("VWAP")));
    }

    #[test]
    fn test_from_config_overrides() {
        let mut config = Config::default();
        config.trading.halfway.min_score = Some(80.0);
        config.trading.halfway.latest_time = Some("14:00".into());
        let cfg = HalfwayConfig::from_config(&config);
        assert_eq!(cfg.min_score, 80.0);
        assert_eq!(cfg.latest_time, NaiveTime::from_hms_opt(14, 0, 0).unwrap());
        assert_eq!(cfg.min_volume_ratio, 1.8);
    }

    #[test]
    fn test_configured_room_and_premium_gate_the_run() {
        let (history, tick) = history_for("600000", &[10.20, 10.25, 10.30, 10.38, 10.45, 10.50]);

        // 4.76% left to the limit, 1.94% over VWAP
        let mut config = Config::default();
        config.trading.halfway.min_room_to_limit_pct = Some(6.0);
        let signal = HalfwayDetector::new(HalfwayConfig::from_config(&config)).evaluate(&tick, &history);
        assert!(!signal.triggered);
        assert!(signal.reasons.iter().any(|r| r.contains("room to limit-up")));

        let mut config = Config::default();
        config.trading.halfway.vwap_premium_pct = Some(3.0);
        let signal = HalfwayDetector::new(HalfwayConfig::from_config(&config)).evaluate(&tick, &history);
        assert!(!signal.triggered);
        assert!(signal.reasons.iter().any(|r| r.contains("VWAP")));
    }
}
