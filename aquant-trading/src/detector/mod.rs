//! Intraday signal detectors.
//!
//! Each detector inspects one tick (plus its recent history) and returns a
//! [`DetectorSignal`]: a boolean trigger, a 0-100 score and the reasons
//! behind both. A detector never fails; missing inputs simply produce an
//! untriggered signal that says what was missing.

pub mod dde;
mod dip;
mod halfway;

pub use dde::{dde_ratio, DdeLevel};
pub use dip::{DipBuyConfig, DipBuyDetector};
pub use halfway::{HalfwayConfig, HalfwayDetector};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which setup a signal describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// 半路: buying into an intraday run before it seals
    HalfwayBreakout,
    /// 低吸: buying a pullback onto support in a strong stock
    DipBuy,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HalfwayBreakout => write!(f, "半路"),
            Self::DipBuy => write!(f, "低吸"),
        }
    }
}

/// Output of a single detector evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSignal {
    pub symbol: String,
    pub kind: SignalKind,
    /// All hard conditions passed and the score reached the threshold
    pub triggered: bool,
    /// Setup quality, 0-100
    pub score: f64,
    pub price: f64,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl DetectorSignal {
    pub(crate) fn new(symbol: &str, kind: SignalKind, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind,
            triggered: false,
            score: 0.0,
            price,
            reasons: Vec::new(),
            timestamp,
        }
    }
}

/// Linear 0..1 ramp of `value` between `lo` and `hi`.
pub(crate) fn ramp(value: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return if value >= hi { 1.0 } else { 0.0 };
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}
