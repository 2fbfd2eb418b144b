//! DDE large-order flow.
//!
//! The raw DDE figure is a net CNY amount; it is normalised against the
//! day's turnover so large and small caps compare on the same scale.

use serde::{Deserialize, Serialize};

use crate::data::Tick;

/// Net large-order flow as a percentage of today's turnover.
pub fn dde_ratio(tick: &Tick) -> Option<f64> {
    let net = tick.big_order_net?;
    if tick.amount > 0.0 {
        Some(net / tick.amount * 100.0)
    } else {
        None
    }
}

/// Coarse large-order flow classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DdeLevel {
    StrongInflow,
    Inflow,
    Neutral,
    Outflow,
    StrongOutflow,
}

impl DdeLevel {
    pub fn classify(ratio: f64) -> Self {
        if ratio >= 5.0 {
            Self::StrongInflow
        } else if ratio >= 1.0 {
            Self::Inflow
        } else if ratio <= -5.0 {
            Self::StrongOutflow
        } else if ratio <= -1.0 {
            Self::Outflow
        } else {
            Self::Neutral
        }
    }

    /// Level of a tick, if it carries DDE data.
    pub fn of(tick: &Tick) -> Option<Self> {
        dde_ratio(tick).map(Self::classify)
    }

    /// Supportiveness for a long entry, 0-100.
    pub fn score(&self) -> f64 {
        match self {
            Self::StrongInflow => 100.0,
            Self::Inflow => 75.0,
            Self::Neutral => 50.0,
            Self::Outflow => 25.0,
            Self::StrongOutflow => 0.0,
        }
    }
}

impl std::fmt::Display for DdeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongInflow => write!(f, "大幅流入"),
            Self::Inflow => write!(f, "流入"),
            Self::Neutral => write!(f, "中性"),
            Self::Outflow => write!(f, "流出"),
            Self::StrongOutflow => write!(f, "大幅流出"),
        }
    }
}

/// DDE contribution as a 0..1 factor; neutral when the tick has no DDE data.
pub(crate) fn dde_factor(tick: &Tick) -> f64 {
    DdeLevel::of(tick).map(|l| l.score() / 100.0).unwrap_or(0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_needs_amount() {
        let tick = Tick::new("600000", 10.0, 10.2).with_dde(5_000.0);
        assert!(dde_ratio(&tick).is_none());

        let tick = tick.with_volume(10_000.0, 100_000.0);
        assert!((dde_ratio(&tick).unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(DdeLevel::of(&tick), Some(DdeLevel::StrongInflow));
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(DdeLevel::classify(1.0), DdeLevel::Inflow);
        assert_eq!(DdeLevel::classify(0.99), DdeLevel::Neutral);
        assert_eq!(DdeLevel::classify(-1.0), DdeLevel::Outflow);
        assert_eq!(DdeLevel::classify(-5.0), DdeLevel::StrongOutflow);
        assert!(DdeLevel::Inflow.score() > DdeLevel::Outflow.score());
    }

    #[test]
    fn test_missing_dde_is_neutral() {
        let tick = Tick::new("600000", 10.0, 10.2).with_volume(1000.0, 10_100.0);
        assert_eq!(dde_factor(&tick), 0.5);
    }
}
