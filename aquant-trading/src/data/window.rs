//! Rolling windows over streaming quotes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{HashMap, VecDeque};

use super::{pct_change, Tick};

/// Bounded FIFO window; pushing past capacity evicts the oldest entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingWindow<T> {
    capacity: usize,
    buf: VecDeque<T>,
}

impl<T> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn first(&self) -> Option<&T> {
        self.buf.front()
    }

    pub fn last(&self) -> Option<&T> {
        self.buf.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.buf.iter()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl RollingWindow<f64> {
    pub fn mean(&self) -> Option<f64> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.iter().mean())
        }
    }

    /// Sample standard deviation (needs at least two values).
    pub fn std_dev(&self) -> Option<f64> {
        if self.buf.len() < 2 {
            None
        } else {
            Some(self.buf.iter().std_dev())
        }
    }

    pub fn max(&self) -> Option<f64> {
        if self.buf.is_empty() {
            None
        } else {
            Some(Statistics::max(self.buf.iter()))
        }
    }

    pub fn min(&self) -> Option<f64> {
        if self.buf.is_empty() {
            None
        } else {
            Some(Statistics::min(self.buf.iter()))
        }
    }

    /// Change from the oldest to the newest value, in percent.
    pub fn pct_change(&self) -> Option<f64> {
        match (self.buf.front(), self.buf.back()) {
            (Some(first), Some(last)) if self.buf.len() >= 2 => Some(pct_change(*first, *last)),
            _ => None,
        }
    }
}

/// One observation kept per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    /// Cumulative volume at this tick
    pub volume: f64,
}

/// Per-symbol bounded tick series shared by the detectors.
#[derive(Debug, Clone)]
pub struct TickHistory {
    capacity: usize,
    series: HashMap<String, RollingWindow<TickPoint>>,
}

impl TickHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            series: HashMap::new(),
        }
    }

    /// Record a tick. Stale repeats are ignored; a drop in cumulative volume
    /// means a new session started and the series restarts.
    pub fn record(&mut self, tick: &Tick) {
        let capacity = self.capacity;
        let window = self
            .series
            .entry(tick.symbol.clone())
            .or_insert_with(|| RollingWindow::new(capacity));

        if let Some(last) = window.last() {
            if tick.timestamp <= last.timestamp {
                return;
            }
            if tick.volume < last.volume {
                window.clear();
            }
        }

        window.push(TickPoint {
            timestamp: tick.timestamp,
            price: tick.price,
            volume: tick.volume,
        });
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.series.get(symbol).map(|w| w.len()).unwrap_or(0)
    }

    pub fn symbols(&self) -> usize {
        self.series.len()
    }

    pub fn prices(&self, symbol: &str) -> Vec<f64> {
        self.series
            .get(symbol)
            .map(|w| w.iter().map(|p| p.price).collect())
            .unwrap_or_default()
    }

    /// Volume traded between consecutive ticks.
    pub fn interval_volumes(&self, symbol: &str) -> Vec<f64> {
        let Some(window) = self.series.get(symbol) else {
            return Vec::new();
        };
        let points: Vec<&TickPoint> = window.iter().collect();
        points
            .windows(2)
            .map(|pair| (pair[1].volume - pair[0].volume).max(0.0))
            .collect()
    }

    /// Price change over the last `ticks` observations, in percent.
    pub fn momentum_pct(&self, symbol: &str, ticks: usize) -> Option<f64> {
        let window = self.series.get(symbol)?;
        if ticks == 0 || window.len() <= ticks {
            return None;
        }
        let last = window.last()?.price;
        let base = window.iter().rev().nth(ticks)?.price;
        Some(pct_change(base, last))
    }

    /// Highest price in the retained series.
    pub fn high(&self, symbol: &str) -> Option<f64> {
        self.series
            .get(symbol)?
            .iter()
            .map(|p| p.price)
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_window_eviction() {
        let mut w = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.push(v);
        }
        assert!(w.is_full());
        assert_eq!(w.first(), Some(&2.0));
        assert_eq!(w.last(), Some(&4.0));
        assert!((w.mean().unwrap() - 3.0).abs() < 1e-9);
        assert_eq!(w.max(), Some(4.0));
        assert_eq!(w.min(), Some(2.0));
        assert!((w.pct_change().unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_stats_on_empty() {
        let w: RollingWindow<f64> = RollingWindow::new(5);
        assert!(w.mean().is_none());
        assert!(w.std_dev().is_none());
        assert!(w.pct_change().is_none());
    }

    #[test]
    fn test_std_dev() {
        let mut w = RollingWindow::new(4);
        for v in [2.0, 4.0, 4.0, 6.0] {
            w.push(v);
        }
        // sample variance = 8/3
        assert!((w.std_dev().unwrap() - (8.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    fn tick_at(secs: i64, price: f64, volume: f64) -> Tick {
        let base = DateTime::parse_from_rfc3339("2024-05-10T01:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Tick::new("600000", 10.0, price)
            .with_volume(volume, volume * price)
            .at(base + Duration::seconds(secs))
    }

    #[test]
    fn test_history_interval_volumes_and_momentum() {
        let mut h = TickHistory::new(10);
        h.record(&tick_at(0, 10.0, 1000.0));
        h.record(&tick_at(3, 10.1, 1500.0));
        h.record(&tick_at(6, 10.2, 1700.0));
        h.record(&tick_at(9, 10.4, 2600.0));

        assert_eq!(h.len("600000"), 4);
        assert_eq!(h.interval_volumes("600000"), vec![500.0, 200.0, 900.0]);
        assert!((h.momentum_pct("600000", 3).unwrap() - 4.0).abs() < 1e-9);
        assert!(h.momentum_pct("600000", 4).is_none());
        assert_eq!(h.high("600000"), Some(10.4));
    }

    #[test]
    fn test_history_ignores_stale_and_resets_on_rollover() {
        let mut h = TickHistory::new(10);
        h.record(&tick_at(10, 10.0, 1000.0));
        h.record(&tick_at(10, 10.5, 1200.0));
        assert_eq!(h.len("600000"), 1);

        h.record(&tick_at(20, 10.1, 50.0));
        assert_eq!(h.len("600000"), 1);
        assert_eq!(h.prices("600000"), vec![10.1]);
    }
}
