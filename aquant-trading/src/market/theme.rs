//! Theme (题材) heat ranking, dragon stocks and rotation.
//!
//! Heat per sector, 0-100:
//!
//! - limit-up count relative to the hottest sector (40)
//! - average change, 0% .. +5% (30)
//! - share of the whole snapshot's turnover (20)
//! - breadth, fraction of members up (10)

use aquant_common::config::Config;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use super::ladder::BoardLadder;
use crate::data::{MarketSnapshot, Tick};
use crate::detector::ramp;

/// Theme tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Sectors considered "top" for rotation and hotness
    pub top_n: usize,
    /// Minimum heat for a top sector to count as hot
    pub hot_threshold: f64,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            hot_threshold: 50.0,
        }
    }
}

impl ThemeConfig {
    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        let d = Self::default();
        let t = &config.trading.theme;
        Self {
            top_n: t.top_n.unwrap_or(d.top_n),
            hot_threshold: t.hot_threshold.unwrap_or(d.hot_threshold),
        }
    }
}

/// 龙头: leader of a sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragonStock {
    pub symbol: String,
    pub name: String,
    pub streak: u32,
    /// First time today the stock was seen sealed at limit-up
    pub first_seal: Option<DateTime<Utc>>,
    pub change_pct: f64,
}

/// Heat of one sector in one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorHeat {
    pub sector: String,
    pub members: usize,
    pub limit_up_count: usize,
    pub up_count: usize,
    pub avg_change_pct: f64,
    pub amount: f64,
    /// Fraction of the whole snapshot's turnover, sectorless ticks included
    pub amount_share: f64,
    pub heat: f64,
    pub dragon: Option<DragonStock>,
}

/// Top-N membership change between two rankings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationReport {
    pub entered: Vec<String>,
    pub exited: Vec<String>,
    pub persisted: Vec<String>,
}

impl RotationReport {
    pub fn has_rotation(&self) -> bool {
        !self.entered.is_empty() || !self.exited.is_empty()
    }
}

/// Ranks sectors and remembers enough state for rotation and dragon lookups.
#[derive(Debug, Clone, Default)]
pub struct ThemeTracker {
    config: ThemeConfig,
    current: Vec<SectorHeat>,
    previous_top: Option<Vec<String>>,
    first_seal: HashMap<String, DateTime<Utc>>,
    seal_date: Option<NaiveDate>,
}

#[derive(Default)]
struct Bucket<'a> {
    ticks: Vec<&'a Tick>,
    limit_ups: usize,
    ups: usize,
    change_sum: f64,
    amount: f64,
}

impl ThemeTracker {
    pub fn new(config: ThemeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ThemeConfig {
        &self.config
    }

    fn note_seals(&mut self, snapshot: &MarketSnapshot) {
        let date = snapshot.trade_date();
        if self.seal_date != Some(date) {
            self.first_seal.clear();
            self.seal_date = Some(date);
        }
        for tick in snapshot.ticks.iter().filter(|t| t.is_limit_up()) {
            self.first_seal
                .entry(tick.symbol.clone())
                .or_insert(tick.timestamp);
        }
    }

    fn pick_dragon(&self, ticks: &[&Tick], ladder: &BoardLadder) -> Option<DragonStock> {
        let candidates = ticks.iter().map(|t| DragonStock {
            symbol: t.symbol.clone(),
            name: t.name.clone(),
            streak: ladder.streak(&t.symbol),
            first_seal: self.first_seal.get(&t.symbol).copied(),
            change_pct: t.change_pct(),
        });

        candidates.min_by(|a, b| {
            b.streak
                .cmp(&a.streak)
                .then_with(|| match (a.first_seal, b.first_seal) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
                .then_with(|| {
                    b.change_pct
                        .partial_cmp(&a.change_pct)
                        .unwrap_or(Ordering::Equal)
                })
        })
    }

    /// Rank sectors by heat, hottest first. Ticks without a sector are ignored.
    pub fn rank(&mut self, snapshot: &MarketSnapshot, ladder: &BoardLadder) -> Vec<SectorHeat> {
        self.note_seals(snapshot);

        let mut buckets: BTreeMap<&str, Bucket> = BTreeMap::new();
        for tick in &snapshot.ticks {
            let Some(sector) = tick.sector.as_deref() else {
                continue;
            };
            let bucket = buckets.entry(sector).or_default();
            bucket.ticks.push(tick);
            bucket.change_sum += tick.change_pct();
            bucket.amount += tick.amount;
            if tick.price > tick.pre_close {
                bucket.ups += 1;
            }
            if tick.is_limit_up() {
                bucket.limit_ups += 1;
            }
        }

        let total_amount: f64 = snapshot.ticks.iter().map(|t| t.amount).sum();
        let max_limit_ups = buckets.values().map(|b| b.limit_ups).max().unwrap_or(0);

        let mut ranked: Vec<SectorHeat> = buckets
            .iter()
            .map(|(sector, b)| {
                let members = b.ticks.len();
                let avg_change = b.change_sum / members as f64;
                let limit_factor = if max_limit_ups > 0 {
                    b.limit_ups as f64 / max_limit_ups as f64
                } else {
                    0.0
                };
                let amount_share = if total_amount > 0.0 { b.amount / total_amount } else { 0.0 };
                let breadth = b.ups as f64 / members as f64;

                let heat = 40.0 * limit_factor
                    + 30.0 * ramp(avg_change, 0.0, 5.0)
                    + 20.0 * amount_share
                    + 10.0 * breadth;

                SectorHeat {
                    sector: sector.to_string(),
                    members,
                    limit_up_count: b.limit_ups,
                    up_count: b.ups,
                    avg_change_pct: avg_change,
                    amount: b.amount,
                    amount_share,
                    heat,
                    dragon: self.pick_dragon(&b.ticks, ladder),
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.heat
                .partial_cmp(&a.heat)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.sector.cmp(&b.sector))
        });

        debug!(
            sectors = ranked.len(),
            top = ranked.first().map(|s| s.sector.as_str()).unwrap_or("-"),
            "Sectors ranked"
        );

        self.current = ranked.clone();
        ranked
    }

    /// Sectors of the latest ranking.
    pub fn current(&self) -> &[SectorHeat] {
        &self.current
    }

    /// Leader of a sector in the latest ranking.
    pub fn dragon(&self, sector: &str) -> Option<&DragonStock> {
        self.current
            .iter()
            .find(|s| s.sector == sector)
            .and_then(|s| s.dragon.as_ref())
    }

    /// Compare the top-N of `ranked` with the top-N of the previous call.
    /// The first call reports every top sector as entered.
    pub fn detect_rotation(&mut self, ranked: &[SectorHeat]) -> RotationReport {
        let top: Vec<String> = ranked
            .iter()
            .take(self.config.top_n)
            .map(|s| s.sector.clone())
            .collect();
        let previous: HashSet<String> = self
            .previous_top
            .as_ref()
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default();
        let current: HashSet<&String> = top.iter().collect();

        let report = RotationReport {
            entered: top.iter().filter(|s| !previous.contains(*s)).cloned().collect(),
            exited: self
                .previous_top
                .iter()
                .flatten()
                .filter(|s| !current.contains(s))
                .cloned()
                .collect(),
            persisted: top.iter().filter(|s| previous.contains(*s)).cloned().collect(),
        };

        self.previous_top = Some(top);
        report
    }

    /// Sector is in the current top-N with heat at or above the hot threshold.
    pub fn is_hot(&self, sector: &str) -> bool {
        self.current
            .iter()
            .take(self.config.top_n)
            .any(|s| s.sector == sector && s.heat >= self.config.hot_threshold)
    }

    /// Hot sectors of the latest ranking, hottest first.
    pub fn hot_sectors(&self) -> Vec<String> {
        self.current
            .iter()
            .take(self.config.top_n)
            .filter(|s| s.heat >= self.config.hot_threshold)
            .map(|s| s.sector.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tick(symbol: &str, sector: &str, price: f64, amount: f64) -> Tick {
        Tick::new(symbol, 10.0, price)
            .with_sector(sector)
            .with_volume(amount / price, amount)
    }

    fn market(at: DateTime<Utc>) -> MarketSnapshot {
        MarketSnapshot::new(
            at,
            vec![
                tick("600001", "半导体", 11.0, 5e8).at(at),
                tick("600002", "半导体", 11.0, 3e8).at(at),
                tick("600003", "半导体", 10.6, 2e8).at(at),
                tick("600011", "白酒", 10.1, 1e8).at(at),
                tick("600012", "白酒", 9.9, 1e8).at(at),
                tick("600021", "地产", 9.5, 5e7).at(at),
                Tick::new("600099", 10.0, 10.5).at(at),
            ],
        )
    }

    #[test]
    fn test_rank_orders_by_heat() {
        let mut tracker = ThemeTracker::default();
        let ranked = tracker.rank(&market(Utc::now()), &BoardLadder::new());

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].sector, "半导体");
        assert_eq!(ranked[0].limit_up_count, 2);
        assert_eq!(ranked[2].sector, "地产");
        let share: f64 = ranked.iter().map(|s| s.amount_share).sum();
        assert!((share - 1.0).abs() < 1e-9);

        assert!(tracker.is_hot("半导体"));
        assert!(!tracker.is_hot("地产"));
        assert_eq!(tracker.hot_sectors(), vec!["半导体".to_string()]);
    }

    #[test]
    fn test_amount_share_counts_whole_snapshot() {
        let at = Utc::now();
        let snapshot = MarketSnapshot::new(
            at,
            vec![
                tick("600011", "白酒", 10.1, 1e8).at(at),
                Tick::new("600099", 10.0, 10.0)
                    .with_volume(3e8 / 10.0, 3e8)
                    .at(at),
            ],
        );
        let mut tracker = ThemeTracker::default();
        let ranked = tracker.rank(&snapshot, &BoardLadder::new());

        // The only sector holds a quarter of turnover, not all of it
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].amount_share - 0.25).abs() < 1e-9);
        // breadth 10 + change ramp 30 * 0.2 + amount 20 * 0.25
        assert!((ranked[0].heat - 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_dragon_prefers_streak_then_earliest_seal() {
        let mut tracker = ThemeTracker::default();
        let t0 = DateTime::parse_from_rfc3339("2024-05-10T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        // 600002 seals first
        let early = MarketSnapshot::new(
            t0,
            vec![
                tick("600001", "半导体", 10.8, 1e8).at(t0),
                tick("600002", "半导体", 11.0, 1e8).at(t0),
            ],
        );
        tracker.rank(&early, &BoardLadder::new());
        tracker.rank(&market(t0 + Duration::seconds(30)), &BoardLadder::new());
        assert_eq!(tracker.dragon("半导体").unwrap().symbol, "600002");

        // A longer streak wins regardless of seal time
        let mut ladder = BoardLadder::new();
        let yesterday = MarketSnapshot::new(t0, vec![Tick::new("600001", 10.0, 11.0)]);
        ladder.roll_day(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(), &yesterday);
        tracker.rank(&market(t0 + Duration::seconds(60)), &ladder);
        let dragon = tracker.dragon("半导体").unwrap();
        assert_eq!(dragon.symbol, "600001");
        assert_eq!(dragon.streak, 1);
    }

    #[test]
    fn test_rotation() {
        let mut tracker = ThemeTracker::new(ThemeConfig {
            top_n: 2,
            hot_threshold: 50.0,
        });
        let ranked = tracker.rank(&market(Utc::now()), &BoardLadder::new());

        let first = tracker.detect_rotation(&ranked);
        assert_eq!(first.entered.len(), 2);
        assert!(first.exited.is_empty());

        let second = tracker.detect_rotation(&ranked);
        assert!(!second.has_rotation());
        assert_eq!(second.persisted.len(), 2);

        let reordered: Vec<SectorHeat> = vec![ranked[2].clone(), ranked[0].clone()];
        let third = tracker.detect_rotation(&reordered);
        assert_eq!(third.entered, vec!["地产".to_string()]);
        assert_eq!(third.exited, vec![ranked[1].sector.clone()]);
        assert_eq!(third.persisted, vec!["半导体".to_string()]);
    }
}
