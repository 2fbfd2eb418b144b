//! Replay of recorded snapshots.
//!
//! File format is JSON lines. Each line is either a [`MarketSnapshot`]
//! or a candle batch `{"candles": [...]}` providing daily history for the
//! dip-buy context. Snapshots are served in timestamp order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use super::{Candle, MarketSnapshot, ProviderError, QuoteProvider};

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Candles { candles: Vec<Candle> },
    Snapshot(MarketSnapshot),
}

/// Serves recorded snapshots one per fetch.
pub struct ReplayProvider {
    snapshots: Vec<MarketSnapshot>,
    candles: HashMap<String, Vec<Candle>>,
    cursor: AtomicUsize,
}

impl ReplayProvider {
    pub fn from_snapshots(snapshots: Vec<MarketSnapshot>) -> Self {
        Self {
            snapshots,
            candles: HashMap::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn with_candles(mut self, candles: Vec<Candle>) -> Self {
        for candle in candles {
            self.candles
                .entry(candle.symbol.clone())
                .or_default()
                .push(candle);
        }
        for series in self.candles.values_mut() {
            series.sort_by_key(|c| c.date);
        }
        self
    }

    /// Load a JSON-lines recording. Blank lines are skipped.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;

        let mut snapshots = Vec::new();
        let mut candles = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed: ReplayLine = serde_json::from_str(line).with_context(|| {
                format!("Invalid replay record at {}:{}", path.display(), lineno + 1)
            })?;
            match parsed {
                ReplayLine::Candles { candles: batch } => candles.extend(batch),
                ReplayLine::Snapshot(snapshot) => snapshots.push(snapshot),
            }
        }

        snapshots.sort_by_key(|s| s.timestamp);

        info!(
            path = %path.display(),
            snapshots = snapshots.len(),
            candles = candles.len(),
            "Loaded replay file"
        );

        Ok(Self::from_snapshots(snapshots).with_candles(candles))
    }

    /// All recorded snapshots in replay order.
    pub fn snapshots(&self) -> &[MarketSnapshot] {
        &self.snapshots
    }

    /// Recorded daily candles for a symbol, oldest first.
    pub fn candles(&self, symbol: &str) -> &[Candle] {
        self.candles.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn remaining(&self) -> usize {
        self.snapshots
            .len()
            .saturating_sub(self.cursor.load(Ordering::Relaxed))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Restart from the first snapshot.
    pub fn rewind(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl QuoteProvider for ReplayProvider {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.is_exhausted() {
            Err(ProviderError::Unavailable("replay exhausted".into()))
        } else {
            Ok(())
        }
    }

    async fn fetch_snapshot(&self, symbols: &[String]) -> Result<MarketSnapshot, ProviderError> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        let Some(snapshot) = self.snapshots.get(idx) else {
            return Err(ProviderError::DataNotAvailable("replay exhausted".into()));
        };

        if symbols.is_empty() {
            return Ok(snapshot.clone());
        }

        let ticks = snapshot
            .ticks
            .iter()
            .filter(|t| symbols.contains(&t.symbol))
            .cloned()
            .collect();
        Ok(MarketSnapshot::new(snapshot.timestamp, ticks))
    }

    async fn fetch_daily_candles(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        let series = self
            .candles
            .get(symbol)
            .ok_or_else(|| ProviderError::DataNotAvailable(symbol.to_string()))?;
        let start = series.len().saturating_sub(limit);
        Ok(series[start..].to_vec())
    }
}
