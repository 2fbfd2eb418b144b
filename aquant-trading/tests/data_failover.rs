//! Provider failover through the public API.
//!
//! A flaky primary behind [`FallbackProvider`] must never stall the monitor:
//! every cycle still gets a snapshot and the fallback count tracks how often
//! the backup was used.

use async_trait::async_trait;
use aquant_common::config::Config;
use aquant_trading::data::{
    Candle, FallbackProvider, MarketSnapshot, ProviderError, QuoteProvider, SampleProvider, Tick,
};
use aquant_trading::monitor::{MarketMonitor, MonitorEvent};
use aquant_trading::watchlist::Watchlist;
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// Mock Providers
// ============================================================================

/// Fails every `fail_every`-th snapshot request, serves one tick otherwise.
struct FlakeyProvider {
    calls: AtomicU32,
    fail_every: u32,
}

impl FlakeyProvider {
    fn new(fail_every: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_every,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for FlakeyProvider {
    fn name(&self) -> &'static str {
        "flakey"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn fetch_snapshot(&self, _symbols: &[String]) -> Result<MarketSnapshot, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n % self.fail_every == 0 {
            return Err(ProviderError::Network("timeout".into()));
        }
        let now = Utc::now();
        Ok(MarketSnapshot::new(
            now,
            vec![Tick::new("600519.SH", 1700.0, 1712.0).at(now)],
        ))
    }

    async fn fetch_daily_candles(
        &self,
        symbol: &str,
        _limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        Err(ProviderError::DataNotAvailable(symbol.to_string()))
    }
}

/// Always down.
struct DownProvider;

#[async_trait]
impl QuoteProvider for DownProvider {
    fn name(&self) -> &'static str {
        "down"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Err(ProviderError::Unavailable("maintenance".into()))
    }

    async fn fetch_snapshot(&self, _symbols: &[String]) -> Result<MarketSnapshot, ProviderError> {
        Err(ProviderError::Unavailable("maintenance".into()))
    }

    async fn fetch_daily_candles(
        &self,
        _symbol: &str,
        _limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        Err(ProviderError::Unavailable("maintenance".into()))
    }
}

fn monitor_over(provider: Arc<dyn QuoteProvider>, dir: &Path) -> MarketMonitor {
    let watchlist = Arc::new(RwLock::new(Watchlist::load(&dir.join("watchlist.json")).unwrap()));
    MarketMonitor::from_config(&Config::default(), provider, watchlist, None).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_flakey_primary_is_covered_by_fallback() {
    let primary = Arc::new(FlakeyProvider::new(3));
    let fallback = Arc::new(SampleProvider::new(20));
    let provider = FallbackProvider::new(primary.clone(), fallback);

    let mut sources = Vec::new();
    for _ in 0..6 {
        let snapshot = provider.fetch_snapshot(&[]).await.unwrap();
        sources.push(snapshot.len());
    }

    assert_eq!(primary.calls(), 6);
    assert_eq!(provider.fallback_count(), 2);
    // Calls 3 and 6 were served from the 20-stock sample market
    assert_eq!(sources, vec![1, 1, 20, 1, 1, 20]);
}

#[tokio::test]
async fn test_candles_fall_back_when_primary_has_none() {
    let provider = FallbackProvider::new(
        Arc::new(FlakeyProvider::new(2)),
        Arc::new(SampleProvider::new(10)),
    );

    let candles = provider.fetch_daily_candles("600000.SH", 15).await.unwrap();
    assert_eq!(candles.len(), 15);
    assert!(candles.windows(2).all(|w| w[0].date < w[1].date));
    assert_eq!(provider.fallback_count(), 1);

    let err = provider.fetch_daily_candles("999999.SZ", 15).await.unwrap_err();
    assert!(matches!(err, ProviderError::DataNotAvailable(_)));
}

#[tokio::test]
async fn test_health_check_uses_fallback() {
    let provider = FallbackProvider::new(Arc::new(DownProvider), Arc::new(SampleProvider::new(5)));
    assert!(provider.health_check().await.is_ok());
    assert_eq!(provider.primary_name(), "down");
}

#[tokio::test]
async fn test_monitor_keeps_cycling_with_primary_down() {
    let provider: Arc<dyn QuoteProvider> = Arc::new(FallbackProvider::new(
        Arc::new(DownProvider),
        Arc::new(SampleProvider::new(30)),
    ));
    let dir = tempfile::tempdir().unwrap();
    let monitor = monitor_over(provider, dir.path());
    let mut events = monitor.subscribe();

    for _ in 0..3 {
        let outcome = monitor.run_cycle().await.unwrap();
        assert_eq!(outcome.ticks + outcome.dropped, 30);
    }

    let stats = monitor.stats().await;
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.errors, 0);
    assert!(monitor.market().await.is_some());

    let mut completed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, MonitorEvent::CycleCompleted { .. }) {
            completed += 1;
        }
    }
    assert_eq!(completed, 3);
}

#[tokio::test]
async fn test_monitor_surfaces_error_when_everything_is_down() {
    let provider: Arc<dyn QuoteProvider> =
        Arc::new(FallbackProvider::new(Arc::new(DownProvider), Arc::new(DownProvider)));
    let dir = tempfile::tempdir().unwrap();
    let monitor = monitor_over(provider, dir.path());

    let err = monitor.run_cycle().await.unwrap_err();
    assert!(format!("{:#}", err).contains("maintenance"));
    assert!(monitor.market().await.is_none());
    assert_eq!(monitor.stats().await.cycles, 0);
}
