//! Primary/fallback provider pair.
//!
//! Requests go to the primary first. A failed request, or an empty
//! primary snapshot, is served from the fallback instead.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Candle, MarketSnapshot, ProviderError, QuoteProvider};

/// Routes requests to a primary provider with automatic fallback.
pub struct FallbackProvider {
    primary: Arc<dyn QuoteProvider>,
    fallback: Arc<dyn QuoteProvider>,
    fallbacks: AtomicU64,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn QuoteProvider>, fallback: Arc<dyn QuoteProvider>) -> Self {
        Self {
            primary,
            fallback,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Number of requests served by the fallback so far.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    pub fn primary_name(&self) -> &'static str {
        self.primary.name()
    }

    fn note_fallback(&self, reason: &str) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        warn!(
            primary = self.primary.name(),
            fallback = self.fallback.name(),
            reason,
            "Primary provider failed, serving fallback data"
        );
    }
}

#[async_trait]
impl QuoteProvider for FallbackProvider {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match self.primary.health_check().await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(provider = self.primary.name(), error = %e, "Primary unhealthy");
                self.fallback.health_check().await
            }
        }
    }

    async fn fetch_snapshot(&self, symbols: &[String]) -> Result<MarketSnapshot, ProviderError> {
        match self.primary.fetch_snapshot(symbols).await {
            Ok(snapshot) if !snapshot.is_empty() => Ok(snapshot),
            Ok(_) => {
                self.note_fallback("empty snapshot");
                self.fallback.fetch_snapshot(symbols).await
            }
            Err(e) => {
                self.note_fallback(&e.to_string());
                self.fallback.fetch_snapshot(symbols).await
            }
        }
    }

    async fn fetch_daily_candles(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        match self.primary.fetch_daily_candles(symbol, limit).await {
            Ok(candles) => Ok(candles),
            Err(e) => {
                self.note_fallback(&e.to_string());
                self.fallback.fetch_daily_candles(symbol, limit).await
            }
        }
    }
}
