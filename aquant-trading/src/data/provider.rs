//! Quote provider abstraction.
//!
//! Vendor adapters (QMT, AkShare, Easyquotation, ...) live outside this
//! crate; they plug in by implementing [`QuoteProvider`].

use async_trait::async_trait;
use std::fmt;

use super::{Candle, MarketSnapshot};

/// Errors specific to quote providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Provider is temporarily unavailable
    Unavailable(String),
    /// Data not available for the requested symbol
    DataNotAvailable(String),
    /// Payload could not be interpreted
    InvalidData(String),
    /// Internal provider error
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is transient (worth retrying next cycle)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Unavailable(_))
    }
}

/// Source of real-time quotes and daily history.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Provider name for logging (e.g., "sample", "replay")
    fn name(&self) -> &'static str;

    /// Lightweight availability check.
    async fn health_check(&self) -> Result<(), ProviderError>;

    /// Fetch the latest quotes. An empty `symbols` slice means the whole market.
    async fn fetch_snapshot(&self, symbols: &[String]) -> Result<MarketSnapshot, ProviderError>;

    /// Fetch up to `limit` most recent daily candles, oldest first.
    async fn fetch_daily_candles(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError>;
}
