//! Market data model for A-shares.
//!
//! Ticks and daily candles as delivered by quote providers, the board
//! classification that decides price limits, and full-market snapshots.
//!
//! # Price limits
//! - Main board: ±10%
//! - ChiNext (300/301) and STAR (688/689): ±20%
//! - Beijing Stock Exchange (4xx/8xx/92x): ±30%
//! - ST stocks on the main board: ±5%
//!
//! Limit prices are `pre_close × (1 ± pct)` rounded half-up to the cent.

mod fallback;
mod provider;
mod recorded;
mod sample;
mod window;

pub use fallback::FallbackProvider;
pub use provider::{ProviderError, QuoteProvider};
pub use recorded::ReplayProvider;
pub use sample::SampleProvider;
pub use window::{RollingWindow, TickHistory, TickPoint};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Price tolerance when comparing against a limit price.
const PRICE_EPSILON: f64 = 0.005;

/// Exchange time zone (UTC+8).
pub fn exchange_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap_or_else(|| Utc.fix())
}

/// Parse an "HH:MM" clock time, falling back to `default` when malformed.
pub fn parse_hhmm(value: Option<&str>, default: NaiveTime) -> NaiveTime {
    value
        .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M").ok())
        .unwrap_or(default)
}

/// Round a price half-up to 0.01.
pub fn round_price(price: f64) -> f64 {
    (price * 100.0 + 0.5 + 1e-7).floor() / 100.0
}

/// Limit price for a previous close and a limit percentage.
pub fn limit_price(pre_close: f64, limit_pct: f64, up: bool) -> f64 {
    let factor = if up {
        1.0 + limit_pct / 100.0
    } else {
        1.0 - limit_pct / 100.0
    };
    round_price(pre_close * factor)
}

/// Percentage change from `base` to `value`; zero when `base` is not positive.
pub fn pct_change(base: f64, value: f64) -> f64 {
    if base > 0.0 {
        (value - base) / base * 100.0
    } else {
        0.0
    }
}

// ============================================================================
// Board
// ============================================================================

/// Listing board, which determines the daily price limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    /// Shanghai/Shenzhen main board
    Main,
    /// Shenzhen ChiNext (创业板)
    ChiNext,
    /// Shanghai STAR market (科创板)
    Star,
    /// Beijing Stock Exchange (北交所)
    Bse,
    /// Special treatment main-board stock
    St,
}

impl Board {
    /// Classify a stock from its code and display name.
    pub fn classify(symbol: &str, name: &str) -> Self {
        let code = bare_code(symbol);

        let board = if code.starts_with("300") || code.starts_with("301") {
            Self::ChiNext
        } else if code.starts_with("688") || code.starts_with("689") {
            Self::Star
        } else if code.starts_with('4') || code.starts_with('8') || code.starts_with("92") {
            Self::Bse
        } else {
            Self::Main
        };

        if board == Self::Main && name.to_uppercase().contains("ST") {
            Self::St
        } else {
            board
        }
    }

    /// Daily price limit in percent.
    pub fn limit_pct(&self) -> f64 {
        match self {
            Self::Main => 10.0,
            Self::ChiNext | Self::Star => 20.0,
            Self::Bse => 30.0,
            Self::St => 5.0,
        }
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "主板"),
            Self::ChiNext => write!(f, "创业板"),
            Self::Star => write!(f, "科创板"),
            Self::Bse => write!(f, "北交所"),
            Self::St => write!(f, "ST"),
        }
    }
}

/// Strip exchange prefixes/suffixes: `sh600519`, `600519.SH` -> `600519`.
pub fn bare_code(symbol: &str) -> &str {
    let s = symbol.split('.').next().unwrap_or(symbol);
    let lower = s.get(..2).map(|p| p.to_ascii_lowercase());
    match lower.as_deref() {
        Some("sh") | Some("sz") | Some("bj") => &s[2..],
        _ => s,
    }
}

// ============================================================================
// Tick
// ============================================================================

/// Why a tick was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TickError {
    #[error("{symbol}: price {price} must be positive")]
    NonPositivePrice { symbol: String, price: f64 },

    #[error("{symbol}: previous close {pre_close} must be positive")]
    NonPositivePreClose { symbol: String, pre_close: f64 },

    #[error("{symbol}: volume {volume} must not be negative")]
    NegativeVolume { symbol: String, volume: f64 },

    #[error("{symbol}: amount {amount} must not be negative")]
    NegativeAmount { symbol: String, amount: f64 },

    #[error("{symbol}: high {high} below low {low}")]
    InvertedRange { symbol: String, high: f64, low: f64 },
}

/// A single real-time quote update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Stock code (`000001.SZ` or bare `000001`)
    pub symbol: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Quote time
    pub timestamp: DateTime<Utc>,
    /// Last price
    pub price: f64,
    /// Today's open
    #[serde(default)]
    pub open: f64,
    /// Intraday high
    #[serde(default)]
    pub high: f64,
    /// Intraday low
    #[serde(default)]
    pub low: f64,
    /// Previous close
    pub pre_close: f64,
    /// Cumulative volume today (shares)
    #[serde(default)]
    pub volume: f64,
    /// Cumulative turnover today (CNY)
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub bid1: f64,
    #[serde(default)]
    pub ask1: f64,
    #[serde(default)]
    pub bid1_volume: f64,
    #[serde(default)]
    pub ask1_volume: f64,
    /// 量比: today's per-minute volume over the 5-day average
    #[serde(default)]
    pub volume_ratio: Option<f64>,
    /// Turnover rate in percent
    #[serde(default)]
    pub turnover_rate: Option<f64>,
    /// DDE large-order net inflow (CNY)
    #[serde(default)]
    pub big_order_net: Option<f64>,
    /// Sector / theme label
    #[serde(default)]
    pub sector: Option<String>,
}

impl Tick {
    /// Create a tick with the open/high/low collapsed onto the last price.
    pub fn new(symbol: impl Into<String>, pre_close: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            name: String::new(),
            timestamp: Utc::now(),
            price,
            open: pre_close,
            high: price.max(pre_close),
            low: price.min(pre_close),
            pre_close,
            volume: 0.0,
            amount: 0.0,
            bid1: price,
            ask1: price,
            bid1_volume: 0.0,
            ask1_volume: 0.0,
            volume_ratio: None,
            turnover_rate: None,
            big_order_net: None,
            sector: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_ohlc(mut self, open: f64, high: f64, low: f64) -> Self {
        self.open = open;
        self.high = high;
        self.low = low;
        self
    }

    pub fn with_volume(mut self, volume: f64, amount: f64) -> Self {
        self.volume = volume;
        self.amount = amount;
        self
    }

    pub fn with_volume_ratio(mut self, ratio: f64) -> Self {
        self.volume_ratio = Some(ratio);
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn with_dde(mut self, big_order_net: f64) -> Self {
        self.big_order_net = Some(big_order_net);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Basic sanity checks; invalid ticks are dropped, never fatal.
    pub fn validate(&self) -> Result<(), TickError> {
        let symbol = || self.symbol.clone();

        if !(self.price > 0.0) {
            return Err(TickError::NonPositivePrice {
                symbol: symbol(),
                price: self.price,
            });
        }
        if !(self.pre_close > 0.0) {
            return Err(TickError::NonPositivePreClose {
                symbol: symbol(),
                pre_close: self.pre_close,
            });
        }
        if self.volume < 0.0 {
            return Err(TickError::NegativeVolume {
                symbol: symbol(),
                volume: self.volume,
            });
        }
        if self.amount < 0.0 {
            return Err(TickError::NegativeAmount {
                symbol: symbol(),
                amount: self.amount,
            });
        }
        if self.high > 0.0 && self.low > 0.0 && self.high < self.low {
            return Err(TickError::InvertedRange {
                symbol: symbol(),
                high: self.high,
                low: self.low,
            });
        }
        Ok(())
    }

    pub fn board(&self) -> Board {
        Board::classify(&self.symbol, &self.name)
    }

    /// Change versus previous close, in percent.
    pub fn change_pct(&self) -> f64 {
        pct_change(self.pre_close, self.price)
    }

    /// Opening gap versus previous close, in percent.
    pub fn gap_pct(&self) -> f64 {
        if self.open > 0.0 {
            pct_change(self.pre_close, self.open)
        } else {
            0.0
        }
    }

    /// Intraday high-low range relative to previous close, in percent.
    pub fn amplitude_pct(&self) -> f64 {
        if self.high > 0.0 && self.low > 0.0 && self.pre_close > 0.0 {
            (self.high - self.low) / self.pre_close * 100.0
        } else {
            0.0
        }
    }

    pub fn limit_up_price(&self) -> f64 {
        limit_price(self.pre_close, self.board().limit_pct(), true)
    }

    pub fn limit_down_price(&self) -> f64 {
        limit_price(self.pre_close, self.board().limit_pct(), false)
    }

    /// Last price sits at the limit-up price.
    pub fn is_limit_up(&self) -> bool {
        self.price >= self.limit_up_price() - PRICE_EPSILON
    }

    /// Last price sits at the limit-down price.
    pub fn is_limit_down(&self) -> bool {
        self.price <= self.limit_down_price() + PRICE_EPSILON
    }

    /// Intraday high reached the limit-up price.
    pub fn touched_limit_up(&self) -> bool {
        self.high.max(self.price) >= self.limit_up_price() - PRICE_EPSILON
    }

    /// 炸板: touched limit-up but no longer sealed.
    pub fn is_broken_board(&self) -> bool {
        self.touched_limit_up() && !self.is_limit_up()
    }

    /// Remaining room to the limit-up price, in percent of the last price.
    pub fn room_to_limit_up_pct(&self) -> f64 {
        pct_change(self.price, self.limit_up_price())
    }

    /// Average traded price (amount / volume), falling back to last price.
    pub fn vwap(&self) -> f64 {
        if self.volume > 0.0 && self.amount > 0.0 {
            self.amount / self.volume
        } else {
            self.price
        }
    }

    /// Quote time on the exchange clock.
    pub fn exchange_time(&self) -> NaiveTime {
        self.timestamp.with_timezone(&exchange_offset()).time()
    }

    /// Trading date on the exchange clock.
    pub fn trade_date(&self) -> NaiveDate {
        self.timestamp.with_timezone(&exchange_offset()).date_naive()
    }
}

// ============================================================================
// Candle
// ============================================================================

/// Daily K-line bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub amount: f64,
    /// Previous day's close, when the source provides it
    #[serde(default)]
    pub pre_close: Option<f64>,
}

impl Candle {
    /// Daily change in percent (0 when no previous close is known).
    pub fn change_pct(&self) -> f64 {
        self.pre_close
            .map(|pc| pct_change(pc, self.close))
            .unwrap_or(0.0)
    }

    /// Closed at the limit-up price for the given board.
    pub fn is_limit_up_close(&self, board: Board) -> bool {
        self.pre_close
            .map(|pc| self.close >= limit_price(pc, board.limit_pct(), true) - PRICE_EPSILON)
            .unwrap_or(false)
    }
}

/// Simple moving average of the last `period` closes.
pub fn sma_close(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }
    let sum: f64 = candles[candles.len() - period..].iter().map(|c| c.close).sum();
    Some(sum / period as f64)
}

// ============================================================================
// Market Snapshot
// ============================================================================

/// Full-market (or watchlist) quote snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub ticks: Vec<Tick>,
}

impl MarketSnapshot {
    pub fn new(timestamp: DateTime<Utc>, ticks: Vec<Tick>) -> Self {
        Self { timestamp, ticks }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<&Tick> {
        self.ticks.iter().find(|t| t.symbol == symbol)
    }

    /// The snapshot with invalid ticks removed.
    pub fn valid_ticks(mut self) -> Self {
        self.retain_valid();
        self
    }

    /// Drop ticks that fail validation, returning how many were dropped.
    pub fn retain_valid(&mut self) -> usize {
        let before = self.ticks.len();
        self.ticks.retain(|t| match t.validate() {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Dropping invalid tick");
                false
            }
        });
        before - self.ticks.len()
    }

    /// Trading date on the exchange clock.
    pub fn trade_date(&self) -> NaiveDate {
        self.timestamp.with_timezone(&exchange_offset()).date_naive()
    }

    /// Snapshot time on the exchange clock.
    pub fn exchange_time(&self) -> NaiveTime {
        self.timestamp.with_timezone(&exchange_offset()).time()
    }
}
