//! Built-in sample market.
//!
//! A deterministic synthetic market used when no live source is reachable.
//! It contains a mix of boards and sectors with a handful of sealed
//! limit-ups, broken boards and limit-downs so every downstream component
//! has something to chew on. Each snapshot advances an internal step so
//! prices and cumulative volumes evolve between calls.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{exchange_offset, limit_price, round_price, Board, Candle, MarketSnapshot, ProviderError, QuoteProvider, Tick};

const SECTORS: &[&str] = &[
    "半导体", "新能源", "医药", "白酒", "券商", "AI算力", "军工", "地产",
];

/// Calendar date on the exchange clock.
fn session_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&exchange_offset()).date_naive()
}

/// Deterministic pseudo-random number in [0, 1).
fn unit(seed: u64) -> f64 {
    // splitmix64
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z % 1_000_000) as f64 / 1_000_000.0
}

#[derive(Debug, Clone)]
struct SampleStock {
    symbol: String,
    name: String,
    sector: &'static str,
    pre_close: f64,
    /// Target change as a fraction of the board limit (-1.0 ..= 1.0)
    limit_fraction: f64,
    /// Sealed at limit-up earlier, now broken
    broken: bool,
    base_volume: f64,
}

/// Synthetic provider used as the fallback market.
pub struct SampleProvider {
    universe: Vec<SampleStock>,
    step: AtomicU64,
}

impl SampleProvider {
    pub fn new(size: usize) -> Self {
        let universe = (0..size.max(1)).map(Self::make_stock).collect();
        Self {
            universe,
            step: AtomicU64::new(0),
        }
    }

    fn make_stock(i: usize) -> SampleStock {
        let seed = i as u64;
        let symbol = match i % 10 {
            0..=3 => format!("600{:03}.SH", i),
            4..=6 => format!("000{:03}.SZ", i),
            7 | 8 => format!("300{:03}.SZ", i),
            _ => format!("688{:03}.SH", i),
        };
        let name = if i % 25 == 24 {
            format!("ST样本{:03}", i)
        } else {
            format!("样本{:03}", i)
        };

        let limit_fraction = if i % 17 == 0 {
            1.0
        } else if i % 31 == 5 {
            -1.0
        } else {
            (unit(seed.wrapping_mul(7)) - 0.45) * 1.2
        };

        SampleStock {
            symbol,
            name,
            sector: SECTORS[i % SECTORS.len()],
            pre_close: round_price(5.0 + unit(seed.wrapping_mul(13)) * 45.0),
            limit_fraction: limit_fraction.clamp(-1.0, 1.0),
            broken: i % 23 == 11,
            base_volume: 200_000.0 + unit(seed.wrapping_mul(29)) * 2_000_000.0,
        }
    }

    /// Number of stocks in the sample universe.
    pub fn len(&self) -> usize {
        self.universe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.universe.is_empty()
    }

    fn quote(stock: &SampleStock, step: u64) -> Tick {
        let board = Board::classify(&stock.symbol, &stock.name);
        let limit_pct = board.limit_pct();
        let up_price = limit_price(stock.pre_close, limit_pct, true);
        let down_price = limit_price(stock.pre_close, limit_pct, false);

        let wobble = ((step as f64) * 0.7 + stock.pre_close).sin() * 0.08;
        let price = if stock.broken {
            round_price(up_price * (0.97 + wobble.abs() * 0.1))
        } else if stock.limit_fraction >= 1.0 {
            up_price
        } else if stock.limit_fraction <= -1.0 {
            down_price
        } else {
            let pct = (stock.limit_fraction + wobble) * limit_pct;
            round_price(stock.pre_close * (1.0 + pct / 100.0)).clamp(down_price, up_price)
        };

        let open = round_price(stock.pre_close * (1.0 + stock.limit_fraction * limit_pct * 0.2 / 100.0));
        let high = if stock.broken { up_price } else { price.max(open) };
        let low = price.min(open);
        let volume = stock.base_volume * (1.0 + step as f64 * 0.05);
        let avg_price = (open + price + high + low) / 4.0;
        let amount = volume * avg_price;
        let seed = stock.pre_close.to_bits() ^ step;

        Tick {
            symbol: stock.symbol.clone(),
            name: stock.name.clone(),
            timestamp: Utc::now(),
            price,
            open,
            high,
            low,
            pre_close: stock.pre_close,
            volume,
            amount,
            bid1: round_price(price - 0.01).max(0.01),
            ask1: if price >= up_price { 0.0 } else { round_price(price + 0.01) },
            bid1_volume: 10_000.0,
            ask1_volume: if price >= up_price { 0.0 } else { 8_000.0 },
            volume_ratio: Some(0.5 + unit(seed) * 3.0),
            turnover_rate: Some(0.5 + unit(seed.wrapping_add(1)) * 8.0),
            big_order_net: Some(amount * (unit(seed.wrapping_add(2)) - 0.45) * 0.1),
            sector: Some(stock.sector.to_string()),
        }
    }

    /// Daily bars ending the session before `today`.
    fn candles(stock: &SampleStock, limit: usize, today: NaiveDate) -> Vec<Candle> {
        let mut close = stock.pre_close;
        let mut bars = Vec::with_capacity(limit);

        // Walk backwards from yesterday's close.
        for day in 1..=limit {
            let seed = stock.pre_close.to_bits().wrapping_add(day as u64);
            let change = (unit(seed) - 0.48) * 0.06;
            let prev_close = round_price(close / (1.0 + change)).max(0.01);
            let open = round_price(prev_close * (1.0 + change * 0.3));
            bars.push(Candle {
                symbol: stock.symbol.clone(),
                date: today - Duration::days(day as i64),
                open,
                high: close.max(open) * 1.01,
                low: close.min(open) * 0.99,
                close,
                volume: stock.base_volume * (0.8 + unit(seed.wrapping_add(3)) * 0.4),
                amount: stock.base_volume * close,
                pre_close: Some(prev_close),
            });
            close = prev_close;
        }

        bars.reverse();
        bars
    }
}

#[async_trait]
impl QuoteProvider for SampleProvider {
    fn name(&self) -> &'static str {
        "sample"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn fetch_snapshot(&self, symbols: &[String]) -> Result<MarketSnapshot, ProviderError> {
        let step = self.step.fetch_add(1, Ordering::Relaxed);
        let ticks = self
            .universe
            .iter()
            .filter(|s| symbols.is_empty() || symbols.contains(&s.symbol))
            .map(|s| Self::quote(s, step))
            .collect();
        Ok(MarketSnapshot::new(Utc::now(), ticks))
    }

    async fn fetch_daily_candles(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        let today = session_date(Utc::now());
        self.universe
            .iter()
            .find(|s| s.symbol == symbol)
            .map(|s| Self::candles(s, limit, today))
            .ok_or_else(|| ProviderError::DataNotAvailable(symbol.to_string()))
    }
}
