//! Paper position book with T+1 compliance.
//!
//! Positions are signals-only bookkeeping: nothing here talks to a broker.
//! Sizes are bought in 100-share lots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

/// A-share board lot.
pub const LOT_SIZE: f64 = 100.0;

/// Why a book operation was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("already holding {0}")]
    AlreadyHolding(String),

    #[error("no position in {0}")]
    NotHolding(String),

    #[error("{symbol}: bought on {entry_date}, cannot sell before the next trading day")]
    T1Locked { symbol: String, entry_date: NaiveDate },

    #[error("{symbol}: {fraction:.3} of capital buys less than one lot at {price:.2}")]
    BelowOneLot { symbol: String, fraction: f64, price: f64 },

    #[error("{symbol}: price {price} must be positive")]
    InvalidPrice { symbol: String, price: f64 },
}

/// An open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub entry_price: f64,
    /// Shares
    pub quantity: f64,
    pub entry_date: NaiveDate,
    /// Highest price seen since entry
    pub highest_price: f64,
}

impl Holding {
    pub fn new(symbol: impl Into<String>, entry_price: f64, quantity: f64, entry_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            name: String::new(),
            entry_price,
            quantity,
            entry_date,
            highest_price: entry_price,
        }
    }

    /// T+1: shares bought today can be sold from the next trading day on.
    pub fn can_sell_on(&self, date: NaiveDate) -> bool {
        date > self.entry_date
    }

    pub fn return_pct(&self, price: f64) -> f64 {
        if self.entry_price > 0.0 {
            (price - self.entry_price) / self.entry_price * 100.0
        } else {
            0.0
        }
    }

    /// Drop from the highest price seen, in percent.
    pub fn drawdown_from_high(&self, price: f64) -> f64 {
        let high = self.highest_price.max(price);
        if high > 0.0 {
            (high - price) / high * 100.0
        } else {
            0.0
        }
    }

    pub fn cost(&self) -> f64 {
        self.entry_price * self.quantity
    }

    pub fn update_high(&mut self, price: f64) {
        if price > self.highest_price {
            self.highest_price = price;
        }
    }
}

/// A position closed out of the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub pnl: f64,
    pub return_pct: f64,
}

/// Open positions, capital and per-day buy counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionBook {
    capital: f64,
    max_total_exposure: f64,
    holdings: HashMap<String, Holding>,
    buys_today: usize,
    realized_pnl: f64,
    date: Option<NaiveDate>,
}

impl PositionBook {
    pub fn new(capital: f64, max_total_exposure: f64) -> Self {
        Self {
            capital,
            max_total_exposure,
            holdings: HashMap::new(),
            buys_today: 0,
            realized_pnl: 0.0,
            date: None,
        }
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn buys_today(&self) -> usize {
        self.buys_today
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn holding(&self, symbol: &str) -> Option<&Holding> {
        self.holdings.get(symbol)
    }

    pub fn is_holding(&self, symbol: &str) -> bool {
        self.holdings.contains_key(symbol)
    }

    pub fn holdings(&self) -> impl Iterator<Item = &Holding> {
        self.holdings.values()
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Cost of open positions as a fraction of capital.
    pub fn exposure(&self) -> f64 {
        if self.capital <= 0.0 {
            return 0.0;
        }
        self.holdings.values().map(Holding::cost).sum::<f64>() / self.capital
    }

    /// Fraction of capital still available under the exposure cap.
    pub fn remaining_capacity(&self) -> f64 {
        (self.max_total_exposure - self.exposure()).max(0.0)
    }

    /// Open a position worth `fraction` of capital, rounded down to whole lots.
    pub fn open(
        &mut self,
        symbol: &str,
        name: &str,
        price: f64,
        fraction: f64,
        date: NaiveDate,
    ) -> Result<&Holding, PositionError> {
        if !(price > 0.0) {
            return Err(PositionError::InvalidPrice {
                symbol: symbol.to_string(),
                price,
            });
        }
        if self.holdings.contains_key(symbol) {
            return Err(PositionError::AlreadyHolding(symbol.to_string()));
        }

        let lots = (self.capital * fraction / price / LOT_SIZE).floor();
        if lots < 1.0 {
            return Err(PositionError::BelowOneLot {
                symbol: symbol.to_string(),
                fraction,
                price,
            });
        }

        let mut holding = Holding::new(symbol, price, lots * LOT_SIZE, date);
        holding.name = name.to_string();
        info!(
            symbol,
            price,
            quantity = holding.quantity,
            fraction,
            "Position opened"
        );

        self.buys_today += 1;
        Ok(self.holdings.entry(symbol.to_string()).or_insert(holding))
    }

    /// Close a position. Refused on the entry day.
    pub fn close(&mut self, symbol: &str, price: f64, date: NaiveDate) -> Result<ClosedTrade, PositionError> {
        let holding = self
            .holdings
            .get(symbol)
            .ok_or_else(|| PositionError::NotHolding(symbol.to_string()))?;
        if !holding.can_sell_on(date) {
            return Err(PositionError::T1Locked {
                symbol: symbol.to_string(),
                entry_date: holding.entry_date,
            });
        }

        let Some(holding) = self.holdings.remove(symbol) else {
            return Err(PositionError::NotHolding(symbol.to_string()));
        };
        let pnl = (price - holding.entry_price) * holding.quantity;
        self.realized_pnl += pnl;

        let trade = ClosedTrade {
            symbol: holding.symbol.clone(),
            entry_price: holding.entry_price,
            exit_price: price,
            quantity: holding.quantity,
            entry_date: holding.entry_date,
            exit_date: date,
            pnl,
            return_pct: holding.return_pct(price),
        };
        info!(symbol, price, pnl, return_pct = trade.return_pct, "Position closed");
        Ok(trade)
    }

    /// Track the highest price of a held symbol.
    pub fn mark(&mut self, symbol: &str, price: f64) {
        if let Some(h) = self.holdings.get_mut(symbol) {
            h.update_high(price);
        }
    }

    /// Start a new trading day.
    pub fn roll_day(&mut self, date: NaiveDate) {
        if self.date == Some(date) {
            return;
        }
        self.buys_today = 0;
        self.date = Some(date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_holding_t1_and_returns() {
        let mut h = Holding::new("600000", 10.0, 1000.0, day(10));
        assert!(!h.can_sell_on(day(10)));
        assert!(h.can_sell_on(day(13)));
        assert!((h.return_pct(10.5) - 5.0).abs() < 1e-9);

        h.update_high(11.0);
        h.update_high(10.6);
        assert_eq!(h.highest_price, 11.0);
        assert!((h.drawdown_from_high(10.45) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_open_rounds_to_lots_and_tracks_exposure() {
        let mut book = PositionBook::new(100_000.0, 0.8);
        let holding = book.open("600000", "浦发银行", 10.33, 0.2, day(10)).unwrap();
        // 20_000 / 10.33 = 1936 shares -> 19 lots
        assert_eq!(holding.quantity, 1900.0);

        assert!((book.exposure() - 0.19627).abs() < 1e-5);
        assert!((book.remaining_capacity() - (0.8 - 0.19627)).abs() < 1e-5);
        assert_eq!(book.buys_today(), 1);

        assert_eq!(
            book.open("600000", "", 10.0, 0.1, day(10)).unwrap_err(),
            PositionError::AlreadyHolding("600000".into())
        );
        assert!(matches!(
            book.open("600519", "", 1500.0, 0.01, day(10)),
            Err(PositionError::BelowOneLot { .. })
        ));
    }

    #[test]
    fn test_close_respects_t1() {
        let mut book = PositionBook::new(100_000.0, 0.8);
        book.open("600000", "", 10.0, 0.2, day(10)).unwrap();

        assert!(matches!(
            book.close("600000", 10.5, day(10)),
            Err(PositionError::T1Locked { .. })
        ));

        let trade = book.close("600000", 10.5, day(13)).unwrap();
        assert!((trade.pnl - 1000.0).abs() < 1e-6);
        assert!(book.is_empty());
        assert!((book.realized_pnl() - 1000.0).abs() < 1e-6);
        assert!(matches!(
            book.close("600000", 10.5, day(14)),
            Err(PositionError::NotHolding(_))
        ));
    }

    #[test]
    fn test_roll_day_resets_buy_count() {
        let mut book = PositionBook::new(100_000.0, 0.8);
        book.roll_day(day(10));
        book.open("600000", "", 10.0, 0.1, day(10)).unwrap();
        assert_eq!(book.buys_today(), 1);

        book.roll_day(day(10));
        assert_eq!(book.buys_today(), 1);
        book.roll_day(day(13));
        assert_eq!(book.buys_today(), 0);
        assert_eq!(book.len(), 1);
    }
}
