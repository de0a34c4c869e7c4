//! L2 order book and the per-venue book store.
//!
//! Books are maintained from two update paths:
//!
//! - **Snapshot**: a full book replaces any prior state for that token.
//! - **Delta**: a batch of single-level changes (`size == 0` removes the
//!   level). After a batch is applied, callers receive the list of touched
//!   tokens exactly once per token, never once per level.
//!
//! Bids are kept sorted descending and asks ascending at all times; levels
//! with zero size are never stored.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Venue an order book or position belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// Leveraged perpetual-futures venue.
    Hyperliquid,
    /// Binary prediction-market CLOB.
    Polymarket,
    /// Event-contract venue.
    Kalshi,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hyperliquid => write!(f, "hyperliquid"),
            Self::Polymarket => write!(f, "polymarket"),
            Self::Kalshi => write!(f, "kalshi"),
        }
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Buying (taking from asks, resting on bids).
    Buy,
    /// Selling (taking from bids, resting on asks).
    Sell,
}

/// A single level change from an incremental feed.
#[derive(Debug, Clone)]
pub struct LevelChange {
    /// Token the change applies to.
    pub token_id: String,
    /// Book side the level sits on.
    pub side: Side,
    /// Price of the level.
    pub price: Decimal,
    /// New size; zero removes the level.
    pub size: Decimal,
}

/// L2 order book with incremental update support.
///
/// Price keys are `Decimal`, so level lookup on the delta path is exact;
/// no float tolerance is needed.
#[derive(Debug, Clone)]
pub struct L2OrderBook {
    /// Token or symbol this book represents.
    pub token_id: String,
    /// Bid levels: price -> size (sorted descending by price).
    pub bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Ask levels: price -> size (sorted ascending by price).
    pub asks: BTreeMap<Decimal, Decimal>,
    /// Timestamp of last update in milliseconds.
    pub last_update_ms: Option<i64>,
}

impl L2OrderBook {
    /// Creates a new empty order book for the given token.
    #[must_use]
    pub fn new(token_id: String) -> Self {
        Self {
            token_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_ms: None,
        }
    }

    /// Returns the best (highest) bid price.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    /// Returns the best (lowest) ask price.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Size resting at the best bid.
    #[must_use]
    pub fn best_bid_size(&self) -> Option<Decimal> {
        self.bids.values().next().copied()
    }

    /// Size resting at the best ask.
    #[must_use]
    pub fn best_ask_size(&self) -> Option<Decimal> {
        self.asks.values().next().copied()
    }

    /// Returns the bid-ask spread, if both sides have liquidity.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Mid price: the bid-ask midpoint when both sides exist, the single
    /// available side otherwise, zero for an empty book.
    #[must_use]
    pub fn mid_price(&self) -> Decimal {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => (bid + ask) / Decimal::TWO,
            (Some(bid), None) => bid,
            (None, Some(ask)) => ask,
            (None, None) => Decimal::ZERO,
        }
    }

    /// Applies a full snapshot, replacing all existing levels.
    ///
    /// Zero-size levels are dropped.
    pub fn apply_snapshot(&mut self, bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) {
        self.bids.clear();
        self.asks.clear();
        for (price, size) in bids {
            if size > Decimal::ZERO {
                self.bids.insert(Reverse(price), size);
            }
        }
        for (price, size) in asks {
            if size > Decimal::ZERO {
                self.asks.insert(price, size);
            }
        }
    }

    /// Applies a delta update to a single price level.
    ///
    /// If size is zero or negative, the level is removed.
    pub fn apply_delta(&mut self, side: Side, price: Decimal, size: Decimal) {
        match side {
            Side::Buy => {
                if size <= Decimal::ZERO {
                    self.bids.remove(&Reverse(price));
                } else {
                    self.bids.insert(Reverse(price), size);
                }
            }
            Side::Sell => {
                if size <= Decimal::ZERO {
                    self.asks.remove(&price);
                } else {
                    self.asks.insert(price, size);
                }
            }
        }
    }

    /// Returns total bid depth (sum of all bid sizes).
    #[must_use]
    pub fn total_bid_depth(&self) -> Decimal {
        self.bids.values().copied().sum()
    }

    /// Returns total ask depth (sum of all ask sizes).
    #[must_use]
    pub fn total_ask_depth(&self) -> Decimal {
        self.asks.values().copied().sum()
    }

    /// Depth summed over the top `n` levels of one side.
    #[must_use]
    pub fn top_depth(&self, side: Side, n: usize) -> Decimal {
        match side {
            Side::Buy => self.bids.values().take(n).copied().sum(),
            Side::Sell => self.asks.values().take(n).copied().sum(),
        }
    }

    /// Top-of-book depth imbalance over the first `n` levels:
    /// `(bid_depth - ask_depth) / (bid_depth + ask_depth)`, in [-1, 1].
    ///
    /// Returns zero when both sides are empty.
    #[must_use]
    pub fn depth_imbalance(&self, n: usize) -> f64 {
        let bid = self.top_depth(Side::Buy, n);
        let ask = self.top_depth(Side::Sell, n);
        let total = bid + ask;
        if total == Decimal::ZERO {
            return 0.0;
        }
        ((bid - ask) / total).to_f64().unwrap_or(0.0)
    }

    /// Returns the number of bid levels.
    #[must_use]
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Returns the number of ask levels.
    #[must_use]
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Checks if the order book has any liquidity.
    #[must_use]
    pub fn has_liquidity(&self) -> bool {
        !self.bids.is_empty() || !self.asks.is_empty()
    }
}

impl Default for L2OrderBook {
    fn default() -> Self {
        Self::new(String::new())
    }
}

/// Key for a book in the [`BookStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BookKey {
    /// Venue the book belongs to.
    pub venue: Venue,
    /// Token id or symbol on that venue.
    pub token_id: String,
}

impl BookKey {
    /// Convenience constructor.
    #[must_use]
    pub fn new(venue: Venue, token_id: impl Into<String>) -> Self {
        Self {
            venue,
            token_id: token_id.into(),
        }
    }
}

/// Latest order books keyed by `(venue, token_id)`.
///
/// The store is owned and mutated exclusively by the engine task; feeds
/// deliver parsed snapshots and delta batches to it over channels.
#[derive(Debug, Default)]
pub struct BookStore {
    books: HashMap<BookKey, L2OrderBook>,
}

impl BookStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the book for a token with a full snapshot and stamps it.
    pub fn apply_snapshot(
        &mut self,
        venue: Venue,
        token_id: &str,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
        now_ms: i64,
    ) {
        let book = self
            .books
            .entry(BookKey::new(venue, token_id))
            .or_insert_with(|| L2OrderBook::new(token_id.to_string()));
        book.apply_snapshot(bids, asks);
        book.last_update_ms = Some(now_ms);
    }

    /// Applies a batch of level changes for one venue.
    ///
    /// Books are created on demand for unknown tokens. Returns the touched
    /// token ids, deduplicated and in first-touch order, so callers can fire
    /// per-token handling once per token rather than once per level.
    pub fn apply_deltas(&mut self, venue: Venue, changes: &[LevelChange], now_ms: i64) -> Vec<String> {
        let mut touched: Vec<String> = Vec::new();
        for change in changes {
            let book = self
                .books
                .entry(BookKey::new(venue, &change.token_id))
                .or_insert_with(|| L2OrderBook::new(change.token_id.clone()));
            book.apply_delta(change.side, change.price, change.size);
            book.last_update_ms = Some(now_ms);
            if !touched.iter().any(|t| t == &change.token_id) {
                touched.push(change.token_id.clone());
            }
        }
        touched
    }

    /// Returns the book for a token, if tracked.
    #[must_use]
    pub fn get(&self, venue: Venue, token_id: &str) -> Option<&L2OrderBook> {
        self.books.get(&BookKey::new(venue, token_id))
    }

    /// Number of tracked books.
    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Iterates over all tracked books.
    pub fn iter(&self) -> impl Iterator<Item = (&BookKey, &L2OrderBook)> {
        self.books.iter()
    }

    /// Drops books that have not been updated since `cutoff_ms`.
    pub fn prune_stale(&mut self, cutoff_ms: i64) -> usize {
        let before = self.books.len();
        self.books
            .retain(|_, b| b.last_update_ms.map_or(true, |ts| ts >= cutoff_ms));
        before - self.books.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_test_book() -> L2OrderBook {
        let mut book = L2OrderBook::new("test-token".to_string());
        book.apply_snapshot(
            vec![(dec!(0.48), dec!(100)), (dec!(0.47), dec!(200))],
            vec![(dec!(0.50), dec!(150)), (dec!(0.51), dec!(250))],
        );
        book
    }

    #[test]
    fn test_best_bid_and_ask() {
        let book = create_test_book();
        assert_eq!(book.best_bid(), Some(dec!(0.48)));
        assert_eq!(book.best_ask(), Some(dec!(0.50)));
        assert_eq!(book.best_bid_size(), Some(dec!(100)));
        assert_eq!(book.best_ask_size(), Some(dec!(150)));
    }

    #[test]
    fn test_spread_and_mid() {
        let book = create_test_book();
        assert_eq!(book.spread(), Some(dec!(0.02)));
        assert_eq!(book.mid_price(), dec!(0.49));
    }

    #[test]
    fn test_mid_degrades_to_single_side() {
        let mut book = L2OrderBook::new("one-sided".to_string());
        book.apply_snapshot(vec![(dec!(0.48), dec!(100))], vec![]);
        assert_eq!(book.mid_price(), dec!(0.48));

        let mut book = L2OrderBook::new("one-sided".to_string());
        book.apply_snapshot(vec![], vec![(dec!(0.52), dec!(100))]);
        assert_eq!(book.mid_price(), dec!(0.52));

        let empty = L2OrderBook::new("empty".to_string());
        assert_eq!(empty.mid_price(), Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_filters_zero_size() {
        let mut book = L2OrderBook::new("test".to_string());
        book.apply_snapshot(
            vec![(dec!(0.48), Decimal::ZERO), (dec!(0.47), dec!(100))],
            vec![(dec!(0.52), dec!(100)), (dec!(0.53), Decimal::ZERO)],
        );
        assert_eq!(book.bid_levels(), 1);
        assert_eq!(book.ask_levels(), 1);
    }

    #[test]
    fn test_delta_insert_update_remove() {
        let mut book = create_test_book();

        book.apply_delta(Side::Buy, dec!(0.49), dec!(50));
        assert_eq!(book.best_bid(), Some(dec!(0.49)));

        book.apply_delta(Side::Buy, dec!(0.49), dec!(75));
        assert_eq!(book.best_bid_size(), Some(dec!(75)));

        book.apply_delta(Side::Buy, dec!(0.49), Decimal::ZERO);
        assert_eq!(book.best_bid(), Some(dec!(0.48)));
    }

    #[test]
    fn test_sides_stay_sorted_after_updates() {
        let mut book = L2OrderBook::new("test".to_string());
        for (p, s) in [(dec!(0.40), dec!(1)), (dec!(0.45), dec!(2)), (dec!(0.42), dec!(3))] {
            book.apply_delta(Side::Buy, p, s);
        }
        for (p, s) in [(dec!(0.55), dec!(1)), (dec!(0.50), dec!(2)), (dec!(0.52), dec!(3))] {
            book.apply_delta(Side::Sell, p, s);
        }

        let bid_prices: Vec<Decimal> = book.bids.keys().map(|r| r.0).collect();
        assert_eq!(bid_prices, vec![dec!(0.45), dec!(0.42), dec!(0.40)]);

        let ask_prices: Vec<Decimal> = book.asks.keys().copied().collect();
        assert_eq!(ask_prices, vec![dec!(0.50), dec!(0.52), dec!(0.55)]);
    }

    #[test]
    fn test_depth_imbalance() {
        let mut book = L2OrderBook::new("test".to_string());
        book.apply_snapshot(
            vec![(dec!(0.48), dec!(300))],
            vec![(dec!(0.52), dec!(100))],
        );
        // (300 - 100) / 400 = 0.5
        assert!((book.depth_imbalance(5) - 0.5).abs() < 1e-9);

        let empty = L2OrderBook::new("empty".to_string());
        assert_eq!(empty.depth_imbalance(5), 0.0);
    }

    #[test]
    fn test_top_depth_limits_levels() {
        let mut book = L2OrderBook::new("test".to_string());
        book.apply_snapshot(
            vec![
                (dec!(0.48), dec!(10)),
                (dec!(0.47), dec!(10)),
                (dec!(0.46), dec!(10)),
            ],
            vec![],
        );
        assert_eq!(book.top_depth(Side::Buy, 2), dec!(20));
        assert_eq!(book.total_bid_depth(), dec!(30));
    }

    #[test]
    fn test_store_apply_deltas_dedupes_touched_tokens() {
        let mut store = BookStore::new();
        let changes = vec![
            LevelChange {
                token_id: "up".to_string(),
                side: Side::Sell,
                price: dec!(0.30),
                size: dec!(100),
            },
            LevelChange {
                token_id: "down".to_string(),
                side: Side::Sell,
                price: dec!(0.70),
                size: dec!(50),
            },
            LevelChange {
                token_id: "up".to_string(),
                side: Side::Buy,
                price: dec!(0.28),
                size: dec!(40),
            },
        ];

        let touched = store.apply_deltas(Venue::Polymarket, &changes, 1_000);
        assert_eq!(touched, vec!["up".to_string(), "down".to_string()]);
        assert_eq!(store.len(), 2);

        let up = store.get(Venue::Polymarket, "up").unwrap();
        assert_eq!(up.best_ask(), Some(dec!(0.30)));
        assert_eq!(up.best_bid(), Some(dec!(0.28)));
        assert_eq!(up.last_update_ms, Some(1_000));
    }

    #[test]
    fn test_store_snapshot_replaces_prior_state() {
        let mut store = BookStore::new();
        store.apply_snapshot(
            Venue::Polymarket,
            "up",
            vec![(dec!(0.30), dec!(10))],
            vec![(dec!(0.35), dec!(10))],
            1,
        );
        store.apply_snapshot(
            Venue::Polymarket,
            "up",
            vec![(dec!(0.40), dec!(5))],
            vec![],
            2,
        );

        let book = store.get(Venue::Polymarket, "up").unwrap();
        assert_eq!(book.best_bid(), Some(dec!(0.40)));
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.bid_levels(), 1);
    }

    #[test]
    fn test_store_prune_stale() {
        let mut store = BookStore::new();
        store.apply_snapshot(Venue::Hyperliquid, "BTC", vec![], vec![(dec!(100), dec!(1))], 1_000);
        store.apply_snapshot(Venue::Hyperliquid, "ETH", vec![], vec![(dec!(10), dec!(1))], 5_000);

        let dropped = store.prune_stale(2_000);
        assert_eq!(dropped, 1);
        assert!(store.get(Venue::Hyperliquid, "BTC").is_none());
        assert!(store.get(Venue::Hyperliquid, "ETH").is_some());
    }

    #[test]
    fn test_same_venue_different_tokens_are_distinct() {
        let mut store = BookStore::new();
        store.apply_snapshot(Venue::Hyperliquid, "BTC", vec![], vec![(dec!(100), dec!(1))], 1);
        store.apply_snapshot(Venue::Polymarket, "BTC", vec![], vec![(dec!(0.5), dec!(1))], 1);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(Venue::Hyperliquid, "BTC").unwrap().best_ask(),
            Some(dec!(100))
        );
        assert_eq!(
            store.get(Venue::Polymarket, "BTC").unwrap().best_ask(),
            Some(dec!(0.5))
        );
    }
}
