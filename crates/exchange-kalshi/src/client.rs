//! REST client for the Kalshi event-contract venue.
//!
//! Only the orderbook read path is wired up; order placement is simulated
//! and returns `NotConfigured` like the other bundled venues.
//!
//! Kalshi books quote both sides as resting YES/NO bids in cents. The
//! client maps them onto a conventional two-sided YES book: YES bids are
//! used directly and each NO bid at `p` cents becomes a YES ask at
//! `100 - p` cents, converted to dollars.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use paperbot_core::{ExchangeClient, L2OrderBook, Side, Venue, VenueError};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Production trade API base URL.
pub const KALSHI_API_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";

#[derive(Debug, Deserialize)]
struct OrderbookResponse {
    orderbook: WireOrderbook,
}

/// Levels arrive as `[price_cents, quantity]` pairs.
#[derive(Debug, Deserialize)]
struct WireOrderbook {
    #[serde(default)]
    yes: Option<Vec<[i64; 2]>>,
    #[serde(default)]
    no: Option<Vec<[i64; 2]>>,
}

pub struct KalshiClient {
    http: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl KalshiClient {
    /// Creates a client rate-limited to 10 requests per second.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(nonzero!(10u32)))),
        }
    }

    /// Fetches the YES-side book for a market ticker.
    ///
    /// # Errors
    /// Returns [`VenueError::Http`] on transport failure and
    /// [`VenueError::Parse`] on an unexpected body.
    pub async fn fetch_orderbook(&self, ticker: &str) -> Result<L2OrderBook, VenueError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/markets/{}/orderbook", self.base_url, ticker);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| VenueError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VenueError::Http(format!(
                "status {} for {ticker}",
                response.status()
            )));
        }
        let parsed: OrderbookResponse = response
            .json()
            .await
            .map_err(|e| VenueError::Parse(e.to_string()))?;

        let mut book = L2OrderBook::new(ticker.to_string());
        let cents = Decimal::ONE_HUNDRED;
        for [price, qty] in parsed.orderbook.yes.unwrap_or_default() {
            book.apply_delta(Side::Buy, Decimal::from(price) / cents, Decimal::from(qty));
        }
        for [price, qty] in parsed.orderbook.no.unwrap_or_default() {
            let ask = Decimal::from(100 - price) / cents;
            book.apply_delta(Side::Sell, ask, Decimal::from(qty));
        }
        Ok(book)
    }
}

#[async_trait]
impl ExchangeClient for KalshiClient {
    fn venue(&self) -> Venue {
        Venue::Kalshi
    }

    async fn get_orderbook(&self, symbol: &str) -> Result<Option<L2OrderBook>, VenueError> {
        let book = self.fetch_orderbook(symbol).await?;
        Ok(book.has_liquidity().then_some(book))
    }

    async fn place_limit(
        &self,
        _symbol: &str,
        _side: Side,
        _price: Decimal,
        _size: Decimal,
    ) -> Result<String, VenueError> {
        Err(VenueError::NotConfigured)
    }

    async fn place_market(
        &self,
        _symbol: &str,
        _side: Side,
        _size: Decimal,
    ) -> Result<String, VenueError> {
        Err(VenueError::NotConfigured)
    }

    async fn cancel(&self, _order_id: &str) -> Result<(), VenueError> {
        Err(VenueError::NotConfigured)
    }

    fn is_connected(&self) -> bool {
        true
    }
}
