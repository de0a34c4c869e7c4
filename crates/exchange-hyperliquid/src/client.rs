//! Rate-limited HTTP client for the Hyperliquid `/info` endpoint.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use paperbot_core::{ExchangeClient, L2OrderBook, Side, Venue, VenueError};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// One price level in an `l2Book` response.
#[derive(Debug, Deserialize)]
struct WireLevel {
    px: String,
    sz: String,
}

/// `l2Book` response body: `levels[0]` are bids, `levels[1]` are asks.
#[derive(Debug, Deserialize)]
struct L2BookResponse {
    #[serde(default)]
    levels: Vec<Vec<WireLevel>>,
}

pub struct HyperliquidClient {
    http_client: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl HyperliquidClient {
    /// Creates a new client. Requests are limited to 20 per second
    /// (Hyperliquid allows 1200 per minute).
    ///
    /// # Panics
    /// Panics if the rate limiter quota cannot be created.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(20).unwrap());
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            base_url,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn post_info(&self, body: serde_json::Value) -> Result<serde_json::Value, VenueError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/info", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VenueError::Http(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| VenueError::Parse(e.to_string()))
    }

    /// Fetches the L2 book for a perps symbol.
    ///
    /// # Errors
    /// Returns [`VenueError::Http`] on transport failure and
    /// [`VenueError::Parse`] when the body is not an `l2Book` payload.
    pub async fn fetch_l2_book(&self, symbol: &str) -> Result<L2OrderBook, VenueError> {
        let body = serde_json::json!({ "type": "l2Book", "coin": symbol });
        let value = self.post_info(body).await?;
        let parsed: L2BookResponse =
            serde_json::from_value(value).map_err(|e| VenueError::Parse(e.to_string()))?;

        let mut book = L2OrderBook::new(symbol.to_string());
        let mut sides = parsed.levels.into_iter();
        for (side, levels) in [Side::Buy, Side::Sell].into_iter().zip(sides.by_ref()) {
            for level in levels {
                let price = Decimal::from_str(&level.px)
                    .map_err(|e| VenueError::Parse(e.to_string()))?;
                let size = Decimal::from_str(&level.sz)
                    .map_err(|e| VenueError::Parse(e.to_string()))?;
                book.apply_delta(side, price, size);
            }
        }
        Ok(book)
    }
}

#[async_trait]
impl ExchangeClient for HyperliquidClient {
    fn venue(&self) -> Venue {
        Venue::Hyperliquid
    }

    async fn get_orderbook(&self, symbol: &str) -> Result<Option<L2OrderBook>, VenueError> {
        let book = self.fetch_l2_book(symbol).await?;
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
