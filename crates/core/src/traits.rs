//! The venue-polymorphic exchange client contract.

use crate::book::{L2OrderBook, Side, Venue};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by venue clients.
#[derive(Error, Debug)]
pub enum VenueError {
    /// Order placement attempted against a simulated venue.
    #[error("order placement not configured for this venue")]
    NotConfigured,

    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(String),

    /// Response could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Polymorphic venue client.
///
/// The bundled venues are simulated: market data is real, but
/// `place_limit` / `place_market` / `cancel` return
/// [`VenueError::NotConfigured`] and the paper wallet stands in for
/// execution. A live adapter implements the same contract.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Which venue this client talks to.
    fn venue(&self) -> Venue;

    /// Fetches the current order book for a symbol, `None` if the venue
    /// does not know the symbol.
    async fn get_orderbook(&self, symbol: &str) -> Result<Option<L2OrderBook>, VenueError>;

    /// Places a limit order, returning the venue order id.
    async fn place_limit(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<String, VenueError>;

    /// Places a market order, returning the venue order id.
    async fn place_market(&self, symbol: &str, side: Side, size: Decimal)
        -> Result<String, VenueError>;

    /// Cancels an order by id.
    async fn cancel(&self, order_id: &str) -> Result<(), VenueError>;

    /// Whether the client currently considers itself connected.
    fn is_connected(&self) -> bool;
}
