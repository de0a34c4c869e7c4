//! Polymarket CLOB integration: the WebSocket market-data feed and
//! deterministic up/down market discovery.
//!
//! The feed is push-only; order books live in the engine's store and the
//! paper wallet stands in for execution on this venue.

pub mod discovery;
pub mod models;
pub mod websocket;

pub use discovery::{DiscoveryClient, DiscoveryError, GAMMA_API_URL};
pub use models::{BetSide, GammaMarket, Timeframe, UpDownMarket};
pub use websocket::{ClobEvent, ClobFeed, ClobFeedConfig, ClobFeedError, CLOB_WS_URL};
