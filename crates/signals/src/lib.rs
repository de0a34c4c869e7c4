//! Spot price ingestion and momentum detection.

pub mod momentum;
pub mod price_buffer;
pub mod spot_feed;

pub use momentum::{MomentumDetector, MomentumSignal};
pub use price_buffer::{PriceBuffer, PricePoint};
pub use spot_feed::{SpotChangeTracker, SpotFeed, SpotFeedConfig, SpotFeedError, SpotTick, BINANCE_WS_URL};
