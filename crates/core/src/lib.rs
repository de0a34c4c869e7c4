//! Core types for the multi-venue paper trading engine: order books, the
//! paper wallet, engine configuration, the exchange-client contract, and
//! telemetry snapshot views.

pub mod book;
pub mod config;
pub mod telemetry;
pub mod traits;
pub mod wallet;

pub use book::{BookKey, BookStore, L2OrderBook, LevelChange, Side, Venue};
pub use config::{
    ArbConfig, BetConfig, DiscoveryConfig, EngineConfig, FlashCrashConfig, LeverageExitConfig,
    MomentumConfig, VenueConfig,
};
pub use telemetry::{
    BookView, EngineCounters, PositionView, StrategyView, TelemetrySnapshot, VenuePnlView,
    WalletView,
};
pub use traits::{ExchangeClient, VenueError};
pub use wallet::{
    leveraged_pnl, ClosedTrade, EquityPoint, ExitReason, PaperPosition, PaperWallet, PositionSide,
    StrategyStats, StrategyTag,
};
