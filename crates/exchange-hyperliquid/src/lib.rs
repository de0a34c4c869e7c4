//! Hyperliquid perps venue integration.

pub mod client;

pub use client::HyperliquidClient;
