//! Kalshi event-contract venue integration.

pub mod client;

pub use client::{KalshiClient, KALSHI_API_URL};
