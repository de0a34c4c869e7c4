//! HTTP/WebSocket transport for the engine's telemetry snapshots.

pub mod handlers;
pub mod server;
pub mod websocket;

pub use server::{ApiServer, ApiState};
