//! WebSocket market-data feed for the Polymarket CLOB.
//!
//! The feed keeps one socket open for every subscribed token id and turns
//! the wire events into typed [`ClobEvent`]s on a bounded channel consumed
//! by the engine task. The feed itself owns no book state: snapshots and
//! delta batches are forwarded as parsed levels and the engine's book store
//! applies them, which keeps a single writer for all shared state.
//!
//! Wire behavior:
//!
//! - Subscription message: `{"assets_ids": [...], "type": "market"}`.
//!   Adding tokens later re-sends the subscription with the **full
//!   accumulated** token list, and reconnects do the same, so a fresh
//!   socket always carries every token seen so far.
//! - Events arrive as a single object or an array of objects.
//! - `price_change` batches level updates; the whole batch is forwarded as
//!   one [`ClobEvent::Deltas`] so downstream handling fires once per
//!   touched token, not once per level.
//! - The literal text frame `"PING"` is a heartbeat: inbound copies are
//!   filtered before JSON parsing and the client sends `"PING"` every 10 s
//!   while the socket is open.
//! - Disconnects trigger exponential-backoff reconnects, 3 s doubling to a
//!   30 s cap, reset after a successful open.

use futures_util::{SinkExt, StreamExt};
use paperbot_core::{LevelChange, Side};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Default CLOB market channel endpoint.
pub const CLOB_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

/// Events emitted by the feed.
#[derive(Debug, Clone)]
pub enum ClobEvent {
    /// Full book snapshot for one token.
    Snapshot {
        /// Token id.
        token_id: String,
        /// Bid levels, unsorted as received.
        bids: Vec<(Decimal, Decimal)>,
        /// Ask levels, unsorted as received.
        asks: Vec<(Decimal, Decimal)>,
    },
    /// A batch of incremental level changes (possibly several tokens).
    Deltas {
        /// Level changes in wire order.
        changes: Vec<LevelChange>,
    },
    /// Trade print.
    Trade {
        /// Token id.
        token_id: String,
        /// Execution price.
        price: Decimal,
        /// Trade size.
        size: Decimal,
    },
    /// Socket opened and subscription sent.
    Connected,
    /// Socket lost; the feed will reconnect unless shut down.
    Disconnected {
        /// Human-readable reason.
        reason: String,
    },
}

/// Feed configuration.
#[derive(Debug, Clone)]
pub struct ClobFeedConfig {
    /// WebSocket URL.
    pub url: String,
    /// First reconnect delay.
    pub initial_reconnect_delay: Duration,
    /// Reconnect delay cap.
    pub max_reconnect_delay: Duration,
    /// Heartbeat cadence.
    pub ping_interval: Duration,
    /// Event channel capacity.
    pub channel_buffer_size: usize,
}

impl Default for ClobFeedConfig {
    fn default() -> Self {
        Self {
            url: CLOB_WS_URL.to_string(),
            initial_reconnect_delay: Duration::from_secs(3),
            max_reconnect_delay: Duration::from_secs(30),
            ping_interval: Duration::from_secs(10),
            channel_buffer_size: 1024,
        }
    }
}

/// Errors from the feed.
#[derive(Error, Debug)]
pub enum ClobFeedError {
    /// Initial or re-connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Underlying WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON parse failure.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

enum FeedCommand {
    Resubscribe,
    Shutdown,
}

/// Handle to a running CLOB feed.
#[derive(Clone)]
pub struct ClobFeed {
    tokens: Arc<RwLock<Vec<String>>>,
    command_tx: mpsc::Sender<FeedCommand>,
}

impl ClobFeed {
    /// Starts the feed with an initial token set.
    ///
    /// Returns the handle and the event receiver. The connection task runs
    /// until [`ClobFeed::shutdown`] is called.
    #[must_use]
    pub fn start(
        initial_tokens: Vec<String>,
        config: ClobFeedConfig,
    ) -> (Self, mpsc::Receiver<ClobEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.channel_buffer_size);
        let (command_tx, command_rx) = mpsc::channel(16);
        let tokens = Arc::new(RwLock::new(initial_tokens));

        tokio::spawn(run_connection_loop(
            config,
            Arc::clone(&tokens),
            event_tx,
            command_rx,
        ));

        (Self { tokens, command_tx }, event_rx)
    }

    /// Adds token ids to the subscription.
    ///
    /// New ids are merged into the accumulated list and the live socket is
    /// asked to re-send the full subscription; a later reconnect picks the
    /// same list up automatically.
    pub async fn subscribe_tokens(&self, new_tokens: Vec<String>) {
        let mut added = false;
        {
            let mut tokens = self.tokens.write();
            for token in new_tokens {
                if !tokens.contains(&token) {
                    tokens.push(token);
                    added = true;
                }
            }
        }
        if added {
            let _ = self.command_tx.send(FeedCommand::Resubscribe).await;
        }
    }

    /// Currently subscribed token ids.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.read().clone()
    }

    /// Stops the feed and closes the socket.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(FeedCommand::Shutdown).await;
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct SubscriptionMessage<'a> {
    assets_ids: &'a [String],
    #[serde(rename = "type")]
    msg_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct WsMessage {
    event_type: String,
    #[serde(flatten)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BookMessage {
    asset_id: String,
    bids: Vec<WireLevel>,
    asks: Vec<WireLevel>,
}

#[derive(Debug, Deserialize)]
struct WireLevel {
    price: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct PriceChangeMessage {
    #[serde(default)]
    price_changes: Vec<WirePriceChange>,
    // Single-change format used by older frames.
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    side: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePriceChange {
    asset_id: String,
    price: String,
    size: String,
    side: String,
}

#[derive(Debug, Deserialize)]
struct LastTradePriceMessage {
    asset_id: String,
    price: String,
    #[serde(default)]
    size: Option<String>,
}

// ============================================================================
// Connection loop
// ============================================================================

async fn run_connection_loop(
    config: ClobFeedConfig,
    tokens: Arc<RwLock<Vec<String>>>,
    event_tx: mpsc::Sender<ClobEvent>,
    mut command_rx: mpsc::Receiver<FeedCommand>,
) {
    let mut reconnect_delay = config.initial_reconnect_delay;

    loop {
        info!(url = %config.url, tokens = tokens.read().len(), "Connecting to CLOB WebSocket");

        match connect_and_run(&config, &tokens, &event_tx, &mut command_rx, &mut reconnect_delay).await {
            Ok(()) => {
                info!("CLOB feed shut down");
                break;
            }
            Err(e) => {
                warn!(error = %e, "CLOB WebSocket connection lost");
                let _ = event_tx
                    .send(ClobEvent::Disconnected { reason: e.to_string() })
                    .await;

                // Drain a shutdown issued while we were down.
                if let Ok(FeedCommand::Shutdown) = command_rx.try_recv() {
                    break;
                }

                info!(delay = ?reconnect_delay, "Waiting before reconnect");
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
            }
        }
    }
}

async fn connect_and_run(
    config: &ClobFeedConfig,
    tokens: &Arc<RwLock<Vec<String>>>,
    event_tx: &mpsc::Sender<ClobEvent>,
    command_rx: &mut mpsc::Receiver<FeedCommand>,
    reconnect_delay: &mut Duration,
) -> Result<(), ClobFeedError> {
    let (ws_stream, _) = connect_async(&config.url)
        .await
        .map_err(|e| ClobFeedError::ConnectionFailed(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    // Always subscribe with the full accumulated list, not a delta. A
    // successful open also resets the backoff.
    send_subscription(&mut write, tokens).await?;
    *reconnect_delay = config.initial_reconnect_delay;
    let _ = event_tx.send(ClobEvent::Connected).await;

    let mut ping_interval = tokio::time::interval(config.ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(FeedCommand::Resubscribe) => {
                        send_subscription(&mut write, tokens).await?;
                    }
                    Some(FeedCommand::Shutdown) | None => {
                        let _ = write.close().await;
                        return Ok(());
                    }
                }
            }

            _ = ping_interval.tick() => {
                write.send(Message::Text("PING".to_string())).await?;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Heartbeat frames are filtered before parse.
                        if text.trim() == "PING" || text.trim() == "PONG" {
                            continue;
                        }
                        if let Err(e) = process_frame(&text, event_tx).await {
                            warn!(error = %e, "Skipping unparseable CLOB frame");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Err(ClobFeedError::ConnectionFailed(
                            frame.map_or_else(|| "connection closed".to_string(), |f| f.reason.to_string()),
                        ));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ClobFeedError::WebSocket(e)),
                    None => return Err(ClobFeedError::ConnectionFailed("stream ended".to_string())),
                }
            }
        }
    }
}

async fn send_subscription<S>(write: &mut S, tokens: &Arc<RwLock<Vec<String>>>) -> Result<(), ClobFeedError>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let token_list = tokens.read().clone();
    let sub = SubscriptionMessage {
        assets_ids: &token_list,
        msg_type: "market",
    };
    let json = serde_json::to_string(&sub)?;
    debug!(tokens = token_list.len(), "Sending CLOB subscription");
    write
        .send(Message::Text(json))
        .await
        .map_err(ClobFeedError::WebSocket)
}

async fn process_frame(text: &str, event_tx: &mpsc::Sender<ClobEvent>) -> Result<(), ClobFeedError> {
    // The server delivers either a single event object or an array of them.
    let messages: Vec<WsMessage> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text)?
    } else {
        vec![serde_json::from_str(text)?]
    };

    for msg in messages {
        match msg.event_type.as_str() {
            "book" => {
                let book: BookMessage = serde_json::from_value(msg.data)?;
                let _ = event_tx
                    .send(ClobEvent::Snapshot {
                        token_id: book.asset_id,
                        bids: parse_levels(&book.bids),
                        asks: parse_levels(&book.asks),
                    })
                    .await;
            }
            "price_change" => {
                let change: PriceChangeMessage = serde_json::from_value(msg.data)?;
                let changes = collect_changes(&change);
                if !changes.is_empty() {
                    let _ = event_tx.send(ClobEvent::Deltas { changes }).await;
                }
            }
            "last_trade_price" => {
                let trade: LastTradePriceMessage = serde_json::from_value(msg.data)?;
                let _ = event_tx
                    .send(ClobEvent::Trade {
                        token_id: trade.asset_id,
                        price: parse_decimal(&trade.price),
                        size: trade.size.as_deref().map(parse_decimal).unwrap_or_default(),
                    })
                    .await;
            }
            other => {
                debug!(event_type = %other, "Ignoring CLOB event type");
            }
        }
    }

    Ok(())
}

fn collect_changes(msg: &PriceChangeMessage) -> Vec<LevelChange> {
    let mut changes: Vec<LevelChange> = msg
        .price_changes
        .iter()
        .filter_map(|c| {
            Some(LevelChange {
                token_id: c.asset_id.clone(),
                side: parse_side(&c.side)?,
                price: parse_decimal(&c.price),
                size: parse_decimal(&c.size),
            })
        })
        .collect();

    // Single-change frames carry the fields at the top level instead.
    if let (Some(asset_id), Some(price), Some(size), Some(side)) =
        (&msg.asset_id, &msg.price, &msg.size, &msg.side)
    {
        if let Some(side) = parse_side(side) {
            changes.push(LevelChange {
                token_id: asset_id.clone(),
                side,
                price: parse_decimal(price),
                size: parse_decimal(size),
            });
        }
    }

    changes
}

/// Parses a decimal string, tolerating the CLOB's `".48"` form.
fn parse_decimal(s: &str) -> Decimal {
    let normalized = if s.starts_with('.') {
        format!("0{s}")
    } else {
        s.to_string()
    };
    Decimal::from_str(&normalized).unwrap_or(Decimal::ZERO)
}

/// Maps the wire side. Malformed sides yield `None` and the level is
/// skipped silently.
fn parse_side(s: &str) -> Option<Side> {
    match s.to_ascii_lowercase().as_str() {
        "buy" | "bid" | "b" => Some(Side::Buy),
        "sell" | "ask" | "s" => Some(Side::Sell),
        _ => None,
    }
}

fn parse_levels(levels: &[WireLevel]) -> Vec<(Decimal, Decimal)> {
    levels
        .iter()
        .filter_map(|level| {
            let price = parse_decimal(&level.price);
            let size = parse_decimal(&level.size);
            (size > Decimal::ZERO).then_some((price, size))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal_formats() {
        assert_eq!(parse_decimal("0.48"), dec!(0.48));
        assert_eq!(parse_decimal(".48"), dec!(0.48));
        assert_eq!(parse_decimal("100"), dec!(100));
        assert_eq!(parse_decimal("junk"), Decimal::ZERO);
    }

    #[test]
    fn test_parse_side_variants() {
        assert_eq!(parse_side("buy"), Some(Side::Buy));
        assert_eq!(parse_side("BUY"), Some(Side::Buy));
        assert_eq!(parse_side("bid"), Some(Side::Buy));
        assert_eq!(parse_side("sell"), Some(Side::Sell));
        assert_eq!(parse_side("ask"), Some(Side::Sell));
        assert_eq!(parse_side("sideways"), None);
    }

    #[tokio::test]
    async fn test_book_snapshot_frame() {
        let (tx, mut rx) = mpsc::channel(8);
        let json = r#"{
            "event_type": "book",
            "asset_id": "token-123",
            "market": "0xmarket",
            "bids": [{"price": ".48", "size": "100"}, {"price": ".47", "size": "0"}],
            "asks": [{"price": ".52", "size": "150"}],
            "timestamp": "1706745600000"
        }"#;

        process_frame(json, &tx).await.unwrap();
        match rx.recv().await.unwrap() {
            ClobEvent::Snapshot { token_id, bids, asks } => {
                assert_eq!(token_id, "token-123");
                assert_eq!(bids, vec![(dec!(0.48), dec!(100))]); // zero-size dropped
                assert_eq!(asks, vec![(dec!(0.52), dec!(150))]);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_price_change_batch_is_one_event() {
        let (tx, mut rx) = mpsc::channel(8);
        let json = r#"{
            "event_type": "price_change",
            "market": "0xmarket",
            "price_changes": [
                {"asset_id": "tok-a", "price": ".49", "size": "50", "side": "BUY"},
                {"asset_id": "tok-a", "price": ".51", "size": "0", "side": "SELL"},
                {"asset_id": "tok-b", "price": ".30", "size": "25", "side": "bid"}
            ]
        }"#;

        process_frame(json, &tx).await.unwrap();
        match rx.recv().await.unwrap() {
            ClobEvent::Deltas { changes } => {
                assert_eq!(changes.len(), 3);
                assert_eq!(changes[0].token_id, "tok-a");
                assert_eq!(changes[0].side, Side::Buy);
                assert_eq!(changes[1].size, Decimal::ZERO);
                assert_eq!(changes[2].token_id, "tok-b");
            }
            other => panic!("expected deltas, got {other:?}"),
        }
        assert!(rx.try_recv().is_err(), "batch must produce a single event");
    }

    #[tokio::test]
    async fn test_single_change_legacy_frame() {
        let (tx, mut rx) = mpsc::channel(8);
        let json = r#"{
            "event_type": "price_change",
            "asset_id": "tok-a",
            "price": ".50",
            "size": "75",
            "side": "sell"
        }"#;

        process_frame(json, &tx).await.unwrap();
        match rx.recv().await.unwrap() {
            ClobEvent::Deltas { changes } => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].side, Side::Sell);
                assert_eq!(changes[0].price, dec!(0.50));
            }
            other => panic!("expected deltas, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_array_of_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let json = r#"[
            {"event_type": "book", "asset_id": "tok-a", "bids": [], "asks": [{"price": ".60", "size": "10"}]},
            {"event_type": "last_trade_price", "asset_id": "tok-a", "price": ".59", "size": "5", "side": "BUY"}
        ]"#;

        process_frame(json, &tx).await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), ClobEvent::Snapshot { .. }));
        match rx.recv().await.unwrap() {
            ClobEvent::Trade { token_id, price, size } => {
                assert_eq!(token_id, "tok-a");
                assert_eq!(price, dec!(0.59));
                assert_eq!(size, dec!(5));
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_level_skipped_silently() {
        let (tx, mut rx) = mpsc::channel(8);
        let json = r#"{
            "event_type": "price_change",
            "price_changes": [
                {"asset_id": "tok-a", "price": ".49", "size": "50", "side": "HOLD"},
                {"asset_id": "tok-a", "price": ".48", "size": "10", "side": "BUY"}
            ]
        }"#;

        process_frame(json, &tx).await.unwrap();
        match rx.recv().await.unwrap() {
            ClobEvent::Deltas { changes } => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].price, dec!(0.48));
            }
            other => panic!("expected deltas, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_frame_is_error_not_panic() {
        let (tx, _rx) = mpsc::channel(8);
        assert!(process_frame("not json", &tx).await.is_err());
    }
}
