//! Real-time spot price feed from Binance.
//!
//! Streams aggTrade events for the configured symbols over a combined
//! stream socket and pushes [`SpotTick`]s into a bounded channel consumed
//! by the engine. Each tick carries the price plus the 10 s and 30 s
//! percent changes computed from a per-symbol rolling history.
//!
//! # Architecture
//!
//! ```text
//! Binance WebSocket (combined aggTrade streams)
//!         │
//!         ▼
//! SpotFeed::run()        parse, update SpotChangeTracker
//!         │
//!         ▼
//! mpsc::Sender<SpotTick>  consumed by the engine task
//! ```

use chrono::Utc;
use futures_util::StreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Default Binance spot WebSocket endpoint.
pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// One spot price update delivered to the engine.
#[derive(Debug, Clone)]
pub struct SpotTick {
    /// Lowercase stream symbol (`btcusdt`).
    pub symbol: String,
    /// Trade price.
    pub price: Decimal,
    /// Fractional change over the last 10 s (0.003 = 0.3%).
    pub change_10s_pct: f64,
    /// Fractional change over the last 30 s.
    pub change_30s_pct: f64,
    /// Arrival timestamp, epoch ms.
    pub ts_ms: i64,
}

/// Errors from the spot feed.
#[derive(Error, Debug)]
pub enum SpotFeedError {
    /// WebSocket failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection closed.
    #[error("connection closed: {0}")]
    Closed(String),
}

/// Feed configuration.
#[derive(Debug, Clone)]
pub struct SpotFeedConfig {
    /// Base WebSocket URL.
    pub url: String,
    /// Symbols to stream, lowercase.
    pub symbols: Vec<String>,
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for SpotFeedConfig {
    fn default() -> Self {
        Self {
            url: BINANCE_WS_URL.to_string(),
            symbols: vec!["btcusdt".to_string()],
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Binance aggTrade payload (combined-stream inner object).
#[derive(Debug, Deserialize)]
struct AggTradeEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Combined-stream wrapper: `{"stream": "...", "data": {...}}`.
#[derive(Debug, Deserialize)]
struct CombinedFrame {
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Rolling per-symbol history used to derive 10 s / 30 s changes.
#[derive(Debug, Default)]
pub struct SpotChangeTracker {
    history: HashMap<String, VecDeque<(i64, Decimal)>>,
}

impl SpotChangeTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a price and returns the `(change_10s, change_30s)`
    /// fractional moves for the symbol.
    pub fn update(&mut self, symbol: &str, price: Decimal, ts_ms: i64) -> (f64, f64) {
        let history = self.history.entry(symbol.to_string()).or_default();
        history.push_back((ts_ms, price));
        while history
            .front()
            .is_some_and(|(ts, _)| ts_ms - ts > 35_000)
        {
            history.pop_front();
        }

        (
            Self::change_over(history, price, ts_ms, 10_000),
            Self::change_over(history, price, ts_ms, 30_000),
        )
    }

    /// Fractional change against the most recent sample at least
    /// `window_ms` old; zero when the history is too short.
    fn change_over(
        history: &VecDeque<(i64, Decimal)>,
        price: Decimal,
        now_ms: i64,
        window_ms: i64,
    ) -> f64 {
        let reference = history
            .iter()
            .rev()
            .find(|(ts, _)| now_ms - ts >= window_ms)
            .map(|(_, p)| *p);
        match reference {
            Some(old) if old > Decimal::ZERO => {
                ((price - old) / old).to_f64().unwrap_or(0.0)
            }
            _ => 0.0,
        }
    }
}

/// The spot price feed task.
pub struct SpotFeed {
    config: SpotFeedConfig,
    tracker: SpotChangeTracker,
    tick_tx: mpsc::Sender<SpotTick>,
}

impl SpotFeed {
    /// Creates a feed that delivers ticks to `tick_tx`.
    #[must_use]
    pub fn new(config: SpotFeedConfig, tick_tx: mpsc::Sender<SpotTick>) -> Self {
        Self {
            config,
            tracker: SpotChangeTracker::new(),
            tick_tx,
        }
    }

    fn build_url(&self) -> String {
        let streams: Vec<String> = self
            .config
            .symbols
            .iter()
            .map(|s| format!("{}@aggTrade", s.to_lowercase()))
            .collect();
        if streams.len() == 1 {
            format!("{}/{}", self.config.url, streams[0])
        } else {
            let base = self.config.url.trim_end_matches("/ws");
            format!("{}/stream?streams={}", base, streams.join("/"))
        }
    }

    /// Runs the feed until the tick channel closes, reconnecting on
    /// transport failures.
    pub async fn run(mut self) {
        loop {
            if self.tick_tx.is_closed() {
                info!("Spot feed consumer gone, stopping");
                return;
            }

            match self.connect_and_stream().await {
                Ok(()) => {
                    info!("Spot feed stream ended cleanly");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Spot feed disconnected, reconnecting");
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
            }
        }
    }

    async fn connect_and_stream(&mut self) -> Result<(), SpotFeedError> {
        let url = self.build_url();
        info!(%url, "Connecting to spot feed");
        let (ws_stream, _) = connect_async(&url).await?;
        let (_, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            match msg? {
                Message::Text(text) => {
                    if let Some(tick) = self.parse_frame(&text) {
                        if self.tick_tx.send(tick).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Message::Close(frame) => {
                    return Err(SpotFeedError::Closed(
                        frame.map_or_else(String::new, |f| f.reason.to_string()),
                    ));
                }
                _ => {}
            }
        }

        Err(SpotFeedError::Closed("stream ended".to_string()))
    }

    fn parse_frame(&mut self, text: &str) -> Option<SpotTick> {
        // Combined streams wrap the event; raw streams deliver it bare.
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Skipping unparseable spot frame");
                return None;
            }
        };
        let inner = match serde_json::from_value::<CombinedFrame>(value.clone()) {
            Ok(CombinedFrame { data: Some(data) }) => data,
            _ => value,
        };
        let event: AggTradeEvent = serde_json::from_value(inner).ok()?;
        if event.event_type != "aggTrade" {
            debug!(event_type = %event.event_type, "Ignoring spot event type");
            return None;
        }

        let price = Decimal::from_str(&event.price).ok()?;
        let ts_ms = if event.trade_time > 0 {
            event.trade_time
        } else {
            Utc::now().timestamp_millis()
        };
        let symbol = event.symbol.to_lowercase();
        let (change_10s_pct, change_30s_pct) = self.tracker.update(&symbol, price, ts_ms);

        Some(SpotTick {
            symbol,
            price,
            change_10s_pct,
            change_30s_pct,
            ts_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_change_tracker_windows() {
        let mut tracker = SpotChangeTracker::new();

        let (c10, c30) = tracker.update("btcusdt", dec!(100), 0);
        assert_eq!((c10, c30), (0.0, 0.0));

        // 5 s later: still no sample old enough for either window.
        let (c10, _) = tracker.update("btcusdt", dec!(101), 5_000);
        assert_eq!(c10, 0.0);

        // 12 s in: the t=0 sample anchors the 10 s change.
        let (c10, c30) = tracker.update("btcusdt", dec!(103), 12_000);
        assert!((c10 - 0.03).abs() < 1e-9);
        assert_eq!(c30, 0.0);

        // 31 s in: t=0 anchors the 30 s change, t=12 000 the 10 s one.
        let (c10, c30) = tracker.update("btcusdt", dec!(106), 31_000);
        assert!((c30 - 0.06).abs() < 1e-9);
        assert!((c10 - (106.0 - 103.0) / 103.0).abs() < 1e-9);
    }

    #[test]
    fn test_change_tracker_per_symbol_isolation() {
        let mut tracker = SpotChangeTracker::new();
        tracker.update("btcusdt", dec!(100), 0);
        tracker.update("ethusdt", dec!(10), 0);

        let (c10, _) = tracker.update("btcusdt", dec!(110), 11_000);
        assert!((c10 - 0.10).abs() < 1e-9);
        let (c10, _) = tracker.update("ethusdt", dec!(9), 11_000);
        assert!((c10 + 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_history_trimmed_past_35s() {
        let mut tracker = SpotChangeTracker::new();
        tracker.update("btcusdt", dec!(100), 0);
        tracker.update("btcusdt", dec!(200), 40_000);
        // The t=0 sample has been dropped, so no 30 s reference exists.
        let (_, c30) = tracker.update("btcusdt", dec!(210), 41_000);
        assert_eq!(c30, 0.0);
    }

    fn feed() -> SpotFeed {
        let (tx, _rx) = mpsc::channel(8);
        SpotFeed::new(SpotFeedConfig::default(), tx)
    }

    #[test]
    fn test_parse_raw_aggtrade_frame() {
        let mut feed = feed();
        let tick = feed
            .parse_frame(
                r#"{"e":"aggTrade","E":1706745600000,"s":"BTCUSDT","a":1,"p":"100000.50","q":"0.1","T":1706745600001,"m":false}"#,
            )
            .expect("tick");
        assert_eq!(tick.symbol, "btcusdt");
        assert_eq!(tick.price, dec!(100000.50));
        assert_eq!(tick.ts_ms, 1_706_745_600_001);
    }

    #[test]
    fn test_parse_combined_frame() {
        let mut feed = feed();
        let tick = feed
            .parse_frame(
                r#"{"stream":"ethusdt@aggTrade","data":{"e":"aggTrade","s":"ETHUSDT","p":"3000","T":5}}"#,
            )
            .expect("tick");
        assert_eq!(tick.symbol, "ethusdt");
        assert_eq!(tick.price, dec!(3000));
    }

    #[test]
    fn test_non_aggtrade_and_garbage_ignored() {
        let mut feed = feed();
        assert!(feed.parse_frame(r#"{"e":"depthUpdate","s":"BTCUSDT","p":"1","T":1}"#).is_none());
        assert!(feed.parse_frame("not json").is_none());
        assert!(feed.parse_frame(r#"{"result":null,"id":1}"#).is_none());
    }

    #[test]
    fn test_build_url_single_and_combined() {
        let (tx, _rx) = mpsc::channel(1);
        let single = SpotFeed::new(
            SpotFeedConfig {
                symbols: vec!["btcusdt".into()],
                ..Default::default()
            },
            tx.clone(),
        );
        assert_eq!(
            single.build_url(),
            "wss://stream.binance.com:9443/ws/btcusdt@aggTrade"
        );

        let combined = SpotFeed::new(
            SpotFeedConfig {
                symbols: vec!["btcusdt".into(), "ethusdt".into()],
                ..Default::default()
            },
            tx,
        );
        assert_eq!(
            combined.build_url(),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@aggTrade/ethusdt@aggTrade"
        );
    }
}
