//! The async engine shell: tick scheduler, event loop, and I/O.
//!
//! [`Engine::run`] owns the [`EngineState`] and is the only task that
//! mutates it. Four event sources feed the loop:
//!
//! - the 500 ms tick interval,
//! - CLOB WebSocket events (which bypass the tick for sub-tick reactions),
//! - external spot ticks,
//! - discovery rounds.
//!
//! Per the tick contract, nothing a tick body does may propagate out: any
//! failure is logged, the error counter increments, and the engine keeps
//! running. HTTP fetches inside a tick (the only suspension points) funnel
//! their results through [`EngineState::apply_fetched_book`] before any
//! decision logic runs.

use crate::state::EngineState;
use chrono::Utc;
use paperbot_core::{EngineConfig, ExchangeClient, TelemetrySnapshot, Venue};
use paperbot_hyperliquid::HyperliquidClient;
use paperbot_kalshi::KalshiClient;
use paperbot_polymarket::{ClobEvent, ClobFeed, DiscoveryClient, UpDownMarket};
use paperbot_signals::SpotTick;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Control handle for a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl EngineHandle {
    /// Requests a graceful stop: the tick timer disarms, feeds are shut
    /// down, and the in-flight tick completes before the task exits.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// The engine task.
pub struct Engine {
    state: EngineState,
    hl_client: Arc<HyperliquidClient>,
    kalshi_client: Arc<KalshiClient>,
    clob_feed: ClobFeed,
    clob_rx: mpsc::Receiver<ClobEvent>,
    spot_rx: mpsc::Receiver<SpotTick>,
    discovery_rx: mpsc::Receiver<Vec<UpDownMarket>>,
    shutdown_rx: mpsc::Receiver<()>,
    snapshot_tx: watch::Sender<Option<TelemetrySnapshot>>,
    hl_cursor: usize,
    kalshi_cursor: usize,
}

impl Engine {
    /// Assembles the engine from its feeds and venue clients.
    ///
    /// Returns the engine (to be `run` on its own task), a control handle,
    /// and the telemetry watch receiver for the dashboard transport.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: EngineConfig,
        hl_client: Arc<HyperliquidClient>,
        kalshi_client: Arc<KalshiClient>,
        clob_feed: ClobFeed,
        clob_rx: mpsc::Receiver<ClobEvent>,
        spot_rx: mpsc::Receiver<SpotTick>,
        discovery_rx: mpsc::Receiver<Vec<UpDownMarket>>,
    ) -> (Self, EngineHandle, watch::Receiver<Option<TelemetrySnapshot>>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let engine = Self {
            state: EngineState::new(config, Utc::now().timestamp_millis()),
            hl_client,
            kalshi_client,
            clob_feed,
            clob_rx,
            spot_rx,
            discovery_rx,
            shutdown_rx,
            snapshot_tx,
            hl_cursor: 0,
            kalshi_cursor: 0,
        };
        (engine, EngineHandle { shutdown_tx }, snapshot_rx)
    }

    /// Runs until [`EngineHandle::stop`] is called.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(Duration::from_millis(self.state.config.tick_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            starting_balance = %self.state.wallet.starting_balance,
            tick_interval_ms = self.state.config.tick_interval_ms,
            "Engine starting"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("Engine stop requested");
                    break;
                }

                Some(event) = self.clob_rx.recv() => {
                    self.state.on_clob_event(event, Utc::now().timestamp_millis());
                }

                Some(spot) = self.spot_rx.recv() => {
                    self.state.on_spot_tick(&spot);
                }

                Some(discovered) = self.discovery_rx.recv() => {
                    let tokens = self.state.merge_markets(discovered);
                    if !tokens.is_empty() {
                        self.clob_feed.subscribe_tokens(tokens).await;
                    }
                }

                _ = tick.tick() => {
                    self.on_tick().await;
                }
            }
        }

        self.clob_feed.shutdown().await;
        let final_snapshot = self.state.build_snapshot(Utc::now().timestamp_millis());
        let _ = self.snapshot_tx.send(Some(final_snapshot));
        info!(equity = self.state.equity_f64(), "Engine stopped");
    }

    /// One tick. Failures are swallowed after logging; the tick counter is
    /// monotonic either way, and a snapshot is published at the end.
    async fn on_tick(&mut self) {
        self.state.counters.tick_count += 1;

        if let Err(e) = self.tick_inner().await {
            self.state.counters.tick_errors += 1;
            error!(error = %e, "Tick failed");
        }

        let snapshot = self.state.build_snapshot(Utc::now().timestamp_millis());
        let _ = self.snapshot_tx.send(Some(snapshot));
    }

    async fn tick_inner(&mut self) -> anyhow::Result<()> {
        // Sub-step 1: refresh a rotating batch of perps books. Individual
        // fetch failures are transient I/O and never abort the tick.
        let symbols = next_batch(
            &self.state.config.venues.hyperliquid_symbols,
            &mut self.hl_cursor,
            self.state.config.venues.hyperliquid_batch_size,
        );
        for symbol in symbols {
            match self.hl_client.get_orderbook(&symbol).await {
                Ok(Some(book)) => {
                    let now_ms = Utc::now().timestamp_millis();
                    self.state
                        .apply_fetched_book(Venue::Hyperliquid, &symbol, &book, now_ms);
                }
                Ok(None) => {}
                Err(e) => warn!(%symbol, error = %e, "Perps book fetch failed"),
            }
        }

        // Sub-step 2: a bounded slice of event-venue books.
        let tickers = next_batch(
            &self.state.config.venues.kalshi_tickers,
            &mut self.kalshi_cursor,
            self.state.config.venues.kalshi_batch_size,
        );
        for ticker in tickers {
            match self.kalshi_client.get_orderbook(&ticker).await {
                Ok(Some(book)) => {
                    let now_ms = Utc::now().timestamp_millis();
                    self.state
                        .apply_fetched_book(Venue::Kalshi, &ticker, &book, now_ms);
                }
                Ok(None) => {}
                Err(e) => warn!(%ticker, error = %e, "Event-venue book fetch failed"),
            }
        }

        // Sub-steps 3-9 run synchronously on the refreshed state.
        self.state.tick_sync(Utc::now().timestamp_millis());
        Ok(())
    }
}

/// Next round-robin batch of up to `batch_size` entries, wrapping so every
/// symbol refreshes every `ceil(len / batch_size)` ticks.
fn next_batch(symbols: &[String], cursor: &mut usize, batch_size: usize) -> Vec<String> {
    if symbols.is_empty() || batch_size == 0 {
        return Vec::new();
    }
    let take = batch_size.min(symbols.len());
    let mut batch = Vec::with_capacity(take);
    for i in 0..take {
        batch.push(symbols[(*cursor + i) % symbols.len()].clone());
    }
    *cursor = (*cursor + take) % symbols.len();
    batch
}

/// Spawns the discovery cadence: every `refresh_interval_s` the client
/// resolves the current and previous windows for every tracked asset and
/// hands the results to the engine.
pub fn spawn_discovery(
    client: DiscoveryClient,
    assets: Vec<String>,
    refresh_interval_s: u64,
    tx: mpsc::Sender<Vec<UpDownMarket>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(refresh_interval_s.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let now_ms = Utc::now().timestamp_millis();
            let markets = client.discover(&assets, now_ms).await;
            if !markets.is_empty() && tx.send(markets).await.is_err() {
                return;
            }
            if tx.is_closed() {
                return;
            }
        }
    })
}
