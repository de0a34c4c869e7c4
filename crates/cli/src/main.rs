use clap::Parser;
use paperbot_core::EngineConfig;
use paperbot_engine::{spawn_discovery, Engine};
use paperbot_hyperliquid::HyperliquidClient;
use paperbot_kalshi::KalshiClient;
use paperbot_polymarket::{ClobFeed, ClobFeedConfig, DiscoveryClient};
use paperbot_signals::{SpotFeed, SpotFeedConfig};
use paperbot_web_api::ApiServer;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "paperbot")]
#[command(about = "Multi-venue paper trading engine", long_about = None)]
struct Cli {
    /// Starting paper balance in dollars.
    #[arg(long, env = "STARTING_BALANCE")]
    starting_balance: Option<Decimal>,

    /// Port the telemetry server listens on.
    #[arg(long, env = "TELEMETRY_PORT")]
    telemetry_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Fatal configuration errors refuse to start the engine.
    let mut config = EngineConfig::from_env()?;
    if let Some(balance) = cli.starting_balance {
        anyhow::ensure!(balance > Decimal::ZERO, "starting balance must be positive");
        config.starting_balance = balance;
    }
    if let Some(port) = cli.telemetry_port {
        config.telemetry_port = port;
    }

    tracing::info!(
        starting_balance = %config.starting_balance,
        telemetry_port = config.telemetry_port,
        assets = ?config.discovery.assets,
        "Starting paperbot"
    );

    // Venue clients.
    let hl_client = Arc::new(HyperliquidClient::new(config.venues.hyperliquid_api_url.clone()));
    let kalshi_client = Arc::new(KalshiClient::new(config.venues.kalshi_api_url.clone()));

    // CLOB market-data feed; discovery registers tokens as markets appear.
    let (clob_feed, clob_rx) = ClobFeed::start(
        Vec::new(),
        ClobFeedConfig {
            url: config.venues.polymarket_ws_url.clone(),
            ..Default::default()
        },
    );

    // External spot feed.
    let (spot_tx, spot_rx) = mpsc::channel(1024);
    let spot_feed = SpotFeed::new(
        SpotFeedConfig {
            url: config.venues.binance_ws_url.clone(),
            symbols: config.venues.spot_symbols.clone(),
            ..Default::default()
        },
        spot_tx,
    );
    tokio::spawn(spot_feed.run());

    // Market discovery cadence.
    let (discovery_tx, discovery_rx) = mpsc::channel(8);
    let discovery_task = spawn_discovery(
        DiscoveryClient::new(config.venues.gamma_api_url.clone()),
        config.discovery.assets.clone(),
        config.discovery.refresh_interval_s,
        discovery_tx,
    );

    // The engine owns all mutable state on a single task.
    let telemetry_port = config.telemetry_port;
    let (engine, engine_handle, snapshot_rx) = Engine::new(
        config,
        hl_client,
        kalshi_client,
        clob_feed,
        clob_rx,
        spot_rx,
        discovery_rx,
    );
    let engine_task = tokio::spawn(engine.run());

    // Telemetry transport.
    let api = ApiServer::new(snapshot_rx);
    let api_addr = format!("0.0.0.0:{telemetry_port}");
    tokio::spawn(async move {
        if let Err(e) = api.serve(&api_addr).await {
            tracing::error!(error = %e, "Telemetry server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    engine_handle.stop().await;
    discovery_task.abort();
    engine_task.await?;

    Ok(())
}
