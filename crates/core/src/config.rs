//! Engine configuration.
//!
//! Every numeric knob in the engine lives here with its default. Values can
//! be overridden from the environment with the `PAPERBOT_` prefix and `__`
//! as the section separator, e.g. `PAPERBOT_STARTING_BALANCE=250` or
//! `PAPERBOT_BETS__MAX_OPEN_BETS=10`.

use figment::providers::{Env, Serialized};
use figment::Figment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Starting paper balance in dollars.
    pub starting_balance: Decimal,
    /// Port the telemetry server listens on.
    pub telemetry_port: u16,
    /// Tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Equity-curve cap before the window slides.
    pub equity_curve_cap: usize,
    /// Trade-log cap.
    pub trade_log_cap: usize,
    /// Cooldown/order timestamps older than this are garbage-collected.
    pub stale_order_gc_ms: i64,
    /// Any position still open after this long is force-closed at the best
    /// available price, a backstop behind the per-strategy exits.
    pub position_backstop_ms: i64,
    /// Number of books included in a telemetry snapshot.
    pub snapshot_book_limit: usize,
    /// Venue endpoints and tracked symbols.
    pub venues: VenueConfig,
    /// Momentum detection and sizing.
    pub momentum: MomentumConfig,
    /// Leveraged position exits.
    pub leverage_exits: LeverageExitConfig,
    /// Binary up/down bet selection.
    pub bets: BetConfig,
    /// Complete-set arbitrage.
    pub arb: ArbConfig,
    /// Flash-crash detection.
    pub flash_crash: FlashCrashConfig,
    /// Binary-market discovery.
    pub discovery: DiscoveryConfig,
}

/// Endpoints and tracked instruments per venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Perps venue REST endpoint.
    pub hyperliquid_api_url: String,
    /// Perps symbols whose books are refreshed round-robin.
    pub hyperliquid_symbols: Vec<String>,
    /// Symbols refreshed per tick.
    pub hyperliquid_batch_size: usize,
    /// CLOB market-data WebSocket endpoint.
    pub polymarket_ws_url: String,
    /// Market-metadata (Gamma) endpoint for slug discovery.
    pub gamma_api_url: String,
    /// Event venue REST endpoint.
    pub kalshi_api_url: String,
    /// Event-venue tickers refreshed in a bounded slice each tick.
    pub kalshi_tickers: Vec<String>,
    /// Event-venue tickers refreshed per tick.
    pub kalshi_batch_size: usize,
    /// Spot feed WebSocket endpoint.
    pub binance_ws_url: String,
    /// Spot symbols streamed from the external feed.
    pub spot_symbols: Vec<String>,
}

/// Momentum detector and momentum-trade sizing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumConfig {
    /// Window `W` of price ticks inspected per event.
    pub window: usize,
    /// Minimum consecutive same-sign deltas `C`.
    pub min_consecutive: usize,
    /// Minimum relative move `M` from run start to end.
    pub min_move_pct: f64,
    /// Secondary trigger: fire when `|change_10s| > large_move_pct`.
    pub large_move_pct: f64,
    /// Book-confirmation depth levels.
    pub confirm_levels: usize,
    /// Imbalance beyond which the book opposes the signal.
    pub opposing_imbalance: f64,
    /// Fraction of equity scaffolding a momentum position's margin.
    pub size_pct: Decimal,
    /// Leverage applied to momentum positions.
    pub leverage: u32,
    /// Cash floor preserved for momentum trades.
    pub cash_floor: Decimal,
}

/// Trailing-stop / stop-loss / time-exit parameters for leveraged positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageExitConfig {
    /// Hard stop distance from entry.
    pub stop_loss_pct: f64,
    /// Profit fraction that arms the trailing stop.
    pub trail_activate_pct: f64,
    /// Fraction of peak profit that may be given back while trailing.
    pub trail_giveback: f64,
    /// Maximum hold time in milliseconds.
    pub max_hold_ms: i64,
}

/// Binary up/down bet selection and sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetConfig {
    /// Base bet size as a fraction of equity.
    pub base_size_pct: f64,
    /// Ceiling on the final size fraction.
    pub max_size_pct: f64,
    /// Smallest bet worth placing, in dollars.
    pub min_trade_size: Decimal,
    /// Per-asset cooldown between bets, milliseconds.
    pub cooldown_ms: i64,
    /// Global cap on simultaneous open positions.
    pub max_open_positions: usize,
    /// Cash buffer never committed to a bet.
    pub cash_buffer: Decimal,
    /// Minimum size at best ask, in shares.
    pub min_ask_size: Decimal,
    /// Floor on time-to-end for 5-minute markets, seconds.
    pub min_time_to_end_5m_s: i64,
    /// Floor on time-to-end for 15-minute markets, seconds.
    pub min_time_to_end_15m_s: i64,
    /// Reject once this fraction of the window has elapsed.
    pub max_elapsed_pct: f64,
    /// Minimum signal strength for a cheap-tier entry.
    pub cheap_min_strength: f64,
    /// Minimum book mid for a moderate-tier entry.
    pub moderate_min_mid: Decimal,
}

/// Complete-set arbitrage parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbConfig {
    /// Combined-ask threshold below which a set is bought.
    pub threshold: Decimal,
    /// Minimum time-to-end, seconds.
    pub min_time_to_end_s: i64,
    /// Equity fraction cap per set.
    pub equity_pct: Decimal,
    /// Cash fraction cap per set.
    pub cash_pct: Decimal,
    /// Minimum shares per set.
    pub min_shares: Decimal,
    /// Minimum locked profit in dollars.
    pub min_locked_profit: Decimal,
}

/// Flash-crash detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashCrashConfig {
    /// Mid-price history horizon, milliseconds.
    pub history_window_ms: i64,
    /// Lookback for the recent maximum, milliseconds.
    pub drop_window_ms: i64,
    /// Samples required before the detector may fire.
    pub min_samples: usize,
    /// Drop fraction from the recent max that triggers entry.
    pub min_drop_pct: f64,
    /// Mid must be strictly above this floor.
    pub mid_floor: Decimal,
    /// Mid must be strictly below this ceiling.
    pub mid_ceiling: Decimal,
    /// Minimum time-to-end, seconds.
    pub min_time_to_end_s: i64,
    /// Equity fraction committed per entry.
    pub size_pct: Decimal,
}

/// Binary-market discovery cadence and universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Refresh interval, seconds.
    pub refresh_interval_s: u64,
    /// Assets whose up/down markets are discovered.
    pub assets: Vec<String>,
    /// Grace period after `end_ts` before a market is expired, seconds.
    pub expiry_grace_s: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::ONE_HUNDRED,
            telemetry_port: 3847,
            tick_interval_ms: 500,
            equity_curve_cap: 10_000,
            trade_log_cap: 500,
            stale_order_gc_ms: 60_000,
            position_backstop_ms: 3_600_000,
            snapshot_book_limit: 10,
            venues: VenueConfig::default(),
            momentum: MomentumConfig::default(),
            leverage_exits: LeverageExitConfig::default(),
            bets: BetConfig::default(),
            arb: ArbConfig::default(),
            flash_crash: FlashCrashConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            hyperliquid_api_url: "https://api.hyperliquid.xyz".to_string(),
            hyperliquid_symbols: vec![
                "BTC".into(),
                "ETH".into(),
                "SOL".into(),
                "XRP".into(),
                "DOGE".into(),
                "AVAX".into(),
                "LINK".into(),
                "ARB".into(),
            ],
            hyperliquid_batch_size: 6,
            polymarket_ws_url: "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string(),
            gamma_api_url: "https://gamma-api.polymarket.com".to_string(),
            kalshi_api_url: "https://api.elections.kalshi.com/trade-api/v2".to_string(),
            kalshi_tickers: Vec::new(),
            kalshi_batch_size: 2,
            binance_ws_url: "wss://stream.binance.com:9443/ws".to_string(),
            spot_symbols: vec!["btcusdt".into(), "ethusdt".into(), "solusdt".into(), "xrpusdt".into()],
        }
    }
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            window: 5,
            min_consecutive: 2,
            min_move_pct: 0.0002,
            large_move_pct: 0.003,
            confirm_levels: 5,
            opposing_imbalance: 0.1,
            size_pct: Decimal::new(45, 2),
            leverage: 20,
            cash_floor: Decimal::new(25, 0),
        }
    }
}

impl Default for LeverageExitConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.0007,
            trail_activate_pct: 0.0005,
            trail_giveback: 0.30,
            max_hold_ms: 300_000,
        }
    }
}

impl Default for BetConfig {
    fn default() -> Self {
        Self {
            base_size_pct: 0.10,
            max_size_pct: 0.20,
            min_trade_size: Decimal::new(5, 0),
            cooldown_ms: 3_000,
            max_open_positions: 20,
            cash_buffer: Decimal::new(5, 0),
            min_ask_size: Decimal::new(10, 0),
            min_time_to_end_5m_s: 60,
            min_time_to_end_15m_s: 90,
            max_elapsed_pct: 0.80,
            cheap_min_strength: 0.40,
            moderate_min_mid: Decimal::new(48, 2),
        }
    }
}

impl Default for ArbConfig {
    fn default() -> Self {
        Self {
            threshold: Decimal::new(96, 2),
            min_time_to_end_s: 20,
            equity_pct: Decimal::new(15, 2),
            cash_pct: Decimal::new(40, 2),
            min_shares: Decimal::new(5, 0),
            min_locked_profit: Decimal::new(50, 2),
        }
    }
}

impl Default for FlashCrashConfig {
    fn default() -> Self {
        Self {
            history_window_ms: 30_000,
            drop_window_ms: 10_000,
            min_samples: 3,
            min_drop_pct: 0.15,
            mid_floor: Decimal::new(5, 2),
            mid_ceiling: Decimal::new(95, 2),
            min_time_to_end_s: 30,
            size_pct: Decimal::new(20, 2),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_s: 30,
            assets: vec!["btc".into(), "eth".into(), "sol".into(), "xrp".into()],
            expiry_grace_s: 60,
        }
    }
}

impl EngineConfig {
    /// Loads the config: defaults overlaid with `PAPERBOT_`-prefixed
    /// environment variables (`__` separates nested sections).
    ///
    /// # Errors
    /// Returns an error when an override fails to parse, a fatal
    /// configuration error callers should refuse to start on.
    pub fn from_env() -> anyhow::Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("PAPERBOT_").split("__"))
            .extract()?;
        if config.starting_balance <= Decimal::ZERO {
            anyhow::bail!("starting balance must be positive");
        }
        Ok(config)
    }
}
