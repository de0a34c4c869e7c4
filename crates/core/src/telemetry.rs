//! Telemetry snapshot types.
//!
//! A snapshot is a deep copy of the engine's observable state, built
//! synchronously on the owner task between ticks or WebSocket callbacks, so
//! consumers never observe partial mutation. The same payload is served by
//! `GET /api/status` and streamed over the dashboard WebSocket.

use crate::book::{L2OrderBook, Venue};
use crate::wallet::{ClosedTrade, EquityPoint, PaperPosition, PaperWallet, StrategyStats, StrategyTag};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read-only view of one open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    /// Position id.
    pub id: uuid::Uuid,
    /// Venue.
    pub venue: Venue,
    /// Symbol or token id.
    pub symbol: String,
    /// Long/short as a display string.
    pub side: String,
    /// Committed margin.
    pub margin: Decimal,
    /// Leverage.
    pub leverage: u32,
    /// Exposure.
    pub notional: Decimal,
    /// Entry price.
    pub entry_price: Decimal,
    /// Latest mark.
    pub current_price: Decimal,
    /// Unrealized PnL at the latest mark.
    pub unrealized_pnl: Decimal,
    /// Owning strategy.
    pub strategy: StrategyTag,
    /// Open timestamp, epoch ms.
    pub opened_at_ms: i64,
}

impl From<&PaperPosition> for PositionView {
    fn from(p: &PaperPosition) -> Self {
        Self {
            id: p.id,
            venue: p.venue,
            symbol: p.symbol.clone(),
            side: format!("{:?}", p.side).to_uppercase(),
            margin: p.margin,
            leverage: p.leverage,
            notional: p.notional(),
            entry_price: p.entry_price,
            current_price: p.current_price,
            unrealized_pnl: p.unrealized_pnl,
            strategy: p.strategy,
            opened_at_ms: p.opened_at_ms,
        }
    }
}

/// Read-only view of the wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletView {
    /// Free cash.
    pub cash_balance: Decimal,
    /// Starting balance.
    pub starting_balance: Decimal,
    /// Current equity.
    pub equity: Decimal,
    /// Total realized PnL.
    pub total_realized_pnl: Decimal,
    /// Total unrealized PnL over open positions.
    pub total_unrealized_pnl: Decimal,
    /// Open positions.
    pub positions: Vec<PositionView>,
    /// Most recent equity point, if any.
    pub last_equity_point: Option<EquityPoint>,
    /// Number of points currently on the equity curve.
    pub equity_curve_len: usize,
}

impl From<&PaperWallet> for WalletView {
    fn from(w: &PaperWallet) -> Self {
        let mut positions: Vec<PositionView> = w.positions().map(PositionView::from).collect();
        positions.sort_by_key(|p| p.opened_at_ms);
        Self {
            cash_balance: w.cash_balance,
            starting_balance: w.starting_balance,
            equity: w.equity(),
            total_realized_pnl: w.total_realized_pnl,
            total_unrealized_pnl: w.total_unrealized_pnl(),
            positions,
            last_equity_point: w.equity_curve().back().copied(),
            equity_curve_len: w.equity_curve().len(),
        }
    }
}

/// Per-strategy metrics row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyView {
    /// Strategy tag.
    pub strategy: StrategyTag,
    /// Counters.
    #[serde(flatten)]
    pub stats: StrategyStats,
    /// Open positions for the strategy.
    pub open_positions: usize,
}

/// Per-venue realized PnL row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenuePnlView {
    /// Venue.
    pub venue: Venue,
    /// Realized PnL on that venue.
    pub realized_pnl: Decimal,
}

/// Compact view of one order book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookView {
    /// Venue.
    pub venue: Venue,
    /// Token id or symbol.
    pub token_id: String,
    /// Best bid.
    pub best_bid: Option<Decimal>,
    /// Best ask.
    pub best_ask: Option<Decimal>,
    /// Mid price (degraded per the book contract).
    pub mid: Decimal,
    /// Spread when both sides exist.
    pub spread: Option<Decimal>,
    /// Bid level count.
    pub bid_levels: usize,
    /// Ask level count.
    pub ask_levels: usize,
    /// Last update, epoch ms.
    pub last_update_ms: Option<i64>,
}

impl BookView {
    /// Builds a view from a tracked book.
    #[must_use]
    pub fn from_book(venue: Venue, book: &L2OrderBook) -> Self {
        Self {
            venue,
            token_id: book.token_id.clone(),
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            mid: book.mid_price(),
            spread: book.spread(),
            bid_levels: book.bid_levels(),
            ask_levels: book.ask_levels(),
            last_update_ms: book.last_update_ms,
        }
    }
}

/// Engine counters exposed for observability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineCounters {
    /// Ticks fired since start.
    pub tick_count: u64,
    /// Tick bodies that raised and were swallowed.
    pub tick_errors: u64,
    /// WebSocket frames processed.
    pub ws_frames: u64,
    /// WebSocket reconnects.
    pub ws_reconnects: u64,
    /// Discovery rounds completed.
    pub discovery_rounds: u64,
    /// Books currently tracked.
    pub books_tracked: usize,
    /// Open single-sided binary bets.
    pub open_bets: usize,
    /// Binary markets currently tracked.
    pub active_markets: usize,
}

/// The full telemetry snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Snapshot timestamp, epoch ms.
    pub timestamp_ms: i64,
    /// Seconds since engine start.
    pub uptime_s: f64,
    /// `tick_count / uptime_s`.
    pub ticks_per_second: f64,
    /// Wallet state.
    pub wallet: WalletView,
    /// Per-strategy rows.
    pub strategies: Vec<StrategyView>,
    /// Per-venue realized PnL rows.
    pub venues: Vec<VenuePnlView>,
    /// Most recent closed trades, newest last.
    pub recent_trades: Vec<ClosedTrade>,
    /// Top tracked books.
    pub books: Vec<BookView>,
    /// Engine counters.
    pub counters: EngineCounters,
}
