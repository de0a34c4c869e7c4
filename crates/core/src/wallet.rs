//! Simulated (paper) wallet: cash, leveraged positions, equity curve and
//! realized-PnL accounting.
//!
//! The wallet is the single execution surface for every strategy. All
//! operations preserve two invariants that the test suite asserts after
//! every mutation:
//!
//! - `equity == cash_balance + Σ (position.margin + position.unrealized_pnl)`
//! - `cash_balance >= 0`
//!
//! Unrealized PnL uses the leveraged return formula
//! `direction * (price - entry) / entry * margin * leverage`; realized PnL
//! is the same expression at the exit price, floored at `-margin` so a gap
//! through the liquidation price can never take cash negative.

use crate::book::Venue;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use uuid::Uuid;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    /// Profits when price rises.
    Long,
    /// Profits when price falls.
    Short,
}

impl PositionSide {
    /// Sign applied to the price return: `1` for long, `-1` for short.
    #[must_use]
    pub fn direction(self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Strategy a position was opened by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    /// Leveraged momentum positions on the perps venue.
    Momentum,
    /// Single-sided binary up/down bets.
    PmUpdown,
    /// Complete-set arbitrage pairs.
    PmArb,
    /// Flash-crash fades on binary tokens.
    PmFlashCrash,
    /// Quantitative strategies (reserved).
    Quant,
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Momentum => "momentum",
            Self::PmUpdown => "pm_updown",
            Self::PmArb => "pm_arb",
            Self::PmFlashCrash => "pm_flash_crash",
            Self::Quant => "quant",
        };
        write!(f, "{s}")
    }
}

/// Why a position was closed. Serialized with the wire names the dashboard
/// expects (`pm_stop_loss_rt`, `pm_take_profit`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Trailing take-profit on a leveraged position.
    #[serde(rename = "trailing_take_profit")]
    TrailingTakeProfit,
    /// Hard stop-loss on a leveraged position.
    #[serde(rename = "stop_loss")]
    StopLoss,
    /// Maximum hold time exceeded.
    #[serde(rename = "time_exit")]
    TimeExit,
    /// Unrealized loss reached margin.
    #[serde(rename = "liquidated")]
    Liquidated,
    /// Binary-bet take-profit on the tick path.
    #[serde(rename = "pm_take_profit")]
    PmTakeProfit,
    /// Binary-bet trailing stop after a profitable peak.
    #[serde(rename = "pm_trailing_stop")]
    PmTrailingStop,
    /// Binary-bet stop-loss on the tick path.
    #[serde(rename = "pm_stop_loss")]
    PmStopLoss,
    /// Binary-bet stop-loss fired from a sub-tick book update.
    #[serde(rename = "pm_stop_loss_rt")]
    PmStopLossRealtime,
    /// Cut close to expiry to avoid resolution risk.
    #[serde(rename = "pm_near_expiry")]
    PmNearExpiry,
    /// Settled on the winning side.
    #[serde(rename = "pm_resolution_win")]
    PmResolutionWin,
    /// Settled on the losing side.
    #[serde(rename = "pm_resolution_loss")]
    PmResolutionLoss,
    /// No spot reference ever arrived; forced total loss after grace.
    #[serde(rename = "pm_forced_loss")]
    PmForcedLoss,
    /// Complete-set arb leg settled.
    #[serde(rename = "pm_arb_settlement")]
    PmArbSettlement,
    /// Closed by an operator or an unwind path.
    #[serde(rename = "manual")]
    Manual,
}

/// An open simulated position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperPosition {
    /// Unique position id.
    pub id: Uuid,
    /// Venue the position notionally lives on.
    pub venue: Venue,
    /// Symbol or token id.
    pub symbol: String,
    /// Long or short.
    pub side: PositionSide,
    /// Cash debited when the position was opened.
    pub margin: Decimal,
    /// Leverage multiplier, `>= 1`.
    pub leverage: u32,
    /// Entry price.
    pub entry_price: Decimal,
    /// Latest mark price.
    pub current_price: Decimal,
    /// Unrealized PnL at `current_price`.
    pub unrealized_pnl: Decimal,
    /// Strategy that opened the position.
    pub strategy: StrategyTag,
    /// Open timestamp in epoch milliseconds.
    pub opened_at_ms: i64,
}

impl PaperPosition {
    /// Exposure: `margin * leverage`.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.margin * Decimal::from(self.leverage)
    }
}

/// A completed round trip, kept in a capped log for telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    /// Id of the closed position.
    pub position_id: Uuid,
    /// Venue the position lived on.
    pub venue: Venue,
    /// Symbol or token id.
    pub symbol: String,
    /// Strategy that owned the position.
    pub strategy: StrategyTag,
    /// Long or short.
    pub side: PositionSide,
    /// Entry price.
    pub entry_price: Decimal,
    /// Exit price.
    pub exit_price: Decimal,
    /// Margin committed.
    pub margin: Decimal,
    /// Realized PnL.
    pub pnl: Decimal,
    /// Why the position closed.
    pub exit_reason: ExitReason,
    /// Close timestamp in epoch milliseconds.
    pub closed_at_ms: i64,
}

/// One point on the equity curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Timestamp in epoch milliseconds.
    pub ts_ms: i64,
    /// Equity at that instant.
    pub equity: Decimal,
}

/// Win/loss/realized-PnL counters per strategy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StrategyStats {
    /// Closed trades with positive PnL.
    pub wins: u32,
    /// Closed trades with PnL `<= 0`.
    pub losses: u32,
    /// Total realized PnL for the strategy.
    pub realized_pnl: Decimal,
}

/// Computes leveraged PnL for a move from `entry` to `price`.
#[must_use]
pub fn leveraged_pnl(
    side: PositionSide,
    entry: Decimal,
    price: Decimal,
    margin: Decimal,
    leverage: u32,
) -> Decimal {
    if entry == Decimal::ZERO {
        return Decimal::ZERO;
    }
    side.direction() * (price - entry) / entry * margin * Decimal::from(leverage)
}

/// The shared simulated wallet.
#[derive(Debug)]
pub struct PaperWallet {
    /// Free cash.
    pub cash_balance: Decimal,
    /// Balance the wallet started with.
    pub starting_balance: Decimal,
    positions: HashMap<Uuid, PaperPosition>,
    equity_curve: VecDeque<EquityPoint>,
    equity_curve_cap: usize,
    trades: VecDeque<ClosedTrade>,
    trade_log_cap: usize,
    realized_by_venue: HashMap<Venue, Decimal>,
    stats_by_strategy: HashMap<StrategyTag, StrategyStats>,
    /// Total realized PnL across all venues.
    pub total_realized_pnl: Decimal,
}

impl PaperWallet {
    /// Creates a wallet with the given starting balance and default caps
    /// (10 000 equity points, 500 trades).
    #[must_use]
    pub fn new(starting_balance: Decimal) -> Self {
        Self::with_caps(starting_balance, 10_000, 500)
    }

    /// Creates a wallet with explicit equity-curve and trade-log caps.
    #[must_use]
    pub fn with_caps(starting_balance: Decimal, equity_curve_cap: usize, trade_log_cap: usize) -> Self {
        Self {
            cash_balance: starting_balance,
            starting_balance,
            positions: HashMap::new(),
            equity_curve: VecDeque::new(),
            equity_curve_cap,
            trades: VecDeque::new(),
            trade_log_cap,
            realized_by_venue: HashMap::new(),
            stats_by_strategy: HashMap::new(),
            total_realized_pnl: Decimal::ZERO,
        }
    }

    /// Opens a position, debiting `margin` from cash.
    ///
    /// Returns `None` (and leaves the wallet untouched) when the business
    /// preconditions fail: `margin <= 0`, `margin > cash_balance`,
    /// `entry_price <= 0` or `leverage == 0`. Callers must check.
    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &mut self,
        venue: Venue,
        symbol: &str,
        side: PositionSide,
        margin: Decimal,
        entry_price: Decimal,
        strategy: StrategyTag,
        leverage: u32,
        now_ms: i64,
    ) -> Option<Uuid> {
        if margin <= Decimal::ZERO || margin > self.cash_balance {
            return None;
        }
        if entry_price <= Decimal::ZERO || leverage == 0 {
            return None;
        }

        let id = Uuid::new_v4();
        self.cash_balance -= margin;
        self.positions.insert(
            id,
            PaperPosition {
                id,
                venue,
                symbol: symbol.to_string(),
                side,
                margin,
                leverage,
                entry_price,
                current_price: entry_price,
                unrealized_pnl: Decimal::ZERO,
                strategy,
                opened_at_ms: now_ms,
            },
        );
        tracing::debug!(
            %id,
            venue = %venue,
            symbol,
            ?side,
            %margin,
            leverage,
            %entry_price,
            strategy = %strategy,
            "Opened paper position"
        );
        Some(id)
    }

    /// Marks a position to `price`, recomputing its unrealized PnL.
    ///
    /// Returns the new unrealized PnL, or `None` for an unknown id.
    pub fn update_price(&mut self, id: Uuid, price: Decimal) -> Option<Decimal> {
        let pos = self.positions.get_mut(&id)?;
        pos.current_price = price;
        pos.unrealized_pnl = leveraged_pnl(pos.side, pos.entry_price, price, pos.margin, pos.leverage);
        Some(pos.unrealized_pnl)
    }

    /// True when the adverse move at `price` has consumed the whole margin,
    /// i.e. a move of `1/leverage` against the position. Does not close.
    #[must_use]
    pub fn check_liquidation(&self, id: Uuid, price: Decimal) -> bool {
        let Some(pos) = self.positions.get(&id) else {
            return false;
        };
        leveraged_pnl(pos.side, pos.entry_price, price, pos.margin, pos.leverage) <= -pos.margin
    }

    /// Closes a position at `exit_price`, crediting `margin + pnl` back to
    /// cash. Realized PnL is floored at `-margin`. Returns the realized PnL,
    /// or `None` for an unknown id.
    pub fn close_position(
        &mut self,
        id: Uuid,
        exit_price: Decimal,
        reason: ExitReason,
        now_ms: i64,
    ) -> Option<Decimal> {
        let pos = self.positions.remove(&id)?;
        let raw = leveraged_pnl(pos.side, pos.entry_price, exit_price, pos.margin, pos.leverage);
        let pnl = raw.max(-pos.margin);

        self.cash_balance += pos.margin + pnl;
        self.total_realized_pnl += pnl;
        *self.realized_by_venue.entry(pos.venue).or_default() += pnl;

        let stats = self.stats_by_strategy.entry(pos.strategy).or_default();
        if pnl > Decimal::ZERO {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }
        stats.realized_pnl += pnl;

        self.trades.push_back(ClosedTrade {
            position_id: pos.id,
            venue: pos.venue,
            symbol: pos.symbol.clone(),
            strategy: pos.strategy,
            side: pos.side,
            entry_price: pos.entry_price,
            exit_price,
            margin: pos.margin,
            pnl,
            exit_reason: reason,
            closed_at_ms: now_ms,
        });
        while self.trades.len() > self.trade_log_cap {
            self.trades.pop_front();
        }

        tracing::info!(
            %id,
            symbol = %pos.symbol,
            strategy = %pos.strategy,
            %exit_price,
            %pnl,
            reason = ?reason,
            "Closed paper position"
        );
        Some(pnl)
    }

    /// Closes every position older than `timeout_ms` at the price supplied
    /// by `get_price` (positions with no available price are left open).
    /// Returns `(id, pnl)` for each closed position.
    pub fn check_and_close_expired<F>(
        &mut self,
        get_price: F,
        timeout_ms: i64,
        now_ms: i64,
    ) -> Vec<(Uuid, Decimal)>
    where
        F: Fn(&PaperPosition) -> Option<Decimal>,
    {
        let expired: Vec<(Uuid, Decimal)> = self
            .positions
            .values()
            .filter(|p| now_ms - p.opened_at_ms > timeout_ms)
            .filter_map(|p| get_price(p).map(|price| (p.id, price)))
            .collect();

        expired
            .into_iter()
            .filter_map(|(id, price)| {
                self.close_position(id, price, ExitReason::TimeExit, now_ms)
                    .map(|pnl| (id, pnl))
            })
            .collect()
    }

    /// Pushes the current equity onto the curve, sliding the window once the
    /// cap is reached.
    pub fn record_equity(&mut self, now_ms: i64) {
        self.equity_curve.push_back(EquityPoint {
            ts_ms: now_ms,
            equity: self.equity(),
        });
        while self.equity_curve.len() > self.equity_curve_cap {
            self.equity_curve.pop_front();
        }
    }

    /// `cash + Σ (margin + unrealized_pnl)` over open positions.
    #[must_use]
    pub fn equity(&self) -> Decimal {
        self.cash_balance
            + self
                .positions
                .values()
                .map(|p| p.margin + p.unrealized_pnl)
                .sum::<Decimal>()
    }

    /// Total unrealized PnL over open positions.
    #[must_use]
    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    /// Returns a position by id.
    #[must_use]
    pub fn position(&self, id: Uuid) -> Option<&PaperPosition> {
        self.positions.get(&id)
    }

    /// Iterates over open positions.
    pub fn positions(&self) -> impl Iterator<Item = &PaperPosition> {
        self.positions.values()
    }

    /// Number of open positions.
    #[must_use]
    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of open positions for one strategy.
    #[must_use]
    pub fn open_count_for(&self, strategy: StrategyTag) -> usize {
        self.positions.values().filter(|p| p.strategy == strategy).count()
    }

    /// The equity curve, oldest first.
    #[must_use]
    pub fn equity_curve(&self) -> &VecDeque<EquityPoint> {
        &self.equity_curve
    }

    /// The trade log, oldest first.
    #[must_use]
    pub fn trades(&self) -> &VecDeque<ClosedTrade> {
        &self.trades
    }

    /// Realized PnL per venue.
    #[must_use]
    pub fn realized_by_venue(&self) -> &HashMap<Venue, Decimal> {
        &self.realized_by_venue
    }

    /// Win/loss stats per strategy.
    #[must_use]
    pub fn stats_by_strategy(&self) -> &HashMap<StrategyTag, StrategyStats> {
        &self.stats_by_strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn assert_equity_identity(wallet: &PaperWallet) {
        let expected: Decimal = wallet.cash_balance
            + wallet
                .positions()
                .map(|p| p.margin + p.unrealized_pnl)
                .sum::<Decimal>();
        assert_eq!(wallet.equity(), expected);
        assert!(wallet.cash_balance >= Decimal::ZERO, "cash went negative");
    }

    fn open_long(wallet: &mut PaperWallet, margin: Decimal, entry: Decimal, leverage: u32) -> Uuid {
        wallet
            .open_position(
                Venue::Hyperliquid,
                "BTC",
                PositionSide::Long,
                margin,
                entry,
                StrategyTag::Momentum,
                leverage,
                0,
            )
            .expect("open should succeed")
    }

    #[test]
    fn test_open_debits_cash() {
        let mut wallet = PaperWallet::new(dec!(100));
        open_long(&mut wallet, dec!(40), dec!(100), 20);
        assert_eq!(wallet.cash_balance, dec!(60));
        assert_eq!(wallet.equity(), dec!(100));
        assert_equity_identity(&wallet);
    }

    #[test]
    fn test_open_rejects_bad_preconditions() {
        let mut wallet = PaperWallet::new(dec!(100));
        let open = |w: &mut PaperWallet, margin: Decimal, entry: Decimal, lev: u32| {
            w.open_position(
                Venue::Hyperliquid,
                "BTC",
                PositionSide::Long,
                margin,
                entry,
                StrategyTag::Momentum,
                lev,
                0,
            )
        };
        assert!(open(&mut wallet, dec!(0), dec!(100), 1).is_none());
        assert!(open(&mut wallet, dec!(-5), dec!(100), 1).is_none());
        assert!(open(&mut wallet, dec!(101), dec!(100), 1).is_none());
        assert!(open(&mut wallet, dec!(10), dec!(0), 1).is_none());
        assert!(open(&mut wallet, dec!(10), dec!(100), 0).is_none());
        assert_eq!(wallet.cash_balance, dec!(100));
    }

    #[test]
    fn test_update_price_leveraged_pnl() {
        let mut wallet = PaperWallet::new(dec!(100));
        let id = open_long(&mut wallet, dec!(50), dec!(100), 20);

        // +1% move at 20x = +20% of margin = +10
        let pnl = wallet.update_price(id, dec!(101)).unwrap();
        assert_eq!(pnl, dec!(10));
        assert_eq!(wallet.equity(), dec!(110));
        assert_equity_identity(&wallet);
    }

    #[test]
    fn test_short_pnl_sign() {
        let mut wallet = PaperWallet::new(dec!(100));
        let id = wallet
            .open_position(
                Venue::Hyperliquid,
                "ETH",
                PositionSide::Short,
                dec!(50),
                dec!(100),
                StrategyTag::Momentum,
                10,
                0,
            )
            .unwrap();

        let pnl = wallet.update_price(id, dec!(99)).unwrap();
        // -1% move on a short at 10x = +10% of margin = +5
        assert_eq!(pnl, dec!(5));
        assert_equity_identity(&wallet);
    }

    #[test]
    fn test_close_realizes_and_credits() {
        let mut wallet = PaperWallet::new(dec!(100));
        let id = open_long(&mut wallet, dec!(50), dec!(100), 20);

        let pnl = wallet
            .close_position(id, dec!(101), ExitReason::TrailingTakeProfit, 1_000)
            .unwrap();
        assert_eq!(pnl, dec!(10));
        assert_eq!(wallet.cash_balance, dec!(110));
        assert_eq!(wallet.total_realized_pnl, dec!(10));
        assert_eq!(wallet.open_position_count(), 0);
        assert_equity_identity(&wallet);

        let trade = wallet.trades().back().unwrap();
        assert_eq!(trade.pnl, dec!(10));
        assert_eq!(trade.exit_reason, ExitReason::TrailingTakeProfit);

        let stats = wallet.stats_by_strategy()[&StrategyTag::Momentum];
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 0);
    }

    #[test]
    fn test_liquidation_threshold_20x_long() {
        let mut wallet = PaperWallet::new(dec!(100));
        let id = open_long(&mut wallet, dec!(50), dec!(100), 20);

        // -4.9% is short of liquidation for 20x; -5% and beyond trips it.
        assert!(!wallet.check_liquidation(id, dec!(95.1)));
        assert!(wallet.check_liquidation(id, dec!(95)));
        assert!(wallet.check_liquidation(id, dec!(94.9)));
    }

    #[test]
    fn test_liquidation_close_loses_exactly_margin() {
        let mut wallet = PaperWallet::new(dec!(100));
        let id = open_long(&mut wallet, dec!(50), dec!(100), 20);

        // Gap past the liquidation price: -5.1% at 20x would be -102% of
        // margin; the realized loss is floored at the margin.
        let pnl = wallet
            .close_position(id, dec!(94.9), ExitReason::Liquidated, 2_000)
            .unwrap();
        assert_eq!(pnl, dec!(-50));
        assert_eq!(wallet.cash_balance, dec!(50));
        assert_equity_identity(&wallet);
    }

    #[test]
    fn test_check_and_close_expired() {
        let mut wallet = PaperWallet::new(dec!(100));
        let old = wallet
            .open_position(
                Venue::Hyperliquid,
                "BTC",
                PositionSide::Long,
                dec!(20),
                dec!(100),
                StrategyTag::Momentum,
                1,
                0,
            )
            .unwrap();
        let fresh = wallet
            .open_position(
                Venue::Hyperliquid,
                "ETH",
                PositionSide::Long,
                dec!(20),
                dec!(10),
                StrategyTag::Momentum,
                1,
                299_000,
            )
            .unwrap();

        let closed = wallet.check_and_close_expired(|p| Some(p.entry_price), 300_000, 301_000);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].0, old);
        assert!(wallet.position(fresh).is_some());
        assert_equity_identity(&wallet);
    }

    #[test]
    fn test_expired_position_without_price_stays_open() {
        let mut wallet = PaperWallet::new(dec!(100));
        wallet
            .open_position(
                Venue::Hyperliquid,
                "BTC",
                PositionSide::Long,
                dec!(20),
                dec!(100),
                StrategyTag::Momentum,
                1,
                0,
            )
            .unwrap();

        let closed = wallet.check_and_close_expired(|_| None, 1_000, 10_000);
        assert!(closed.is_empty());
        assert_eq!(wallet.open_position_count(), 1);
    }

    #[test]
    fn test_equity_curve_cap_slides() {
        let mut wallet = PaperWallet::with_caps(dec!(100), 5, 500);
        for i in 0..8 {
            wallet.record_equity(i);
        }
        assert_eq!(wallet.equity_curve().len(), 5);
        assert_eq!(wallet.equity_curve().front().unwrap().ts_ms, 3);
        assert_eq!(wallet.equity_curve().back().unwrap().ts_ms, 7);
    }

    #[test]
    fn test_realized_pnl_per_venue_buckets() {
        let mut wallet = PaperWallet::new(dec!(100));
        let hl = open_long(&mut wallet, dec!(10), dec!(100), 1);
        let pm = wallet
            .open_position(
                Venue::Polymarket,
                "up-token",
                PositionSide::Long,
                dec!(10),
                dec!(0.40),
                StrategyTag::PmUpdown,
                1,
                0,
            )
            .unwrap();

        wallet.close_position(hl, dec!(110), ExitReason::Manual, 1).unwrap();
        wallet.close_position(pm, dec!(0.20), ExitReason::PmStopLoss, 2).unwrap();

        assert_eq!(wallet.realized_by_venue()[&Venue::Hyperliquid], dec!(1));
        assert_eq!(wallet.realized_by_venue()[&Venue::Polymarket], dec!(-5));
        assert_eq!(wallet.total_realized_pnl, dec!(-4));
        assert_equity_identity(&wallet);
    }

    #[test]
    fn test_equity_identity_through_random_walk() {
        let mut wallet = PaperWallet::new(dec!(1000));
        let mut ids = Vec::new();
        for i in 0..10 {
            let id = wallet
                .open_position(
                    Venue::Hyperliquid,
                    "BTC",
                    if i % 2 == 0 { PositionSide::Long } else { PositionSide::Short },
                    dec!(30),
                    dec!(100),
                    StrategyTag::Momentum,
                    5,
                    i,
                )
                .unwrap();
            ids.push(id);
            assert_equity_identity(&wallet);
        }
        for (i, id) in ids.iter().enumerate() {
            wallet.update_price(*id, dec!(100) + Decimal::from(i as i64 - 5));
            assert_equity_identity(&wallet);
        }
        for (i, id) in ids.into_iter().enumerate() {
            wallet.close_position(id, dec!(100) + Decimal::from(i as i64 - 5), ExitReason::Manual, 99);
            assert_equity_identity(&wallet);
        }
        assert_eq!(wallet.open_position_count(), 0);
    }

    #[test]
    fn test_trade_log_cap() {
        let mut wallet = PaperWallet::with_caps(dec!(1000), 100, 3);
        for i in 0..5 {
            let id = open_long(&mut wallet, dec!(10), dec!(100), 1);
            wallet.close_position(id, dec!(100), ExitReason::Manual, i).unwrap();
        }
        assert_eq!(wallet.trades().len(), 3);
        assert_eq!(wallet.trades().front().unwrap().closed_at_ms, 2);
    }
}
