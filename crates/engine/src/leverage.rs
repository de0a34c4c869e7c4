//! Exit management for leveraged momentum positions.
//!
//! Each position moves through a small state machine:
//!
//! | State       | Enter when                                      |
//! |-------------|-------------------------------------------------|
//! | OPEN        | position opened                                 |
//! | TRAILING    | profit fraction reaches `trail_activate_pct`    |
//! | CLOSED_TP   | trailing giveback exceeds `trail_giveback` of the peak profit |
//! | CLOSED_SL   | price crosses the hard stop at `stop_loss_pct` from entry |
//! | CLOSED_TIME | held longer than `max_hold_ms`                  |
//! | LIQUIDATED  | unrealized loss reaches margin                  |
//!
//! Checks run in a fixed order on every mark: liquidation, then hard stop,
//! then trail, then time exit. The first hit wins.

use crate::bets::PositionMeta;
use paperbot_core::{
    ExitReason, LeverageExitConfig, PaperWallet, PositionSide, StrategyTag,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// One closed position reported by a management pass.
#[derive(Debug, Clone)]
pub struct LeverageExit {
    /// Position that closed.
    pub position_id: Uuid,
    /// Exit classification.
    pub reason: ExitReason,
    /// Realized PnL.
    pub pnl: Decimal,
}

/// Manages trailing stops, hard stops, time exits, and liquidation for
/// `momentum` positions.
#[derive(Debug, Clone)]
pub struct LeveragedPositionMgr {
    config: LeverageExitConfig,
}

impl LeveragedPositionMgr {
    /// Creates a manager.
    #[must_use]
    pub fn new(config: LeverageExitConfig) -> Self {
        Self { config }
    }

    /// Runs one management pass over every open momentum position, using
    /// each position's `current_price` (the engine marks to the latest mid
    /// before calling this).
    ///
    /// Closes are executed against the wallet; the matching meta entries
    /// are dropped.
    pub fn manage(
        &self,
        wallet: &mut PaperWallet,
        meta: &mut HashMap<Uuid, PositionMeta>,
        now_ms: i64,
    ) -> Vec<LeverageExit> {
        let candidates: Vec<(Uuid, PositionSide, Decimal, Decimal, i64)> = wallet
            .positions()
            .filter(|p| p.strategy == StrategyTag::Momentum)
            .map(|p| (p.id, p.side, p.entry_price, p.current_price, p.opened_at_ms))
            .collect();

        let mut exits = Vec::new();

        for (id, side, entry, price, opened_at_ms) in candidates {
            let Some(position_meta) = meta.get_mut(&id) else {
                continue;
            };
            position_meta.observe(price);

            let reason = self.classify(
                side,
                entry,
                price,
                position_meta,
                now_ms - opened_at_ms,
                wallet.check_liquidation(id, price),
            );

            if let Some(reason) = reason {
                if let Some(pnl) = wallet.close_position(id, price, reason, now_ms) {
                    info!(position_id = %id, ?reason, %pnl, "Leveraged exit");
                    meta.remove(&id);
                    exits.push(LeverageExit {
                        position_id: id,
                        reason,
                        pnl,
                    });
                }
            }
        }

        exits
    }

    /// Applies the exit checks in their fixed order. Mutates the trailing
    /// flag on the meta when the trail arms. The hard stop uses the mark
    /// recorded on the meta at open, falling back to `stop_loss_pct` from
    /// entry when none was set.
    fn classify(
        &self,
        side: PositionSide,
        entry: Decimal,
        price: Decimal,
        meta: &mut PositionMeta,
        held_ms: i64,
        liquidated: bool,
    ) -> Option<ExitReason> {
        if liquidated {
            return Some(ExitReason::Liquidated);
        }

        let profit = profit_fraction(side, entry, price);
        let stop_hit = match meta.sl_price {
            Some(sl) => match side {
                PositionSide::Long => price <= sl,
                PositionSide::Short => price >= sl,
            },
            None => profit <= -self.config.stop_loss_pct,
        };
        if stop_hit {
            return Some(ExitReason::StopLoss);
        }

        if !meta.trail_active && profit >= self.config.trail_activate_pct {
            meta.trail_active = true;
        }
        if meta.trail_active {
            let peak = match side {
                PositionSide::Long => meta.max_price,
                PositionSide::Short => meta.min_price,
            };
            let max_profit = profit_fraction(side, entry, peak);
            if max_profit > 0.0 && (max_profit - profit) > self.config.trail_giveback * max_profit {
                return Some(ExitReason::TrailingTakeProfit);
            }
        }

        if held_ms > self.config.max_hold_ms {
            return Some(ExitReason::TimeExit);
        }

        None
    }
}

/// Signed profit fraction of entry for a move to `price`.
fn profit_fraction(side: PositionSide, entry: Decimal, price: Decimal) -> f64 {
    if entry == Decimal::ZERO {
        return 0.0;
    }
    let raw = ((price - entry) / entry).to_f64().unwrap_or(0.0);
    match side {
        PositionSide::Long => raw,
        PositionSide::Short => -raw,
    }
}
