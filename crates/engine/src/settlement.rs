//! Resolution of binary bets and arb pairs against the external spot
//! reference.
//!
//! A market resolves "Up" iff the current spot is at or above the spot
//! captured when the market was first observed. Winning shares pay $1.00,
//! losing shares $0.001 (the venue's dust bid). A bet whose market never
//! captured a reference gets a 30 s grace window and is then force-closed
//! as a total loss. An arb pair in the same situation closes both legs at
//! $0.50, which realizes exactly the guaranteed $1 combined payout.

use crate::bets::{ArbPair, BinaryBet, PositionMeta};
use paperbot_core::{ExitReason, PaperWallet};
use paperbot_polymarket::{BetSide, UpDownMarket};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Winning-side settlement price.
pub const WIN_PRICE: Decimal = Decimal::ONE;
/// Losing-side settlement price.
pub const LOSE_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);
/// Grace window for a missing spot reference, milliseconds.
pub const REFERENCE_GRACE_MS: i64 = 30_000;

/// One settled position.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Position settled.
    pub position_id: Uuid,
    /// Exit classification.
    pub reason: ExitReason,
    /// Realized PnL.
    pub pnl: Decimal,
}

/// Whether the Up side wins given the reference and current spot.
#[must_use]
pub fn up_wins(start_price: Decimal, current_price: Decimal) -> bool {
    current_price >= start_price
}

/// Settles every bet whose resolution time has passed.
///
/// `markets` may no longer contain the market (it expires 60 s after its
/// end); the bet's own slug lookup failing is treated like a missing
/// reference.
pub fn settle_due_bets(
    wallet: &mut PaperWallet,
    bets: &mut HashMap<Uuid, BinaryBet>,
    meta: &mut HashMap<Uuid, PositionMeta>,
    markets: &HashMap<String, UpDownMarket>,
    spot_prices: &HashMap<String, Decimal>,
    now_ms: i64,
) -> Vec<Settlement> {
    let due: Vec<Uuid> = bets
        .values()
        .filter(|b| now_ms >= b.resolution_ts_ms)
        .map(|b| b.position_id)
        .collect();

    let mut settled = Vec::new();
    for id in due {
        let Some(bet) = bets.get(&id) else { continue };

        let reference = markets
            .get(&bet.market_slug)
            .and_then(|m| m.start_price)
            .map(|start| (start, spot_prices.get(&bet.asset).copied()));

        let (exit_price, reason) = match reference {
            Some((start, Some(current))) => {
                let won = match bet.side {
                    BetSide::Up => up_wins(start, current),
                    BetSide::Down => !up_wins(start, current),
                };
                if won {
                    (WIN_PRICE, ExitReason::PmResolutionWin)
                } else {
                    (LOSE_PRICE, ExitReason::PmResolutionLoss)
                }
            }
            // No reference: wait out the grace window, then take the loss.
            _ if now_ms < bet.resolution_ts_ms + REFERENCE_GRACE_MS => continue,
            _ => {
                warn!(slug = %bet.market_slug, "No settlement reference, forcing total loss");
                (LOSE_PRICE, ExitReason::PmForcedLoss)
            }
        };

        if let Some(pnl) = wallet.close_position(id, exit_price, reason, now_ms) {
            info!(position_id = %id, slug = %bet.market_slug, ?reason, %pnl, "Bet settled");
            settled.push(Settlement {
                position_id: id,
                reason,
                pnl,
            });
        }
        bets.remove(&id);
        meta.remove(&id);
    }

    settled
}

/// Settles every arb pair whose resolution time has passed.
pub fn settle_due_arbs(
    wallet: &mut PaperWallet,
    pairs: &mut Vec<ArbPair>,
    meta: &mut HashMap<Uuid, PositionMeta>,
    markets: &HashMap<String, UpDownMarket>,
    spot_prices: &HashMap<String, Decimal>,
    now_ms: i64,
) -> Vec<Settlement> {
    let mut settled = Vec::new();
    let mut remaining = Vec::with_capacity(pairs.len());

    for pair in pairs.drain(..) {
        if now_ms < pair.resolution_ts_ms {
            remaining.push(pair);
            continue;
        }

        let reference = markets
            .get(&pair.market_slug)
            .and_then(|m| m.start_price)
            .and_then(|start| spot_prices.get(&pair.asset).map(|current| (start, *current)));

        let (up_price, down_price) = match reference {
            Some((start, current)) => {
                if up_wins(start, current) {
                    (WIN_PRICE, LOSE_PRICE)
                } else {
                    (LOSE_PRICE, WIN_PRICE)
                }
            }
            None if now_ms < pair.resolution_ts_ms + REFERENCE_GRACE_MS => {
                remaining.push(pair);
                continue;
            }
            None => {
                // A complete set pays $1 combined whichever way the market
                // went; with no reference, realize that payout evenly.
                warn!(slug = %pair.market_slug, "No settlement reference for arb pair, closing both legs at 0.50");
                (Decimal::new(50, 2), Decimal::new(50, 2))
            }
        };

        for (id, price) in [(pair.up_position_id, up_price), (pair.down_position_id, down_price)] {
            if let Some(pnl) = wallet.close_position(id, price, ExitReason::PmArbSettlement, now_ms) {
                settled.push(Settlement {
                    position_id: id,
                    reason: ExitReason::PmArbSettlement,
                    pnl,
                });
            }
            meta.remove(&id);
        }
        info!(slug = %pair.market_slug, shares = %pair.shares, "Arb pair settled");
    }

    *pairs = remaining;
    settled
}
