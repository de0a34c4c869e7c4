//! Stop-loss, take-profit and trailing exits for binary bets.
//!
//! Two paths evaluate the same positions:
//!
//! - [`ExitPolicy::realtime_check`] fires on every book callback, ahead of
//!   the 500 ms tick, so a collapsing bid is cut without waiting for the
//!   scheduler. Only the first matching bet per callback is closed.
//! - [`ExitPolicy::tick_check`] runs on the tick and applies the full
//!   ladder: take-profit, trailing stop and hard stop for cheap entries,
//!   the stop/near-expiry ladder for moderate entries.
//!
//! Entries at or below $0.45 are "cheap" (longshot pricing, wide stops);
//! everything above is "moderate". Moderate stops widen inside the last
//! minute to avoid panic exits into a thinning book.

use crate::bets::{BinaryBet, PositionMeta};
use paperbot_core::{BookStore, ExitReason, L2OrderBook, PaperWallet, Venue};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Boundary between cheap and moderate entries.
const CHEAP_ENTRY_MAX: Decimal = Decimal::from_parts(45, 0, 0, false, 2);

/// A closed bet reported by an exit pass.
#[derive(Debug, Clone)]
pub struct BetExit {
    /// Position that closed.
    pub position_id: Uuid,
    /// Exit classification.
    pub reason: ExitReason,
    /// Realized PnL.
    pub pnl: Decimal,
}

/// Exit thresholds for binary bets. All fractions are relative gains
/// against the entry share price.
#[derive(Debug, Clone)]
pub struct ExitPolicy {
    /// Cheap-entry take-profit (+80%).
    pub cheap_take_profit: f64,
    /// Cheap-entry trailing arm level (+50% peak gain).
    pub cheap_trail_arm: f64,
    /// Fraction of the peak-to-entry rise kept by the trail (0.65).
    pub cheap_trail_keep: f64,
    /// Cheap-entry hard stop (-30%).
    pub cheap_stop: f64,
    /// Moderate-entry stop while time remains (-18%).
    pub moderate_stop: f64,
    /// Moderate-entry stop inside the last minute (-35%).
    pub moderate_stop_near_expiry: f64,
    /// Near-expiry cut level (-25%) applied in the last 30 s.
    pub near_expiry_cut: f64,
    /// Seconds of time-to-end below which the moderate stop widens.
    pub widen_below_s: i64,
    /// Seconds of time-to-end below which the near-expiry cut applies.
    pub cut_below_s: i64,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            cheap_take_profit: 0.80,
            cheap_trail_arm: 0.50,
            cheap_trail_keep: 0.65,
            cheap_stop: -0.30,
            moderate_stop: -0.18,
            moderate_stop_near_expiry: -0.35,
            near_expiry_cut: -0.25,
            widen_below_s: 60,
            cut_below_s: 30,
        }
    }
}

impl ExitPolicy {
    /// Realtime stop-loss, evaluated on a single updated book before the
    /// next tick can observe it.
    ///
    /// Scans bets on the updated token (arb legs excluded), closes the
    /// first one whose drawdown breaches the stop for its tier, and stops:
    /// one close per callback.
    pub fn realtime_check(
        &self,
        token_id: &str,
        book: &L2OrderBook,
        wallet: &mut PaperWallet,
        bets: &mut HashMap<Uuid, BinaryBet>,
        meta: &mut HashMap<Uuid, PositionMeta>,
        now_ms: i64,
    ) -> Option<BetExit> {
        let Some(best_bid) = book.best_bid() else {
            return None;
        };

        let candidate = bets.values().find(|bet| {
            if bet.token_id != token_id {
                return false;
            }
            let gain = relative_gain(bet.entry_share_price, best_bid);
            let threshold = if bet.entry_share_price <= CHEAP_ENTRY_MAX {
                self.cheap_stop
            } else if bet.resolution_ts_ms - now_ms > self.widen_below_s * 1000 {
                self.moderate_stop
            } else {
                self.moderate_stop_near_expiry
            };
            gain <= threshold
        })?;

        let id = candidate.position_id;
        let pnl = wallet.close_position(id, best_bid, ExitReason::PmStopLossRealtime, now_ms)?;
        info!(position_id = %id, %best_bid, %pnl, "Realtime stop-loss");
        bets.remove(&id);
        meta.remove(&id);
        Some(BetExit {
            position_id: id,
            reason: ExitReason::PmStopLossRealtime,
            pnl,
        })
    }

    /// Tick-path early-exit ladder over every open bet (arb legs excluded;
    /// they hold to settlement).
    pub fn tick_check(
        &self,
        books: &BookStore,
        wallet: &mut PaperWallet,
        bets: &mut HashMap<Uuid, BinaryBet>,
        meta: &mut HashMap<Uuid, PositionMeta>,
        now_ms: i64,
    ) -> Vec<BetExit> {
        let mut exits = Vec::new();
        let ids: Vec<Uuid> = bets.keys().copied().collect();

        for id in ids {
            let Some(bet) = bets.get(&id) else { continue };
            let Some(book) = books.get(Venue::Polymarket, &bet.token_id) else {
                continue;
            };
            let Some(best_bid) = book.best_bid() else {
                continue;
            };
            let Some(position_meta) = meta.get_mut(&id) else {
                continue;
            };
            position_meta.observe(best_bid);

            let gain = relative_gain(bet.entry_share_price, best_bid);
            let tte_s = (bet.resolution_ts_ms - now_ms) / 1000;

            let reason = if bet.entry_share_price <= CHEAP_ENTRY_MAX {
                self.cheap_exit(bet, position_meta, best_bid, gain)
            } else {
                self.moderate_exit(position_meta, best_bid, gain, tte_s)
            };

            if let Some(reason) = reason {
                if let Some(pnl) = wallet.close_position(id, best_bid, reason, now_ms) {
                    info!(position_id = %id, ?reason, %best_bid, %pnl, "Bet exit");
                    bets.remove(&id);
                    meta.remove(&id);
                    exits.push(BetExit {
                        position_id: id,
                        reason,
                        pnl,
                    });
                }
            }
        }

        exits
    }

    /// Take-profit, then trail, then hard stop. The tp/sl marks recorded
    /// on the meta at open take precedence over the policy fractions.
    fn cheap_exit(
        &self,
        bet: &BinaryBet,
        meta: &mut PositionMeta,
        best_bid: Decimal,
        gain: f64,
    ) -> Option<ExitReason> {
        let tp_hit = match meta.tp_price {
            Some(tp) => best_bid >= tp,
            None => gain >= self.cheap_take_profit,
        };
        if tp_hit {
            return Some(ExitReason::PmTakeProfit);
        }

        let peak_gain = relative_gain(bet.entry_share_price, meta.max_price);
        if peak_gain >= self.cheap_trail_arm {
            meta.trail_active = true;
        }
        if meta.trail_active {
            let keep =
                Decimal::try_from(self.cheap_trail_keep).unwrap_or_else(|_| Decimal::new(65, 2));
            let trail = bet.entry_share_price + (meta.max_price - bet.entry_share_price) * keep;
            if best_bid <= trail {
                return Some(ExitReason::PmTrailingStop);
            }
        }

        let sl_hit = match meta.sl_price {
            Some(sl) => best_bid <= sl,
            None => gain <= self.cheap_stop,
        };
        if sl_hit {
            return Some(ExitReason::PmStopLoss);
        }
        None
    }

    fn moderate_exit(
        &self,
        meta: &PositionMeta,
        best_bid: Decimal,
        gain: f64,
        tte_s: i64,
    ) -> Option<ExitReason> {
        if tte_s > self.widen_below_s {
            let sl_hit = match meta.sl_price {
                Some(sl) => best_bid <= sl,
                None => gain <= self.moderate_stop,
            };
            if sl_hit {
                return Some(ExitReason::PmStopLoss);
            }
        }
        if tte_s <= self.cut_below_s && gain < self.near_expiry_cut {
            return Some(ExitReason::PmNearExpiry);
        }
        None
    }
}

/// `(price - entry) / entry` as an f64 fraction.
fn relative_gain(entry: Decimal, price: Decimal) -> f64 {
    if entry == Decimal::ZERO {
        return 0.0;
    }
    ((price - entry) / entry).to_f64().unwrap_or(0.0)
}
