//! Binary up/down bet selection, scoring and sizing.
//!
//! Triggered by a confirmed momentum signal. Candidate markets for the
//! signal's asset are filtered (time floors, liquidity, entry tier),
//! scored, and the best one is sized with a time-scaled fraction of equity
//! and opened through the paper wallet.

use crate::bets::{BinaryBet, PositionMeta};
use paperbot_core::{
    BetConfig, BookStore, PaperWallet, PositionSide, StrategyTag, Venue,
};
use paperbot_polymarket::{BetSide, Timeframe, UpDownMarket};
use paperbot_signals::MomentumSignal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Entry tier classified from the best ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTier {
    /// `0.10 < ask <= 0.45`: longshot pricing, high payout.
    Cheap,
    /// `0.45 < ask <= 0.65`: near-even pricing.
    Moderate,
}

/// A scored candidate surviving all filters.
#[derive(Debug, Clone)]
struct Candidate {
    slug: String,
    token_id: String,
    side: BetSide,
    ask: Decimal,
    ask_size: Decimal,
    tier: EntryTier,
    score: f64,
    elapsed_pct: f64,
    resolution_ts_ms: i64,
}

/// Selects and opens single-sided binary bets.
#[derive(Debug)]
pub struct BetSelector {
    config: BetConfig,
    /// Cash floor preserved for the momentum strategy's entries.
    momentum_cash_floor: Decimal,
}

impl BetSelector {
    /// Creates a selector.
    #[must_use]
    pub fn new(config: BetConfig, momentum_cash_floor: Decimal) -> Self {
        Self {
            config,
            momentum_cash_floor,
        }
    }

    /// Handles a confirmed momentum signal: picks the best candidate market
    /// and opens a bet. Returns the new position id, or `None` when every
    /// gate rejects.
    ///
    /// On success the market slug joins `betted_slugs` and the asset
    /// cooldown restarts.
    #[allow(clippy::too_many_arguments)]
    pub fn on_signal(
        &mut self,
        signal: &MomentumSignal,
        markets: &HashMap<String, UpDownMarket>,
        books: &BookStore,
        wallet: &mut PaperWallet,
        bets: &mut HashMap<Uuid, BinaryBet>,
        meta: &mut HashMap<Uuid, PositionMeta>,
        betted_slugs: &mut HashSet<String>,
        cooldowns: &mut HashMap<String, i64>,
        now_ms: i64,
    ) -> Option<Uuid> {
        if let Some(last) = cooldowns.get(&signal.asset) {
            if now_ms - last < self.config.cooldown_ms {
                debug!(asset = %signal.asset, "Bet suppressed by cooldown");
                return None;
            }
        }
        if wallet.open_position_count() >= self.config.max_open_positions {
            debug!("Bet suppressed by global position cap");
            return None;
        }

        // Sizing scaffold; the final size follows candidate selection.
        let base_size_pct =
            (self.config.base_size_pct + (signal.strength - 0.2) * 0.0625).min(self.config.max_size_pct);

        let best = markets
            .values()
            .filter(|m| m.asset == signal.asset && !betted_slugs.contains(&m.slug))
            .filter_map(|m| self.evaluate(m, signal, books, now_ms))
            .max_by(|a, b| a.score.total_cmp(&b.score))?;

        // Time-based size scaling: entries late in the window shrink.
        let time_scale = (1.0 - best.elapsed_pct * 0.5).max(0.6);
        let size_pct = (base_size_pct * time_scale).min(self.config.max_size_pct);

        let equity = wallet.equity().to_f64().unwrap_or(0.0);
        let mut size = Decimal::from_f64(equity * size_pct).unwrap_or_default();

        // Clamps: spendable cash after the buffer and the momentum floor,
        // then dollar liquidity at the best ask.
        let spendable = wallet.cash_balance - self.config.cash_buffer - self.momentum_cash_floor;
        size = size.min(spendable.max(Decimal::ZERO));
        size = size.min(best.ask_size * best.ask);

        if size < self.config.min_trade_size {
            debug!(slug = %best.slug, %size, "Bet below minimum trade size");
            return None;
        }

        let position_id = wallet.open_position(
            Venue::Polymarket,
            &best.token_id,
            PositionSide::Long,
            size,
            best.ask,
            StrategyTag::PmUpdown,
            1,
            now_ms,
        )?;

        let mut position_meta = PositionMeta::new(StrategyTag::PmUpdown, best.ask);
        match best.tier {
            EntryTier::Cheap => {
                position_meta.tp_price = Some(best.ask * Decimal::new(18, 1));
                position_meta.sl_price = Some(best.ask * Decimal::new(7, 1));
            }
            EntryTier::Moderate => {
                position_meta.sl_price = Some(best.ask * Decimal::new(82, 2));
            }
        }
        meta.insert(position_id, position_meta);

        bets.insert(
            position_id,
            BinaryBet {
                position_id,
                market_slug: best.slug.clone(),
                asset: signal.asset.clone(),
                side: best.side,
                token_id: best.token_id.clone(),
                entry_share_price: best.ask,
                cost_basis: size,
                resolution_ts_ms: best.resolution_ts_ms,
            },
        );
        betted_slugs.insert(best.slug.clone());
        cooldowns.insert(signal.asset.clone(), now_ms);

        info!(
            slug = %best.slug,
            side = %best.side,
            ask = %best.ask,
            %size,
            tier = ?best.tier,
            score = best.score,
            "Opened binary bet"
        );
        Some(position_id)
    }

    /// Filters one market and scores it if it survives.
    fn evaluate(
        &self,
        market: &UpDownMarket,
        signal: &MomentumSignal,
        books: &BookStore,
        now_ms: i64,
    ) -> Option<Candidate> {
        let tte_s = market.time_to_end_ms(now_ms) / 1000;
        let floor_s = match market.timeframe {
            Timeframe::M5 => self.config.min_time_to_end_5m_s,
            Timeframe::M15 => self.config.min_time_to_end_15m_s,
        };
        if tte_s < floor_s {
            return None;
        }
        let elapsed_pct = market.elapsed_pct(now_ms);
        if elapsed_pct > self.config.max_elapsed_pct {
            return None;
        }

        // Momentum side: ride the move, not fade it.
        let side = match signal.direction {
            PositionSide::Long => BetSide::Up,
            PositionSide::Short => BetSide::Down,
        };
        let token_id = market.token_for(side).to_string();
        let book = books.get(Venue::Polymarket, &token_id)?;
        if book.ask_levels() == 0 {
            return None;
        }
        let ask = book.best_ask()?;
        let ask_size = book.best_ask_size()?;
        if ask_size < self.config.min_ask_size {
            return None;
        }

        let tier = if ask > Decimal::new(10, 2) && ask <= Decimal::new(45, 2) {
            if signal.strength < self.config.cheap_min_strength {
                return None;
            }
            EntryTier::Cheap
        } else if ask > Decimal::new(45, 2) && ask <= Decimal::new(65, 2) {
            if book.mid_price() < self.config.moderate_min_mid {
                return None;
            }
            EntryTier::Moderate
        } else {
            return None;
        };

        let ask_f = ask.to_f64().unwrap_or(1.0);
        let score = (1.0 / ask_f)
            + if market.timeframe == Timeframe::M15 { 0.3 } else { 0.0 }
            + market.remaining_pct(now_ms) * 0.2
            + signal.strength * 0.5
            + if tier == EntryTier::Cheap { 1.0 } else { 0.0 };

        Some(Candidate {
            slug: market.slug.clone(),
            token_id,
            side,
            ask,
            ask_size,
            tier,
            score,
            elapsed_pct,
            resolution_ts_ms: market.end_ts_ms,
        })
    }
}
