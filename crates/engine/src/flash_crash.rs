//! Flash-crash detection on binary-token mids.
//!
//! A sudden collapse of a token's mid inside a 10 s window, while the mid
//! is still in tradable territory, is treated as an overreaction worth
//! fading: the detector buys the crashed side at the best ask.

use crate::bets::{BinaryBet, PositionMeta};
use paperbot_core::{
    BookStore, FlashCrashConfig, PaperWallet, PositionSide, StrategyTag, Venue,
};
use paperbot_polymarket::UpDownMarket;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};
use uuid::Uuid;

/// Per-token rolling mid history and crash detection.
#[derive(Debug)]
pub struct FlashCrashDetector {
    config: FlashCrashConfig,
    history: HashMap<String, VecDeque<(i64, Decimal)>>,
}

impl FlashCrashDetector {
    /// Creates a detector.
    #[must_use]
    pub fn new(config: FlashCrashConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
        }
    }

    /// Records a mid sample and opens a `pm_flash_crash` position when the
    /// drop condition and all market gates hold. Called on every book
    /// update for the token, sub-tick.
    #[allow(clippy::too_many_arguments)]
    pub fn on_book_update(
        &mut self,
        token_id: &str,
        mid: Decimal,
        markets: &HashMap<String, UpDownMarket>,
        books: &BookStore,
        wallet: &mut PaperWallet,
        bets: &mut HashMap<Uuid, BinaryBet>,
        meta: &mut HashMap<Uuid, PositionMeta>,
        betted_slugs: &mut HashSet<String>,
        cooldowns: &mut HashMap<String, i64>,
        cooldown_ms: i64,
        now_ms: i64,
    ) -> Option<Uuid> {
        let samples = self.history.entry(token_id.to_string()).or_default();
        samples.push_back((now_ms, mid));
        while samples
            .front()
            .is_some_and(|(ts, _)| now_ms - ts > self.config.history_window_ms)
        {
            samples.pop_front();
        }

        if samples.len() < self.config.min_samples {
            return None;
        }
        if mid <= self.config.mid_floor || mid >= self.config.mid_ceiling {
            return None;
        }

        let recent_max = samples
            .iter()
            .filter(|(ts, _)| now_ms - ts <= self.config.drop_window_ms)
            .map(|(_, m)| *m)
            .max()?;
        if recent_max <= Decimal::ZERO {
            return None;
        }
        let drop = ((recent_max - mid) / recent_max).to_f64().unwrap_or(0.0);
        if drop < self.config.min_drop_pct {
            return None;
        }

        // The token must belong to a tracked market without an open bet,
        // with enough time left to mean-revert.
        let (market, side) = markets.values().find_map(|m| {
            m.side_of(token_id).map(|side| (m, side))
        })?;
        if betted_slugs.contains(&market.slug) {
            return None;
        }
        if market.time_to_end_ms(now_ms) < self.config.min_time_to_end_s * 1000 {
            return None;
        }
        if let Some(last) = cooldowns.get(&market.asset) {
            if now_ms - last < cooldown_ms {
                debug!(asset = %market.asset, "Flash-crash entry suppressed by cooldown");
                return None;
            }
        }

        let book = books.get(Venue::Polymarket, token_id)?;
        let ask = book.best_ask()?;
        if ask <= Decimal::ZERO {
            return None;
        }

        // 20% of equity, clamped by available cash.
        let size = (wallet.equity() * self.config.size_pct).min(wallet.cash_balance);
        if size <= Decimal::ZERO {
            return None;
        }

        let position_id = wallet.open_position(
            Venue::Polymarket,
            token_id,
            PositionSide::Long,
            size,
            ask,
            StrategyTag::PmFlashCrash,
            1,
            now_ms,
        )?;

        meta.insert(position_id, PositionMeta::new(StrategyTag::PmFlashCrash, ask));
        bets.insert(
            position_id,
            BinaryBet {
                position_id,
                market_slug: market.slug.clone(),
                asset: market.asset.clone(),
                side,
                token_id: token_id.to_string(),
                entry_share_price: ask,
                cost_basis: size,
                resolution_ts_ms: market.end_ts_ms,
            },
        );
        betted_slugs.insert(market.slug.clone());
        cooldowns.insert(market.asset.clone(), now_ms);

        info!(
            token_id,
            %mid,
            %recent_max,
            drop,
            %ask,
            %size,
            "Flash-crash entry"
        );
        Some(position_id)
    }

    /// Drops histories for tokens no longer attached to a tracked market.
    pub fn retain_tokens(&mut self, is_tracked: impl Fn(&str) -> bool) {
        self.history.retain(|token, _| is_tracked(token));
    }
}
