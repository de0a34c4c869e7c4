//! Complete-set arbitrage detection.
//!
//! When the best asks of a market's Up and Down tokens sum below $1, buying
//! both sides locks `1 - cost` per share regardless of the outcome. The
//! detector runs once per tick, opens the two legs atomically (the first is
//! undone if the second cannot fund), and marks the slug so each market is
//! arbed at most once.

use crate::bets::{ArbPair, PositionMeta};
use paperbot_core::{
    ArbConfig, BookStore, ExitReason, PaperWallet, PositionSide, StrategyTag, Venue,
};
use paperbot_polymarket::UpDownMarket;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

/// Detects and executes complete-set arbitrage.
#[derive(Debug)]
pub struct CompleteSetArbDetector {
    config: ArbConfig,
}

impl CompleteSetArbDetector {
    /// Creates a detector.
    #[must_use]
    pub fn new(config: ArbConfig) -> Self {
        Self { config }
    }

    /// Scans every eligible market and opens at most one pair per market
    /// over the engine lifetime. Returns the pairs opened this pass.
    #[allow(clippy::too_many_arguments)]
    pub fn scan(
        &self,
        markets: &HashMap<String, UpDownMarket>,
        books: &BookStore,
        wallet: &mut PaperWallet,
        meta: &mut HashMap<Uuid, PositionMeta>,
        completed_slugs: &mut HashSet<String>,
        now_ms: i64,
    ) -> Vec<ArbPair> {
        let mut opened = Vec::new();

        for market in markets.values() {
            if completed_slugs.contains(&market.slug) {
                continue;
            }
            if market.time_to_end_ms(now_ms) < self.config.min_time_to_end_s * 1000 {
                continue;
            }
            if let Some(pair) = self.try_open(market, books, wallet, meta, now_ms) {
                completed_slugs.insert(market.slug.clone());
                opened.push(pair);
            }
        }

        opened
    }

    fn try_open(
        &self,
        market: &UpDownMarket,
        books: &BookStore,
        wallet: &mut PaperWallet,
        meta: &mut HashMap<Uuid, PositionMeta>,
        now_ms: i64,
    ) -> Option<ArbPair> {
        let up_book = books.get(Venue::Polymarket, &market.up_token_id)?;
        let down_book = books.get(Venue::Polymarket, &market.down_token_id)?;

        let ask_up = up_book.best_ask()?;
        let ask_down = down_book.best_ask()?;
        let size_up = up_book.best_ask_size()?;
        let size_down = down_book.best_ask_size()?;

        let cost = ask_up + ask_down;
        if cost >= self.config.threshold || cost <= Decimal::ZERO {
            return None;
        }
        let edge = Decimal::ONE - cost;

        // Liquidity bound, then the equity and cash fractions expressed in
        // shares at the combined cost.
        let max_shares = size_up.min(size_down);
        let equity_shares = wallet.equity() * self.config.equity_pct / cost;
        let cash_shares = wallet.cash_balance * self.config.cash_pct / cost;
        let shares = max_shares.min(equity_shares).min(cash_shares).floor();

        if shares < self.config.min_shares {
            return None;
        }
        let locked_profit = shares * edge;
        if locked_profit < self.config.min_locked_profit {
            return None;
        }

        // Open both legs atomically: undo the first at its entry price if
        // the second cannot fund.
        let up_id = wallet.open_position(
            Venue::Polymarket,
            &market.up_token_id,
            PositionSide::Long,
            shares * ask_up,
            ask_up,
            StrategyTag::PmArb,
            1,
            now_ms,
        )?;
        let Some(down_id) = wallet.open_position(
            Venue::Polymarket,
            &market.down_token_id,
            PositionSide::Long,
            shares * ask_down,
            ask_down,
            StrategyTag::PmArb,
            1,
            now_ms,
        ) else {
            warn!(slug = %market.slug, "Down leg failed to fund, unwinding up leg");
            wallet.close_position(up_id, ask_up, ExitReason::Manual, now_ms);
            return None;
        };

        meta.insert(up_id, PositionMeta::new(StrategyTag::PmArb, ask_up));
        meta.insert(down_id, PositionMeta::new(StrategyTag::PmArb, ask_down));

        info!(
            slug = %market.slug,
            %cost,
            %edge,
            %shares,
            %locked_profit,
            "Opened complete-set arb pair"
        );

        Some(ArbPair {
            market_slug: market.slug.clone(),
            asset: market.asset.clone(),
            up_position_id: up_id,
            down_position_id: down_id,
            shares,
            pair_cost: cost,
            resolution_ts_ms: market.end_ts_ms,
        })
    }
}
