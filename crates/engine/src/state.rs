//! The engine's single-owner state and the synchronous event/tick logic.
//!
//! Every map in here is mutated from exactly one task. The async shell
//! ([`crate::engine::Engine`]) performs the I/O (book fetches, WebSocket
//! reads, discovery) and funnels completed results into these methods, so
//! the 500 ms tick and every WebSocket callback are mutually exclusive on
//! the shared state and no sub-step ever observes a later sub-step's
//! effects within the same pass.

use crate::arb::CompleteSetArbDetector;
use crate::bets::{ArbPair, BinaryBet, PositionMeta};
use crate::exits::ExitPolicy;
use crate::flash_crash::FlashCrashDetector;
use crate::leverage::LeveragedPositionMgr;
use crate::selector::BetSelector;
use crate::settlement::{settle_due_arbs, settle_due_bets};
use paperbot_core::{
    BookStore, BookView, EngineConfig, EngineCounters, L2OrderBook, PaperWallet, PositionSide,
    StrategyTag, StrategyView, TelemetrySnapshot, Venue, VenuePnlView, WalletView,
};
use paperbot_polymarket::{ClobEvent, UpDownMarket};
use paperbot_signals::{MomentumDetector, MomentumSignal, PriceBuffer, SpotTick};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

/// All mutable engine state plus the strategy components.
pub struct EngineState {
    /// Engine configuration.
    pub config: EngineConfig,
    /// The shared paper wallet.
    pub wallet: PaperWallet,
    /// Order books for every venue.
    pub books: BookStore,
    /// Tracked up/down markets by slug.
    pub markets: HashMap<String, UpDownMarket>,
    /// Open single-sided bets by position id.
    pub bets: HashMap<Uuid, BinaryBet>,
    /// Open complete-set pairs.
    pub arb_pairs: Vec<ArbPair>,
    /// Per-position exit bookkeeping.
    pub meta: HashMap<Uuid, PositionMeta>,
    /// Slugs with an open single-sided bet.
    pub betted_slugs: HashSet<String>,
    /// Slugs with a completed-set arb.
    pub completed_arb_slugs: HashSet<String>,
    /// Engine counters for telemetry.
    pub counters: EngineCounters,

    buffers: HashMap<String, PriceBuffer>,
    latest_spot: HashMap<String, Decimal>,
    cooldowns: HashMap<String, i64>,
    momentum: MomentumDetector,
    leverage_mgr: LeveragedPositionMgr,
    selector: BetSelector,
    arb: CompleteSetArbDetector,
    flash: FlashCrashDetector,
    exit_policy: ExitPolicy,
    started_at_ms: i64,
}

impl EngineState {
    /// Creates the state owner from a configuration.
    #[must_use]
    pub fn new(config: EngineConfig, started_at_ms: i64) -> Self {
        let wallet = PaperWallet::with_caps(
            config.starting_balance,
            config.equity_curve_cap,
            config.trade_log_cap,
        );
        Self {
            wallet,
            books: BookStore::new(),
            markets: HashMap::new(),
            bets: HashMap::new(),
            arb_pairs: Vec::new(),
            meta: HashMap::new(),
            betted_slugs: HashSet::new(),
            completed_arb_slugs: HashSet::new(),
            counters: EngineCounters::default(),
            buffers: HashMap::new(),
            latest_spot: HashMap::new(),
            cooldowns: HashMap::new(),
            momentum: MomentumDetector::new(config.momentum.clone()),
            leverage_mgr: LeveragedPositionMgr::new(config.leverage_exits.clone()),
            selector: BetSelector::new(config.bets.clone(), config.momentum.cash_floor),
            arb: CompleteSetArbDetector::new(config.arb.clone()),
            flash: FlashCrashDetector::new(config.flash_crash.clone()),
            exit_policy: ExitPolicy::default(),
            started_at_ms,
            config,
        }
    }

    /// Lowercase asset for a spot stream symbol (`btcusdt` -> `btc`).
    #[must_use]
    pub fn asset_of_spot_symbol(symbol: &str) -> String {
        symbol
            .to_lowercase()
            .trim_end_matches("usdt")
            .trim_end_matches("usd")
            .to_string()
    }

    /// Perps venue symbol for an asset (`btc` -> `BTC`).
    #[must_use]
    pub fn perps_symbol(asset: &str) -> String {
        asset.to_uppercase()
    }

    /// Latest spot price for an asset, if any has arrived.
    #[must_use]
    pub fn spot_price(&self, asset: &str) -> Option<Decimal> {
        self.latest_spot.get(asset).copied()
    }

    // ------------------------------------------------------------------
    // Spot path
    // ------------------------------------------------------------------

    /// Handles one external spot tick: records it, runs the momentum
    /// detector, and routes any confirmed signal into the leveraged entry
    /// and the bet selector.
    pub fn on_spot_tick(&mut self, tick: &SpotTick) {
        let asset = Self::asset_of_spot_symbol(&tick.symbol);
        self.latest_spot.insert(asset.clone(), tick.price);

        let window = self.config.momentum.window;
        let buffer = self
            .buffers
            .entry(asset.clone())
            .or_insert_with(|| PriceBuffer::for_window(window));
        buffer.push(tick.price, tick.ts_ms);

        let perps_book = self.books.get(Venue::Hyperliquid, &Self::perps_symbol(&asset));
        let Some(signal) = self
            .momentum
            .detect(&asset, &self.buffers[&asset], tick.change_10s_pct, perps_book)
        else {
            return;
        };

        debug!(
            asset = %signal.asset,
            direction = ?signal.direction,
            strength = signal.strength,
            "Momentum signal"
        );

        self.open_momentum_position(&signal, tick.ts_ms);
        self.selector.on_signal(
            &signal,
            &self.markets,
            &self.books,
            &mut self.wallet,
            &mut self.bets,
            &mut self.meta,
            &mut self.betted_slugs,
            &mut self.cooldowns,
            tick.ts_ms,
        );
    }

    /// Opens a leveraged momentum position on the perps venue, at most one
    /// per symbol at a time. Margin scales with equity and signal strength.
    fn open_momentum_position(&mut self, signal: &MomentumSignal, now_ms: i64) -> Option<Uuid> {
        let symbol = Self::perps_symbol(&signal.asset);
        let already_open = self
            .wallet
            .positions()
            .any(|p| p.strategy == StrategyTag::Momentum && p.symbol == symbol);
        if already_open {
            return None;
        }

        let book = self.books.get(Venue::Hyperliquid, &symbol)?;
        let entry = book.mid_price();
        if entry <= Decimal::ZERO {
            return None;
        }

        let scale = Decimal::from_f64(0.5 + signal.strength * 0.5)?;
        let margin = (self.config.momentum.size_pct * self.wallet.equity() * scale)
            .min(self.wallet.cash_balance);
        if margin < Decimal::ONE {
            return None;
        }

        let id = self.wallet.open_position(
            Venue::Hyperliquid,
            &symbol,
            signal.direction,
            margin,
            entry,
            StrategyTag::Momentum,
            self.config.momentum.leverage,
            now_ms,
        )?;

        let mut meta = PositionMeta::new(StrategyTag::Momentum, entry);
        let sl = Decimal::from_f64(self.config.leverage_exits.stop_loss_pct).unwrap_or_default();
        meta.sl_price = Some(match signal.direction {
            PositionSide::Long => entry * (Decimal::ONE - sl),
            PositionSide::Short => entry * (Decimal::ONE + sl),
        });
        self.meta.insert(id, meta);

        info!(
            %symbol,
            direction = ?signal.direction,
            %entry,
            %margin,
            leverage = self.config.momentum.leverage,
            "Opened momentum position"
        );
        Some(id)
    }

    // ------------------------------------------------------------------
    // CLOB push path
    // ------------------------------------------------------------------

    /// Applies one WebSocket event. Book mutations land in the store
    /// before any strategy reads the book, and the realtime exit guard
    /// runs ahead of the next tick.
    pub fn on_clob_event(&mut self, event: ClobEvent, now_ms: i64) {
        self.counters.ws_frames += 1;
        match event {
            ClobEvent::Snapshot { token_id, bids, asks } => {
                self.books
                    .apply_snapshot(Venue::Polymarket, &token_id, bids, asks, now_ms);
                self.on_token_touched(&token_id, now_ms);
            }
            ClobEvent::Deltas { changes } => {
                let touched = self.books.apply_deltas(Venue::Polymarket, &changes, now_ms);
                // Once per touched token, never once per level.
                for token_id in touched {
                    self.on_token_touched(&token_id, now_ms);
                }
            }
            ClobEvent::Trade { token_id, price, size } => {
                debug!(%token_id, %price, %size, "Trade print");
            }
            ClobEvent::Connected => {
                info!("CLOB feed connected");
            }
            ClobEvent::Disconnected { reason } => {
                self.counters.ws_reconnects += 1;
                info!(%reason, "CLOB feed disconnected");
            }
        }
    }

    /// Sub-tick handling for one updated token: realtime stop-loss first,
    /// then flash-crash detection on the new mid.
    fn on_token_touched(&mut self, token_id: &str, now_ms: i64) {
        let Some(book) = self.books.get(Venue::Polymarket, token_id).cloned() else {
            return;
        };

        self.exit_policy.realtime_check(
            token_id,
            &book,
            &mut self.wallet,
            &mut self.bets,
            &mut self.meta,
            now_ms,
        );

        let mid = book.mid_price();
        if mid > Decimal::ZERO {
            self.flash.on_book_update(
                token_id,
                mid,
                &self.markets,
                &self.books,
                &mut self.wallet,
                &mut self.bets,
                &mut self.meta,
                &mut self.betted_slugs,
                &mut self.cooldowns,
                self.config.bets.cooldown_ms,
                now_ms,
            );
        }
    }

    // ------------------------------------------------------------------
    // Discovery path
    // ------------------------------------------------------------------

    /// Merges one discovery round. New markets capture the current spot as
    /// their settlement reference; known markets keep their stored state.
    /// Returns the token ids to (re-)register with the WebSocket feed.
    pub fn merge_markets(&mut self, discovered: Vec<UpDownMarket>) -> Vec<String> {
        self.counters.discovery_rounds += 1;
        let mut tokens = Vec::new();

        for mut market in discovered {
            tokens.push(market.up_token_id.clone());
            tokens.push(market.down_token_id.clone());

            if self.markets.contains_key(&market.slug) {
                continue;
            }
            market.start_price = self.latest_spot.get(&market.asset).copied();
            info!(
                slug = %market.slug,
                start_price = ?market.start_price,
                end_ts_ms = market.end_ts_ms,
                "Tracking new market"
            );
            self.markets.insert(market.slug.clone(), market);
        }

        tokens
    }

    // ------------------------------------------------------------------
    // Tick path
    // ------------------------------------------------------------------

    /// Applies a freshly fetched venue book (tick sub-steps 1 and 2 funnel
    /// their HTTP results through here before any decision logic runs).
    pub fn apply_fetched_book(&mut self, venue: Venue, symbol: &str, book: &L2OrderBook, now_ms: i64) {
        let bids: Vec<(Decimal, Decimal)> = book.bids.iter().map(|(p, s)| (p.0, *s)).collect();
        let asks: Vec<(Decimal, Decimal)> = book.asks.iter().map(|(p, s)| (*p, *s)).collect();
        self.books.apply_snapshot(venue, symbol, bids, asks, now_ms);
    }

    /// The synchronous remainder of a tick, in the fixed sub-step order:
    /// record equity, mark to market, manage leveraged positions, scan for
    /// complete sets, run bet early-exits, settle, close anything past the
    /// position backstop, garbage-collect.
    pub fn tick_sync(&mut self, now_ms: i64) {
        self.wallet.record_equity(now_ms);
        self.mark_to_market();

        self.leverage_mgr
            .manage(&mut self.wallet, &mut self.meta, now_ms);

        let opened = self.arb.scan(
            &self.markets,
            &self.books,
            &mut self.wallet,
            &mut self.meta,
            &mut self.completed_arb_slugs,
            now_ms,
        );
        self.arb_pairs.extend(opened);

        self.exit_policy.tick_check(
            &self.books,
            &mut self.wallet,
            &mut self.bets,
            &mut self.meta,
            now_ms,
        );

        settle_due_bets(
            &mut self.wallet,
            &mut self.bets,
            &mut self.meta,
            &self.markets,
            &self.latest_spot,
            now_ms,
        );
        settle_due_arbs(
            &mut self.wallet,
            &mut self.arb_pairs,
            &mut self.meta,
            &self.markets,
            &self.latest_spot,
            now_ms,
        );

        self.close_expired_positions(now_ms);
        self.garbage_collect(now_ms);
    }

    /// Generic backstop behind the per-strategy exits: a position that
    /// somehow outlives them all is closed at the live book price, or at
    /// its last mark when the book is gone.
    fn close_expired_positions(&mut self, now_ms: i64) {
        let books = &self.books;
        let closed = self.wallet.check_and_close_expired(
            |p| {
                let book_price = match p.strategy {
                    StrategyTag::Momentum | StrategyTag::Quant => books
                        .get(p.venue, &p.symbol)
                        .map(L2OrderBook::mid_price)
                        .filter(|mid| *mid > Decimal::ZERO),
                    StrategyTag::PmUpdown | StrategyTag::PmArb | StrategyTag::PmFlashCrash => {
                        books.get(Venue::Polymarket, &p.symbol).and_then(L2OrderBook::best_bid)
                    }
                };
                book_price.or(Some(p.current_price))
            },
            self.config.position_backstop_ms,
            now_ms,
        );

        for (id, pnl) in closed {
            info!(position_id = %id, %pnl, "Backstop closed expired position");
            self.bets.remove(&id);
            self.meta.remove(&id);
            self.arb_pairs
                .retain(|pair| pair.up_position_id != id && pair.down_position_id != id);
        }
    }

    /// Marks every open position: momentum to the perps mid, binary
    /// positions to their token's best bid.
    fn mark_to_market(&mut self) {
        let marks: Vec<(Uuid, Decimal)> = self
            .wallet
            .positions()
            .filter_map(|p| {
                let price = match p.strategy {
                    StrategyTag::Momentum | StrategyTag::Quant => {
                        let book = self.books.get(p.venue, &p.symbol)?;
                        let mid = book.mid_price();
                        (mid > Decimal::ZERO).then_some(mid)
                    }
                    StrategyTag::PmUpdown | StrategyTag::PmArb | StrategyTag::PmFlashCrash => {
                        self.books.get(Venue::Polymarket, &p.symbol)?.best_bid()
                    }
                };
                price.map(|price| (p.id, price))
            })
            .collect();

        for (id, price) in marks {
            self.wallet.update_price(id, price);
        }
    }

    /// Tick sub-step 9: drop stale cooldown stamps, expire markets past
    /// their grace window, and trim detector history to tracked tokens.
    fn garbage_collect(&mut self, now_ms: i64) {
        let gc_ms = self.config.stale_order_gc_ms;
        self.cooldowns.retain(|_, ts| now_ms - *ts <= gc_ms);

        let grace_ms = self.config.discovery.expiry_grace_s * 1000;
        let expired: Vec<String> = self
            .markets
            .values()
            .filter(|m| m.end_ts_ms < now_ms - grace_ms)
            .map(|m| m.slug.clone())
            .collect();
        for slug in expired {
            debug!(%slug, "Expiring market");
            self.markets.remove(&slug);
            self.betted_slugs.remove(&slug);
            self.completed_arb_slugs.remove(&slug);
        }

        let tracked: HashSet<String> = self
            .markets
            .values()
            .flat_map(|m| [m.up_token_id.clone(), m.down_token_id.clone()])
            .collect();
        self.flash.retain_tokens(|token| tracked.contains(token));
    }

    // ------------------------------------------------------------------
    // Telemetry
    // ------------------------------------------------------------------

    /// Builds a deep-copy snapshot of the observable state.
    #[must_use]
    pub fn build_snapshot(&self, now_ms: i64) -> TelemetrySnapshot {
        let uptime_s = ((now_ms - self.started_at_ms).max(0) as f64) / 1000.0;
        let ticks_per_second = if uptime_s > 0.0 {
            self.counters.tick_count as f64 / uptime_s
        } else {
            0.0
        };

        let mut strategies: Vec<StrategyView> = self
            .wallet
            .stats_by_strategy()
            .iter()
            .map(|(tag, stats)| StrategyView {
                strategy: *tag,
                stats: *stats,
                open_positions: self.wallet.open_count_for(*tag),
            })
            .collect();
        strategies.sort_by_key(|s| s.strategy.to_string());

        let mut venues: Vec<VenuePnlView> = self
            .wallet
            .realized_by_venue()
            .iter()
            .map(|(venue, pnl)| VenuePnlView {
                venue: *venue,
                realized_pnl: *pnl,
            })
            .collect();
        venues.sort_by_key(|v| v.venue.to_string());

        let recent_trades = self
            .wallet
            .trades()
            .iter()
            .rev()
            .take(50)
            .rev()
            .cloned()
            .collect();

        let mut books: Vec<BookView> = self
            .books
            .iter()
            .map(|(key, book)| BookView::from_book(key.venue, book))
            .collect();
        books.sort_by_key(|b| std::cmp::Reverse(b.last_update_ms.unwrap_or(0)));
        books.truncate(self.config.snapshot_book_limit);

        let mut counters = self.counters;
        counters.books_tracked = self.books.len();
        counters.open_bets = self.bets.len();
        counters.active_markets = self.markets.len();

        TelemetrySnapshot {
            timestamp_ms: now_ms,
            uptime_s,
            ticks_per_second,
            wallet: WalletView::from(&self.wallet),
            strategies,
            venues,
            recent_trades,
            books,
            counters,
        }
    }

    /// Equity as an `f64`, for logging.
    #[must_use]
    pub fn equity_f64(&self) -> f64 {
        self.wallet.equity().to_f64().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperbot_core::LevelChange;
    use paperbot_core::Side;
    use paperbot_polymarket::Timeframe;
    use rust_decimal_macros::dec;

    const WINDOW_START: i64 = 1_700_000_100_000;

    fn state() -> EngineState {
        EngineState::new(EngineConfig::default(), WINDOW_START)
    }

    fn spot(price: Decimal, ts_ms: i64) -> SpotTick {
        SpotTick {
            symbol: "btcusdt".into(),
            price,
            change_10s_pct: 0.0,
            change_30s_pct: 0.0,
            ts_ms,
        }
    }

    fn perps_book(state: &mut EngineState, mid: Decimal, now_ms: i64) {
        let spread = dec!(0.01);
        state.books.apply_snapshot(
            Venue::Hyperliquid,
            "BTC",
            vec![(mid - spread, dec!(10))],
            vec![(mid + spread, dec!(10))],
            now_ms,
        );
    }

    fn add_market(state: &mut EngineState, slug: &str, up_ask: Decimal) -> UpDownMarket {
        let market = UpDownMarket {
            asset: "btc".into(),
            timeframe: Timeframe::M5,
            slug: slug.into(),
            start_ts_ms: WINDOW_START,
            end_ts_ms: WINDOW_START + 300_000,
            up_token_id: format!("{slug}-up"),
            down_token_id: format!("{slug}-down"),
            start_price: None,
        };
        state.books.apply_snapshot(
            Venue::Polymarket,
            &market.up_token_id.clone(),
            vec![(up_ask - dec!(0.02), dec!(100))],
            vec![(up_ask, dec!(100))],
            WINDOW_START,
        );
        state.markets.insert(slug.to_string(), market.clone());
        market
    }

    #[test]
    fn test_asset_symbol_mapping() {
        assert_eq!(EngineState::asset_of_spot_symbol("BTCUSDT"), "btc");
        assert_eq!(EngineState::asset_of_spot_symbol("ethusdt"), "eth");
        assert_eq!(EngineState::perps_symbol("btc"), "BTC");
    }

    #[test]
    fn test_momentum_round_trip_through_spot_path() {
        let mut state = state();
        perps_book(&mut state, dec!(100.03), WINDOW_START);

        // Consecutive rises: the run reaches C=2 with a 2 bp move on the
        // third tick, which emits the LONG signal (strength 2/5) and opens
        // a 20x momentum position at the perps mid.
        for (i, price) in [dec!(100.00), dec!(100.01), dec!(100.02), dec!(100.03)]
            .into_iter()
            .enumerate()
        {
            state.on_spot_tick(&spot(price, WINDOW_START + i as i64 * 200));
        }

        let position = state
            .wallet
            .positions()
            .find(|p| p.strategy == StrategyTag::Momentum)
            .expect("momentum position opened");
        assert_eq!(position.symbol, "BTC");
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.leverage, 20);
        assert_eq!(position.entry_price, dec!(100.03));

        // margin = 0.45 * equity * (0.5 + 0.4 * 0.5) = 0.45 * 100 * 0.7 = 31.5.
        assert_eq!(position.margin, dec!(31.5));
        let id = position.id;
        assert_eq!(state.meta[&id].strategy, StrategyTag::Momentum);

        // A second signal for the same symbol does not stack.
        for (i, price) in [dec!(100.04), dec!(100.05), dec!(100.06)].into_iter().enumerate() {
            state.on_spot_tick(&spot(price, WINDOW_START + 1_000 + i as i64 * 200));
        }
        assert_eq!(
            state
                .wallet
                .positions()
                .filter(|p| p.strategy == StrategyTag::Momentum)
                .count(),
            1
        );
    }

    #[test]
    fn test_spot_tick_records_latest_price() {
        let mut state = state();
        state.on_spot_tick(&spot(dec!(100.5), WINDOW_START));
        assert_eq!(state.spot_price("btc"), Some(dec!(100.5)));
    }

    #[test]
    fn test_clob_snapshot_and_delta_batch() {
        let mut state = state();
        state.on_clob_event(
            ClobEvent::Snapshot {
                token_id: "tok".into(),
                bids: vec![(dec!(0.40), dec!(10))],
                asks: vec![(dec!(0.44), dec!(20))],
            },
            WINDOW_START,
        );
        let book = state.books.get(Venue::Polymarket, "tok").unwrap();
        assert_eq!(book.best_bid(), Some(dec!(0.40)));

        state.on_clob_event(
            ClobEvent::Deltas {
                changes: vec![
                    LevelChange {
                        token_id: "tok".into(),
                        side: Side::Buy,
                        price: dec!(0.41),
                        size: dec!(5),
                    },
                    LevelChange {
                        token_id: "tok".into(),
                        side: Side::Sell,
                        price: dec!(0.44),
                        size: Decimal::ZERO,
                    },
                ],
            },
            WINDOW_START + 1,
        );
        let book = state.books.get(Venue::Polymarket, "tok").unwrap();
        assert_eq!(book.best_bid(), Some(dec!(0.41)));
        assert_eq!(book.best_ask(), None);
        assert_eq!(state.counters.ws_frames, 2);
    }

    #[test]
    fn test_realtime_guard_runs_on_book_event() {
        let mut state = state();
        let market = add_market(&mut state, "btc-updown-5m-1700000100", dec!(0.40));

        // Open a bet by hand.
        let id = state
            .wallet
            .open_position(
                Venue::Polymarket,
                &market.up_token_id,
                PositionSide::Long,
                dec!(10),
                dec!(0.40),
                StrategyTag::PmUpdown,
                1,
                WINDOW_START,
            )
            .unwrap();
        state.meta.insert(id, PositionMeta::new(StrategyTag::PmUpdown, dec!(0.40)));
        state.bets.insert(
            id,
            BinaryBet {
                position_id: id,
                market_slug: market.slug.clone(),
                asset: "btc".into(),
                side: paperbot_polymarket::BetSide::Up,
                token_id: market.up_token_id.clone(),
                entry_share_price: dec!(0.40),
                cost_basis: dec!(10),
                resolution_ts_ms: market.end_ts_ms,
            },
        );

        // A snapshot with the bid collapsed 32.5% fires the realtime stop
        // before any tick runs.
        state.on_clob_event(
            ClobEvent::Snapshot {
                token_id: market.up_token_id.clone(),
                bids: vec![(dec!(0.27), dec!(50))],
                asks: vec![(dec!(0.30), dec!(50))],
            },
            WINDOW_START + 5_000,
        );

        assert!(state.bets.is_empty());
        let trade = state.wallet.trades().back().unwrap();
        assert_eq!(trade.exit_reason, paperbot_core::ExitReason::PmStopLossRealtime);
        assert_eq!(trade.exit_price, dec!(0.27));
    }

    #[test]
    fn test_merge_markets_captures_start_price_once() {
        let mut state = state();
        state.on_spot_tick(&spot(dec!(100.00), WINDOW_START));

        let market = UpDownMarket {
            asset: "btc".into(),
            timeframe: Timeframe::M5,
            slug: "btc-updown-5m-1700000100".into(),
            start_ts_ms: WINDOW_START,
            end_ts_ms: WINDOW_START + 300_000,
            up_token_id: "tok-up".into(),
            down_token_id: "tok-down".into(),
            start_price: None,
        };
        let tokens = state.merge_markets(vec![market.clone()]);
        assert_eq!(tokens, vec!["tok-up".to_string(), "tok-down".to_string()]);
        assert_eq!(
            state.markets[&market.slug].start_price,
            Some(dec!(100.00))
        );

        // Re-discovery of the same slug keeps the original reference even
        // though spot has moved.
        state.on_spot_tick(&spot(dec!(105.00), WINDOW_START + 1_000));
        let tokens = state.merge_markets(vec![market.clone()]);
        assert_eq!(tokens.len(), 2, "tokens re-registered for resubscribe");
        assert_eq!(
            state.markets[&market.slug].start_price,
            Some(dec!(100.00))
        );
        assert_eq!(state.counters.discovery_rounds, 2);
    }

    #[test]
    fn test_tick_settles_due_bet_as_win() {
        let mut state = state();
        let market = add_market(&mut state, "btc-updown-5m-1700000100", dec!(0.50));
        state.markets.get_mut(&market.slug).unwrap().start_price = Some(dec!(100.00));
        state.on_spot_tick(&spot(dec!(101.00), WINDOW_START));

        let id = state
            .wallet
            .open_position(
                Venue::Polymarket,
                &market.up_token_id,
                PositionSide::Long,
                dec!(10),
                dec!(0.50),
                StrategyTag::PmUpdown,
                1,
                WINDOW_START,
            )
            .unwrap();
        state.meta.insert(id, PositionMeta::new(StrategyTag::PmUpdown, dec!(0.50)));
        state.bets.insert(
            id,
            BinaryBet {
                position_id: id,
                market_slug: market.slug.clone(),
                asset: "btc".into(),
                side: paperbot_polymarket::BetSide::Up,
                token_id: market.up_token_id.clone(),
                entry_share_price: dec!(0.50),
                cost_basis: dec!(10),
                resolution_ts_ms: market.end_ts_ms,
            },
        );

        state.tick_sync(market.end_ts_ms + 1);
        assert!(state.bets.is_empty());
        let trade = state.wallet.trades().back().unwrap();
        assert_eq!(trade.exit_reason, paperbot_core::ExitReason::PmResolutionWin);
        assert_eq!(trade.exit_price, Decimal::ONE);
    }

    #[test]
    fn test_tick_gc_expires_markets_and_cooldowns() {
        let mut state = state();
        add_market(&mut state, "btc-updown-5m-1700000100", dec!(0.40));
        state.betted_slugs.insert("btc-updown-5m-1700000100".into());
        state.cooldowns.insert("btc".into(), WINDOW_START);

        // Just inside the 60 s grace: still tracked.
        state.tick_sync(WINDOW_START + 300_000 + 59_000);
        assert_eq!(state.markets.len(), 1);

        // Past the grace: market, slug mark and stale cooldown all go.
        state.tick_sync(WINDOW_START + 300_000 + 61_000);
        assert!(state.markets.is_empty());
        assert!(state.betted_slugs.is_empty());
        assert!(state.cooldowns.is_empty());
    }

    #[test]
    fn test_tick_mark_to_market_updates_unrealized() {
        let mut state = state();
        perps_book(&mut state, dec!(100.00), WINDOW_START);
        let id = state
            .wallet
            .open_position(
                Venue::Hyperliquid,
                "BTC",
                PositionSide::Long,
                dec!(50),
                dec!(100.00),
                StrategyTag::Momentum,
                20,
                WINDOW_START,
            )
            .unwrap();
        state.meta.insert(id, PositionMeta::new(StrategyTag::Momentum, dec!(100.00)));

        perps_book(&mut state, dec!(100.02), WINDOW_START + 500);
        state.tick_sync(WINDOW_START + 500);

        // +0.02% at 20x on 50 margin = +0.2; the trail has not armed and no
        // exit fires.
        let position = state.wallet.position(id).expect("still open");
        assert_eq!(position.unrealized_pnl, dec!(0.2));
    }

    #[test]
    fn test_arb_scan_runs_in_tick() {
        let mut state = state();
        let market = add_market(&mut state, "btc-updown-5m-1700000100", dec!(0.45));
        state.books.apply_snapshot(
            Venue::Polymarket,
            &market.down_token_id.clone(),
            vec![],
            vec![(dec!(0.48), dec!(100))],
            WINDOW_START,
        );

        state.tick_sync(WINDOW_START + 1_000);
        assert_eq!(state.arb_pairs.len(), 1);
        assert!(state.completed_arb_slugs.contains(&market.slug));
        assert_eq!(state.wallet.open_position_count(), 2);
    }

    #[test]
    fn test_backstop_closes_forgotten_position() {
        let mut state = state();
        perps_book(&mut state, dec!(100.00), WINDOW_START);

        // A quant position has no dedicated exit path; only the backstop
        // can reap it.
        let id = state
            .wallet
            .open_position(
                Venue::Hyperliquid,
                "BTC",
                PositionSide::Long,
                dec!(10),
                dec!(100.00),
                StrategyTag::Quant,
                1,
                WINDOW_START,
            )
            .unwrap();
        state.meta.insert(id, PositionMeta::new(StrategyTag::Quant, dec!(100.00)));

        // At exactly the backstop age it is still open.
        state.tick_sync(WINDOW_START + 3_600_000);
        assert!(state.wallet.position(id).is_some());

        // Past it, the position closes at the live mid and the meta goes.
        state.tick_sync(WINDOW_START + 3_600_001);
        assert_eq!(state.wallet.open_position_count(), 0);
        assert!(state.meta.is_empty());
        let trade = state.wallet.trades().back().unwrap();
        assert_eq!(trade.exit_reason, paperbot_core::ExitReason::TimeExit);
        assert_eq!(trade.exit_price, dec!(100.00));
    }

    #[test]
    fn test_backstop_falls_back_to_last_mark_without_book() {
        let mut state = state();
        let id = state
            .wallet
            .open_position(
                Venue::Polymarket,
                "gone-token",
                PositionSide::Long,
                dec!(10),
                dec!(0.40),
                StrategyTag::PmUpdown,
                1,
                WINDOW_START,
            )
            .unwrap();
        state.meta.insert(id, PositionMeta::new(StrategyTag::PmUpdown, dec!(0.40)));

        // No book for the token anywhere: the last mark (the entry) is
        // used so the position cannot linger forever.
        state.tick_sync(WINDOW_START + 3_600_001);
        assert_eq!(state.wallet.open_position_count(), 0);
        let trade = state.wallet.trades().back().unwrap();
        assert_eq!(trade.exit_price, dec!(0.40));
        assert_eq!(trade.pnl, Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut state = state();
        perps_book(&mut state, dec!(100.00), WINDOW_START);
        state.counters.tick_count = 10;

        let snapshot = state.build_snapshot(WINDOW_START + 5_000);
        assert_eq!(snapshot.wallet.cash_balance, dec!(100));
        assert_eq!(snapshot.wallet.equity, dec!(100));
        assert!((snapshot.uptime_s - 5.0).abs() < 1e-9);
        assert!((snapshot.ticks_per_second - 2.0).abs() < 1e-9);
        assert_eq!(snapshot.counters.books_tracked, 1);
        assert_eq!(snapshot.books.len(), 1);
        assert_eq!(snapshot.books[0].token_id, "BTC");
    }

    #[test]
    fn test_flash_crash_path_through_clob_events() {
        let mut state = state();
        let market = add_market(&mut state, "btc-updown-5m-1700000100", dec!(0.42));
        let token = market.up_token_id.clone();
        let t0 = WINDOW_START + 60_000;

        let snapshot = |bid: Decimal, ask: Decimal| ClobEvent::Snapshot {
            token_id: token.clone(),
            bids: vec![(bid, dec!(100))],
            asks: vec![(ask, dec!(100))],
        };

        // Mid path 0.60 -> 0.58 -> 0.40 inside 4 s: 33% drop.
        state.on_clob_event(snapshot(dec!(0.58), dec!(0.62)), t0);
        state.on_clob_event(snapshot(dec!(0.56), dec!(0.60)), t0 + 2_000);
        state.on_clob_event(snapshot(dec!(0.38), dec!(0.42)), t0 + 4_000);

        assert_eq!(state.bets.len(), 1);
        let bet = state.bets.values().next().unwrap();
        assert_eq!(bet.entry_share_price, dec!(0.42));
        let position = state.wallet.position(bet.position_id).unwrap();
        assert_eq!(position.strategy, StrategyTag::PmFlashCrash);
        // 20% of 100 equity.
        assert_eq!(position.margin, dec!(20));
    }
}
