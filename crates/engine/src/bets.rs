//! Side-car state attached to open positions.

use paperbot_core::StrategyTag;
use paperbot_polymarket::BetSide;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Per-position exit bookkeeping, keyed by position id and living exactly
/// as long as the position does.
#[derive(Debug, Clone)]
pub struct PositionMeta {
    /// Owning strategy.
    pub strategy: StrategyTag,
    /// Highest mark seen since open.
    pub max_price: Decimal,
    /// Lowest mark seen since open.
    pub min_price: Decimal,
    /// Whether the trailing stop has armed.
    pub trail_active: bool,
    /// Take-profit price recorded at open, if the strategy uses one.
    pub tp_price: Option<Decimal>,
    /// Stop-loss price recorded at open, if the strategy uses one.
    pub sl_price: Option<Decimal>,
}

impl PositionMeta {
    /// Creates meta seeded at the entry price.
    #[must_use]
    pub fn new(strategy: StrategyTag, entry_price: Decimal) -> Self {
        Self {
            strategy,
            max_price: entry_price,
            min_price: entry_price,
            trail_active: false,
            tp_price: None,
            sl_price: None,
        }
    }

    /// Folds a new mark into the running extremes.
    pub fn observe(&mut self, price: Decimal) {
        if price > self.max_price {
            self.max_price = price;
        }
        if price < self.min_price {
            self.min_price = price;
        }
    }
}

/// Side-car for a single-sided binary-market position.
#[derive(Debug, Clone)]
pub struct BinaryBet {
    /// Backing paper position.
    pub position_id: Uuid,
    /// Market slug the bet sits on.
    pub market_slug: String,
    /// Underlying asset, lowercase.
    pub asset: String,
    /// Outcome side held.
    pub side: BetSide,
    /// Token id of the held outcome.
    pub token_id: String,
    /// Share price paid at entry.
    pub entry_share_price: Decimal,
    /// Cash committed.
    pub cost_basis: Decimal,
    /// Resolution time, epoch ms.
    pub resolution_ts_ms: i64,
}

/// A complete-set arbitrage pair registered for settlement.
#[derive(Debug, Clone)]
pub struct ArbPair {
    /// Market slug.
    pub market_slug: String,
    /// Underlying asset, lowercase.
    pub asset: String,
    /// Up-leg position id.
    pub up_position_id: Uuid,
    /// Down-leg position id.
    pub down_position_id: Uuid,
    /// Shares held on each leg.
    pub shares: Decimal,
    /// Combined entry cost per set.
    pub pair_cost: Decimal,
    /// Resolution time, epoch ms.
    pub resolution_ts_ms: i64,
}
