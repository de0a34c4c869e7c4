//! Models for rolling up/down binary markets and the Gamma metadata wire
//! format.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rolling window length of an up/down market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// 5-minute window.
    #[serde(rename = "5m")]
    M5,
    /// 15-minute window.
    #[serde(rename = "15m")]
    M15,
}

impl Timeframe {
    /// Window length in seconds (the slug period).
    #[must_use]
    pub const fn period_s(self) -> i64 {
        match self {
            Self::M5 => 300,
            Self::M15 => 900,
        }
    }

    /// Window length in milliseconds.
    #[must_use]
    pub const fn window_ms(self) -> i64 {
        self.period_s() * 1000
    }

    /// Slug segment (`5m` / `15m`).
    #[must_use]
    pub const fn slug_segment(self) -> &'static str {
        match self {
            Self::M5 => "5m",
            Self::M15 => "15m",
        }
    }

    /// Both supported timeframes.
    #[must_use]
    pub const fn all() -> [Self; 2] {
        [Self::M5, Self::M15]
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug_segment())
    }
}

/// Which outcome token a bet sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetSide {
    /// The "Up" outcome.
    Up,
    /// The "Down" outcome.
    Down,
}

impl fmt::Display for BetSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "Up"),
            Self::Down => write!(f, "Down"),
        }
    }
}

/// A discovered rolling up/down binary market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpDownMarket {
    /// Underlying asset, lowercase (`btc`, `eth`, ...).
    pub asset: String,
    /// Window length.
    pub timeframe: Timeframe,
    /// Deterministic slug the market was discovered under.
    pub slug: String,
    /// Window start, epoch ms.
    pub start_ts_ms: i64,
    /// Window end (resolution time), epoch ms.
    pub end_ts_ms: i64,
    /// Token id of the "Up" outcome.
    pub up_token_id: String,
    /// Token id of the "Down" outcome.
    pub down_token_id: String,
    /// External spot price at first observation; settlement reference.
    pub start_price: Option<Decimal>,
}

impl UpDownMarket {
    /// Milliseconds until resolution (negative once past).
    #[must_use]
    pub fn time_to_end_ms(&self, now_ms: i64) -> i64 {
        self.end_ts_ms - now_ms
    }

    /// Fraction of the window already elapsed, clamped to [0, 1].
    #[must_use]
    pub fn elapsed_pct(&self, now_ms: i64) -> f64 {
        let window = (self.end_ts_ms - self.start_ts_ms) as f64;
        if window <= 0.0 {
            return 1.0;
        }
        (((now_ms - self.start_ts_ms) as f64) / window).clamp(0.0, 1.0)
    }

    /// Fraction of the window still remaining, clamped to [0, 1].
    #[must_use]
    pub fn remaining_pct(&self, now_ms: i64) -> f64 {
        1.0 - self.elapsed_pct(now_ms)
    }

    /// Token id for a side.
    #[must_use]
    pub fn token_for(&self, side: BetSide) -> &str {
        match side {
            BetSide::Up => &self.up_token_id,
            BetSide::Down => &self.down_token_id,
        }
    }

    /// Side a token id belongs to, if it belongs to this market.
    #[must_use]
    pub fn side_of(&self, token_id: &str) -> Option<BetSide> {
        if token_id == self.up_token_id {
            Some(BetSide::Up)
        } else if token_id == self.down_token_id {
            Some(BetSide::Down)
        } else {
            None
        }
    }
}

/// One market object as returned by the Gamma metadata endpoint.
///
/// `outcomes` and `clob_token_ids` arrive JSON-encoded inside the JSON
/// (e.g. `"[\"Up\", \"Down\"]"`).
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
    /// Market slug.
    #[serde(default)]
    pub slug: Option<String>,
    /// JSON-encoded outcome names.
    #[serde(default)]
    pub outcomes: Option<String>,
    /// JSON-encoded CLOB token ids, same order as `outcomes`.
    #[serde(rename = "clobTokenIds", default)]
    pub clob_token_ids: Option<String>,
    /// JSON-encoded outcome prices (unused, kept for completeness).
    #[serde(rename = "outcomePrices", default)]
    pub outcome_prices: Option<String>,
    /// Market end date, if present.
    #[serde(rename = "endDate", default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl GammaMarket {
    /// Extracts `(up_token_id, down_token_id)` when the market's outcomes
    /// are exactly `["Up", "Down"]`. Any other shape returns `None`.
    #[must_use]
    pub fn up_down_tokens(&self) -> Option<(String, String)> {
        let outcomes: Vec<String> = serde_json::from_str(self.outcomes.as_deref()?).ok()?;
        let tokens: Vec<String> = serde_json::from_str(self.clob_token_ids.as_deref()?).ok()?;
        if outcomes.len() != 2 || tokens.len() != 2 {
            return None;
        }
        if outcomes[0] != "Up" || outcomes[1] != "Down" {
            return None;
        }
        Some((tokens[0].clone(), tokens[1].clone()))
    }
}
