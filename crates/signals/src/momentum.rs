//! Momentum detection over the spot tick buffer.
//!
//! Two triggers can emit a signal on a price event:
//!
//! 1. **Consecutive-move**: the run of same-sign tick-to-tick deltas at the
//!    end of the window is at least `C` and the relative move from run
//!    start to run end is at least `M`.
//! 2. **Large-move**: `|change_10s| > large_move_pct`, bypassing the
//!    consecutive filter so the bet selector still sees violent short
//!    horizon moves.
//!
//! Either way the signal is confirmed against the leveraged-venue book:
//! the top-of-book depth imbalance must not strongly oppose the direction.
//! Unconfirmed signals are discarded.

use crate::price_buffer::PriceBuffer;
use paperbot_core::{L2OrderBook, MomentumConfig, PositionSide};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

/// An emitted momentum signal.
#[derive(Debug, Clone)]
pub struct MomentumSignal {
    /// Underlying asset, lowercase.
    pub asset: String,
    /// Direction of the move.
    pub direction: PositionSide,
    /// Signal strength in [0, 1].
    pub strength: f64,
    /// Relative move that produced the signal.
    pub move_size: f64,
    /// Whether the book confirmed the signal (always true for emitted
    /// signals; unconfirmed ones are discarded).
    pub confirmed: bool,
}

/// Stateless detector parameterised by [`MomentumConfig`].
#[derive(Debug, Clone)]
pub struct MomentumDetector {
    config: MomentumConfig,
}

impl MomentumDetector {
    /// Creates a detector.
    #[must_use]
    pub fn new(config: MomentumConfig) -> Self {
        Self { config }
    }

    /// Evaluates the buffer after a new tick for `asset`.
    ///
    /// `book` is the leveraged-venue book for the same asset, used for
    /// confirmation; with no book available the signal passes unopposed.
    #[must_use]
    pub fn detect(
        &self,
        asset: &str,
        buffer: &PriceBuffer,
        change_10s_pct: f64,
        book: Option<&L2OrderBook>,
    ) -> Option<MomentumSignal> {
        if let Some(signal) = self.detect_consecutive(asset, buffer) {
            if self.confirm(signal.direction, book) {
                return Some(signal);
            }
            debug!(asset, "Momentum signal opposed by book imbalance, discarding");
        }

        self.detect_large_move(asset, change_10s_pct, book)
    }

    fn detect_consecutive(&self, asset: &str, buffer: &PriceBuffer) -> Option<MomentumSignal> {
        let window = buffer.last_n(self.config.window);
        if window.len() < 2 {
            return None;
        }

        let deltas: Vec<Decimal> = window.windows(2).map(|w| w[1].price - w[0].price).collect();

        // Count consecutive same-sign deltas from the end; a zero delta
        // breaks the run.
        let last = *deltas.last()?;
        if last == Decimal::ZERO {
            return None;
        }
        let positive = last > Decimal::ZERO;
        let run = deltas
            .iter()
            .rev()
            .take_while(|d| (**d > Decimal::ZERO) == positive && **d != Decimal::ZERO)
            .count();

        if run < self.config.min_consecutive {
            return None;
        }

        // Relative move from run start to run end.
        let run_start = window[window.len() - 1 - run].price;
        let run_end = window[window.len() - 1].price;
        if run_start == Decimal::ZERO {
            return None;
        }
        let move_size = ((run_end - run_start) / run_start).to_f64().unwrap_or(0.0);
        if move_size.abs() < self.config.min_move_pct {
            return None;
        }

        let strength = (run as f64 / self.config.window as f64).min(1.0);
        Some(MomentumSignal {
            asset: asset.to_lowercase(),
            direction: if positive { PositionSide::Long } else { PositionSide::Short },
            strength,
            move_size,
            confirmed: true,
        })
    }

    fn detect_large_move(
        &self,
        asset: &str,
        change_10s_pct: f64,
        book: Option<&L2OrderBook>,
    ) -> Option<MomentumSignal> {
        if change_10s_pct.abs() <= self.config.large_move_pct {
            return None;
        }
        let direction = if change_10s_pct > 0.0 {
            PositionSide::Long
        } else {
            PositionSide::Short
        };
        if !self.confirm(direction, book) {
            return None;
        }
        Some(MomentumSignal {
            asset: asset.to_lowercase(),
            direction,
            strength: (300.0 * change_10s_pct.abs()).min(1.0),
            move_size: change_10s_pct,
            confirmed: true,
        })
    }

    /// The book confirms unless its imbalance strongly opposes the
    /// direction.
    fn confirm(&self, direction: PositionSide, book: Option<&L2OrderBook>) -> bool {
        let Some(book) = book else {
            return true;
        };
        let imbalance = book.depth_imbalance(self.config.confirm_levels);
        match direction {
            PositionSide::Long => imbalance > -self.config.opposing_imbalance,
            PositionSide::Short => imbalance < self.config.opposing_imbalance,
        }
    }
}
