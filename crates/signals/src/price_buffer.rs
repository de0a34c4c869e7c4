//! Bounded per-symbol tick buffer.

use rust_decimal::Decimal;
use std::collections::VecDeque;

/// One spot tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    /// Observed price.
    pub price: Decimal,
    /// Arrival timestamp, epoch ms.
    pub ts_ms: i64,
}

/// Bounded FIFO of recent ticks for one symbol.
///
/// Capacity is `2 * W` where `W` is the momentum window, enough for the
/// detector's lookback plus headroom.
#[derive(Debug, Clone)]
pub struct PriceBuffer {
    entries: VecDeque<PricePoint>,
    cap: usize,
}

impl PriceBuffer {
    /// Creates a buffer for a momentum window of `window` ticks.
    #[must_use]
    pub fn for_window(window: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: window.max(1) * 2,
        }
    }

    /// Appends a tick, dropping the oldest entries beyond capacity.
    pub fn push(&mut self, price: Decimal, ts_ms: i64) {
        self.entries.push_back(PricePoint { price, ts_ms });
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    /// Number of buffered ticks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent tick.
    #[must_use]
    pub fn latest(&self) -> Option<PricePoint> {
        self.entries.back().copied()
    }

    /// The last `n` ticks, oldest first.
    #[must_use]
    pub fn last_n(&self, n: usize) -> Vec<PricePoint> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cap_is_twice_window() {
        let mut buffer = PriceBuffer::for_window(3);
        for i in 0..10 {
            buffer.push(dec!(100) + Decimal::from(i), i64::from(i));
        }
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.last_n(1)[0].ts_ms, 9);
        assert_eq!(buffer.last_n(6)[0].ts_ms, 4);
    }

    #[test]
    fn test_last_n_short_buffer() {
        let mut buffer = PriceBuffer::for_window(5);
        buffer.push(dec!(1), 0);
        buffer.push(dec!(2), 1);
        let window = buffer.last_n(5);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].price, dec!(1));
    }

    #[test]
    fn test_latest() {
        let mut buffer = PriceBuffer::for_window(2);
        assert!(buffer.latest().is_none());
        buffer.push(dec!(42), 7);
        assert_eq!(buffer.latest().unwrap().price, dec!(42));
    }
}
