// =============================================================================
// Window Aggregator — taker buy/sell notional over a fixed window
// =============================================================================
//
// Accumulates taker buy/sell notional for the open window and hands the
// totals over atomically when the window flips.  Both counters live behind a
// single mutex so a flip can never observe one counter from the old window
// and one from the new.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Result of one atomic window flip.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFlip {
    /// Taker buy notional accumulated over the closed window.
    pub taker_buy: f64,
    /// Taker sell notional accumulated over the closed window.
    pub taker_sell: f64,
    /// Order-flow imbalance: taker_buy − taker_sell.
    pub delta: f64,
    /// When the window closed.
    pub flipped_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Counters {
    buy_notional: f64,
    sell_notional: f64,
}

/// Running taker-volume counters for the currently open window.
///
/// `record_trade` and `flip` are non-blocking and never perform I/O; they are
/// safe to call from the message loop and the flip tick respectively.
#[derive(Debug, Default)]
pub struct WindowAggregator {
    counters: Mutex<Counters>,
}

impl WindowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one trade into the open window.
    ///
    /// `buyer_is_maker == true` means the aggressive side was selling, so the
    /// notional counts as taker sell; otherwise taker buy.
    pub fn record_trade(&self, price: f64, quantity: f64, buyer_is_maker: bool) {
        let notional = price * quantity;
        let mut counters = self.counters.lock();
        if buyer_is_maker {
            counters.sell_notional += notional;
        } else {
            counters.buy_notional += notional;
        }
    }

    /// Atomically close the window: capture both counters, reset them to
    /// zero, and return the captured totals stamped with the current time.
    ///
    /// A window with no trades yields an explicit all-zero flip, which is
    /// distinct from "no data" — zero flow was observed.
    pub fn flip(&self) -> WindowFlip {
        let (taker_buy, taker_sell) = {
            let mut counters = self.counters.lock();
            let captured = (counters.buy_notional, counters.sell_notional);
            counters.buy_notional = 0.0;
            counters.sell_notional = 0.0;
            captured
        };

        WindowFlip {
            taker_buy,
            taker_sell,
            delta: taker_buy - taker_sell,
            flipped_at: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_sums_buy_and_sell_sides() {
        let agg = WindowAggregator::new();
        // buy 100, buy 50, sell 30 (price × qty)
        agg.record_trade(100.0, 1.0, false);
        agg.record_trade(50.0, 1.0, false);
        agg.record_trade(30.0, 1.0, true);

        let flip = agg.flip();
        assert_eq!(flip.taker_buy, 150.0);
        assert_eq!(flip.taker_sell, 30.0);
        assert_eq!(flip.delta, 120.0);
    }

    #[test]
    fn flip_resets_counters() {
        let agg = WindowAggregator::new();
        agg.record_trade(100.0, 2.0, false);
        agg.flip();

        let second = agg.flip();
        assert_eq!(second.taker_buy, 0.0);
        assert_eq!(second.taker_sell, 0.0);
        assert_eq!(second.delta, 0.0);
    }

    #[test]
    fn empty_window_flips_to_zeros() {
        let agg = WindowAggregator::new();
        let flip = agg.flip();
        assert_eq!(flip.taker_buy, 0.0);
        assert_eq!(flip.taker_sell, 0.0);
        assert_eq!(flip.delta, 0.0);
    }

    #[test]
    fn notional_uses_price_times_quantity() {
        let agg = WindowAggregator::new();
        agg.record_trade(37000.0, 0.5, false);
        agg.record_trade(37000.0, 0.25, true);

        let flip = agg.flip();
        assert_eq!(flip.taker_buy, 18500.0);
        assert_eq!(flip.taker_sell, 9250.0);
        assert_eq!(flip.delta, 9250.0);
    }

    #[test]
    fn delta_can_be_negative() {
        let agg = WindowAggregator::new();
        agg.record_trade(10.0, 1.0, true);
        let flip = agg.flip();
        assert_eq!(flip.delta, -10.0);
    }
}
