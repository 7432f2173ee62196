//! Position Change Decomposition
//!
//! Splits a requested old/new position pair into the four economically
//! distinct execution legs: buy-to-cover-short, buy-to-open-long,
//! sell-to-close-long, sell-to-open-short. Closing flow always consumes the
//! opposing pre-existing position before any opening quantity is recorded;
//! the book's capital accounting depends on that ordering.

use crate::sim::market_data::Qty;

fn positive(x: f64) -> f64 {
    x.max(0.0)
}

fn negative(x: f64) -> f64 {
    (-x).max(0.0)
}

/// Pure decomposition of a position delta into execution legs.
///
/// All vectors share the universe index space. Closure invariants are checked
/// at construction and abort on mismatch.
#[derive(Debug, Clone, Default)]
pub struct PositionChange {
    pub cur_pos: Vec<Qty>,
    pub new_pos: Vec<Qty>,
    pub diff: Vec<Qty>,
    pub buy_qty: Vec<Qty>,
    pub sell_qty: Vec<Qty>,
    /// Buy flow that covers an existing short.
    pub buy_to_cover: Vec<Qty>,
    /// Buy flow that opens new long exposure.
    pub buy_to_open: Vec<Qty>,
    /// Sell flow that closes an existing long.
    pub sell_to_close: Vec<Qty>,
    /// Sell flow that opens new short exposure.
    pub sell_to_open: Vec<Qty>,
}

impl PositionChange {
    pub fn new(cur_pos: Vec<Qty>, new_pos: Vec<Qty>) -> Self {
        assert_eq!(
            cur_pos.len(),
            new_pos.len(),
            "position vectors must share the universe index space"
        );

        let n = cur_pos.len();
        let mut change = Self {
            diff: vec![0.0; n],
            buy_qty: vec![0.0; n],
            sell_qty: vec![0.0; n],
            buy_to_cover: vec![0.0; n],
            buy_to_open: vec![0.0; n],
            sell_to_close: vec![0.0; n],
            sell_to_open: vec![0.0; n],
            cur_pos,
            new_pos,
        };

        for i in 0..n {
            let diff = change.new_pos[i] - change.cur_pos[i];
            let buy = positive(diff);
            let sell = negative(diff);

            // Closing consumes the opposing pre-existing position first.
            let cover = buy.min(negative(change.cur_pos[i]));
            let close = sell.min(positive(change.cur_pos[i]));

            change.diff[i] = diff;
            change.buy_qty[i] = buy;
            change.sell_qty[i] = sell;
            change.buy_to_cover[i] = cover;
            change.buy_to_open[i] = buy - cover;
            change.sell_to_close[i] = close;
            change.sell_to_open[i] = sell - close;
        }

        change.assert_closure();
        change
    }

    /// Build from a target vector where `None` means "leave unchanged".
    pub fn from_targets(cur_pos: &[Qty], target: &[Option<Qty>]) -> Self {
        assert_eq!(
            cur_pos.len(),
            target.len(),
            "target vector must share the universe index space"
        );
        let new_pos = cur_pos
            .iter()
            .zip(target)
            .map(|(&cur, t)| t.unwrap_or(cur))
            .collect();
        Self::new(cur_pos.to_vec(), new_pos)
    }

    /// Decomposition closure: each leg pair sums back to its parent quantity
    /// and `buy - sell == diff`. A mismatch beyond float rounding is a
    /// caller/programming defect.
    fn assert_closure(&self) {
        fn close(a: f64, b: f64) -> bool {
            (a - b).abs() <= 1e-9 * b.abs().max(1.0)
        }
        for i in 0..self.diff.len() {
            assert!(
                close(self.buy_qty[i] - self.sell_qty[i], self.diff[i]),
                "buy/sell decomposition does not close for index {}",
                i
            );
            assert!(
                close(self.buy_to_cover[i] + self.buy_to_open[i], self.buy_qty[i]),
                "buy legs do not sum to buy quantity for index {}",
                i
            );
            assert!(
                close(self.sell_to_close[i] + self.sell_to_open[i], self.sell_qty[i]),
                "sell legs do not sum to sell quantity for index {}",
                i
            );
        }
    }

    pub fn len(&self) -> usize {
        self.diff.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }

    /// True when no contract has a requested delta.
    pub fn is_noop(&self) -> bool {
        self.diff.iter().all(|&d| d == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legs(cur: f64, new: f64) -> (f64, f64, f64, f64) {
        let change = PositionChange::new(vec![cur], vec![new]);
        (
            change.buy_to_cover[0],
            change.buy_to_open[0],
            change.sell_to_close[0],
            change.sell_to_open[0],
        )
    }

    #[test]
    fn test_open_long_from_flat() {
        assert_eq!(legs(0.0, 10.0), (0.0, 10.0, 0.0, 0.0));
    }

    #[test]
    fn test_open_short_from_flat() {
        assert_eq!(legs(0.0, -10.0), (0.0, 0.0, 0.0, 10.0));
    }

    #[test]
    fn test_close_long_partially() {
        assert_eq!(legs(10.0, 4.0), (0.0, 0.0, 6.0, 0.0));
    }

    #[test]
    fn test_flip_long_to_short_closes_first() {
        // 10 long -> 5 short: close the full 10 before opening 5 short.
        assert_eq!(legs(10.0, -5.0), (0.0, 0.0, 10.0, 5.0));
    }

    #[test]
    fn test_flip_short_to_long_covers_first() {
        assert_eq!(legs(-4.0, 6.0), (4.0, 6.0, 0.0, 0.0));
    }

    #[test]
    fn test_none_target_means_unchanged() {
        let change = PositionChange::from_targets(&[3.0, -2.0, 7.0], &[None, Some(-2.0), Some(0.0)]);
        assert_eq!(change.new_pos, vec![3.0, -2.0, 0.0]);
        assert_eq!(change.diff, vec![0.0, 0.0, -7.0]);
        assert!(!change.is_noop());
    }

    #[test]
    fn test_noop_change() {
        let change = PositionChange::from_targets(&[3.0, -2.0], &[None, Some(-2.0)]);
        assert!(change.is_noop());
    }
}
