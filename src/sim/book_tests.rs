//! Book Scenario and Property Tests
//!
//! These tests verify:
//! 1. Leg pricing and capital flow for opens, closes, and flips
//! 2. FIFO-derived realized PnL and fee accrual through the book
//! 3. Resolution completeness (queue drained, position zeroed, cash credited)
//! 4. Universe growth with index stability and zero-padded state
//! 5. Forced liquidation of delisted contracts, visible in the fill output
//! 6. No-op idempotence and the input-validation error paths
//! 7. NAV and lot/position reconciliation across randomized trade sequences

use crate::sim::book::Book;
use crate::sim::error::SimError;
use crate::sim::market_data::{ContractId, PriceSnapshot, Qty, Quote};
use crate::sim::position_change::PositionChange;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

fn snapshot(quotes: &[(ContractId, f64, f64, f64)]) -> PriceSnapshot {
    let mut snap = PriceSnapshot::new();
    for &(cid, bid, ask, trade) in quotes {
        snap.insert(cid, Quote::new(bid, ask, trade));
    }
    snap
}

fn approx(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "expected {} ~= {}", a, b);
}

// =============================================================================
// TEST 1: Open long from flat
// =============================================================================

#[test]
fn test_open_long_from_flat() {
    let mut book = Book::new(1000.0);
    let snap = snapshot(&[(1, 0.40, 0.45, 0.42)]);
    book.update_universe(&[1], &snap).unwrap();

    let fills = book.apply_position_change(&[Some(10.0)], &snap).unwrap();
    book.set_mark_price(&snap);

    assert_eq!(fills.len(), 1);
    approx(fills[0].cost, 4.5);
    approx(fills[0].qty, 10.0);
    approx(fills[0].pos, 0.0);
    approx(book.capital(), 995.5);
    assert_eq!(book.position(), &[10.0]);

    let summary = book.summary();
    approx(summary.pos_cost, 4.5);
    approx(summary.net_cost, 4.5);
    approx(summary.pos_value, 4.2);
    approx(summary.value, 999.7);
    approx(summary.unrealized_pnl, -0.3);
    approx(summary.realized_pnl, 0.0);
}

// =============================================================================
// TEST 2: Flip long to short through zero
// =============================================================================

#[test]
fn test_flip_long_to_short() {
    let mut book = Book::new(1000.0);
    let day1 = snapshot(&[(1, 0.40, 0.45, 0.42)]);
    book.update_universe(&[1], &day1).unwrap();
    book.apply_position_change(&[Some(10.0)], &day1).unwrap();

    let day2 = snapshot(&[(1, 0.50, 0.55, 0.52)]);
    let fills = book.apply_position_change(&[Some(-5.0)], &day2).unwrap();
    book.set_mark_price(&day2);

    // Close 10 at bid 0.50, open 5 short at 1 - bid = 0.50.
    assert_eq!(fills.len(), 1);
    approx(fills[0].qty, -15.0);
    approx(fills[0].cost, -(10.0 * 0.50 - 5.0 * 0.50));
    approx(book.capital(), 995.5 + 2.5);
    assert_eq!(book.position(), &[-5.0]);

    let summary = book.summary();
    approx(summary.realized_pnl, 10.0 * (1.0 - 0.45 - 0.50));
    approx(summary.fees, 0.1 * 10.0 * (1.0 - 0.45 - 0.50));
    // Remaining short lot carries the complementary price.
    approx(summary.pos_cost, 5.0 * 0.50);
    // Short marked at 1 - trade price.
    approx(summary.pos_value, 5.0 * (1.0 - 0.52));
}

// =============================================================================
// TEST 3: Resolution completeness
// =============================================================================

#[test]
fn test_resolution_long_winner() {
    let mut book = Book::new(100.0);
    let snap = snapshot(&[(1, 0.45, 0.50, 0.47)]);
    book.update_universe(&[1], &snap).unwrap();
    book.apply_position_change(&[Some(8.0)], &snap).unwrap();
    approx(book.capital(), 100.0 - 4.0);

    let mut resolutions = HashMap::new();
    resolutions.insert(1, 1.0);
    book.apply_resolutions(&resolutions).unwrap();

    approx(book.capital(), 96.0 + 8.0);
    assert_eq!(book.position(), &[0.0]);
    assert!(book.is_resolved(0));
    assert!(!book.universe().is_active(0));
    // Queue drained; NAV is pure capital.
    approx(book.summary().pos_cost, 0.0);
    approx(book.value(), book.capital());
    approx(book.summary().realized_pnl, 8.0 * (1.0 - 0.50));

    // Resolving again is a no-op.
    book.apply_resolutions(&resolutions).unwrap();
    approx(book.capital(), 104.0);
}

#[test]
fn test_resolution_short_loser() {
    let mut book = Book::new(100.0);
    let snap = snapshot(&[(1, 0.60, 0.65, 0.62)]);
    book.update_universe(&[1], &snap).unwrap();
    book.apply_position_change(&[Some(-6.0)], &snap).unwrap();
    // Opened short: paid 6 * (1 - 0.60).
    approx(book.capital(), 100.0 - 2.4);

    let mut resolutions = HashMap::new();
    resolutions.insert(1, 1.0);
    book.apply_resolutions(&resolutions).unwrap();

    // Short against a winning contract pays nothing back.
    approx(book.capital(), 97.6);
    assert_eq!(book.position(), &[0.0]);
    approx(book.summary().realized_pnl, 6.0 * (1.0 - 0.40 - 1.0));
}

// =============================================================================
// TEST 4: Universe growth, index stability, zero padding
// =============================================================================

#[test]
fn test_universe_growth_pads_state() {
    let mut book = Book::new(1000.0);
    let day1 = snapshot(&[(10, 0.30, 0.35, 0.32), (20, 0.60, 0.65, 0.62)]);
    book.update_universe(&[10, 20], &day1).unwrap();
    book.apply_position_change(&[Some(5.0), Some(-3.0)], &day1)
        .unwrap();

    let idx10 = book.universe().index_of(10).unwrap();
    let idx20 = book.universe().index_of(20).unwrap();

    let day2 = snapshot(&[
        (10, 0.30, 0.35, 0.32),
        (20, 0.60, 0.65, 0.62),
        (5, 0.10, 0.15, 0.12),
        (30, 0.50, 0.55, 0.52),
        (40, 0.70, 0.75, 0.72),
    ]);
    let forced = book
        .update_universe(&[10, 20, 5, 30, 40], &day2)
        .unwrap();
    assert!(forced.is_empty());

    // Previously assigned indices unchanged; new ids appended sorted.
    assert_eq!(book.universe().index_of(10).unwrap(), idx10);
    assert_eq!(book.universe().index_of(20).unwrap(), idx20);
    assert_eq!(book.universe().ids(), &[10, 20, 5, 30, 40]);

    // New state is zero-padded, old positions survive.
    assert_eq!(book.position().len(), 5);
    approx(book.position()[idx10], 5.0);
    approx(book.position()[idx20], -3.0);
    approx(book.position()[2], 0.0);
    approx(book.position()[3], 0.0);
    approx(book.position()[4], 0.0);
}

// =============================================================================
// TEST 5: Forced liquidation of a delisted contract
// =============================================================================

#[test]
fn test_forced_liquidation_on_delisting() {
    let mut book = Book::new(1000.0);
    let day1 = snapshot(&[(1, 0.40, 0.45, 0.42), (2, 0.20, 0.25, 0.22)]);
    book.update_universe(&[1, 2], &day1).unwrap();
    book.apply_position_change(&[Some(10.0), Some(4.0)], &day1)
        .unwrap();

    // Contract 2 drops out while still holding 4 long; it must be sold at
    // the bid before going inactive.
    let day2 = snapshot(&[(1, 0.40, 0.45, 0.42), (2, 0.18, 0.23, 0.20)]);
    let forced = book.update_universe(&[1], &day2).unwrap();

    assert_eq!(forced.len(), 1);
    assert_eq!(forced[0].cid, 2);
    approx(forced[0].qty, -4.0);
    approx(forced[0].cost, -4.0 * 0.18);

    let idx2 = book.universe().index_of(2).unwrap();
    approx(book.position()[idx2], 0.0);
    assert!(!book.universe().is_active(idx2));
    assert!(book.universe().contains(2));
}

#[test]
fn test_forced_liquidation_requires_quotes() {
    let mut book = Book::new(1000.0);
    let day1 = snapshot(&[(1, 0.40, 0.45, 0.42)]);
    book.update_universe(&[1], &day1).unwrap();
    book.apply_position_change(&[Some(10.0)], &day1).unwrap();

    // Delisted with an open position and no quote: loud failure, not a skip.
    let day2 = PriceSnapshot::new();
    let err = book.update_universe(&[], &day2).unwrap_err();
    assert_eq!(err, SimError::MissingPriceData { cid: 1 });
}

// =============================================================================
// TEST 6: No-op idempotence and validation errors
// =============================================================================

#[test]
fn test_noop_change_is_free() {
    let mut book = Book::new(1000.0);
    let snap = snapshot(&[(1, 0.40, 0.45, 0.42), (2, 0.20, 0.25, 0.22)]);
    book.update_universe(&[1, 2], &snap).unwrap();
    book.apply_position_change(&[Some(10.0), None], &snap).unwrap();

    let capital = book.capital();
    let position = book.position().to_vec();

    // Explicit current targets and all-None both change nothing.
    let fills = book
        .apply_position_change(&[Some(10.0), Some(0.0)], &snap)
        .unwrap();
    assert!(fills.is_empty());
    let fills = book.apply_position_change(&[None, None], &snap).unwrap();
    assert!(fills.is_empty());

    assert_eq!(book.capital(), capital);
    assert_eq!(book.position(), &position[..]);
}

#[test]
fn test_missing_quote_rejects_whole_change() {
    let mut book = Book::new(1000.0);
    let listing = snapshot(&[(1, 0.40, 0.45, 0.42), (2, 0.20, 0.25, 0.22)]);
    book.update_universe(&[1, 2], &listing).unwrap();

    // Contract 2 has only a trade price today.
    let mut snap = snapshot(&[(1, 0.40, 0.45, 0.42)]);
    snap.insert(
        2,
        Quote {
            bid_price: None,
            ask_price: None,
            trade_price: Some(0.22),
        },
    );

    let err = book
        .apply_position_change(&[Some(5.0), Some(5.0)], &snap)
        .unwrap_err();
    assert_eq!(err, SimError::MissingPriceData { cid: 2 });

    // All-or-nothing: contract 1 was not traded either.
    assert_eq!(book.position(), &[0.0, 0.0]);
    approx(book.capital(), 1000.0);
}

#[test]
fn test_length_mismatch_rejected() {
    let mut book = Book::new(1000.0);
    let snap = snapshot(&[(1, 0.40, 0.45, 0.42)]);
    book.update_universe(&[1], &snap).unwrap();
    let err = book
        .apply_position_change(&[Some(1.0), Some(2.0)], &snap)
        .unwrap_err();
    assert_eq!(
        err,
        SimError::LengthMismatch {
            expected: 1,
            actual: 2
        }
    );
}

#[test]
fn test_unknown_contract_resolution_rejected() {
    let mut book = Book::new(1000.0);
    let snap = snapshot(&[(1, 0.40, 0.45, 0.42)]);
    book.update_universe(&[1], &snap).unwrap();

    let mut resolutions = HashMap::new();
    resolutions.insert(99, 1.0);
    assert_eq!(
        book.apply_resolutions(&resolutions).unwrap_err(),
        SimError::UnknownContract { cid: 99 }
    );

    let mut resolutions = HashMap::new();
    resolutions.insert(1, 1.5);
    assert_eq!(
        book.apply_resolutions(&resolutions).unwrap_err(),
        SimError::InvalidSettlement { cid: 1, value: 1.5 }
    );
}

#[test]
fn test_trading_resolved_contract_rejected() {
    let mut book = Book::new(1000.0);
    let snap = snapshot(&[(1, 0.40, 0.45, 0.42)]);
    book.update_universe(&[1], &snap).unwrap();

    let mut resolutions = HashMap::new();
    resolutions.insert(1, 0.0);
    book.apply_resolutions(&resolutions).unwrap();

    let err = book
        .apply_position_change(&[Some(5.0)], &snap)
        .unwrap_err();
    assert_eq!(err, SimError::ContractResolved { cid: 1 });
}

// =============================================================================
// TEST 7: Capital conservation against the fill log
// =============================================================================

#[test]
fn test_capital_conservation_matches_fills() {
    let mut book = Book::new(5000.0);
    let snap = snapshot(&[
        (1, 0.40, 0.45, 0.42),
        (2, 0.20, 0.25, 0.22),
        (3, 0.70, 0.75, 0.72),
    ]);
    book.update_universe(&[1, 2, 3], &snap).unwrap();

    let targets: Vec<Vec<Option<Qty>>> = vec![
        vec![Some(10.0), Some(-20.0), Some(5.0)],
        vec![Some(-4.0), Some(-25.0), None],
        vec![Some(0.0), Some(12.0), Some(-7.0)],
    ];

    for target in targets {
        let before = book.capital();
        let fills = book.apply_position_change(&target, &snap).unwrap();
        let total_cost: f64 = fills.iter().map(|f| f.cost).sum();
        approx(before - book.capital(), total_cost);
    }
}

// =============================================================================
// TEST 8: Randomized invariant sweep (seeded)
// =============================================================================

#[test]
fn test_randomized_sequences_hold_invariants() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let cids: Vec<ContractId> = (1..=5).collect();

    for _ in 0..20 {
        let mut book = Book::new(10_000.0);

        for _day in 0..30 {
            let quotes: Vec<(ContractId, f64, f64, f64)> = cids
                .iter()
                .map(|&cid| {
                    let mid: f64 = rng.gen_range(0.10..0.90);
                    (cid, (mid - 0.02).max(0.01), (mid + 0.02).min(0.99), mid)
                })
                .collect();
            let snap = snapshot(&quotes);
            book.update_universe(&cids, &snap).unwrap();

            let target: Vec<Option<Qty>> = (0..cids.len())
                .map(|_| {
                    if rng.gen_bool(0.3) {
                        None
                    } else {
                        Some(rng.gen_range(-50.0_f64..50.0).round())
                    }
                })
                .collect();

            let before = book.capital();
            let fills = book.apply_position_change(&target, &snap).unwrap();
            let total_cost: f64 = fills.iter().map(|f| f.cost).sum();
            assert!((before - book.capital() - total_cost).abs() < 1e-9);

            book.set_mark_price(&snap);

            // NAV identity after every mutation.
            let summary = book.summary();
            assert!((summary.value - (summary.capital + summary.pos_value)).abs() < 1e-9);
            assert!((summary.unrealized_pnl - (summary.pos_value - summary.pos_cost)).abs() < 1e-9);
        }

        // Settle everything; the book must collapse to pure capital.
        let resolutions: HashMap<ContractId, f64> = cids
            .iter()
            .map(|&cid| (cid, if rng.gen_bool(0.5) { 1.0 } else { 0.0 }))
            .collect();
        book.apply_resolutions(&resolutions).unwrap();
        assert!(book.position().iter().all(|&p| p == 0.0));
        approx(book.summary().pos_cost, 0.0);
        approx(book.value(), book.capital());
    }
}

// =============================================================================
// TEST 9: Decomposition closure over random position pairs
// =============================================================================

#[test]
fn test_decomposition_closure_randomized() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for _ in 0..500 {
        let n = rng.gen_range(1..8);
        let cur: Vec<Qty> = (0..n).map(|_| rng.gen_range(-100.0_f64..100.0)).collect();
        let new: Vec<Qty> = (0..n).map(|_| rng.gen_range(-100.0_f64..100.0)).collect();

        // Construction asserts leg closure internally; spot-check the sums.
        let change = PositionChange::new(cur.clone(), new.clone());
        for i in 0..n {
            approx(change.buy_qty[i] - change.sell_qty[i], new[i] - cur[i]);
            approx(
                change.buy_to_cover[i] + change.buy_to_open[i],
                change.buy_qty[i],
            );
            approx(
                change.sell_to_close[i] + change.sell_to_open[i],
                change.sell_qty[i],
            );
            // Closing never exceeds the opposing pre-existing position.
            assert!(change.buy_to_cover[i] <= (-cur[i]).max(0.0));
            assert!(change.sell_to_close[i] <= cur[i].max(0.0));
        }
    }
}
