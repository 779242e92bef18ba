// tests/selection.rs
use meme_pipeline::analyze::ScoreResult;
use meme_pipeline::selection::select;
use meme_pipeline::{Ledger, LedgerEntry};

fn sr(id: &str, score: f32, idx: usize) -> ScoreResult {
    ScoreResult {
        content_id: id.to_string(),
        score,
        fetch_index: idx,
    }
}

fn ids(v: &[ScoreResult]) -> Vec<&str> {
    v.iter().map(|s| s.content_id.as_str()).collect()
}

fn sample() -> Vec<ScoreResult> {
    vec![sr("A", 0.9, 0), sr("B", 0.7, 1), sr("C", 0.5, 2), sr("D", 0.95, 3)]
}

#[test]
fn top_two_above_threshold() {
    let ledger = Ledger::in_memory(100);
    assert_eq!(ids(&select(&sample(), 0.65, 2, &ledger)), vec!["D", "A"]);
}

#[test]
fn ledger_hit_is_excluded() {
    let mut ledger = Ledger::in_memory(100);
    ledger.record(LedgerEntry::new("D", 0.95));
    assert_eq!(ids(&select(&sample(), 0.65, 2, &ledger)), vec!["A", "B"]);
}

#[test]
fn threshold_is_inclusive() {
    let ledger = Ledger::in_memory(100);
    let out = select(&[sr("X", 0.65, 0), sr("Y", 0.6499, 1)], 0.65, 10, &ledger);
    assert_eq!(ids(&out), vec!["X"]);
}

#[test]
fn zero_budget_and_empty_input() {
    let ledger = Ledger::in_memory(100);
    assert!(select(&sample(), 0.0, 0, &ledger).is_empty());
    assert!(select(&[], 0.0, 5, &ledger).is_empty());
}

#[test]
fn larger_budget_is_a_superset_prefix() {
    let ledger = Ledger::in_memory(100);
    let scored: Vec<_> = (0..20)
        .map(|i| sr(&format!("i{i}"), ((i * 37) % 100) as f32 / 100.0, i))
        .collect();
    let mut prev: Vec<ScoreResult> = Vec::new();
    for budget in 0..=20 {
        let cur = select(&scored, 0.3, budget, &ledger);
        assert!(cur.len() <= budget);
        assert_eq!(&cur[..prev.len()], &prev[..]);
        prev = cur;
    }
}

#[test]
fn ties_follow_fetch_order_not_arrival_order() {
    let ledger = Ledger::in_memory(100);
    // arrival order scrambled; fetch order is p, q, r
    let arrived = vec![sr("r", 0.8, 2), sr("p", 0.8, 0), sr("q", 0.8, 1)];
    assert_eq!(ids(&select(&arrived, 0.5, 3, &ledger)), vec!["p", "q", "r"]);
}

#[test]
fn same_input_same_output() {
    let ledger = Ledger::in_memory(100);
    let a = select(&sample(), 0.6, 3, &ledger);
    let b = select(&sample(), 0.6, 3, &ledger);
    assert_eq!(a, b);
}

#[test]
fn raising_threshold_never_grows_selection() {
    let ledger = Ledger::in_memory(100);
    let scored: Vec<_> = (0..30)
        .map(|i| sr(&format!("i{i}"), ((i * 53) % 101) as f32 / 100.0, i))
        .collect();
    for budget in [3, 10, 30] {
        let mut prev = usize::MAX;
        for step in 0..=20 {
            let threshold = step as f32 * 0.05;
            let n = select(&scored, threshold, budget, &ledger).len();
            assert!(n <= prev, "threshold {threshold} budget {budget}: {n} > {prev}");
            prev = n;
        }
    }
}
