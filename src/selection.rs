//! # Selection Policy
//! Pure, deterministic top-N pick over one cycle's scores:
//! threshold → ledger dedup → stable rank by score (desc) → budget.
//! The ledger is only borrowed, so the caller's view is fixed for the call.

use crate::analyze::ScoreResult;
use crate::history::Ledger;

pub fn select(
    scored: &[ScoreResult],
    threshold: f32,
    budget: usize,
    ledger: &Ledger,
) -> Vec<ScoreResult> {
    let mut survivors: Vec<ScoreResult> = scored
        .iter()
        .filter(|s| s.score >= threshold)
        .filter(|s| {
            let seen = ledger.contains(&s.content_id);
            if seen {
                tracing::debug!(content_id = %s.content_id, "selection: already published");
            }
            !seen
        })
        .cloned()
        .collect();

    // Ties keep fetch order regardless of the order scores arrived in.
    survivors.sort_by_key(|s| s.fetch_index);
    survivors.sort_by(|a, b| b.score.total_cmp(&a.score));
    survivors.truncate(budget);
    survivors
}
