// src/ingest/mod.rs
pub mod download;
pub mod providers;
pub mod types;

use crate::ingest::types::{ContentItem, ContentSource, SortMode};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pipeline_items_fetched_total",
            "Items returned by sources after in-cycle dedup."
        );
        describe_counter!(
            "pipeline_source_errors_total",
            "Source fetch failures and timeouts."
        );
        describe_counter!(
            "pipeline_source_posts_total",
            "Raw posts listed by remote sources before filtering."
        );
        describe_counter!(
            "pipeline_download_errors_total",
            "Image downloads abandoned after retries."
        );
        describe_counter!(
            "pipeline_ingest_dedup_total",
            "Items dropped because another source returned the same id."
        );
        describe_histogram!("pipeline_fetch_ms", "Per-source fetch time in milliseconds.");
        describe_gauge!(
            "pipeline_last_cycle_ts",
            "Unix ts when the last cycle finished."
        );
    });
}

/// A configured (source, selector) pair.
#[derive(Clone)]
pub struct SourceBinding {
    pub source: Arc<dyn ContentSource>,
    pub selector: String,
    pub sort: SortMode,
    pub limit: usize,
}

impl SourceBinding {
    pub fn new(source: Arc<dyn ContentSource>, selector: impl Into<String>, sort: SortMode, limit: usize) -> Self {
        Self {
            source,
            selector: selector.into(),
            sort,
            limit,
        }
    }

    /// `reddit/memes` style label for logs.
    pub fn label(&self) -> String {
        format!("{}/{}", self.source.name(), self.selector)
    }
}

/// Fetch one binding under `timeout`. A timeout is an ordinary error.
pub async fn fetch_one(binding: &SourceBinding, timeout: Duration) -> anyhow::Result<Vec<ContentItem>> {
    let started = Instant::now();
    let res = tokio::time::timeout(
        timeout,
        binding
            .source
            .fetch(&binding.selector, binding.sort, binding.limit),
    )
    .await;
    histogram!("pipeline_fetch_ms", "source" => binding.source.name())
        .record(started.elapsed().as_secs_f64() * 1000.0);
    match res {
        Ok(inner) => inner,
        Err(_) => Err(anyhow::anyhow!(
            "{} timed out after {}s",
            binding.label(),
            timeout.as_secs()
        )),
    }
}

/// Keep the first occurrence of every content id, preserving order.
/// Returns the number of dropped duplicates.
pub fn dedup_by_id(items: &mut Vec<ContentItem>) -> usize {
    let before = items.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    items.retain(|it| seen.insert(it.content_id.clone()));
    before - items.len()
}

/// Run every binding once, in order. Failures are logged and skipped; the
/// result is the concatenation of what succeeded, deduplicated by id.
pub async fn run_once(bindings: &[SourceBinding], timeout: Duration) -> Vec<ContentItem> {
    ensure_metrics_described();

    let mut items = Vec::new();
    for b in bindings {
        match fetch_one(b, timeout).await {
            Ok(mut v) => {
                tracing::debug!(source = %b.label(), n = v.len(), "source fetched");
                items.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(error = ?e, source = %b.label(), "source error");
                counter!("pipeline_source_errors_total", "source" => b.source.name()).increment(1);
            }
        }
    }

    let dropped = dedup_by_id(&mut items);
    counter!("pipeline_ingest_dedup_total").increment(dropped as u64);
    counter!("pipeline_items_fetched_total").increment(items.len() as u64);
    items
}
