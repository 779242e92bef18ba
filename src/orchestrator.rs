// src/orchestrator.rs
//! Cycle driver: Fetching → Scoring → Selecting → Publishing → Idle, repeated
//! until cancelled. One task drives the state machine; scoring fans out to a
//! bounded worker pool, publishing is strictly sequential.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::analyze::{QualityScorer, ScoreResult};
use crate::caption::{fallback_caption, CaptionGenerator};
use crate::config::PipelineConfig;
use crate::ingest::{self, types::ContentItem, SourceBinding};
use crate::notify::{PublishOutcome, Publisher};
use crate::selection::select;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Fetching,
    Scoring,
    Selecting,
    Publishing,
    Idle,
}

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub threshold: f32,
    pub budget: usize,
    pub post_interval: Duration,
    pub scrape_interval: Duration,
    pub fetch_timeout: Duration,
    pub workers: usize,
    pub shutdown_grace: Duration,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl CycleSettings {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            threshold: cfg.selection.min_score_threshold,
            budget: cfg.selection.max_daily_selections,
            post_interval: cfg.post_interval(),
            scrape_interval: cfg.scrape_interval(),
            fetch_timeout: Duration::from_secs(cfg.ingest.fetch_timeout_secs),
            workers: cfg.scoring.workers.max(1),
            shutdown_grace: Duration::from_secs(cfg.schedule.shutdown_grace_secs),
        }
    }
}

/// Outcome counts for one cycle. Kept in memory only.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub fetched: usize,
    pub scored: usize,
    pub selected: usize,
    pub posted: usize,
    pub already_posted: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl CycleReport {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            fetched: 0,
            scored: 0,
            selected: 0,
            posted: 0,
            already_posted: 0,
            failed: 0,
            cancelled: false,
        }
    }
}

/// What the status endpoint shows.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub phase: CyclePhase,
    pub cycles: u64,
    pub last_cycle: Option<CycleReport>,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self {
            phase: CyclePhase::Idle,
            cycles: 0,
            last_cycle: None,
        }
    }
}

pub struct Orchestrator {
    bindings: Vec<SourceBinding>,
    scorer: Arc<QualityScorer>,
    captioner: Arc<dyn CaptionGenerator>,
    publisher: Publisher,
    settings: CycleSettings,
    status: Option<watch::Sender<PipelineStatus>>,
}

impl Orchestrator {
    pub fn new(
        bindings: Vec<SourceBinding>,
        scorer: Arc<QualityScorer>,
        captioner: Arc<dyn CaptionGenerator>,
        publisher: Publisher,
        settings: CycleSettings,
    ) -> Self {
        Self {
            bindings,
            scorer,
            captioner,
            publisher,
            settings,
            status: None,
        }
    }

    /// Publish phase changes and finished reports on `tx`.
    pub fn with_status(mut self, tx: watch::Sender<PipelineStatus>) -> Self {
        self.status = Some(tx);
        self
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    fn enter(&self, phase: CyclePhase) {
        tracing::debug!(?phase, "phase");
        if let Some(tx) = &self.status {
            tx.send_modify(|s| s.phase = phase);
        }
    }

    fn finish(&self, report: &mut CycleReport) {
        report.finished_at = Some(Utc::now());
        gauge!("pipeline_last_cycle_ts").set(Utc::now().timestamp() as f64);
        if let Some(tx) = &self.status {
            tx.send_modify(|s| {
                s.phase = CyclePhase::Idle;
                s.cycles += 1;
                s.last_cycle = Some(report.clone());
            });
        }
        tracing::info!(
            fetched = report.fetched,
            scored = report.scored,
            selected = report.selected,
            posted = report.posted,
            already_posted = report.already_posted,
            failed = report.failed,
            cancelled = report.cancelled,
            "cycle done"
        );
    }

    /// One full pass. Always returns a report, even when cancelled midway.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::start();

        self.enter(CyclePhase::Fetching);
        let items = tokio::select! {
            items = ingest::run_once(&self.bindings, self.settings.fetch_timeout) => items,
            _ = cancel.cancelled() => {
                report.cancelled = true;
                self.finish(&mut report);
                return report;
            }
        };
        report.fetched = items.len();
        if items.is_empty() {
            tracing::info!("nothing fetched");
            self.finish(&mut report);
            return report;
        }

        self.enter(CyclePhase::Scoring);
        let Some(scored) = self.score_all(&items, cancel).await else {
            report.cancelled = true;
            self.finish(&mut report);
            return report;
        };
        report.scored = scored.len();

        self.enter(CyclePhase::Selecting);
        let picked = select(
            &scored,
            self.settings.threshold,
            self.settings.budget,
            self.publisher.ledger(),
        );
        report.selected = picked.len();
        counter!("pipeline_selected_total").increment(picked.len() as u64);
        tracing::info!(
            candidates = scored.len(),
            selected = picked.len(),
            threshold = self.settings.threshold,
            "selection done"
        );

        self.enter(CyclePhase::Publishing);
        let last = picked.len().saturating_sub(1);
        for (i, pick) in picked.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(item) = items.get(pick.fetch_index) else {
                continue;
            };

            let caption = match self.captioner.make_caption(item, pick.score).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(content_id = %item.content_id, error = %e, captioner = self.captioner.name(), "caption failed, using fallback");
                    fallback_caption(item)
                }
            };

            // an in-flight publish is never interrupted
            let outcome = self.publisher.publish(item, pick.score, &caption).await;
            match &outcome {
                PublishOutcome::Posted => report.posted += 1,
                PublishOutcome::AlreadyPosted => report.already_posted += 1,
                PublishOutcome::Failed(e) => {
                    report.failed += 1;
                    tracing::warn!(content_id = %item.content_id, error = %e, "item not published");
                }
            }

            if matches!(outcome, PublishOutcome::Posted) && i < last && !self.settings.post_interval.is_zero() {
                tracing::debug!(secs = self.settings.post_interval.as_secs(), "waiting before next post");
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.post_interval) => {}
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                }
            }
        }

        self.finish(&mut report);
        report
    }

    /// Score every item on at most `workers` concurrent tasks. Results come
    /// back indexed by fetch position. `None` means cancelled.
    async fn score_all(&self, items: &[ContentItem], cancel: &CancellationToken) -> Option<Vec<ScoreResult>> {
        let permits = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut set = JoinSet::new();
        for (idx, item) in items.iter().cloned().enumerate() {
            let permits = Arc::clone(&permits);
            let scorer = Arc::clone(&self.scorer);
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let score = scorer.score(&item).await;
                (idx, score)
            });
        }

        let mut slots: Vec<Option<f32>> = vec![None; items.len()];
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    let drained = tokio::time::timeout(self.settings.shutdown_grace, async {
                        while set.join_next().await.is_some() {}
                    })
                    .await;
                    if drained.is_err() {
                        tracing::warn!("scoring tasks still running after grace period");
                    }
                    return None;
                }
                next = set.join_next() => match next {
                    None => break,
                    Some(Ok((idx, score))) => slots[idx] = Some(score),
                    Some(Err(e)) => tracing::error!(error = %e, "scoring task died"),
                },
            }
        }

        // a task that died leaves its slot empty and scores 0.0
        Some(
            items
                .iter()
                .zip(slots)
                .enumerate()
                .map(|(idx, (item, slot))| {
                    let score = slot.unwrap_or(0.0);
                    counter!("pipeline_items_scored_total").increment(1);
                    histogram!("pipeline_score").record(score as f64);
                    ScoreResult {
                        content_id: item.content_id.clone(),
                        score,
                        fetch_index: idx,
                    }
                })
                .collect(),
        )
    }

    /// Cycle, idle, repeat until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut cycle = 0u64;
        while !cancel.is_cancelled() {
            cycle += 1;
            tracing::info!(cycle, "cycle start");
            let report = self.run_cycle(&cancel).await;
            if report.cancelled {
                break;
            }
            self.enter(CyclePhase::Idle);
            tracing::info!(secs = self.settings.scrape_interval.as_secs(), "idle until next cycle");
            tokio::select! {
                _ = tokio::time::sleep(self.settings.scrape_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
        tracing::info!("orchestrator stopped");
    }
}
