// tests/orchestrator.rs
mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use meme_pipeline::analyze::{FixedBackend, QualityScorer};
use meme_pipeline::caption::{CaptionGenerator, TemplateCaptioner};
use meme_pipeline::ingest::SourceBinding;
use meme_pipeline::notify::{ChannelError, Publisher};
use meme_pipeline::orchestrator::{CycleSettings, Orchestrator, PipelineStatus};
use meme_pipeline::{ContentItem, Ledger, SortMode};

use common::*;

fn settings() -> CycleSettings {
    CycleSettings {
        threshold: 0.65,
        budget: 10,
        post_interval: Duration::ZERO,
        scrape_interval: Duration::from_secs(3600),
        fetch_timeout: Duration::from_secs(5),
        workers: 2,
        shutdown_grace: Duration::from_secs(1),
    }
}

fn scorer() -> Arc<QualityScorer> {
    Arc::new(QualityScorer::new(Arc::new(FixedBackend {
        probs: GOOD_PROBS.to_vec(),
    })))
}

/// Two sharp images (0.78) around one flat image (0.52).
fn fixture_items(dir: &std::path::Path) -> Vec<ContentItem> {
    vec![
        ContentItem::from_payload(write_file(dir, "reddit_s1.png", &sharp_png())).with_title("first"),
        ContentItem::from_payload(write_file(dir, "reddit_f1.png", &flat_png())).with_title("flat"),
        ContentItem::from_payload(write_file(dir, "reddit_s2.png", &sharp_png())).with_title("second"),
    ]
}

fn orchestrator(
    bindings: Vec<SourceBinding>,
    channel: Arc<CountingChannel>,
    ledger: Ledger,
    settings: CycleSettings,
) -> Orchestrator {
    Orchestrator::new(
        bindings,
        scorer(),
        Arc::new(TemplateCaptioner::new()),
        Publisher::new(channel, ledger),
        settings,
    )
}

#[tokio::test]
async fn full_cycle_skips_failing_source_and_posts_in_rank_order() {
    let dir = tempfile::tempdir().unwrap();
    let items = fixture_items(dir.path());
    let expected = vec![items[0].content_id.clone(), items[2].content_id.clone()];
    let bindings = vec![
        SourceBinding::new(Arc::new(FailingSource), "down", SortMode::Hot, 10),
        SourceBinding::new(StaticSource::new(items), "memes", SortMode::Hot, 10),
    ];
    let ch = CountingChannel::ok();
    let mut o = orchestrator(bindings, ch.clone(), Ledger::open(dir.path().join("h.json"), 100), settings());

    let report = o.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.fetched, 3);
    assert_eq!(report.scored, 3);
    assert_eq!(report.selected, 2);
    assert_eq!(report.posted, 2);
    assert_eq!(report.failed, 0);
    assert!(!report.cancelled);
    // equal scores: fetch order decides
    assert_eq!(ch.sent_ids(), expected);
    assert_eq!(o.publisher().ledger().len(), 2);
}

#[tokio::test]
async fn second_cycle_publishes_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let bindings = vec![SourceBinding::new(
        StaticSource::new(fixture_items(dir.path())),
        "memes",
        SortMode::Hot,
        10,
    )];
    let ch = CountingChannel::ok();
    let mut o = orchestrator(bindings, ch.clone(), Ledger::in_memory(100), settings());
    let token = CancellationToken::new();

    o.run_cycle(&token).await;
    let second = o.run_cycle(&token).await;
    assert_eq!(second.selected, 0);
    assert_eq!(second.posted, 0);
    assert_eq!(ch.count(), 2);
}

#[tokio::test]
async fn empty_fetch_goes_straight_to_idle() {
    let ch = CountingChannel::ok();
    let bindings = vec![
        SourceBinding::new(StaticSource::new(vec![]), "none", SortMode::New, 10),
        SourceBinding::new(Arc::new(FailingSource), "down", SortMode::Hot, 10),
    ];
    let mut o = orchestrator(bindings, ch.clone(), Ledger::in_memory(10), settings());
    let report = o.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.fetched, 0);
    assert_eq!(report.scored, 0);
    assert_eq!(ch.count(), 0);
    assert!(report.finished_at.is_some());
}

#[tokio::test]
async fn budget_caps_posts() {
    let dir = tempfile::tempdir().unwrap();
    let bindings = vec![SourceBinding::new(
        StaticSource::new(fixture_items(dir.path())),
        "memes",
        SortMode::Hot,
        10,
    )];
    let ch = CountingChannel::ok();
    let mut s = settings();
    s.budget = 1;
    let mut o = orchestrator(bindings, ch.clone(), Ledger::in_memory(10), s);
    let report = o.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.selected, 1);
    assert_eq!(ch.count(), 1);
}

#[tokio::test]
async fn cancel_during_post_interval_stops_after_current_post() {
    let dir = tempfile::tempdir().unwrap();
    let bindings = vec![SourceBinding::new(
        StaticSource::new(fixture_items(dir.path())),
        "memes",
        SortMode::Hot,
        10,
    )];
    let ch = CountingChannel::ok();
    let mut s = settings();
    s.post_interval = Duration::from_secs(600);
    let mut o = orchestrator(bindings, ch.clone(), Ledger::in_memory(10), s);

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        let ch = ch.clone();
        tokio::spawn(async move {
            while ch.count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            token.cancel();
        })
    };

    let report = tokio::time::timeout(Duration::from_secs(30), o.run_cycle(&token))
        .await
        .expect("cycle must not sit out the full post interval");
    canceller.await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.posted, 1);
    assert_eq!(ch.count(), 1);
}

#[tokio::test]
async fn single_post_does_not_wait() {
    let dir = tempfile::tempdir().unwrap();
    let item = ContentItem::from_payload(write_file(dir.path(), "reddit_only.png", &sharp_png()));
    let bindings = vec![SourceBinding::new(StaticSource::new(vec![item]), "memes", SortMode::Hot, 10)];
    let ch = CountingChannel::ok();
    let mut s = settings();
    s.post_interval = Duration::from_secs(600);
    let mut o = orchestrator(bindings, ch.clone(), Ledger::in_memory(10), s);

    let report = tokio::time::timeout(Duration::from_secs(30), o.run_cycle(&CancellationToken::new()))
        .await
        .expect("no delay after the last post");
    assert_eq!(report.posted, 1);
}

#[tokio::test]
async fn failed_publish_does_not_wait() {
    let dir = tempfile::tempdir().unwrap();
    let items = fixture_items(dir.path());
    let bindings = vec![SourceBinding::new(StaticSource::new(items), "memes", SortMode::Hot, 10)];
    let ch = CountingChannel::failing(ChannelError::Transient("discord down".into()));
    let mut s = settings();
    s.post_interval = Duration::from_secs(600);
    let mut o = orchestrator(bindings, ch.clone(), Ledger::in_memory(10), s);

    let report = tokio::time::timeout(Duration::from_secs(30), o.run_cycle(&CancellationToken::new()))
        .await
        .expect("no delay after a failed post");
    assert_eq!(report.selected, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.posted, 0);
    assert_eq!(ch.count(), 2);
    assert!(o.publisher().ledger().is_empty());
}

#[tokio::test]
async fn run_exits_when_already_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let src = StaticSource::new(fixture_items(dir.path()));
    let bindings = vec![SourceBinding::new(src.clone(), "memes", SortMode::Hot, 10)];
    let ch = CountingChannel::ok();
    let mut o = orchestrator(bindings, ch.clone(), Ledger::in_memory(10), settings());

    let token = CancellationToken::new();
    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), o.run(token))
        .await
        .expect("run should stop immediately");
    assert_eq!(ch.count(), 0);
}

#[tokio::test]
async fn run_stops_during_idle() {
    let dir = tempfile::tempdir().unwrap();
    let bindings = vec![SourceBinding::new(
        StaticSource::new(fixture_items(dir.path())),
        "memes",
        SortMode::Hot,
        10,
    )];
    let ch = CountingChannel::ok();
    let (tx, mut rx) = watch::channel(PipelineStatus::default());
    let mut o = orchestrator(bindings, ch.clone(), Ledger::in_memory(10), settings()).with_status(tx);

    let token = CancellationToken::new();
    let runner = {
        let token = token.clone();
        tokio::spawn(async move {
            o.run(token).await;
            o
        })
    };

    // first report marks the end of cycle one; the orchestrator is now idle
    rx.wait_for(|s| s.cycles >= 1).await.unwrap();
    token.cancel();
    let o = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("idle wait must observe cancellation")
        .unwrap();
    assert_eq!(o.publisher().ledger().len(), 2);
    assert_eq!(ch.count(), 2);
}

struct BrokenCaptioner;

#[async_trait]
impl CaptionGenerator for BrokenCaptioner {
    async fn make_caption(&self, _item: &ContentItem, _score: f32) -> anyhow::Result<String> {
        anyhow::bail!("model unavailable")
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn caption_failure_uses_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let with_title = ContentItem::from_payload(write_file(dir.path(), "reddit_t.png", &sharp_png()))
        .with_title("Monday again");
    let without = ContentItem::from_payload(write_file(dir.path(), "reddit_u.png", &sharp_png()));
    let bindings = vec![SourceBinding::new(
        StaticSource::new(vec![with_title, without]),
        "memes",
        SortMode::Hot,
        10,
    )];
    let ch = CountingChannel::ok();
    let mut o = Orchestrator::new(
        bindings,
        scorer(),
        Arc::new(BrokenCaptioner),
        Publisher::new(ch.clone(), Ledger::in_memory(10)),
        settings(),
    );
    let report = o.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.posted, 2);
    let captions: Vec<_> = ch.sent.lock().iter().map(|p| p.caption.clone()).collect();
    assert_eq!(captions, vec!["Monday again".to_string(), "Fresh pick".to_string()]);
}

#[tokio::test]
async fn status_channel_carries_last_report() {
    let dir = tempfile::tempdir().unwrap();
    let bindings = vec![SourceBinding::new(
        StaticSource::new(fixture_items(dir.path())),
        "memes",
        SortMode::Hot,
        10,
    )];
    let (tx, rx) = watch::channel(PipelineStatus::default());
    let mut o = orchestrator(bindings, CountingChannel::ok(), Ledger::in_memory(10), settings()).with_status(tx);
    let report = o.run_cycle(&CancellationToken::new()).await;

    let status = rx.borrow().clone();
    assert_eq!(status.cycles, 1);
    assert_eq!(status.last_cycle, Some(report));
}
