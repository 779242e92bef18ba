//! Ledger-guarded publish adapter.
//!
//! Checks the ledger before touching the channel, and records + persists
//! after a successful send. `Posted` is only reported once the ledger write
//! is durable.

use std::sync::Arc;

use metrics::counter;

use super::{ChannelError, OutgoingPost, PublishChannel};
use crate::history::{Ledger, LedgerEntry};
use crate::ingest::types::ContentItem;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// Delivered, but the ledger could not be written. This process keeps the
    /// in-memory record; a restart would consider the item unpublished.
    #[error("delivered but ledger persist failed: {0}")]
    LedgerPersist(String),
}

#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Posted,
    AlreadyPosted,
    Failed(PublishError),
}

impl PublishOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Posted => "posted",
            PublishOutcome::AlreadyPosted => "already_posted",
            PublishOutcome::Failed(_) => "failed",
        }
    }
}

pub struct Publisher {
    channel: Arc<dyn PublishChannel>,
    ledger: Ledger,
}

impl Publisher {
    pub fn new(channel: Arc<dyn PublishChannel>, ledger: Ledger) -> Self {
        Self { channel, ledger }
    }

    /// Read-only view used for selection pre-filtering.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn channel(&self) -> &Arc<dyn PublishChannel> {
        &self.channel
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    pub async fn publish(&mut self, item: &ContentItem, score: f32, caption: &str) -> PublishOutcome {
        let outcome = self.publish_inner(item, score, caption).await;
        counter!("pipeline_posts_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn publish_inner(&mut self, item: &ContentItem, score: f32, caption: &str) -> PublishOutcome {
        let content_id = crate::ingest::types::content_id_for(&item.payload_ref);
        if self.ledger.contains(&content_id) {
            tracing::info!(%content_id, "already posted, skipping send");
            return PublishOutcome::AlreadyPosted;
        }

        let post = OutgoingPost {
            content_id: content_id.clone(),
            payload_ref: item.payload_ref.clone(),
            caption: caption.to_string(),
            score,
            title: item.title.clone(),
            source: item.source_tag.clone(),
            engagement: item.engagement_metric,
        };

        if let Err(e) = self.channel.send(&post).await {
            if e.is_config_error() {
                tracing::error!(%content_id, channel = self.channel.name(), error = %e, "publish failed: channel misconfigured");
            } else {
                tracing::warn!(%content_id, channel = self.channel.name(), error = %e, "publish failed");
            }
            return PublishOutcome::Failed(e.into());
        }

        let mut entry = LedgerEntry::new(content_id.clone(), score)
            .with_meta("file_path", item.payload_ref.display().to_string());
        if let Some(t) = &item.title {
            entry = entry.with_meta("title", t.clone());
        }
        if let Some(s) = &item.source_tag {
            entry = entry.with_meta("source", s.clone());
        }
        if let Some(up) = item.engagement_metric {
            entry = entry.with_meta("upvotes", up);
        }
        self.ledger.record(entry);

        if let Err(e) = self.ledger.persist_async().await {
            tracing::error!(%content_id, error = %e, "ledger persist failed after delivery");
            return PublishOutcome::Failed(PublishError::LedgerPersist(format!("{e:#}")));
        }

        tracing::info!(%content_id, score, channel = self.channel.name(), "posted");
        PublishOutcome::Posted
    }
}
