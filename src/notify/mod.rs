//! Publish side: channel abstraction, concrete channels, and the ledger-guarded publisher.

pub mod discord;
pub mod email;
pub mod publisher;

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::Retriable;

pub use publisher::{PublishError, PublishOutcome, Publisher};

/// Everything a channel needs to deliver one item.
#[derive(Debug, Clone)]
pub struct OutgoingPost {
    pub content_id: String,
    pub payload_ref: PathBuf,
    pub caption: String,
    pub score: f32,
    pub title: Option<String>,
    pub source: Option<String>,
    pub engagement: Option<i64>,
}

impl OutgoingPost {
    /// Name/value pairs shown alongside the image.
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut out = vec![("AI Score".to_string(), format!("{:.0}% ⭐", self.score * 100.0))];
        if let Some(src) = &self.source {
            out.push(("Source".to_string(), src.clone()));
        }
        if let Some(up) = self.engagement {
            out.push(("Upvotes".to_string(), format!("⬆️ {}", group_thousands(up))));
        }
        out
    }

    /// Embed colour by score tier (gold / green / blue).
    pub fn color(&self) -> u32 {
        if self.score >= 0.8 {
            0xF1C40F
        } else if self.score >= 0.65 {
            0x2ECC71
        } else {
            0x3498DB
        }
    }

    pub fn file_name(&self) -> String {
        self.payload_ref
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.bin", self.content_id))
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// Bad credentials or missing permission. Configuration problem; not retried.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Target channel does not exist. Configuration problem; not retried.
    #[error("channel not found: {0}")]
    NotFound(String),
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("payload unavailable: {0}")]
    Payload(String),
}

impl ChannelError {
    /// Errors that mean the deployment is misconfigured.
    pub fn is_config_error(&self) -> bool {
        matches!(self, ChannelError::PermissionDenied(_) | ChannelError::NotFound(_))
    }
}

impl Retriable for ChannelError {
    fn is_retriable(&self) -> bool {
        matches!(self, ChannelError::RateLimited { .. } | ChannelError::Transient(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ChannelError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[async_trait::async_trait]
pub trait PublishChannel: Send + Sync {
    /// One-time readiness gate awaited at startup.
    async fn ready(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send(&self, post: &OutgoingPost) -> Result<(), ChannelError>;

    fn name(&self) -> &'static str;
}
