// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One candidate image pulled from a source. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub content_id: String,
    pub payload_ref: PathBuf,
    pub title: Option<String>,
    pub source_tag: Option<String>, // e.g. "reddit/memes"
    pub engagement_metric: Option<i64>,
}

impl ContentItem {
    /// Build an item from a downloaded file; the id is derived from the file name.
    pub fn from_payload(payload_ref: impl Into<PathBuf>) -> Self {
        let payload_ref = payload_ref.into();
        Self {
            content_id: content_id_for(&payload_ref),
            payload_ref,
            title: None,
            source_tag: None,
            engagement_metric: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let t = title.into();
        self.title = if t.trim().is_empty() { None } else { Some(t) };
        self
    }

    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = Some(tag.into());
        self
    }

    pub fn with_engagement(mut self, metric: i64) -> Self {
        self.engagement_metric = Some(metric);
        self
    }
}

/// Stable dedup key: first 16 hex chars of SHA-256 over the payload's file name.
/// Sources name files after the source-local post id, so the same post always
/// maps to the same id regardless of download directory.
pub fn content_id_for(payload_ref: &Path) -> String {
    use sha2::{Digest, Sha256};
    let name = payload_ref
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| payload_ref.to_string_lossy().into_owned());
    let digest = Sha256::digest(name.as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Listing order requested from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Hot,
    New,
    Top,
    Rising,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Hot => "hot",
            SortMode::New => "new",
            SortMode::Top => "top",
            SortMode::Rising => "rising",
        }
    }
}

impl std::fmt::Display for SortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch up to `limit` items for `selector` (subreddit, gallery section, directory…).
    async fn fetch(&self, selector: &str, sort: SortMode, limit: usize) -> Result<Vec<ContentItem>>;
    fn name(&self) -> &'static str;
}
