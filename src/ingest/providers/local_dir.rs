// src/ingest/providers/local_dir.rs
//! Images already on disk. The selector is a directory; the file name is the
//! identity, so re-running over the same folder yields the same ids.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::ingest::download::is_image_url;
use crate::ingest::types::{ContentItem, ContentSource, SortMode};

#[derive(Debug, Clone, Default)]
pub struct LocalDirSource {
    root: Option<PathBuf>,
}

impl LocalDirSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative selectors against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn dir_for(&self, selector: &str) -> PathBuf {
        match &self.root {
            Some(root) if Path::new(selector).is_relative() => root.join(selector),
            _ => PathBuf::from(selector),
        }
    }
}

struct Found {
    path: PathBuf,
    modified: std::time::SystemTime,
}

#[async_trait]
impl ContentSource for LocalDirSource {
    async fn fetch(&self, selector: &str, sort: SortMode, limit: usize) -> Result<Vec<ContentItem>> {
        let dir = self.dir_for(selector);
        let mut rd = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("reading {}", dir.display()))?;

        let mut found = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_image_url(&name) {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
            found.push(Found { path, modified });
        }

        // New = most recently modified first; everything else by name.
        match sort {
            SortMode::New => found.sort_by(|a, b| b.modified.cmp(&a.modified).then(a.path.cmp(&b.path))),
            _ => found.sort_by(|a, b| a.path.cmp(&b.path)),
        }

        let tag = format!(
            "local/{}",
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| selector.to_string())
        );
        Ok(found
            .into_iter()
            .take(limit)
            .map(|f| {
                let title = f
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
                    .unwrap_or_default();
                ContentItem::from_payload(f.path)
                    .with_title(title)
                    .with_source_tag(tag.clone())
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
