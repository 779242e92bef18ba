//! Durable ledger of published content ids.
//!
//! Append-only, FIFO-capped, persisted as one JSON document written via
//! temp file + rename. A missing or corrupt file loads as an empty ledger.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub content_id: String,
    pub timestamp: DateTime<Utc>,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LedgerEntry {
    pub fn new(content_id: impl Into<String>, score: f32) -> Self {
        Self {
            content_id: content_id.into(),
            timestamp: Utc::now(),
            score,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    posted: Vec<LedgerEntry>,
}

#[derive(Debug)]
pub struct Ledger {
    path: Option<PathBuf>,
    entries: Vec<LedgerEntry>,
    ids: HashSet<String>,
    cap: usize,
}

impl Ledger {
    /// File-backed ledger; call `load` to read existing state.
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: Some(path.into()),
            entries: Vec::new(),
            ids: HashSet::new(),
            cap: cap.max(1),
        }
    }

    /// Ledger without a backing file; `persist` is a no-op.
    pub fn in_memory(cap: usize) -> Self {
        Self {
            path: None,
            entries: Vec::new(),
            ids: HashSet::new(),
            cap: cap.max(1),
        }
    }

    /// Construct and load in one step.
    pub fn open(path: impl Into<PathBuf>, cap: usize) -> Self {
        let mut l = Self::new(path, cap);
        l.load();
        l
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, content_id: &str) -> bool {
        self.ids.contains(content_id)
    }

    /// Append an entry; returns `false` (and changes nothing) for a known id.
    pub fn record(&mut self, entry: LedgerEntry) -> bool {
        if self.ids.contains(&entry.content_id) {
            return false;
        }
        self.ids.insert(entry.content_id.clone());
        self.entries.push(entry);
        self.trim();
        true
    }

    /// Last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[LedgerEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Replace in-memory state with the backing file. Never fails: a missing
    /// file is a fresh ledger, an unreadable or corrupt one is logged and
    /// treated as empty.
    pub fn load(&mut self) {
        self.entries.clear();
        self.ids.clear();
        let Some(path) = self.path.clone() else {
            return;
        };
        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "ledger: no history yet");
                return;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ledger unreadable, starting empty");
                return;
            }
        };
        let file: LedgerFile = match serde_json::from_str(&raw) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ledger corrupt, starting empty");
                return;
            }
        };
        for entry in file.posted {
            if self.ids.insert(entry.content_id.clone()) {
                self.entries.push(entry);
            }
        }
        self.trim();
        tracing::info!(path = %path.display(), entries = self.entries.len(), "ledger loaded");
    }

    /// Durably write the whole ledger (temp file + rename).
    pub fn persist(&self) -> Result<()> {
        match self.snapshot()? {
            Some((path, json)) => write_atomic(&path, &json),
            None => Ok(()),
        }
    }

    /// Same as `persist`, with the file I/O moved onto the blocking pool.
    pub async fn persist_async(&self) -> Result<()> {
        let Some((path, json)) = self.snapshot()? else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .context("ledger writer task")?
    }

    fn snapshot(&self) -> Result<Option<(PathBuf, Vec<u8>)>> {
        let Some(path) = self.path.clone() else {
            return Ok(None);
        };
        let doc = LedgerFile {
            posted: self.entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&doc).context("serializing ledger")?;
        Ok(Some((path, json)))
    }

    // Drop the oldest prefix beyond the cap.
    fn trim(&mut self) {
        if self.entries.len() > self.cap {
            let excess = self.entries.len() - self.cap;
            for e in self.entries.drain(0..excess) {
                self.ids.remove(&e.content_id);
            }
        }
    }
}

fn write_atomic(path: &Path, json: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    f.write_all(json).context("writing ledger")?;
    f.sync_all().context("syncing ledger")?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
