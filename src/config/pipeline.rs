// src/config/pipeline.rs
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::history::DEFAULT_MAX_HISTORY_ENTRIES;
use crate::ingest::types::SortMode;

pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/pipeline.toml";
pub const DEFAULT_JSON_PATH: &str = "config/pipeline.json";

/// Idle gaps longer than a year are clamped.
pub const MAX_SCRAPE_INTERVAL_HOURS: f64 = 24.0 * 365.0;

pub const ENV_DISCORD_TOKEN: &str = "DISCORD_BOT_TOKEN";
pub const ENV_SMTP_PASS: &str = "SMTP_PASS";
pub const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";

fn default_threshold() -> f32 {
    0.65
}
fn default_budget() -> usize {
    10
}
fn default_post_interval() -> u64 {
    300
}
fn default_scrape_interval() -> f64 {
    6.0
}
fn default_grace() -> u64 {
    10
}
fn default_history_path() -> PathBuf {
    PathBuf::from("posted_history.json")
}
fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY_ENTRIES
}
fn default_limit() -> usize {
    25
}
fn default_sort() -> SortMode {
    SortMode::Hot
}
fn default_download_dir() -> PathBuf {
    PathBuf::from("memes")
}
fn default_min_upvotes() -> i64 {
    50
}
fn default_time_filter() -> String {
    "day".into()
}
fn default_fetch_timeout() -> u64 {
    120
}
fn default_http_timeout() -> u64 {
    20
}
fn default_retries() -> u8 {
    3
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    concat!("meme-pipeline/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_backend() -> String {
    "disabled".into()
}
fn default_scoring_timeout() -> u64 {
    15
}
fn default_workers() -> usize {
    2
}
fn default_channel_kind() -> String {
    "discord".into()
}
fn default_true() -> bool {
    true
}
fn default_smtp_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_threshold")]
    pub min_score_threshold: f32,
    #[serde(default = "default_budget")]
    pub max_daily_selections: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_score_threshold: default_threshold(),
            max_daily_selections: default_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_post_interval")]
    pub post_interval_seconds: u64,
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval_hours: f64,
    #[serde(default = "default_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            post_interval_seconds: default_post_interval(),
            scrape_interval_hours: default_scrape_interval(),
            shutdown_grace_secs: default_grace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_history")]
    pub max_history_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            max_history_entries: default_max_history(),
        }
    }
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// "reddit" | "imgur" | "local"
    pub kind: String,
    pub selector: String,
    #[serde(default = "default_sort")]
    pub sort_mode: SortMode,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_min_upvotes")]
    pub min_upvotes: i64,
    #[serde(default)]
    pub max_post_age_hours: Option<f64>,
    #[serde(default = "default_time_filter")]
    pub time_filter: String,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub max_retries: u8,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub imgur_client_id: Option<String>,
    #[serde(default)]
    pub reddit_base: Option<String>,
    #[serde(default)]
    pub imgur_base: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            min_upvotes: default_min_upvotes(),
            max_post_age_hours: None,
            time_filter: default_time_filter(),
            fetch_timeout_secs: default_fetch_timeout(),
            http_timeout_secs: default_http_timeout(),
            max_retries: default_retries(),
            request_delay_ms: default_request_delay_ms(),
            user_agent: default_user_agent(),
            imgur_client_id: None,
            reddit_base: None,
            imgur_base: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// "clip-http" | "disabled"
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_scoring_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            endpoint: None,
            timeout_secs: default_scoring_timeout(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptionConfig {
    #[serde(default)]
    pub use_ai: bool,
    #[serde(default)]
    pub model: Option<String>,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// "discord" | "email"
    #[serde(default = "default_channel_kind")]
    pub kind: String,
    /// "ENV" means: read from DISCORD_BOT_TOKEN
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_true")]
    pub add_reactions: bool,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default)]
    pub smtp_user: Option<String>,
    /// "ENV" means: read from SMTP_PASS
    #[serde(default)]
    pub smtp_pass: Option<String>,
    #[serde(default)]
    pub email_from: Option<String>,
    #[serde(default)]
    pub email_to: Option<String>,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub max_retries: u8,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            kind: default_channel_kind(),
            bot_token: None,
            channel_id: None,
            api_base: None,
            add_reactions: true,
            smtp_host: None,
            smtp_user: None,
            smtp_pass: None,
            email_from: None,
            email_to: None,
            timeout_secs: default_smtp_timeout(),
            max_retries: default_retries(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusConfig {
    /// e.g. "127.0.0.1:8080"; no server when unset.
    #[serde(default)]
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub caption: CaptionConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

impl PipelineConfig {
    /// Parse by extension (`.json` → JSON, anything else → TOML), then sanitize.
    pub fn from_str_for(path: &Path, data: &str) -> anyhow::Result<Self> {
        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let mut cfg: PipelineConfig = if is_json {
            serde_json::from_str(data).context("parsing JSON config")?
        } else {
            toml::from_str(data).context("parsing TOML config")?
        };
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        Self::from_str_for(path, &data)
    }

    /// `explicit`, else `$PIPELINE_CONFIG_PATH`, else the first default path that exists.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(p.to_path_buf());
        }
        if let Ok(p) = env::var(ENV_PIPELINE_CONFIG_PATH) {
            if !p.trim().is_empty() {
                return Some(PathBuf::from(p));
            }
        }
        [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH]
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    /// Never fails: a missing or corrupt file yields defaults and a warning.
    /// Secrets are resolved afterwards.
    pub fn load(explicit: Option<&Path>) -> Self {
        let mut cfg = match Self::resolve_path(explicit) {
            Some(path) => match Self::load_from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path.display(), "config loaded");
                    cfg
                }
                Err(e) => {
                    tracing::warn!(error = ?e, path = %path.display(), "config unusable, using defaults");
                    Self::default()
                }
            },
            None => {
                tracing::warn!("no config file found, using defaults");
                Self::default()
            }
        };
        cfg.resolve_secrets();
        cfg
    }

    /// Clamp values into their valid ranges.
    pub fn sanitize(&mut self) {
        let t = self.selection.min_score_threshold;
        self.selection.min_score_threshold = if t.is_finite() {
            t.clamp(0.0, 1.0)
        } else {
            default_threshold()
        };
        let h = self.schedule.scrape_interval_hours;
        self.schedule.scrape_interval_hours = if h.is_finite() && h > 0.0 {
            h.min(MAX_SCRAPE_INTERVAL_HOURS)
        } else {
            default_scrape_interval()
        };
        self.scoring.workers = self.scoring.workers.max(1);
        self.history.max_history_entries = self.history.max_history_entries.max(1);
        self.ingest.fetch_timeout_secs = self.ingest.fetch_timeout_secs.max(1);
        self.ingest.max_retries = self.ingest.max_retries.max(1);
        self.channel.max_retries = self.channel.max_retries.max(1);
        self.channel.kind = self.channel.kind.trim().to_ascii_lowercase();
        self.scoring.backend = self.scoring.backend.trim().to_ascii_lowercase();
        for s in &mut self.sources {
            s.kind = s.kind.trim().to_ascii_lowercase();
        }
    }

    /// Replace every `"ENV"` placeholder with the matching environment variable.
    /// A missing variable leaves the field unset; `validate` reports it.
    pub fn resolve_secrets(&mut self) {
        resolve_env(&mut self.channel.bot_token, ENV_DISCORD_TOKEN);
        resolve_env(&mut self.channel.smtp_pass, ENV_SMTP_PASS);
        resolve_env(&mut self.caption.api_key, ENV_OPENAI_KEY);
    }

    /// Fatal configuration problems. Run once at startup.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.channel.kind.as_str() {
            "discord" => {
                if is_blank(&self.channel.bot_token) {
                    bail!("channel.bot_token missing (set {ENV_DISCORD_TOKEN})");
                }
                if is_blank(&self.channel.channel_id) {
                    bail!("channel.channel_id missing");
                }
            }
            "email" => {
                for (name, v) in [
                    ("smtp_host", &self.channel.smtp_host),
                    ("smtp_user", &self.channel.smtp_user),
                    ("smtp_pass", &self.channel.smtp_pass),
                    ("email_from", &self.channel.email_from),
                    ("email_to", &self.channel.email_to),
                ] {
                    if is_blank(v) {
                        bail!("channel.{name} missing");
                    }
                }
            }
            other => bail!("unsupported channel kind: {other}"),
        }
        if self.scoring.backend == "clip-http" && is_blank(&self.scoring.endpoint) {
            bail!("scoring.endpoint required for clip-http backend");
        }
        for s in &self.sources {
            if !matches!(s.kind.as_str(), "reddit" | "imgur" | "local") {
                bail!("unsupported source kind: {}", s.kind);
            }
            if s.selector.trim().is_empty() {
                bail!("source of kind {} has an empty selector", s.kind);
            }
        }
        Ok(())
    }

    pub fn post_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.post_interval_seconds)
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.schedule.scrape_interval_hours * 3600.0)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_scrape_interval() * 3600.0))
    }
}

fn is_blank(v: &Option<String>) -> bool {
    v.as_deref().is_none_or(|s| s.trim().is_empty())
}

fn resolve_env(field: &mut Option<String>, var: &str) {
    if field
        .as_deref()
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("env"))
    {
        *field = env::var(var).ok().filter(|v| !v.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = PipelineConfig::from_str_for(Path::new("x.toml"), "").unwrap();
        assert_eq!(cfg.selection.min_score_threshold, 0.65);
        assert_eq!(cfg.selection.max_daily_selections, 10);
        assert_eq!(cfg.schedule.post_interval_seconds, 300);
        assert_eq!(cfg.schedule.scrape_interval_hours, 6.0);
        assert_eq!(cfg.history.max_history_entries, 1000);
        assert_eq!(cfg.scoring.workers, 2);
        assert!(cfg.sources.is_empty());
    }

    #[test]
    fn sanitize_clamps() {
        let toml = r#"
            [selection]
            min_score_threshold = 1.7
            [scoring]
            workers = 0
            [schedule]
            scrape_interval_hours = -1.0
        "#;
        let cfg = PipelineConfig::from_str_for(Path::new("x.toml"), toml).unwrap();
        assert_eq!(cfg.selection.min_score_threshold, 1.0);
        assert_eq!(cfg.scoring.workers, 1);
        assert_eq!(cfg.schedule.scrape_interval_hours, 6.0);
    }

    #[test]
    fn huge_scrape_interval_is_clamped() {
        let cfg = PipelineConfig::from_str_for(Path::new("x.toml"), "[schedule]\nscrape_interval_hours = 1e300").unwrap();
        assert_eq!(cfg.schedule.scrape_interval_hours, MAX_SCRAPE_INTERVAL_HOURS);
        assert_eq!(cfg.scrape_interval(), Duration::from_secs(365 * 24 * 3600));

        // unsanitized values fall back instead of overflowing
        let mut raw = PipelineConfig::default();
        raw.schedule.scrape_interval_hours = 1e300;
        assert_eq!(raw.scrape_interval(), Duration::from_secs(6 * 3600));
    }

    #[test]
    fn discord_requires_token_and_channel() {
        let mut cfg = PipelineConfig::default();
        assert!(cfg.validate().is_err());
        cfg.channel.bot_token = Some("t".into());
        assert!(cfg.validate().is_err());
        cfg.channel.channel_id = Some("123".into());
        assert!(cfg.validate().is_ok());
    }
}
