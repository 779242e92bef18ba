// src/bootstrap.rs
//! Wiring: turn a `PipelineConfig` into live collaborators.

use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::analyze::{DisabledBackend, HttpClipBackend, QualityScorer, SemanticBackend};
use crate::caption::{CaptionGenerator, OpenAiCaptioner, TemplateCaptioner};
use crate::config::PipelineConfig;
use crate::history::Ledger;
use crate::ingest::download::{Downloader, HttpSettings};
use crate::ingest::providers::{ImgurSource, LocalDirSource, RedditOptions, RedditSource};
use crate::ingest::types::ContentSource;
use crate::ingest::SourceBinding;
use crate::notify::discord::DiscordChannel;
use crate::notify::email::{EmailChannel, EmailSettings};
use crate::notify::{PublishChannel, Publisher};
use crate::orchestrator::{CycleSettings, Orchestrator};

pub struct Runtime {
    pub cfg: PipelineConfig,
    pub bindings: Vec<SourceBinding>,
    pub scorer: Arc<QualityScorer>,
    pub captioner: Arc<dyn CaptionGenerator>,
    pub channel: Arc<dyn PublishChannel>,
    pub ledger: Ledger,
}

impl Runtime {
    /// Build everything. `cfg` should already be validated.
    pub fn from_config(cfg: PipelineConfig) -> anyhow::Result<Self> {
        let bindings = build_sources(&cfg)?;
        let scorer = Arc::new(QualityScorer::new(build_backend(&cfg)?));
        let captioner = build_captioner(&cfg);
        let channel = build_channel(&cfg)?;
        let ledger = Ledger::open(&cfg.history.path, cfg.history.max_history_entries);
        // Safe diagnostics: names and counts only
        info!(
            sources = bindings.len(),
            backend = scorer.backend_name(),
            captioner = captioner.name(),
            channel = channel.name(),
            ledger_entries = ledger.len(),
            "runtime ready"
        );
        Ok(Self {
            cfg,
            bindings,
            scorer,
            captioner,
            channel,
            ledger,
        })
    }

    pub fn into_orchestrator(self) -> Orchestrator {
        let settings = CycleSettings::from_config(&self.cfg);
        let publisher = Publisher::new(self.channel, self.ledger);
        Orchestrator::new(self.bindings, self.scorer, self.captioner, publisher, settings)
    }
}

pub fn http_settings(cfg: &PipelineConfig) -> HttpSettings {
    HttpSettings {
        user_agent: cfg.ingest.user_agent.clone(),
        timeout: Duration::from_secs(cfg.ingest.http_timeout_secs),
        max_retries: cfg.ingest.max_retries,
        download_dir: cfg.ingest.download_dir.clone(),
        ..HttpSettings::default()
    }
}

pub fn build_sources(cfg: &PipelineConfig) -> anyhow::Result<Vec<SourceBinding>> {
    if cfg.sources.is_empty() {
        warn!("no sources configured; cycles will fetch nothing");
        return Ok(Vec::new());
    }
    let http = Arc::new(Downloader::new(&http_settings(cfg))?);
    let delay = Duration::from_millis(cfg.ingest.request_delay_ms);

    let mut reddit: Option<Arc<dyn ContentSource>> = None;
    let mut imgur: Option<Arc<dyn ContentSource>> = None;
    let local: Arc<dyn ContentSource> = Arc::new(LocalDirSource::new());

    let mut out = Vec::with_capacity(cfg.sources.len());
    for s in &cfg.sources {
        let source = match s.kind.as_str() {
            "reddit" => reddit
                .get_or_insert_with(|| {
                    let mut opts = RedditOptions {
                        min_upvotes: cfg.ingest.min_upvotes,
                        max_post_age_hours: cfg.ingest.max_post_age_hours,
                        time_filter: cfg.ingest.time_filter.clone(),
                        request_delay: delay,
                        ..RedditOptions::default()
                    };
                    if let Some(base) = &cfg.ingest.reddit_base {
                        opts.base_url = base.clone();
                    }
                    Arc::new(RedditSource::new(Arc::clone(&http), opts)) as Arc<dyn ContentSource>
                })
                .clone(),
            "imgur" => imgur
                .get_or_insert_with(|| {
                    let mut src = ImgurSource::new(Arc::clone(&http), cfg.ingest.imgur_client_id.clone())
                        .with_request_delay(delay);
                    if let Some(base) = &cfg.ingest.imgur_base {
                        src = src.with_base_url(base.clone());
                    }
                    Arc::new(src) as Arc<dyn ContentSource>
                })
                .clone(),
            "local" => Arc::clone(&local),
            other => bail!("unsupported source kind: {other}"),
        };
        out.push(SourceBinding::new(source, s.selector.clone(), s.sort_mode, s.limit));
    }
    Ok(out)
}

pub fn build_backend(cfg: &PipelineConfig) -> anyhow::Result<Arc<dyn SemanticBackend>> {
    match cfg.scoring.backend.as_str() {
        "clip-http" => {
            let endpoint = cfg
                .scoring
                .endpoint
                .clone()
                .context("scoring.endpoint required for clip-http backend")?;
            Ok(Arc::new(HttpClipBackend::new(
                endpoint,
                Duration::from_secs(cfg.scoring.timeout_secs),
            )?))
        }
        "disabled" | "" => Ok(Arc::new(DisabledBackend)),
        other => {
            warn!(backend = other, "unknown scoring backend, semantic scoring disabled");
            Ok(Arc::new(DisabledBackend))
        }
    }
}

/// AI captions when enabled and keyed; template captions otherwise.
pub fn build_captioner(cfg: &PipelineConfig) -> Arc<dyn CaptionGenerator> {
    if cfg.caption.use_ai {
        match cfg.caption.api_key.clone().filter(|k| !k.trim().is_empty()) {
            Some(key) => match OpenAiCaptioner::new(key, cfg.caption.model.as_deref()) {
                Ok(c) => return Arc::new(c),
                Err(e) => warn!(error = ?e, "AI captioner unavailable, using templates"),
            },
            None => warn!("caption.use_ai set without an API key, using templates"),
        }
    }
    Arc::new(TemplateCaptioner::new())
}

pub fn build_channel(cfg: &PipelineConfig) -> anyhow::Result<Arc<dyn PublishChannel>> {
    let ch = &cfg.channel;
    match ch.kind.as_str() {
        "discord" => {
            let token = ch.bot_token.clone().context("channel.bot_token missing")?;
            let channel_id = ch.channel_id.clone().context("channel.channel_id missing")?;
            let mut d = DiscordChannel::new(token, channel_id)
                .with_timeout(ch.timeout_secs.max(1))
                .with_retries(ch.max_retries)
                .with_reactions(ch.add_reactions);
            if let Some(base) = &ch.api_base {
                d = d.with_api_base(base.clone());
            }
            Ok(Arc::new(d))
        }
        "email" => {
            let s = EmailSettings {
                host: ch.smtp_host.clone().context("channel.smtp_host missing")?,
                user: ch.smtp_user.clone().context("channel.smtp_user missing")?,
                pass: ch.smtp_pass.clone().context("channel.smtp_pass missing")?,
                from: ch.email_from.clone().context("channel.email_from missing")?,
                to: ch.email_to.clone().context("channel.email_to missing")?,
                timeout_secs: ch.timeout_secs,
                max_retries: ch.max_retries,
            };
            Ok(Arc::new(EmailChannel::new(&s)?))
        }
        other => bail!("unsupported channel kind: {other}"),
    }
}
