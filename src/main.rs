//! meme-pipeline: harvest → score → select → caption → publish.
//!
//! Runs cycles until Ctrl-C, or exactly one with `--once`.

use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use meme_pipeline::api::{self, AppState};
use meme_pipeline::bootstrap::Runtime;
use meme_pipeline::metrics::Metrics;
use meme_pipeline::orchestrator::PipelineStatus;
use meme_pipeline::{init_tracing, PipelineConfig};

#[derive(Debug, Parser)]
#[command(name = "meme-pipeline", version, about = "Scheduled image curation and publishing")]
struct Cli {
    /// Config file (TOML or JSON by extension)
    #[arg(long, env = "PIPELINE_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Run a single cycle, then exit
    #[arg(long)]
    once: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let log_json = cli.log_json
        || std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    init_tracing(log_json);

    let cfg = PipelineConfig::load(cli.config.as_deref());
    if let Err(e) = cfg.validate() {
        tracing::error!(error = %e, "configuration invalid");
        return Err(e);
    }

    let metrics = match Metrics::init(cfg.selection.min_score_threshold) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = ?e, "metrics recorder unavailable");
            None
        }
    };
    let status_bind = cfg.status.bind.clone();

    let runtime = Runtime::from_config(cfg)?;

    // Readiness gate: misconfiguration is fatal, anything else is retried by send.
    if let Err(e) = runtime.channel.ready().await {
        if e.is_config_error() {
            tracing::error!(channel = runtime.channel.name(), error = %e, "channel not usable");
            anyhow::bail!("channel readiness failed: {e}");
        }
        tracing::warn!(channel = runtime.channel.name(), error = %e, "channel readiness check failed, continuing");
    }

    let cancel = CancellationToken::new();
    let (status_tx, status_rx) = watch::channel(PipelineStatus::default());

    let server = status_bind.map(|bind| {
        let app = api::router_with_metrics(AppState::new(status_rx), metrics.as_ref());
        let token = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(&bind, app, token).await {
                tracing::error!(error = ?e, "status server stopped");
            }
        })
    });

    {
        let token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                token.cancel();
            }
        });
    }

    let mut orchestrator = runtime.into_orchestrator().with_status(status_tx);
    if cli.once {
        let report = orchestrator.run_cycle(&cancel).await;
        tracing::info!(posted = report.posted, failed = report.failed, "single cycle finished");
        cancel.cancel();
    } else {
        orchestrator.run(cancel.clone()).await;
    }

    if let Some(handle) = server {
        let _ = handle.await;
    }
    Ok(())
}
