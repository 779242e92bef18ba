//! Score one local image with the configured backend.
//!
//! usage: score_image <path> [config]

use std::path::PathBuf;

use meme_pipeline::analyze::{QualityScorer, QualityTier};
use meme_pipeline::bootstrap::build_backend;
use meme_pipeline::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next().map(PathBuf::from) else {
        anyhow::bail!("usage: score_image <path> [config]");
    };
    let cfg_path = args.next().map(PathBuf::from);
    let cfg = PipelineConfig::load(cfg_path.as_deref());

    let scorer = QualityScorer::new(build_backend(&cfg)?);
    let b = scorer.evaluate_file(&path).await?;
    let tier = QualityTier::from_score(b.final_score);

    println!("file:      {}", path.display());
    println!("backend:   {}", scorer.backend_name());
    println!("semantic:  {:.3}", b.semantic);
    println!("heuristic: {:.3}", b.heuristic);
    println!("final:     {:.3} ({})", b.final_score, tier.label());
    println!(
        "selected:  {}",
        if b.final_score >= cfg.selection.min_score_threshold { "yes" } else { "no" }
    );
    Ok(())
}
