//! Pre-flight check: config, ledger, sources, semantic backend, channel.
//! Exits 1 when anything fatal is found.

use std::path::PathBuf;
use std::time::Duration;

use meme_pipeline::analyze::semantic::all_labels;
use meme_pipeline::bootstrap::{build_backend, build_channel, build_sources};
use meme_pipeline::history::Ledger;
use meme_pipeline::ingest::fetch_one;
use meme_pipeline::PipelineConfig;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let explicit = std::env::args().nth(1).map(PathBuf::from);
    let cfg = PipelineConfig::load(explicit.as_deref());
    let mut fatal = 0usize;

    match cfg.validate() {
        Ok(()) => println!("✓ config valid (channel: {})", cfg.channel.kind),
        Err(e) => {
            println!("✗ config: {e}");
            fatal += 1;
        }
    }

    let ledger = Ledger::open(&cfg.history.path, cfg.history.max_history_entries);
    println!(
        "✓ ledger {} ({} / {} entries)",
        cfg.history.path.display(),
        ledger.len(),
        ledger.capacity()
    );

    match build_sources(&cfg) {
        Ok(bindings) if bindings.is_empty() => println!("! no sources configured"),
        Ok(bindings) => {
            for mut b in bindings {
                b.limit = 1;
                match fetch_one(&b, Duration::from_secs(cfg.ingest.fetch_timeout_secs)).await {
                    Ok(items) => println!("✓ source {} ({} item)", b.label(), items.len()),
                    Err(e) => println!("! source {}: {e:#}", b.label()),
                }
            }
        }
        Err(e) => {
            println!("✗ sources: {e:#}");
            fatal += 1;
        }
    }

    match build_backend(&cfg) {
        Ok(backend) => {
            // 1x1 PNG is enough to see whether the backend answers
            let probe = tiny_png();
            match backend.similarity(&probe, &all_labels()).await {
                Ok(p) => println!("✓ semantic backend {} ({} probs)", backend.name(), p.len()),
                Err(e) => println!("! semantic backend {}: {e:#} (scores fall back to 0.5)", backend.name()),
            }
        }
        Err(e) => {
            println!("✗ semantic backend: {e:#}");
            fatal += 1;
        }
    }

    if cfg.validate().is_ok() {
        match build_channel(&cfg) {
            Ok(ch) => match ch.ready().await {
                Ok(()) => println!("✓ channel {} ready", ch.name()),
                Err(e) if e.is_config_error() => {
                    println!("✗ channel {}: {e}", ch.name());
                    fatal += 1;
                }
                Err(e) => println!("! channel {}: {e}", ch.name()),
            },
            Err(e) => {
                println!("✗ channel: {e:#}");
                fatal += 1;
            }
        }
    }

    if fatal > 0 {
        println!("\n{fatal} fatal problem(s)");
        std::process::exit(1);
    }
    println!("\nall checks passed");
}

fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(1, 1, image::Rgb([255, 255, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    if image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .is_err()
    {
        return Vec::new();
    }
    out.into_inner()
}
