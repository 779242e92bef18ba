// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod bootstrap;
pub mod caption;
pub mod config;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod retry;
pub mod selection;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::PipelineConfig;
pub use crate::history::{Ledger, LedgerEntry};
pub use crate::ingest::types::{ContentItem, ContentSource, SortMode};
pub use crate::orchestrator::{CycleReport, Orchestrator};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the default filter;
/// `json` selects the JSON formatter. Safe to call twice (second call is a no-op).
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("meme_pipeline=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing already initialized");
    }
}
