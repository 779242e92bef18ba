use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once per process) and describe the
    /// pipeline series. A second call reuses the first handle.
    pub fn init(threshold: f32) -> anyhow::Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")
            })?
            .clone();

        describe_pipeline_metrics();
        // Static gauge with the configured selection threshold
        gauge!("pipeline_score_threshold").set(threshold as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn describe_pipeline_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_items_scored_total", "Items that received a score.");
        describe_histogram!("pipeline_score", "Final quality scores in [0,1].");
        describe_counter!("pipeline_selected_total", "Items chosen by the selection policy.");
        describe_counter!(
            "pipeline_posts_total",
            "Publish attempts by outcome (posted, already_posted, failed)."
        );
        describe_gauge!(
            "pipeline_score_threshold",
            "Configured minimum score for selection."
        );
    });
}
