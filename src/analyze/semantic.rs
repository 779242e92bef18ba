//! Semantic quality signal: image/label similarity from a CLIP-style backend.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub const SEMANTIC_FALLBACK: f32 = 0.5;

pub const POSITIVE_LABELS: [&str; 4] = [
    "a high quality funny meme",
    "a viral internet meme",
    "a popular relatable meme",
    "an engaging social media post",
];

pub const NEGATIVE_LABELS: [&str; 4] = [
    "a low quality blurry image",
    "inappropriate nsfw content",
    "spam or advertisement",
    "boring text-heavy content",
];

/// Positive labels first, then negative; the order the backend is queried in.
pub fn all_labels() -> Vec<&'static str> {
    POSITIVE_LABELS.iter().chain(NEGATIVE_LABELS.iter()).copied().collect()
}

#[async_trait]
pub trait SemanticBackend: Send + Sync {
    /// Probability distribution over `labels` (same length, sums to ~1).
    async fn similarity(&self, image: &[u8], labels: &[&str]) -> Result<Vec<f32>>;
    fn name(&self) -> &'static str;
}

/// `mean(pos) / (mean(pos) + mean(neg))`; `None` if the distribution is unusable.
pub fn semantic_ratio(probs: &[f32], n_positive: usize) -> Option<f32> {
    if n_positive == 0 || probs.len() <= n_positive {
        return None;
    }
    let (pos, neg) = probs.split_at(n_positive);
    let mean = |xs: &[f32]| xs.iter().sum::<f32>() / xs.len() as f32;
    let (p, n) = (mean(pos), mean(neg));
    let denom = p + n;
    if !denom.is_finite() || denom <= 0.0 || !p.is_finite() {
        return None;
    }
    Some((p / denom).clamp(0.0, 1.0))
}

/// Query the backend with the fixed label sets; any failure yields 0.5.
pub async fn semantic_score(backend: &dyn SemanticBackend, image: &[u8]) -> f32 {
    let labels = all_labels();
    match backend.similarity(image, &labels).await {
        Ok(probs) if probs.len() == labels.len() => {
            semantic_ratio(&probs, POSITIVE_LABELS.len()).unwrap_or_else(|| {
                tracing::warn!(backend = backend.name(), "semantic: degenerate distribution");
                SEMANTIC_FALLBACK
            })
        }
        Ok(probs) => {
            tracing::warn!(
                backend = backend.name(),
                got = probs.len(),
                want = labels.len(),
                "semantic: label/probability count mismatch"
            );
            SEMANTIC_FALLBACK
        }
        Err(e) => {
            tracing::warn!(backend = backend.name(), error = %e, "semantic: backend error");
            SEMANTIC_FALLBACK
        }
    }
}

// ------------------------------------------------------------
// Backends
// ------------------------------------------------------------

/// Used when no inference endpoint is configured.
pub struct DisabledBackend;

#[async_trait]
impl SemanticBackend for DisabledBackend {
    async fn similarity(&self, _image: &[u8], _labels: &[&str]) -> Result<Vec<f32>> {
        bail!("semantic backend disabled")
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// CLIP inference server reached over HTTP.
///
/// Request: multipart with an `image` file part and a `labels` JSON array.
/// Response: `{"probs": [..]}` aligned with `labels`.
pub struct HttpClipBackend {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpClipBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("meme-pipeline/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building clip http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[derive(Deserialize)]
struct ClipResponse {
    probs: Vec<f32>,
}

#[async_trait]
impl SemanticBackend for HttpClipBackend {
    async fn similarity(&self, image: &[u8], labels: &[&str]) -> Result<Vec<f32>> {
        let part = reqwest::multipart::Part::bytes(image.to_vec()).file_name("image");
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("labels", serde_json::to_string(labels)?);

        let resp = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .context("clip request")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("clip backend HTTP {status}"));
        }
        let body: ClipResponse = resp.json().await.context("clip response json")?;
        Ok(body.probs)
    }
    fn name(&self) -> &'static str {
        "clip-http"
    }
}

/// Returns a fixed distribution; handy for offline runs and tests.
#[derive(Clone)]
pub struct FixedBackend {
    pub probs: Vec<f32>,
}

#[async_trait]
impl SemanticBackend for FixedBackend {
    async fn similarity(&self, _image: &[u8], _labels: &[&str]) -> Result<Vec<f32>> {
        Ok(self.probs.clone())
    }
    fn name(&self) -> &'static str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_scale_free() {
        let probs = [0.2, 0.2, 0.2, 0.2, 0.05, 0.05, 0.05, 0.05];
        let r = semantic_ratio(&probs, 4).unwrap();
        assert!((r - 0.8).abs() < 1e-6);
        let scaled: Vec<f32> = probs.iter().map(|p| p * 10.0).collect();
        assert!((semantic_ratio(&scaled, 4).unwrap() - r).abs() < 1e-6);
    }

    #[test]
    fn zero_distribution_is_rejected() {
        assert!(semantic_ratio(&[0.0; 8], 4).is_none());
        assert!(semantic_ratio(&[0.5, 0.5], 2).is_none());
    }

    #[tokio::test]
    async fn disabled_backend_falls_back_to_neutral() {
        assert_eq!(semantic_score(&DisabledBackend, b"img").await, SEMANTIC_FALLBACK);
    }

    #[tokio::test]
    async fn wrong_length_falls_back_to_neutral() {
        let b = FixedBackend {
            probs: vec![0.9, 0.1],
        };
        assert_eq!(semantic_score(&b, b"img").await, SEMANTIC_FALLBACK);
    }
}
