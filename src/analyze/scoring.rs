//! Quality scoring: blends the semantic and heuristic signals.
//!
//! final = 0.6 * semantic + 0.4 * heuristic, clamped to [0,1].
//! An unreadable or undecodable payload scores 0.0 overall.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::heuristic::heuristic_score_image;
use super::semantic::{semantic_score, SemanticBackend};
use crate::ingest::types::ContentItem;

pub const SEMANTIC_WEIGHT: f32 = 0.6;
pub const HEURISTIC_WEIGHT: f32 = 0.4;

/// Sub-scores in [0,1] plus their blend. Keep it small and clear.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub semantic: f32,
    pub heuristic: f32,
    pub final_score: f32,
}

impl ScoreBreakdown {
    /// Safe constructor with clamping.
    pub fn new(semantic: f32, heuristic: f32) -> Self {
        fn c(x: f32) -> f32 {
            if x.is_finite() {
                x.clamp(0.0, 1.0)
            } else {
                0.0
            }
        }
        let (semantic, heuristic) = (c(semantic), c(heuristic));
        Self {
            semantic,
            heuristic,
            final_score: combine(semantic, heuristic),
        }
    }
}

pub fn combine(semantic: f32, heuristic: f32) -> f32 {
    (semantic * SEMANTIC_WEIGHT + heuristic * HEURISTIC_WEIGHT).clamp(0.0, 1.0)
}

/// Score attached to an item id. `fetch_index` is the item's position in the
/// cycle's fetch order and breaks ranking ties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub content_id: String,
    pub score: f32,
    pub fetch_index: usize,
}

/// Operator-facing bucket for a final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    Viral,
    Quality,
    Borderline,
    Reject,
}

impl QualityTier {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.80 {
            QualityTier::Viral
        } else if score >= 0.65 {
            QualityTier::Quality
        } else if score >= 0.50 {
            QualityTier::Borderline
        } else {
            QualityTier::Reject
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Viral => "VIRAL",
            QualityTier::Quality => "QUALITY",
            QualityTier::Borderline => "BORDERLINE",
            QualityTier::Reject => "REJECT",
        }
    }
}

/// Stateless per call; the backend is shared for the process lifetime.
#[derive(Clone)]
pub struct QualityScorer {
    backend: Arc<dyn SemanticBackend>,
}

impl QualityScorer {
    pub fn new(backend: Arc<dyn SemanticBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Full breakdown for raw bytes. Errors when the bytes are not an image or
    /// the decode worker dies; callers map that to a 0.0 score.
    pub async fn evaluate(&self, bytes: Vec<u8>) -> Result<ScoreBreakdown> {
        let bytes = Arc::new(bytes);
        let for_decode = Arc::clone(&bytes);
        let heuristic = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&for_decode).map(|img| heuristic_score_image(&img))
        })
        .await
        .map_err(|e| anyhow!("decode worker failed: {e}"))?
        .context("decoding image")?;

        let semantic = semantic_score(self.backend.as_ref(), &bytes).await;
        Ok(ScoreBreakdown::new(semantic, heuristic))
    }

    pub async fn evaluate_file(&self, path: &Path) -> Result<ScoreBreakdown> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        self.evaluate(bytes).await
    }

    /// Final score for an item; never fails, degrades to 0.0.
    pub async fn score(&self, item: &ContentItem) -> f32 {
        match self.evaluate_file(&item.payload_ref).await {
            Ok(b) => {
                tracing::debug!(
                    content_id = %item.content_id,
                    semantic = b.semantic,
                    heuristic = b.heuristic,
                    score = b.final_score,
                    "scored"
                );
                b.final_score
            }
            Err(e) => {
                tracing::warn!(content_id = %item.content_id, error = %e, "scoring failed, using 0.0");
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        assert!((SEMANTIC_WEIGHT + HEURISTIC_WEIGHT - 1.0).abs() < 1e-6);
    }

    #[test]
    fn breakdown_clamps_inputs() {
        let b = ScoreBreakdown::new(1.7, -2.0);
        assert_eq!(b.semantic, 1.0);
        assert_eq!(b.heuristic, 0.0);
        assert!((b.final_score - 0.6).abs() < 1e-6);
        let nan = ScoreBreakdown::new(f32::NAN, 0.5);
        assert!((nan.final_score - 0.2).abs() < 1e-6);
    }

    #[test]
    fn tiers() {
        assert_eq!(QualityTier::from_score(0.95), QualityTier::Viral);
        assert_eq!(QualityTier::from_score(0.65), QualityTier::Quality);
        assert_eq!(QualityTier::from_score(0.5), QualityTier::Borderline);
        assert_eq!(QualityTier::from_score(0.1), QualityTier::Reject);
    }
}
