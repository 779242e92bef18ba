// src/analyze/mod.rs
//! Quality analysis: semantic (CLIP-style) and heuristic signals, blended into one score.

pub mod heuristic;
pub mod scoring;
pub mod semantic;

// Re-export convenient types.
pub use crate::analyze::heuristic::{heuristic_score, ImageStats};
pub use crate::analyze::scoring::{QualityScorer, QualityTier, ScoreBreakdown, ScoreResult};
pub use crate::analyze::semantic::{
    DisabledBackend, FixedBackend, HttpClipBackend, SemanticBackend,
};
