//! Caption synthesis. Generators may fail; the orchestrator then uses
//! [`fallback_caption`], which never does.

pub mod openai;
pub mod template;

use anyhow::Result;
use async_trait::async_trait;

use crate::ingest::types::ContentItem;

pub use openai::OpenAiCaptioner;
pub use template::TemplateCaptioner;

pub const FALLBACK_CAPTION: &str = "Fresh pick";

#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    async fn make_caption(&self, item: &ContentItem, score: f32) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Deterministic minimal caption: the item's title, else a placeholder.
pub fn fallback_caption(item: &ContentItem) -> String {
    item.title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_CAPTION.to_string())
}

/// Single line, whitespace collapsed, at most `max` chars.
pub fn sanitize_caption(input: &str, max: usize) -> String {
    let mut out = String::with_capacity(max.min(input.len()));
    let mut count = 0usize;
    let mut prev_space = false;
    for ch in input.chars() {
        let c = if ch.is_whitespace() { ' ' } else { ch };
        if c == ' ' {
            if prev_space || out.is_empty() {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(c);
        count += 1;
        if count >= max {
            break;
        }
    }
    out.trim_end().to_string()
}
