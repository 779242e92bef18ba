//! Template captions + hashtags, seeded per item so reruns are reproducible.

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;

use super::CaptionGenerator;
use crate::ingest::types::ContentItem;

const CASUAL: [&str; 5] = [
    "When you {context} 😂",
    "POV: {context}",
    "This hits different {emoji}",
    "Tag someone who {context}",
    "Why is this so accurate? {emoji}",
];

const HYPE: [&str; 3] = [
    "This is PEAK content 🔥",
    "Absolute gold right here ⭐",
    "This one's legendary 💯",
];

const TAGS_GENERIC: [&str; 6] = ["#memes", "#funny", "#dankmemes", "#lol", "#viral", "#comedy"];
const TAGS_QUALITY: [&str; 3] = ["#bestmemes", "#topmemes", "#funnycontent"];
const TAGS_ENGAGEMENT: [&str; 4] = ["#relatable", "#mood", "#trending", "#fyp"];

const EMOJIS: [&str; 6] = ["😂", "💀", "🤣", "😭", "🔥", "💯"];

const MAX_TAGS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct TemplateCaptioner;

impl TemplateCaptioner {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core; the trait impl just wraps it.
    pub fn caption_for(&self, item: &ContentItem, score: f32) -> String {
        let mut rng = StdRng::seed_from_u64(seed_for(&item.content_id));

        let pool: &[&str] = if score >= 0.8 { &HYPE } else { &CASUAL };
        let template = pool.choose(&mut rng).copied().unwrap_or("{context}");
        let emoji = EMOJIS.choose(&mut rng).copied().unwrap_or("😂");
        let text = template
            .replace("{context}", &context_phrase(item.title.as_deref()))
            .replace("{emoji}", emoji);

        let tags = hashtags(&mut rng, item.source_tag.as_deref(), score);
        format!("{text}\n\n{tags}")
    }
}

#[async_trait]
impl CaptionGenerator for TemplateCaptioner {
    async fn make_caption(&self, item: &ContentItem, score: f32) -> Result<String> {
        Ok(self.caption_for(item, score))
    }
    fn name(&self) -> &'static str {
        "template"
    }
}

fn seed_for(content_id: &str) -> u64 {
    u64::from_str_radix(content_id, 16).unwrap_or_else(|_| {
        content_id
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3))
    })
}

/// Phrase used in `{context}`: text after "when", else the title, else "see this".
pub fn context_phrase(title: Option<&str>) -> String {
    let title = title.unwrap_or_default().to_lowercase();
    if title.trim().is_empty() {
        return "see this".to_string();
    }
    let picked = match title.split_once("when") {
        Some((_, rest)) if !rest.trim().is_empty() => rest.trim(),
        _ => title.trim(),
    };
    picked.chars().take(50).collect()
}

fn hashtags(rng: &mut StdRng, source_tag: Option<&str>, score: f32) -> String {
    let mut picked: Vec<String> = TAGS_GENERIC
        .choose_multiple(rng, 4)
        .map(|s| s.to_string())
        .collect();
    if score >= 0.75 {
        picked.extend(TAGS_QUALITY.choose_multiple(rng, 2).map(|s| s.to_string()));
    }
    picked.extend(TAGS_ENGAGEMENT.choose_multiple(rng, 2).map(|s| s.to_string()));

    // "reddit/memes" → "#memes"
    if let Some(tag) = source_tag {
        let local = tag.rsplit('/').next().unwrap_or(tag);
        let cleaned: String = local
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect::<String>()
            .to_lowercase();
        if !cleaned.is_empty() {
            picked.push(format!("#{cleaned}"));
        }
    }

    let mut seen = std::collections::HashSet::new();
    picked.retain(|t| seen.insert(t.clone()));
    picked.truncate(MAX_TAGS);
    picked.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ContentItem {
        ContentItem::from_payload("memes/reddit_abc.jpg")
            .with_title("When you realize it's Monday tomorrow")
            .with_source_tag("reddit/memes")
    }

    #[test]
    fn context_uses_text_after_when() {
        assert_eq!(
            context_phrase(Some("When you realize it's Monday tomorrow")),
            "you realize it's monday tomorrow"
        );
        assert_eq!(context_phrase(Some("Cats")), "cats");
        assert_eq!(context_phrase(None), "see this");
    }

    #[test]
    fn same_item_same_caption() {
        let c = TemplateCaptioner::new();
        assert_eq!(c.caption_for(&item(), 0.7), c.caption_for(&item(), 0.7));
    }

    #[test]
    fn hashtags_are_unique_capped_and_include_source() {
        let c = TemplateCaptioner::new();
        let cap = c.caption_for(&item(), 0.9);
        let (_, tags) = cap.split_once("\n\n").unwrap();
        let list: Vec<&str> = tags.split(' ').collect();
        assert!(list.len() <= MAX_TAGS);
        // 4 generic + 2 quality + 2 engagement + source (no overlap between pools
        // except "#memes", which the source tag may duplicate)
        assert!(list.len() >= 8);
        assert!(list.contains(&"#memes"));
        let uniq: std::collections::HashSet<_> = list.iter().collect();
        assert_eq!(uniq.len(), list.len());
    }

    #[test]
    fn hype_templates_for_high_scores() {
        let c = TemplateCaptioner::new();
        let cap = c.caption_for(&item(), 0.95);
        let first = cap.lines().next().unwrap();
        assert!(HYPE.contains(&first));
    }
}
