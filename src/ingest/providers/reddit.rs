// src/ingest/providers/reddit.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::download::{extension_for, is_image_url, Downloader};
use crate::ingest::types::{ContentItem, ContentSource, SortMode};

pub const DEFAULT_REDDIT_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}
#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}
#[derive(Debug, Deserialize)]
struct Child {
    data: RawPost,
}
#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    over_18: bool,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    gallery_data: Option<serde_json::Value>,
    #[serde(default)]
    media_metadata: Option<HashMap<String, MediaMeta>>,
    #[serde(default)]
    preview: Option<Preview>,
}
#[derive(Debug, Deserialize)]
struct MediaMeta {
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    s: Option<MediaSource>,
}
#[derive(Debug, Deserialize)]
struct MediaSource {
    #[serde(default)]
    u: Option<String>,
}
#[derive(Debug, Deserialize)]
struct Preview {
    #[serde(default)]
    images: Vec<PreviewImage>,
}
#[derive(Debug, Deserialize)]
struct PreviewImage {
    source: PreviewSource,
}
#[derive(Debug, Deserialize)]
struct PreviewSource {
    url: String,
}

/// One listing entry after image-URL extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub ups: i64,
    pub num_comments: i64,
    pub created_utc: f64,
    pub over_18: bool,
    pub is_video: bool,
    pub image_url: Option<String>,
}

impl RedditPost {
    pub fn age_hours(&self, now_unix: f64) -> f64 {
        ((now_unix - self.created_utc) / 3600.0).max(0.0)
    }

    /// (upvotes + 2 * comments) per hour of age, age floored at one hour.
    pub fn engagement(&self, now_unix: f64) -> f64 {
        let age = self.age_hours(now_unix);
        if age <= 0.0 {
            return 0.0;
        }
        (self.ups as f64 + self.num_comments as f64 * 2.0) / age.max(1.0)
    }
}

fn unescape(url: &str) -> String {
    html_escape::decode_html_entities(url).to_string()
}

/// Direct image link, then first gallery image, then preview source.
fn extract_image_url(p: &RawPost) -> Option<String> {
    if let Some(u) = p.url.as_deref().filter(|u| is_image_url(u)) {
        return Some(unescape(u));
    }
    if p.gallery_data.is_some() {
        if let Some(meta) = &p.media_metadata {
            // HashMap order is arbitrary; pick the smallest media id for stability
            let mut ids: Vec<&String> = meta.keys().collect();
            ids.sort();
            for id in ids {
                let m = &meta[id];
                if m.e.as_deref() == Some("Image") {
                    if let Some(u) = m.s.as_ref().and_then(|s| s.u.as_deref()) {
                        return Some(unescape(u));
                    }
                }
            }
        }
    }
    p.preview
        .as_ref()
        .and_then(|pv| pv.images.first())
        .map(|img| unescape(&img.source.url))
}

/// Parse a subreddit listing JSON document.
pub fn parse_listing(json: &str) -> Result<Vec<RedditPost>> {
    let listing: Listing = serde_json::from_str(json).context("parsing reddit listing json")?;
    Ok(listing_posts(listing))
}

fn listing_posts(listing: Listing) -> Vec<RedditPost> {
    listing
        .data
        .children
        .into_iter()
        .map(|c| {
            let image_url = extract_image_url(&c.data);
            let p = c.data;
            RedditPost {
                id: p.id,
                title: p.title,
                ups: p.ups,
                num_comments: p.num_comments,
                created_utc: p.created_utc,
                over_18: p.over_18,
                is_video: p.is_video,
                image_url,
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct RedditOptions {
    pub base_url: String,
    pub min_upvotes: i64,
    pub max_post_age_hours: Option<f64>,
    /// Window for `top` listings: hour, day, week, month, year, all.
    pub time_filter: String,
    pub request_delay: Duration,
}

impl Default for RedditOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REDDIT_BASE.to_string(),
            min_upvotes: 50,
            max_post_age_hours: None,
            time_filter: "day".to_string(),
            request_delay: Duration::from_millis(500),
        }
    }
}

pub fn listing_url(opts: &RedditOptions, subreddit: &str, sort: SortMode, limit: usize) -> String {
    let mut url = format!(
        "{}/r/{}/{}.json?limit={}",
        opts.base_url.trim_end_matches('/'),
        subreddit,
        sort.as_str(),
        limit.min(100)
    );
    if sort == SortMode::Top {
        url.push_str(&format!("&t={}", opts.time_filter));
    }
    url
}

/// Keep posts that pass the engagement/age/content filters, best engagement first.
pub fn filter_candidates(posts: Vec<RedditPost>, opts: &RedditOptions, now_unix: f64) -> Vec<RedditPost> {
    let mut kept: Vec<(f64, RedditPost)> = posts
        .into_iter()
        .filter(|p| !p.over_18 && !p.is_video && p.image_url.is_some())
        .filter(|p| p.ups >= opts.min_upvotes)
        .filter(|p| {
            opts.max_post_age_hours
                .map_or(true, |max| p.age_hours(now_unix) <= max)
        })
        .map(|p| (p.engagement(now_unix), p))
        .collect();
    kept.sort_by(|a, b| b.0.total_cmp(&a.0));
    kept.into_iter().map(|(_, p)| p).collect()
}

/// Public subreddit JSON listings; no API key.
pub struct RedditSource {
    http: Arc<Downloader>,
    opts: RedditOptions,
}

impl RedditSource {
    pub fn new(http: Arc<Downloader>, opts: RedditOptions) -> Self {
        Self { http, opts }
    }
}

#[async_trait]
impl ContentSource for RedditSource {
    async fn fetch(&self, selector: &str, sort: SortMode, limit: usize) -> Result<Vec<ContentItem>> {
        let url = listing_url(&self.opts, selector, sort, limit);
        let listing: Listing = self
            .http
            .get_json(&url)
            .await
            .with_context(|| format!("fetching r/{selector}"))?;
        let posts = listing_posts(listing);
        let total = posts.len();
        counter!("pipeline_source_posts_total", "source" => "reddit").increment(total as u64);

        let now = chrono::Utc::now().timestamp() as f64;
        let candidates = filter_candidates(posts, &self.opts, now);
        let skipped = total - candidates.len();

        let mut out = Vec::with_capacity(candidates.len());
        for (i, post) in candidates.into_iter().enumerate() {
            if i > 0 && !self.opts.request_delay.is_zero() {
                tokio::time::sleep(self.opts.request_delay).await;
            }
            let Some(image_url) = post.image_url.as_deref() else {
                continue;
            };
            let file_name = format!("reddit_{}{}", post.id, extension_for(image_url));
            match self.http.fetch_image(image_url, &file_name).await {
                Ok(path) => out.push(
                    ContentItem::from_payload(path)
                        .with_title(post.title.clone())
                        .with_source_tag(format!("reddit/{selector}"))
                        .with_engagement(post.ups),
                ),
                Err(e) => {
                    tracing::warn!(post_id = %post.id, error = %e, "reddit: download failed");
                }
            }
        }

        tracing::info!(
            target: "ingest",
            subreddit = selector,
            sort = %sort,
            listed = total,
            skipped,
            downloaded = out.len(),
            "reddit fetch done"
        );
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{"data":{"children":[
        {"kind":"t3","data":{"id":"a1","title":"direct","url":"https://i.redd.it/a1.png","ups":500,"num_comments":10,"created_utc":0}},
        {"kind":"t3","data":{"id":"g1","title":"gallery","url":"https://www.reddit.com/gallery/g1","ups":80,
            "gallery_data":{"items":[]},
            "media_metadata":{"m2":{"e":"Image","s":{"u":"https://preview.redd.it/m2.jpg?width=640&amp;format=pjpg"}}}}},
        {"kind":"t3","data":{"id":"p1","title":"preview","url":"https://imgur.com/p1","ups":60,
            "preview":{"images":[{"source":{"url":"https://preview.redd.it/p1.jpg?a=1&amp;b=2"}}]}}},
        {"kind":"t3","data":{"id":"v1","title":"video","url":"https://v.redd.it/v1","ups":900,"is_video":true}},
        {"kind":"t3","data":{"id":"n1","title":"nsfw","url":"https://i.redd.it/n1.jpg","ups":900,"over_18":true}},
        {"kind":"t3","data":{"id":"l1","title":"low","url":"https://i.redd.it/l1.jpg","ups":3}}
    ]}}"#;

    #[test]
    fn extracts_direct_gallery_and_preview_urls() {
        let posts = parse_listing(LISTING).unwrap();
        assert_eq!(posts.len(), 6);
        assert_eq!(posts[0].image_url.as_deref(), Some("https://i.redd.it/a1.png"));
        assert_eq!(
            posts[1].image_url.as_deref(),
            Some("https://preview.redd.it/m2.jpg?width=640&format=pjpg")
        );
        assert_eq!(
            posts[2].image_url.as_deref(),
            Some("https://preview.redd.it/p1.jpg?a=1&b=2")
        );
        assert!(posts[3].image_url.is_none());
    }

    #[test]
    fn filters_video_nsfw_and_low_upvotes() {
        let posts = parse_listing(LISTING).unwrap();
        let opts = RedditOptions::default();
        let kept = filter_candidates(posts, &opts, 7200.0);
        let ids: Vec<_> = kept.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "g1", "p1"]);
    }

    #[test]
    fn top_listing_carries_time_filter() {
        let opts = RedditOptions::default();
        assert_eq!(
            listing_url(&opts, "memes", SortMode::Top, 25),
            "https://www.reddit.com/r/memes/top.json?limit=25&t=day"
        );
        assert_eq!(
            listing_url(&opts, "memes", SortMode::Hot, 500),
            "https://www.reddit.com/r/memes/hot.json?limit=100"
        );
    }

    #[test]
    fn max_age_filter() {
        let posts = parse_listing(LISTING).unwrap();
        let opts = RedditOptions {
            max_post_age_hours: Some(1.0),
            ..Default::default()
        };
        // every post was created at t=0; at t=2h all are too old
        assert!(filter_candidates(posts, &opts, 7200.0).is_empty());
    }
}
