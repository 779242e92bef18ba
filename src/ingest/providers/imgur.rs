// src/ingest/providers/imgur.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::download::{extension_for, Downloader};
use crate::ingest::types::{ContentItem, ContentSource, SortMode};

pub const DEFAULT_IMGUR_BASE: &str = "https://api.imgur.com";
/// Public web client id used by imgur.com itself.
pub const DEFAULT_IMGUR_CLIENT_ID: &str = "546c25a59c58ad7";

#[derive(Debug, Deserialize)]
struct PostsPage {
    #[serde(default)]
    posts: Vec<RawPost>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    upvote_count: Option<i64>,
    #[serde(default)]
    point_count: Option<i64>,
    #[serde(default)]
    media: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImgurPost {
    pub id: String,
    pub title: String,
    pub upvotes: i64,
    pub image_url: String,
}

/// Map the shared sort modes onto Imgur's `sort` parameter.
pub fn sort_param(sort: SortMode) -> &'static str {
    match sort {
        SortMode::Hot | SortMode::Rising => "-viral",
        SortMode::New => "-time",
        SortMode::Top => "-top",
    }
}

pub fn posts_url(base: &str, client_id: &str, section: &str, sort: SortMode) -> String {
    format!(
        "{}/post/v1/posts?client_id={}&filter[section]=eq:{}&include=media&page=1&sort={}",
        base.trim_end_matches('/'),
        client_id,
        section,
        sort_param(sort)
    )
}

/// Posts whose first media entry is a still image; others are skipped.
pub fn parse_posts(json: &str) -> Result<Vec<ImgurPost>> {
    let page: PostsPage = serde_json::from_str(json).context("parsing imgur posts json")?;
    Ok(page_posts(page))
}

fn page_posts(page: PostsPage) -> Vec<ImgurPost> {
    page.posts
        .into_iter()
        .filter_map(|p| {
            let first = p.media.into_iter().next()?;
            if first.kind.as_deref() == Some("video") {
                return None;
            }
            let image_url = first.url.filter(|u| !u.is_empty())?;
            Some(ImgurPost {
                id: p.id,
                title: p.title.unwrap_or_default(),
                upvotes: p.upvote_count.or(p.point_count).unwrap_or(0),
                image_url,
            })
        })
        .collect()
}

pub struct ImgurSource {
    http: Arc<Downloader>,
    base_url: String,
    client_id: String,
    request_delay: Duration,
}

impl ImgurSource {
    pub fn new(http: Arc<Downloader>, client_id: Option<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_IMGUR_BASE.to_string(),
            client_id: client_id
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_IMGUR_CLIENT_ID.to_string()),
            request_delay: Duration::from_millis(500),
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into();
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }
}

#[async_trait]
impl ContentSource for ImgurSource {
    async fn fetch(&self, selector: &str, sort: SortMode, limit: usize) -> Result<Vec<ContentItem>> {
        let url = posts_url(&self.base_url, &self.client_id, selector, sort);
        let page: PostsPage = self
            .http
            .get_json(&url)
            .await
            .with_context(|| format!("fetching imgur section {selector}"))?;
        let posts = page_posts(page);
        counter!("pipeline_source_posts_total", "source" => "imgur").increment(posts.len() as u64);

        let mut out = Vec::new();
        for (i, post) in posts.into_iter().take(limit).enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            let file_name = format!("imgur_{}{}", post.id, extension_for(&post.image_url));
            match self.http.fetch_image(&post.image_url, &file_name).await {
                Ok(path) => out.push(
                    ContentItem::from_payload(path)
                        .with_title(post.title)
                        .with_source_tag(format!("imgur/{selector}"))
                        .with_engagement(post.upvotes),
                ),
                Err(e) => tracing::warn!(post_id = %post.id, error = %e, "imgur: download failed"),
            }
        }
        tracing::info!(target: "ingest", section = selector, downloaded = out.len(), "imgur fetch done");
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "imgur"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_videos_and_empty_media() {
        let json = r#"{"posts":[
            {"id":"i1","title":"cat","upvote_count":120,"media":[{"url":"https://i.imgur.com/i1.png","type":"image"}]},
            {"id":"i2","title":"clip","upvote_count":900,"media":[{"url":"https://i.imgur.com/i2.mp4","type":"video"}]},
            {"id":"i3","title":"none","media":[]},
            {"id":"i4","point_count":7,"media":[{"url":"https://i.imgur.com/i4.jpg"}]}
        ]}"#;
        let posts = parse_posts(json).unwrap();
        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i4"]);
        assert_eq!(posts[1].upvotes, 7);
        assert_eq!(posts[1].title, "");
    }

    #[test]
    fn sort_mapping() {
        assert_eq!(sort_param(SortMode::Hot), "-viral");
        assert_eq!(sort_param(SortMode::New), "-time");
        assert!(posts_url("https://api.imgur.com/", "cid", "top", SortMode::Top)
            .ends_with("client_id=cid&filter[section]=eq:top&include=media&page=1&sort=-top"));
    }
}
