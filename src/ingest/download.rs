// src/ingest/download.rs
//! Shared HTTP plumbing for sources: one client, JSON listing fetch and
//! image download, both retried with backoff.

use anyhow::{anyhow, bail, Context, Result};
use metrics::counter;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{with_backoff, RetryPolicy};

/// Responses smaller than this are not real images (error stubs, pixels).
pub const MIN_IMAGE_BYTES: usize = 100;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u8,
    pub backoff_base: Duration,
    pub download_dir: PathBuf,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("meme-pipeline/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
            download_dir: PathBuf::from("memes"),
        }
    }
}

pub struct Downloader {
    client: reqwest::Client,
    retry: RetryPolicy,
    download_dir: PathBuf,
}

impl Downloader {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.timeout)
            .build()
            .context("building source http client")?;
        Ok(Self {
            client,
            retry: RetryPolicy::new(settings.max_retries, settings.backoff_base),
            download_dir: settings.download_dir.clone(),
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// GET + JSON decode, retried on any failure.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let client = &self.client;
        with_backoff(self.retry, "listing fetch", move |_| async move {
            let rsp = client
                .get(url)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
                .with_context(|| format!("GET {url}"))?
                .error_for_status()
                .with_context(|| format!("GET {url}"))?;
            rsp.json::<T>().await.context("decoding listing json")
        })
        .await
    }

    /// Download `url` into the download dir as `file_name`. An existing
    /// non-empty file is reused without a request.
    pub async fn fetch_image(&self, url: &str, file_name: &str) -> Result<PathBuf> {
        let path = self.download_dir.join(file_name);
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_file() && meta.len() as usize >= MIN_IMAGE_BYTES {
                return Ok(path);
            }
        }
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .with_context(|| format!("creating {}", self.download_dir.display()))?;

        let client = &self.client;
        let bytes = with_backoff(self.retry, "image download", move |_| async move {
            let rsp = client
                .get(url)
                .send()
                .await
                .with_context(|| format!("GET {url}"))?
                .error_for_status()
                .with_context(|| format!("GET {url}"))?;
            let body = rsp.bytes().await.context("reading image body")?;
            validate_image_body(&body)?;
            Ok::<_, anyhow::Error>(body)
        })
        .await
        .inspect_err(|_| counter!("pipeline_download_errors_total").increment(1))?;

        // temp + rename so a half-written file is never mistaken for a cached one
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming to {}", path.display()))?;
        Ok(path)
    }
}

/// Reject tiny bodies and HTML block pages served in place of an image.
pub fn validate_image_body(body: &[u8]) -> Result<()> {
    if body.len() < MIN_IMAGE_BYTES {
        bail!("file too small ({} bytes)", body.len());
    }
    if looks_like_html(body) {
        return Err(anyhow!("got HTML instead of image (blocked)"));
    }
    Ok(())
}

pub fn looks_like_html(body: &[u8]) -> bool {
    let head: Vec<u8> = body
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take(15)
        .map(|b| b.to_ascii_lowercase())
        .collect();
    head.starts_with(b"<!doctype html") || head.starts_with(b"<html")
}

const IMAGE_EXTS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Direct link to an image file (query string ignored).
pub fn is_image_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    IMAGE_EXTS.iter().any(|ext| path.ends_with(ext))
}

/// File extension guessed from the URL; `.jpg` when unknown.
pub fn extension_for(url: &str) -> &'static str {
    let u = url.to_ascii_lowercase();
    if u.contains(".jpg") || u.contains(".jpeg") {
        ".jpg"
    } else if u.contains(".png") {
        ".png"
    } else if u.contains(".gif") {
        ".gif"
    } else if u.contains(".webp") {
        ".webp"
    } else {
        ".jpg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_block_pages_are_detected() {
        assert!(looks_like_html(b"<!DOCTYPE html><html>blocked</html>"));
        assert!(looks_like_html(b"  \n<html><body>"));
        assert!(!looks_like_html(b"\x89PNG\r\n\x1a\n"));
    }

    #[test]
    fn image_url_detection_ignores_query() {
        assert!(is_image_url("https://i.redd.it/abc.PNG"));
        assert!(is_image_url("https://i.example/x.jpg?width=640"));
        assert!(!is_image_url("https://v.redd.it/abc"));
    }

    #[test]
    fn extension_guess() {
        assert_eq!(extension_for("https://x/y.webp?a=1"), ".webp");
        assert_eq!(extension_for("https://x/y"), ".jpg");
    }

    #[test]
    fn small_bodies_rejected() {
        assert!(validate_image_body(&[0u8; 10]).is_err());
        assert!(validate_image_body(&[0u8; 200]).is_ok());
    }
}
