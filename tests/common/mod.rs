// tests/common/mod.rs
// Shared fixtures: generated images, mock sources and a counting channel.
#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;

use meme_pipeline::notify::{ChannelError, OutgoingPost, PublishChannel};
use meme_pipeline::{ContentItem, ContentSource, SortMode};

/// Positives 0.2 each, negatives 0.05 each: semantic ratio 0.8.
pub const GOOD_PROBS: [f32; 8] = [0.2, 0.2, 0.2, 0.2, 0.05, 0.05, 0.05, 0.05];

pub fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// 1280x720 black/white checkerboard: heuristic 0.75.
pub fn sharp_png() -> Vec<u8> {
    encode_png(RgbImage::from_fn(1280, 720, |x, y| {
        if (x + y) % 2 == 0 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    }))
}

/// 100x100 flat grey: heuristic 0.1.
pub fn flat_png() -> Vec<u8> {
    encode_png(RgbImage::from_pixel(100, 100, Rgb([128, 128, 128])))
}

/// 128x128 colour gradient; large enough to pass the download size check.
pub fn gradient_png() -> Vec<u8> {
    encode_png(RgbImage::from_fn(128, 128, |x, y| {
        Rgb([(x * 2) as u8, (y * 2) as u8, ((x * y) % 256) as u8])
    }))
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, bytes).expect("write fixture");
    p
}

/// Returns a fixed list of items for every fetch.
pub struct StaticSource {
    pub items: Vec<ContentItem>,
    pub calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(items: Vec<ContentItem>) -> Arc<Self> {
        Arc::new(Self {
            items,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    async fn fetch(&self, _selector: &str, _sort: SortMode, limit: usize) -> anyhow::Result<Vec<ContentItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.iter().take(limit).cloned().collect())
    }
    fn name(&self) -> &'static str {
        "static"
    }
}

pub struct FailingSource;

#[async_trait]
impl ContentSource for FailingSource {
    async fn fetch(&self, _selector: &str, _sort: SortMode, _limit: usize) -> anyhow::Result<Vec<ContentItem>> {
        anyhow::bail!("source offline")
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Records every send; optionally fails them all.
#[derive(Default)]
pub struct CountingChannel {
    pub sent: Mutex<Vec<OutgoingPost>>,
    pub fail_with: Option<ChannelError>,
}

impl CountingChannel {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(err: ChannelError) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(err),
        })
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn sent_ids(&self) -> Vec<String> {
        self.sent.lock().iter().map(|p| p.content_id.clone()).collect()
    }
}

#[async_trait]
impl PublishChannel for CountingChannel {
    async fn send(&self, post: &OutgoingPost) -> Result<(), ChannelError> {
        self.sent.lock().push(post.clone());
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
    fn name(&self) -> &'static str {
        "counting"
    }
}
