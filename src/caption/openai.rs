//! Chat-completions caption generator. Requires an API key; failures are
//! returned to the caller so the fallback caption applies.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{sanitize_caption, CaptionGenerator};
use crate::ingest::types::ContentItem;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const MAX_CAPTION_CHARS: usize = 100;

pub struct OpenAiCaptioner {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiCaptioner {
    /// `model_override`: pass Some("gpt-4o") to override; defaults to gpt-4o-mini.
    pub fn new(api_key: String, model_override: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("meme-pipeline/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .context("building caption http client")?;
        Ok(Self {
            http,
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl CaptionGenerator for OpenAiCaptioner {
    async fn make_caption(&self, item: &ContentItem, _score: f32) -> Result<String> {
        if self.api_key.is_empty() {
            bail!("caption model has no API key");
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let title: String = item
            .title
            .as_deref()
            .unwrap_or("funny meme")
            .chars()
            .take(50)
            .collect();
        let user = format!("Write a short funny caption for a meme about: {title}");
        let sys = "You write captions for memes. Return ONE short line (<=100 chars), casual tone, at most one emoji. Output only the caption.";
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.8,
            max_tokens: 40,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("caption request")?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("caption model HTTP {status}"));
        }
        let body: Resp = resp.json().await.context("caption response json")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        let cleaned = sanitize_caption(content.trim_matches('"'), MAX_CAPTION_CHARS);
        if cleaned.is_empty() {
            bail!("caption model returned empty text");
        }
        Ok(cleaned)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
