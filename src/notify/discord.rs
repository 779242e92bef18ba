use super::{ChannelError, OutgoingPost, PublishChannel};
use crate::retry::{with_backoff, RetryPolicy};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const REACTIONS: [&str; 3] = ["👍", "👎", "🔥"];

/// Posts image + embed to one channel through the Discord bot API.
#[derive(Clone)]
pub struct DiscordChannel {
    api_base: String,
    token: String,
    channel_id: String,
    client: Client,
    timeout: Duration,
    retry: RetryPolicy,
    reactions: bool,
}

impl DiscordChannel {
    pub fn new(token: String, channel_id: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            channel_id,
            client: Client::new(),
            timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            reactions: true,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retry = RetryPolicy::new(retries, self.retry.base_delay);
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.retry = RetryPolicy::new(self.retry.max_attempts, base);
        self
    }

    pub fn with_reactions(mut self, on: bool) -> Self {
        self.reactions = on;
        self
    }

    fn channel_url(&self) -> String {
        format!("{}/channels/{}", self.api_base, self.channel_id)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// One upload attempt. After a 2xx the message exists, so the id is read
    /// best-effort and a malformed body is not an error.
    async fn post_once(&self, post: &OutgoingPost, bytes: &[u8]) -> Result<Option<String>, ChannelError> {
        let file_name = post.file_name();
        let payload = DiscordMessagePayload::embed(post, &file_name);
        let payload_json =
            serde_json::to_string(&payload).map_err(|e| ChannelError::Payload(e.to_string()))?;

        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .text("payload_json", payload_json)
            .part("files[0]", part);

        let rsp = self
            .client
            .post(format!("{}/messages", self.channel_url()))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;

        let rsp = check_status(rsp).await?;
        let body = rsp.text().await.unwrap_or_default();
        match serde_json::from_str::<MessageCreated>(&body) {
            Ok(msg) => Ok(Some(msg.id)),
            Err(e) => {
                tracing::warn!(error = %e, "discord: message created but response unreadable");
                Ok(None)
            }
        }
    }

    async fn add_reactions(&self, message_id: &str) {
        for emoji in REACTIONS {
            let url = format!(
                "{}/messages/{}/reactions/{}/@me",
                self.channel_url(),
                message_id,
                percent_encode(emoji)
            );
            let res = self
                .client
                .put(url)
                .header(reqwest::header::AUTHORIZATION, self.auth())
                .header(reqwest::header::CONTENT_LENGTH, "0")
                .timeout(self.timeout)
                .send()
                .await;
            match res {
                Ok(rsp) if rsp.status().is_success() => {}
                Ok(rsp) => tracing::debug!(status = %rsp.status(), emoji, "discord: reaction rejected"),
                Err(e) => tracing::debug!(error = %e, emoji, "discord: reaction failed"),
            }
        }
    }
}

#[async_trait::async_trait]
impl PublishChannel for DiscordChannel {
    /// Verifies the token can see the configured channel.
    async fn ready(&self) -> Result<(), ChannelError> {
        let this = self;
        with_backoff(self.retry, "discord ready", move |_| async move {
            let rsp = this
                .client
                .get(this.channel_url())
                .header(reqwest::header::AUTHORIZATION, this.auth())
                .timeout(this.timeout)
                .send()
                .await
                .map_err(request_error)?;
            check_status(rsp).await.map(|_| ())
        })
        .await
    }

    async fn send(&self, post: &OutgoingPost) -> Result<(), ChannelError> {
        let bytes = tokio::fs::read(&post.payload_ref)
            .await
            .map_err(|e| ChannelError::Payload(format!("{}: {e}", post.payload_ref.display())))?;

        let bytes = bytes.as_slice();
        let message_id =
            with_backoff(self.retry, "discord send", move |_| self.post_once(post, bytes)).await?;

        match message_id {
            Some(id) if self.reactions => self.add_reactions(&id).await,
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

fn request_error(e: reqwest::Error) -> ChannelError {
    if e.is_timeout() {
        ChannelError::Transient(format!("timeout: {e}"))
    } else {
        ChannelError::Transient(format!("request failed: {e}"))
    }
}

/// Map non-2xx responses onto the channel error taxonomy.
async fn check_status(rsp: Response) -> Result<Response, ChannelError> {
    let status = rsp.status();
    if status.is_success() {
        return Ok(rsp);
    }
    let body = rsp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChannelError::PermissionDenied(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate(&body, 200)
        )),
        StatusCode::NOT_FOUND => ChannelError::NotFound(truncate(&body, 200)),
        StatusCode::TOO_MANY_REQUESTS => ChannelError::RateLimited {
            retry_after: serde_json::from_str::<RateLimitBody>(&body)
                .ok()
                .and_then(|b| Duration::try_from_secs_f64(b.retry_after).ok()),
        },
        s if s.is_server_error() => {
            ChannelError::Transient(format!("HTTP {}: {}", s.as_u16(), truncate(&body, 200)))
        }
        s => ChannelError::Rejected {
            status: s.as_u16(),
            body: truncate(&body, 200),
        },
    })
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

#[derive(Deserialize)]
struct MessageCreated {
    id: String,
}

#[derive(Serialize)]
struct DiscordEmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Serialize)]
struct DiscordEmbedImage {
    url: String,
}

#[derive(Serialize)]
struct DiscordEmbedFooter {
    text: String,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
    fields: Vec<DiscordEmbedField>,
    image: DiscordEmbedImage,
    footer: DiscordEmbedFooter,
}

#[derive(Serialize)]
struct DiscordMessagePayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordMessagePayload {
    fn embed(post: &OutgoingPost, file_name: &str) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: "🎯 AI-Selected Content".to_string(),
                description: post.caption.clone(),
                color: post.color(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                fields: post
                    .fields()
                    .into_iter()
                    .map(|(name, value)| DiscordEmbedField {
                        name,
                        value,
                        inline: true,
                    })
                    .collect(),
                image: DiscordEmbedImage {
                    url: format!("attachment://{file_name}"),
                },
                footer: DiscordEmbedFooter {
                    text: "meme-pipeline".to_string(),
                },
            }],
        }
    }
}
