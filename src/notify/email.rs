use lettre::message::{header, Attachment, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use std::time::Duration;

use super::{ChannelError, OutgoingPost, PublishChannel};
use crate::retry::{with_backoff, RetryPolicy};

/// Delivers each pick as an email with the image attached.
pub struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub to: String,
    pub timeout_secs: u64,
    pub max_retries: u8,
}

impl EmailChannel {
    pub fn new(s: &EmailSettings) -> anyhow::Result<Self> {
        use anyhow::Context;
        let creds = Credentials::new(s.user.clone(), s.pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&s.host)
            .with_context(|| format!("invalid SMTP host {}", s.host))?
            .credentials(creds)
            .timeout(Some(Duration::from_secs(s.timeout_secs)))
            .build();
        let from = s.from.parse().context("invalid email from address")?;
        let to = s.to.parse().context("invalid email to address")?;
        Ok(Self {
            mailer,
            from,
            to,
            retry: RetryPolicy::new(s.max_retries, Duration::from_millis(500)),
        })
    }

    fn build_message(&self, post: &OutgoingPost, bytes: Vec<u8>) -> Result<Message, ChannelError> {
        let subject = match &post.title {
            Some(t) => format!("Meme pick ({:.0}%): {}", post.score * 100.0, t),
            None => format!("Meme pick ({:.0}%)", post.score * 100.0),
        };
        let mut body = post.caption.clone();
        body.push_str("\n\n");
        for (name, value) in post.fields() {
            body.push_str(&format!("{name}: {value}\n"));
        }

        let content_type = header::ContentType::parse(mime_for(&post.file_name()))
            .map_err(|e| ChannelError::Payload(e.to_string()))?;
        let attachment = Attachment::new(post.file_name()).body(bytes, content_type);

        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body))
                    .singlepart(attachment),
            )
            .map_err(|e| ChannelError::Payload(format!("build email: {e}")))
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

fn smtp_error(e: lettre::transport::smtp::Error) -> ChannelError {
    // 530/535: authentication required / rejected
    let code = e.status().map(|c| c.to_string());
    if matches!(code.as_deref(), Some("530") | Some("535")) {
        return ChannelError::PermissionDenied(e.to_string());
    }
    if e.is_permanent() {
        ChannelError::Rejected {
            status: code.and_then(|c| c.parse().ok()).unwrap_or(550),
            body: e.to_string(),
        }
    } else {
        ChannelError::Transient(e.to_string())
    }
}

#[async_trait::async_trait]
impl PublishChannel for EmailChannel {
    async fn ready(&self) -> Result<(), ChannelError> {
        match self.mailer.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ChannelError::Transient("SMTP server not reachable".into())),
            Err(e) => Err(smtp_error(e)),
        }
    }

    async fn send(&self, post: &OutgoingPost) -> Result<(), ChannelError> {
        let bytes = tokio::fs::read(&post.payload_ref)
            .await
            .map_err(|e| ChannelError::Payload(format!("{}: {e}", post.payload_ref.display())))?;
        let msg = self.build_message(post, bytes)?;
        let msg = &msg;
        let mailer = &self.mailer;
        with_backoff(self.retry, "email send", move |_| async move {
            mailer.send(msg.clone()).await.map(|_| ()).map_err(smtp_error)
        })
        .await
    }

    fn name(&self) -> &'static str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for("a.PNG"), "image/png");
        assert_eq!(mime_for("a.gif"), "image/gif");
        assert_eq!(mime_for("a.jpg"), "image/jpeg");
    }
}
