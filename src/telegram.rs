use crate::config::split_list;
use crate::message::html_to_text;
use crate::store::PersistedEmail;
use async_trait::async_trait;
use chrono::FixedOffset;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    // `<chatId>` or `<chatId>/<topicId>` or `<chatId>-<topicId>`; group ids
    // are negative, topic ids are positive.
    static ref CHAT_TARGET_REGEX: Regex = Regex::new(r"^(-?\d+)(?:[/-](\d+))?$").unwrap();
    // Fixed display timezone for the relayed timestamp (UTC+8).
    static ref DISPLAY_TZ: FixedOffset = FixedOffset::east_opt(8 * 3600).unwrap();
}

/// One parsed relay destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    pub chat_id: String,
    pub topic_id: Option<i64>,
}

/// Parse a destination token. Tokens that do not match the strict grammar
/// fall back to the whole token as chat id with no topic.
pub fn parse_chat_target(token: &str) -> ChatTarget {
    if let Some(captures) = CHAT_TARGET_REGEX.captures(token) {
        let topic_id = captures
            .get(2)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .filter(|topic| *topic > 0);
        return ChatTarget {
            chat_id: captures[1].to_string(),
            topic_id,
        };
    }
    ChatTarget {
        chat_id: token.to_string(),
        topic_id: None,
    }
}

/// Body of one Telegram `sendMessage` call.
#[derive(Debug, Clone, Serialize)]
pub struct TelegramPayload {
    pub chat_id: String,
    pub parse_mode: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
}

impl TelegramPayload {
    pub fn new(target: ChatTarget, text: String) -> Self {
        TelegramPayload {
            chat_id: target.chat_id,
            parse_mode: "HTML",
            text,
            message_thread_id: target.topic_id,
        }
    }
}

/// Delivery seam so fan-out can be exercised without the network.
#[async_trait]
pub trait RelaySink: Send + Sync {
    async fn deliver(&self, payload: &TelegramPayload) -> anyhow::Result<()>;
}

/// Real sink: one HTTPS POST to the Telegram bot API per payload.
pub struct TelegramSink {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramSink {
    pub fn new(token: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_api_base(token, "https://api.telegram.org")
    }

    pub fn with_api_base(
        token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("mail-intake/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(TelegramSink {
            client,
            api_base: api_base.into(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl RelaySink for TelegramSink {
    async fn deliver(&self, payload: &TelegramPayload) -> anyhow::Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let response = self.client.post(&url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("telegram responded {status}: {body}");
        }
        Ok(())
    }
}

/// Render the relay summary for a persisted row: subject, sender, recipient,
/// delivery time in the display timezone, then the body text.
pub fn render_summary(row: &PersistedEmail) -> String {
    let record = &row.record;
    let body = record
        .text
        .clone()
        .or_else(|| record.content.as_deref().map(html_to_text))
        .unwrap_or_default();
    let time = row
        .create_time
        .with_timezone(&*DISPLAY_TZ)
        .format("%Y-%m-%d %H:%M");

    format!(
        "<b>{}</b>\n\n<b>From:</b> {} &lt;{}&gt;\n<b>To:</b> {}\n<b>Time:</b> {}\n\n{}",
        record.subject, record.send_name, record.send_email, record.to_email, time, body
    )
}

/// Fan out one delivery per destination token. Each destination runs as its
/// own task; a failure is logged with the offending token and never blocks
/// or fails the siblings. Returns once every delivery has settled.
pub async fn dispatch_all(sink: Arc<dyn RelaySink>, chat_ids: &str, text: &str) {
    let mut handles = Vec::new();

    for token in split_list(chat_ids) {
        let sink = sink.clone();
        let text = text.to_string();
        handles.push(tokio::spawn(async move {
            let payload = TelegramPayload::new(parse_chat_target(&token), text);
            if let Err(e) = sink.deliver(&payload).await {
                log::error!("telegram relay failed for destination {token}: {e:#}");
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            log::error!("telegram relay task panicked: {e}");
        }
    }
}
