use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::backend::{ensure_success, http_client, ChannelClient, ChannelError};

const CHANNEL: &str = "telegram";
const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage`.
pub struct TelegramClient {
    token: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

impl TelegramClient {
    pub fn new(token: String, timeout: Duration) -> Self {
        Self {
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            http: http_client(timeout),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token
        )
    }
}

fn compose_text(message: &str, subject: Option<&str>) -> String {
    match subject {
        Some(subject) if !subject.is_empty() => format!("{subject}\n\n{message}"),
        _ => message.to_string(),
    }
}

#[async_trait]
impl ChannelClient for TelegramClient {
    fn name(&self) -> &'static str {
        CHANNEL
    }

    async fn send(
        &self,
        recipient: &str,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), ChannelError> {
        if recipient.trim().is_empty() {
            return Err(ChannelError::InvalidRecipient {
                channel: CHANNEL,
                recipient: recipient.to_string(),
            });
        }

        let payload = json!({
            "chat_id": recipient,
            "text": compose_text(message, subject),
        });

        let resp = self
            .http
            .post(self.send_message_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::from_reqwest(CHANNEL, e))?;
        let resp = ensure_success(CHANNEL, resp).await?;

        let body: BotApiResponse = resp
            .json()
            .await
            .map_err(|e| ChannelError::from_reqwest(CHANNEL, e))?;

        if !body.ok {
            return Err(ChannelError::Rejected {
                channel: CHANNEL,
                status: body.error_code.unwrap_or(200),
                body: body.description.unwrap_or_default(),
            });
        }

        Ok(())
    }
}
