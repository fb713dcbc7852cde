use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::backend::{ensure_success, http_client, ChannelClient, ChannelError};

const CHANNEL: &str = "webhook";

/// Generic incoming-webhook channel: the recipient is the URL, the body is
/// `{"text": message, "subject": subject}`.
pub struct WebhookClient {
    http: reqwest::Client,
}

impl WebhookClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: http_client(timeout),
        }
    }
}

fn is_http_url(recipient: &str) -> bool {
    recipient.starts_with("https://") || recipient.starts_with("http://")
}

#[async_trait]
impl ChannelClient for WebhookClient {
    fn name(&self) -> &'static str {
        CHANNEL
    }

    async fn send(
        &self,
        recipient: &str,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), ChannelError> {
        if !is_http_url(recipient) {
            return Err(ChannelError::InvalidRecipient {
                channel: CHANNEL,
                recipient: recipient.to_string(),
            });
        }

        let payload = json!({
            "text": message,
            "subject": subject,
        });

        let resp = self
            .http
            .post(recipient)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::from_reqwest(CHANNEL, e))?;

        ensure_success(CHANNEL, resp).await?;
        Ok(())
    }
}
