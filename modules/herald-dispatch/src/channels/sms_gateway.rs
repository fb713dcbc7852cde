//! SMS through an email-to-SMS gateway: the text is mailed to
//! `{token}+{phone}@{domain}` and the gateway forwards it as an SMS.

use std::sync::Arc;

use async_trait::async_trait;

use super::backend::{ChannelClient, ChannelError};

const CHANNEL: &str = "sms";

pub const DEFAULT_GATEWAY_DOMAIN: &str = "sms.ru";

/// The gateway ignores the subject but mail requires one.
const GATEWAY_SUBJECT: &str = "SMS";

pub struct SmsGatewayClient {
    mail: Arc<dyn ChannelClient>,
    token: String,
    domain: String,
}

impl SmsGatewayClient {
    pub fn new(mail: Arc<dyn ChannelClient>, token: String, domain: String) -> Self {
        Self { mail, token, domain }
    }

    /// Gateway address for `phone`. Accepts `+79991234567` or `79991234567`.
    fn gateway_address(&self, phone: &str) -> Option<String> {
        let digits = phone.strip_prefix('+').unwrap_or(phone);
        if digits.len() < 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(format!("{}+{}@{}", self.token, digits, self.domain))
    }
}

#[async_trait]
impl ChannelClient for SmsGatewayClient {
    fn name(&self) -> &'static str {
        CHANNEL
    }

    async fn send(
        &self,
        recipient: &str,
        message: &str,
        _subject: Option<&str>,
    ) -> Result<(), ChannelError> {
        let address = self
            .gateway_address(recipient)
            .ok_or_else(|| ChannelError::InvalidRecipient {
                channel: CHANNEL,
                recipient: recipient.to_string(),
            })?;

        self.mail
            .send(&address, message, Some(GATEWAY_SUBJECT))
            .await
            .map_err(|e| match e {
                ChannelError::Timeout { .. } => ChannelError::Timeout { channel: CHANNEL },
                ChannelError::Transport { message, .. } => ChannelError::Transport {
                    channel: CHANNEL,
                    message,
                },
                ChannelError::Rejected { status, body, .. } => ChannelError::Rejected {
                    channel: CHANNEL,
                    status,
                    body,
                },
                other => other,
            })
    }
}
