use async_trait::async_trait;
use twilio::{TwilioError, TwilioService};

use super::backend::{ChannelClient, ChannelError};

const CHANNEL: &str = "sms";

/// SMS through Twilio. The subject, if any, is ignored.
pub struct SmsClient {
    twilio: TwilioService,
}

impl SmsClient {
    pub fn new(twilio: TwilioService) -> Self {
        Self { twilio }
    }
}

impl From<TwilioError> for ChannelError {
    fn from(e: TwilioError) -> Self {
        match e {
            TwilioError::InvalidRecipient(recipient) => ChannelError::InvalidRecipient {
                channel: CHANNEL,
                recipient,
            },
            TwilioError::Timeout => ChannelError::Timeout { channel: CHANNEL },
            TwilioError::Transport(message) | TwilioError::Decode(message) => {
                ChannelError::Transport {
                    channel: CHANNEL,
                    message,
                }
            }
            TwilioError::Api {
                status,
                code,
                message,
            } => ChannelError::Rejected {
                channel: CHANNEL,
                status,
                body: match code {
                    Some(code) => format!("{message} (twilio code {code})"),
                    None => message,
                },
            },
        }
    }
}

#[async_trait]
impl ChannelClient for SmsClient {
    fn name(&self) -> &'static str {
        CHANNEL
    }

    async fn send(
        &self,
        recipient: &str,
        message: &str,
        _subject: Option<&str>,
    ) -> Result<(), ChannelError> {
        let sent = self.twilio.send_sms(recipient, message).await?;
        tracing::debug!(sid = %sent.sid, status = %sent.status, "SMS accepted");
        Ok(())
    }
}
