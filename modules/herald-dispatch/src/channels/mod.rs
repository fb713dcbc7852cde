//! External delivery channels.
//!
//! Each client owns its transport and maps timeouts, connection failures and
//! API rejections to `ChannelError` at this boundary.

pub mod backend;
pub mod mail;
pub mod noop;
pub mod sms;
pub mod sms_gateway;
pub mod telegram;
pub mod webhook;

use std::sync::Arc;

use herald_common::Config;
use tracing::{info, warn};

pub use backend::{ChannelClient, ChannelError};
pub use mail::{MailClient, SmtpOptions};
pub use noop::NoopChannel;
pub use sms::SmsClient;
pub use sms_gateway::SmsGatewayClient;
pub use telegram::TelegramClient;
pub use webhook::WebhookClient;

/// One client per channel, as wired by the binary.
#[derive(Clone)]
pub struct Channels {
    pub chat: Arc<dyn ChannelClient>,
    pub email: Arc<dyn ChannelClient>,
    pub sms: Arc<dyn ChannelClient>,
    pub webhook: Arc<dyn ChannelClient>,
}

impl Channels {
    /// Build real clients where credentials are configured, no-op clients elsewhere.
    ///
    /// SMS goes through the email-to-SMS gateway when `SMS_TOKEN` and SMTP are
    /// configured, otherwise through Twilio.
    pub fn from_config(config: &Config) -> Result<Self, ChannelError> {
        let timeout = config.channel_timeout;

        let chat: Arc<dyn ChannelClient> = match &config.telegram_bot_token {
            Some(token) => {
                info!("Chat channel: Telegram");
                Arc::new(TelegramClient::new(token.clone(), timeout))
            }
            None => {
                warn!("No TG_BOT_TOKEN set, chat messages disabled");
                Arc::new(NoopChannel::new("chat"))
            }
        };

        let smtp: Option<Arc<dyn ChannelClient>> = match &config.smtp {
            Some(smtp) => {
                info!(server = %smtp.server, port = smtp.port, "Email channel: SMTP");
                Some(Arc::new(MailClient::new(SmtpOptions {
                    server: smtp.server.clone(),
                    port: smtp.port,
                    user: smtp.user.clone(),
                    password: smtp.password.clone(),
                    timeout,
                })?))
            }
            None => None,
        };

        let email: Arc<dyn ChannelClient> = match &smtp {
            Some(mail) => Arc::clone(mail),
            None => {
                warn!("SMTP_SERVER/EMAIL_USER/EMAIL_PASSWORD not set, email disabled");
                Arc::new(NoopChannel::new("email"))
            }
        };

        let sms: Arc<dyn ChannelClient> = match (&smtp, &config.sms_token, &config.twilio) {
            (Some(mail), Some(token), _) => {
                info!(domain = %config.sms_gateway_domain, "SMS channel: email-to-SMS gateway");
                Arc::new(SmsGatewayClient::new(
                    Arc::clone(mail),
                    token.clone(),
                    config.sms_gateway_domain.clone(),
                ))
            }
            (_, _, Some(twilio)) => {
                info!("SMS channel: Twilio");
                Arc::new(SmsClient::new(twilio::TwilioService::new(twilio::TwilioOptions {
                    account_sid: twilio.account_sid.clone(),
                    auth_token: twilio.auth_token.clone(),
                    from_number: twilio.from_number.clone(),
                    timeout,
                })))
            }
            _ => {
                warn!("Neither SMS_TOKEN with SMTP nor Twilio credentials set, SMS disabled");
                Arc::new(NoopChannel::new("sms"))
            }
        };

        Ok(Self {
            chat,
            email,
            sms,
            webhook: Arc::new(WebhookClient::new(timeout)),
        })
    }
}
