use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::backend::{ChannelClient, ChannelError};

const CHANNEL: &str = "email";

/// Subject used when the action does not render one.
pub const DEFAULT_SUBJECT: &str = "Notification";

#[derive(Debug, Clone)]
pub struct SmtpOptions {
    pub server: String,
    /// Implicit-TLS (SMTPS) port, usually 465.
    pub port: u16,
    /// Login user; also the `From` address.
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

/// Plain-text mail over SMTPS with login.
pub struct MailClient {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl MailClient {
    /// Build the client. No connection is made until the first send.
    pub fn new(options: SmtpOptions) -> Result<Self, ChannelError> {
        let from = options.user.parse::<Mailbox>().map_err(|e| ChannelError::Setup {
            channel: CHANNEL,
            message: format!("EMAIL_USER {:?} is not a mailbox: {e}", options.user),
        })?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&options.server)
            .map_err(|e| ChannelError::Setup {
                channel: CHANNEL,
                message: e.to_string(),
            })?
            .port(options.port)
            .credentials(Credentials::new(options.user, options.password))
            .timeout(Some(options.timeout))
            .build();

        Ok(Self { from, transport })
    }

    fn build_message(
        &self,
        recipient: &str,
        message: &str,
        subject: Option<&str>,
    ) -> Result<Message, ChannelError> {
        let to = recipient
            .parse::<Mailbox>()
            .map_err(|_| invalid_recipient(recipient))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject.unwrap_or(DEFAULT_SUBJECT))
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .map_err(|e| ChannelError::Transport {
                channel: CHANNEL,
                message: e.to_string(),
            })
    }
}

fn invalid_recipient(recipient: &str) -> ChannelError {
    ChannelError::InvalidRecipient {
        channel: CHANNEL,
        recipient: recipient.to_string(),
    }
}

fn is_email(identifier: &str) -> bool {
    match identifier.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

fn from_smtp_error(e: lettre::transport::smtp::Error) -> ChannelError {
    if e.is_timeout() {
        return ChannelError::Timeout { channel: CHANNEL };
    }
    match e.status() {
        Some(code) => ChannelError::Rejected {
            channel: CHANNEL,
            status: code.to_string().parse().unwrap_or_default(),
            body: e.to_string(),
        },
        None => ChannelError::Transport {
            channel: CHANNEL,
            message: e.to_string(),
        },
    }
}

#[async_trait]
impl ChannelClient for MailClient {
    fn name(&self) -> &'static str {
        CHANNEL
    }

    async fn send(
        &self,
        recipient: &str,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), ChannelError> {
        if !is_email(recipient) {
            return Err(invalid_recipient(recipient));
        }

        let email = self.build_message(recipient, message, subject)?;
        let response = self.transport.send(email).await.map_err(from_smtp_error)?;
        tracing::debug!(code = %response.code(), "Mail accepted by SMTP server");
        Ok(())
    }
}
