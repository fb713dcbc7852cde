use async_trait::async_trait;

/// A delivery channel: chat bot, SMTP mail, SMS gateway, webhook.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Short channel name for logs and errors.
    fn name(&self) -> &'static str;

    /// Deliver `message` to `recipient`. Succeeds only once the provider accepted it.
    async fn send(
        &self,
        recipient: &str,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), ChannelError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("{channel}: request timed out")]
    Timeout { channel: &'static str },

    #[error("{channel}: transport error: {message}")]
    Transport {
        channel: &'static str,
        message: String,
    },

    #[error("{channel}: rejected with {status}: {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },

    #[error("{channel}: invalid recipient {recipient:?}")]
    InvalidRecipient {
        channel: &'static str,
        recipient: String,
    },

    #[error("{channel}: misconfigured: {message}")]
    Setup {
        channel: &'static str,
        message: String,
    },
}

impl ChannelError {
    pub fn from_reqwest(channel: &'static str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChannelError::Timeout { channel }
        } else {
            ChannelError::Transport {
                channel,
                message: e.to_string(),
            }
        }
    }
}

/// Shared HTTP client with the channel timeout applied.
pub(crate) fn http_client(timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Turn a non-2xx response into `ChannelError::Rejected`.
pub(crate) async fn ensure_success(
    channel: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ChannelError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ChannelError::Rejected {
        channel,
        status: status.as_u16(),
        body,
    })
}
