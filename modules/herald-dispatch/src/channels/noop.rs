use async_trait::async_trait;
use tracing::warn;

use super::backend::{ChannelClient, ChannelError};

/// Channel used when no credentials are configured. Warns and succeeds, so the
/// event log shows SUCCESS for a message that went nowhere.
pub struct NoopChannel {
    name: &'static str,
}

impl NoopChannel {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl ChannelClient for NoopChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(
        &self,
        recipient: &str,
        message: &str,
        _subject: Option<&str>,
    ) -> Result<(), ChannelError> {
        warn!(
            channel = self.name,
            recipient,
            chars = message.len(),
            "Channel disabled, message NOT delivered"
        );
        Ok(())
    }
}
