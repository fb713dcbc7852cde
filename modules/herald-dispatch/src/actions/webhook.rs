use std::sync::Arc;

use async_trait::async_trait;
use herald_common::Payload;
use tracing::info;

use super::{require_receiver, Action, ActionError, ActionKind, RenderedAction};
use crate::channels::ChannelClient;

/// Calls the URL held in `receiver`.
pub struct WebhookAction {
    client: Arc<dyn ChannelClient>,
}

impl WebhookAction {
    pub fn new(client: Arc<dyn ChannelClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Action for WebhookAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Webhook
    }

    async fn execute(
        &self,
        params: &RenderedAction,
        _context: &Payload,
    ) -> Result<(), ActionError> {
        let url = require_receiver(self.kind(), params)?;
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ActionError::InvalidReceiver {
                action: self.kind(),
                receiver: url.to_string(),
            });
        }

        self.client
            .send(url, &params.message, params.subject.as_deref())
            .await?;

        info!(channel = self.client.name(), "Webhook called");
        Ok(())
    }
}
