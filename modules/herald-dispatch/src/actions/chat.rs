use std::sync::Arc;

use async_trait::async_trait;
use herald_common::Payload;
use tracing::info;

use super::{Action, ActionError, ActionKind, RenderedAction};
use crate::channels::ChannelClient;

/// Posts to a chat. Without a configured receiver it falls back to the
/// operator chat (`TG_CHAT_ID`).
pub struct ChatAction {
    client: Arc<dyn ChannelClient>,
    default_chat_id: Option<String>,
}

impl ChatAction {
    pub fn new(client: Arc<dyn ChannelClient>, default_chat_id: Option<String>) -> Self {
        Self {
            client,
            default_chat_id,
        }
    }
}

#[async_trait]
impl Action for ChatAction {
    fn kind(&self) -> ActionKind {
        ActionKind::SendChatMessage
    }

    async fn execute(
        &self,
        params: &RenderedAction,
        _context: &Payload,
    ) -> Result<(), ActionError> {
        let chat_id = params
            .receiver
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .or(self.default_chat_id.as_deref())
            .ok_or(ActionError::MissingReceiver {
                action: self.kind(),
            })?;

        self.client
            .send(chat_id, &params.message, params.subject.as_deref())
            .await?;

        info!(channel = self.client.name(), chat_id, "Chat message sent");
        Ok(())
    }
}
