use std::sync::Arc;

use async_trait::async_trait;
use herald_common::Payload;
use tracing::info;

use super::{require_receiver, Action, ActionError, ActionKind, RenderedAction};
use crate::channels::ChannelClient;

pub struct EmailAction {
    client: Arc<dyn ChannelClient>,
}

impl EmailAction {
    pub fn new(client: Arc<dyn ChannelClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Action for EmailAction {
    fn kind(&self) -> ActionKind {
        ActionKind::SendEmail
    }

    async fn execute(
        &self,
        params: &RenderedAction,
        _context: &Payload,
    ) -> Result<(), ActionError> {
        let to = require_receiver(self.kind(), params)?;
        if !to.contains('@') {
            return Err(ActionError::InvalidReceiver {
                action: self.kind(),
                receiver: to.to_string(),
            });
        }

        self.client
            .send(to, &params.message, params.subject.as_deref())
            .await?;

        info!(channel = self.client.name(), to, "Email sent");
        Ok(())
    }
}
