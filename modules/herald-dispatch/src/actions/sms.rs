use std::sync::Arc;

use async_trait::async_trait;
use herald_common::Payload;
use tracing::info;

use super::{require_receiver, Action, ActionError, ActionKind, RenderedAction};
use crate::channels::ChannelClient;

pub struct SmsAction {
    client: Arc<dyn ChannelClient>,
}

impl SmsAction {
    pub fn new(client: Arc<dyn ChannelClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Action for SmsAction {
    fn kind(&self) -> ActionKind {
        ActionKind::SendSms
    }

    async fn execute(
        &self,
        params: &RenderedAction,
        _context: &Payload,
    ) -> Result<(), ActionError> {
        let to = require_receiver(self.kind(), params)?;

        // SMS has no subject line.
        self.client.send(to, &params.message, None).await?;

        info!(channel = self.client.name(), to, "SMS sent");
        Ok(())
    }
}
