//! Side-effecting actions. Each wraps one channel client.
//!
//! The processor renders an action's templates before calling it, so an
//! action sees only finished strings plus the execution context.

pub mod chat;
pub mod email;
pub mod sms;
pub mod webhook;

use async_trait::async_trait;
use herald_common::Payload;

use crate::channels::ChannelError;

pub use herald_common::ActionKind;

pub use chat::ChatAction;
pub use email::EmailAction;
pub use sms::SmsAction;
pub use webhook::WebhookAction;

/// An action's parameters after template rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAction {
    pub receiver: Option<String>,
    pub message: String,
    pub subject: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("{action}: no receiver configured")]
    MissingReceiver { action: ActionKind },

    #[error("{action}: invalid receiver {receiver:?}")]
    InvalidReceiver { action: ActionKind, receiver: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

#[async_trait]
pub trait Action: Send + Sync {
    fn kind(&self) -> ActionKind;

    /// Perform the side effect. `context` is the event payload plus the
    /// processor's injected fields.
    async fn execute(
        &self,
        params: &RenderedAction,
        context: &Payload,
    ) -> Result<(), ActionError>;
}

/// The rendered receiver, or `MissingReceiver` when none was configured.
pub(crate) fn require_receiver(
    action: ActionKind,
    params: &RenderedAction,
) -> Result<&str, ActionError> {
    match params.receiver.as_deref().map(str::trim) {
        Some(receiver) if !receiver.is_empty() => Ok(receiver),
        _ => Err(ActionError::MissingReceiver { action }),
    }
}
