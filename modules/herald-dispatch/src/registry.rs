//! Action registry: action-type tag to implementation, built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use herald_common::ActionType;

use crate::actions::{Action, ActionKind, ChatAction, EmailAction, SmsAction, WebhookAction};
use crate::channels::Channels;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown action type: {0}")]
    UnknownType(String),

    #[error("No implementation registered for action type {0}")]
    NotRegistered(ActionKind),
}

#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<ActionKind, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every action type wired to its channel.
    pub fn standard(channels: &Channels, default_chat_id: Option<String>) -> Self {
        Self::new()
            .with(Arc::new(ChatAction::new(channels.chat.clone(), default_chat_id)))
            .with(Arc::new(EmailAction::new(channels.email.clone())))
            .with(Arc::new(SmsAction::new(channels.sms.clone())))
            .with(Arc::new(WebhookAction::new(channels.webhook.clone())))
    }

    /// Register `action` under its own kind, replacing any previous entry.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.kind(), action);
    }

    pub fn with(mut self, action: Arc<dyn Action>) -> Self {
        self.register(action);
        self
    }

    /// Resolve a raw tag.
    pub fn get(&self, tag: &str) -> Result<Arc<dyn Action>, RegistryError> {
        self.resolve(&ActionType::from(tag))
    }

    /// Resolve a tag already decoded from configuration.
    pub fn resolve(&self, kind: &ActionType) -> Result<Arc<dyn Action>, RegistryError> {
        let kind = match kind {
            ActionType::Known(kind) => *kind,
            ActionType::Unknown(tag) => return Err(RegistryError::UnknownType(tag.clone())),
        };

        self.actions
            .get(&kind)
            .cloned()
            .ok_or(RegistryError::NotRegistered(kind))
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|kind| self.actions.contains_key(kind))
            .collect()
    }
}
