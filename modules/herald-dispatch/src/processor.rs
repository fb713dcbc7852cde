//! Event Processor: turns one event into its configured sequence of actions.
//!
//! Stages per event: mark IN_PROGRESS, load the action list, then for each
//! action evaluate its conditions, resolve it in the registry, render its
//! templates and execute it. The first failing stage fails the whole event;
//! actions already executed are not compensated. Failures end up in the event
//! log only, never in the caller.

use std::sync::Arc;

use herald_common::{ActionConfig, EventMessage, EventProcessingState, EventType, Payload};
use herald_events::{ActionConfigStore, EventLogStore, StoreError};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::actions::{ActionError, ActionKind, RenderedAction};
use crate::registry::{ActionRegistry, RegistryError};
use crate::template::{self, TemplateError};

/// Message text used when an action config carries no `message` template.
pub const DEFAULT_MESSAGE: &str = "Event {{ event_type }}";

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to write event log: {0}")]
    LogWrite(#[source] StoreError),

    #[error("Failed to load action configuration: {0}")]
    LoadConfig(#[source] StoreError),

    #[error("No action configuration for event type {0}")]
    NoConfiguration(EventType),

    #[error("Action #{index}: {source}")]
    Registry {
        index: usize,
        #[source]
        source: RegistryError,
    },

    #[error("Action #{index} ({action}): cannot render {field}: {source}")]
    Render {
        index: usize,
        action: ActionKind,
        field: &'static str,
        #[source]
        source: TemplateError,
    },

    #[error("Action #{index} ({action}) failed: {source}")]
    Execute {
        index: usize,
        action: ActionKind,
        #[source]
        source: ActionError,
    },
}

impl ProcessError {
    /// Position of the failing action in the configured list, if an action failed.
    pub fn action_index(&self) -> Option<usize> {
        match self {
            Self::Registry { index, .. }
            | Self::Render { index, .. }
            | Self::Execute { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// What happened to one event. Already reflected in the event log.
#[derive(Debug)]
pub enum ProcessOutcome {
    Succeeded { executed: usize, skipped: usize },
    Failed { error: ProcessError },
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

pub struct EventProcessor {
    log: Arc<dyn EventLogStore>,
    configs: Arc<dyn ActionConfigStore>,
    registry: ActionRegistry,
}

impl EventProcessor {
    pub fn new(
        log: Arc<dyn EventLogStore>,
        configs: Arc<dyn ActionConfigStore>,
        registry: ActionRegistry,
    ) -> Self {
        Self {
            log,
            configs,
            registry,
        }
    }

    /// Process one event end to end. Never returns an error: the outcome is
    /// written to the event log and returned for the caller's logging.
    #[instrument(skip_all, fields(event_id = %message.id, event_type = %message.event_type))]
    pub async fn process_event(&self, message: &EventMessage) -> ProcessOutcome {
        if let Err(e) = self
            .log
            .transition(message, EventProcessingState::InProgress, None)
            .await
        {
            return self.fail(message, ProcessError::LogWrite(e)).await;
        }

        match self.run_actions(message).await {
            Ok((executed, skipped)) => {
                if let Err(e) = self
                    .log
                    .transition(message, EventProcessingState::Success, None)
                    .await
                {
                    // Actions already ran; the row stays IN_PROGRESS.
                    error!(error = %e, "Failed to record SUCCESS state");
                }
                info!(executed, skipped, "Event processed");
                ProcessOutcome::Succeeded { executed, skipped }
            }
            Err(err) => self.fail(message, err).await,
        }
    }

    async fn run_actions(&self, message: &EventMessage) -> Result<(usize, usize), ProcessError> {
        let actions = self
            .configs
            .load(&message.event_type)
            .await
            .map_err(ProcessError::LoadConfig)?
            .ok_or_else(|| ProcessError::NoConfiguration(message.event_type.clone()))?;

        let context = execution_context(message);
        let mut executed = 0;
        let mut skipped = 0;

        for (index, config) in actions.iter().enumerate() {
            if !config.check_conditions() {
                debug!(index, action = %config.kind, "Conditions not met, skipping action");
                skipped += 1;
                continue;
            }

            let action = self
                .registry
                .resolve(&config.kind)
                .map_err(|source| ProcessError::Registry { index, source })?;

            let params = render_params(config, &context).map_err(|(field, source)| {
                ProcessError::Render {
                    index,
                    action: action.kind(),
                    field,
                    source,
                }
            })?;

            action
                .execute(&params, &context)
                .await
                .map_err(|source| ProcessError::Execute {
                    index,
                    action: action.kind(),
                    source,
                })?;

            debug!(index, action = %action.kind(), "Action executed");
            executed += 1;
        }

        Ok((executed, skipped))
    }

    async fn fail(&self, message: &EventMessage, error: ProcessError) -> ProcessOutcome {
        let reason = error.to_string();
        warn!(error = %reason, "Event processing failed");

        if let Err(e) = self
            .log
            .transition(message, EventProcessingState::Failed, Some(&reason))
            .await
        {
            error!(error = %e, "Failed to record FAILED state");
        }

        ProcessOutcome::Failed { error }
    }
}

/// Template variables: the payload plus `event_type` and `event_id`.
/// The injected fields win over payload keys of the same name.
pub fn execution_context(message: &EventMessage) -> Payload {
    let mut context = message.payload.clone();
    context.insert(
        "event_type".into(),
        Value::String(message.event_type.to_string()),
    );
    context.insert("event_id".into(), Value::String(message.id.to_string()));
    context
}

fn render_params(
    config: &ActionConfig,
    context: &Payload,
) -> Result<RenderedAction, (&'static str, TemplateError)> {
    let receiver =
        template::render_opt(config.receiver.as_deref(), context).map_err(|e| ("receiver", e))?;
    let message = template::render(config.message.as_deref().unwrap_or(DEFAULT_MESSAGE), context)
        .map_err(|e| ("message", e))?;
    let subject =
        template::render_opt(config.subject.as_deref(), context).map_err(|e| ("subject", e))?;

    Ok(RenderedAction {
        receiver,
        message,
        subject,
    })
}
