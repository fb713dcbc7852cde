//! Shared vocabulary for the event delivery pipeline.
//!
//! Every other herald crate speaks in these types: the message that travels over
//! the broker, the per-event processing state, and the action configuration that
//! the processor reads from the configuration store.

pub mod action_config;
pub mod config;
pub mod error;
pub mod types;

pub use action_config::{ActionConfig, ActionKind, ActionType, Conditions, Predicate};
pub use config::{AppEnv, Config, SmtpSettings, TwilioSettings};
pub use error::ConfigError;
pub use types::{EventMessage, EventProcessingState, EventType, Payload};
