//! Event delivery and action dispatch.
//!
//! `EventSender` publishes an event and records it as SENT. `EventConsumer`
//! reads the topic as part of a consumer group and hands each message to the
//! `EventProcessor`, which runs the event type's configured actions in order
//! (conditions, then registry lookup, then template rendering, then execution)
//! and records SUCCESS or FAILED in the event log.

pub mod actions;
pub mod channels;
pub mod consumer;
pub mod processor;
pub mod registry;
pub mod sender;
pub mod template;

pub use actions::{Action, ActionError, ActionKind, RenderedAction};
pub use channels::{ChannelClient, ChannelError, Channels};
pub use consumer::{ConsumerError, ConsumerStats, EventConsumer};
pub use processor::{EventProcessor, ProcessError, ProcessOutcome};
pub use registry::{ActionRegistry, RegistryError};
pub use sender::{EventSender, SendError};
pub use template::{render, TemplateError};
