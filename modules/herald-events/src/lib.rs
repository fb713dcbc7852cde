//! Durable state for the event pipeline.
//!
//! Two stores live here: the event log (one row per sent event, advanced through
//! `sent -> in_progress -> success | failed`) and the read-only configuration
//! store that maps an event type to its ordered list of actions.
//!
//! Both are traits with a Postgres implementation for production and an
//! in-memory implementation for tests.

pub mod configs;
pub mod error;
pub mod log;
pub mod memory;
pub mod types;

pub use configs::{ActionConfigStore, PgActionConfigStore};
pub use error::{Result, StoreError};
pub use log::{EventLogStore, PgEventLog};
pub use memory::{MemoryActionConfigStore, MemoryEventLog};
pub use types::EventLogEntry;
