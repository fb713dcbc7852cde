//! Message broker seam for the event pipeline.
//!
//! A topic is an append-only, partitioned log. Producers append and wait for the
//! broker's acknowledgement; consumers join a named group and each partition is
//! read by exactly one member of the group at a time. Progress is committed per
//! group when the consumer advances past a message, so a member that dies
//! mid-message leaves it to be redelivered (at-least-once).
//!
//! `PgBroker` keeps the log in Postgres. `MemoryBroker` is the in-process
//! equivalent used by tests.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::{BrokerError, Result};
pub use memory::MemoryBroker;
pub use postgres::{PgBroker, PgBrokerOptions};
pub use traits::{Broker, Delivery, Producer, RecordMetadata, Subscription};
