use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered string-keyed JSON object carried by every event.
pub type Payload = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Identifies a kind of domain occurrence, e.g. `user_registered`.
///
/// The set is open: the well-known types below are what the game backend emits
/// today, but any string round-trips through the broker and the stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    pub const USER_REGISTERED: EventType = EventType(Cow::Borrowed("user_registered"));
    pub const USER_LOGGED_IN: EventType = EventType(Cow::Borrowed("user_logged_in"));
    pub const DECK_COMPLETED: EventType = EventType(Cow::Borrowed("deck_completed"));
    pub const SEASON_STARTED: EventType = EventType(Cow::Borrowed("season_started"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the types the backend defines ahead of time.
    pub fn is_well_known(&self) -> bool {
        [
            Self::USER_REGISTERED,
            Self::USER_LOGGED_IN,
            Self::DECK_COMPLETED,
            Self::SEASON_STARTED,
        ]
        .iter()
        .any(|known| known == self)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// EventMessage
// ---------------------------------------------------------------------------

/// The unit of transport between sender and consumer.
///
/// Serialized as `{"id": "<uuid>", "event_type": "<string>", "payload": {..}}`.
/// The `id` doubles as the primary key of the event's log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: Uuid,
    pub event_type: EventType,
    pub payload: Payload,
}

impl EventMessage {
    /// Build a message with a freshly generated id.
    pub fn new(event_type: EventType, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            payload,
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a broker body. Every field is required.
    pub fn from_json_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

// ---------------------------------------------------------------------------
// EventProcessingState
// ---------------------------------------------------------------------------

/// Lifecycle of one event: `Sent -> InProgress -> Success | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventProcessingState {
    Sent,
    InProgress,
    Success,
    Failed,
}

impl EventProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for EventProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventProcessingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown event processing state: {other}")),
        }
    }
}
