//! Per-event-type action configuration, as authored in the admin console and
//! stored as a JSON array on the event's configuration row.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One configured step of an event's processing.
///
/// ```json
/// {"type": "send_chat_message", "conditions": true, "receiver": "{{ chat_id }}"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Action-type tag, decoded on load. Unknown tags are kept and fail the
    /// event when the processor reaches them.
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl ActionConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: ActionType::from(kind.into()),
            conditions: Conditions::AlwaysRun,
            receiver: None,
            message: None,
            subject: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Gate evaluated before the action runs. `false` means skip, not fail.
    pub fn check_conditions(&self) -> bool {
        self.conditions.evaluate()
    }
}

// ---------------------------------------------------------------------------
// Action types
// ---------------------------------------------------------------------------

/// The closed set of action types the registry can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    SendChatMessage,
    SendEmail,
    SendSms,
    Webhook,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::SendChatMessage,
        ActionKind::SendEmail,
        ActionKind::SendSms,
        ActionKind::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendChatMessage => "send_chat_message",
            Self::SendEmail => "send_email",
            Self::SendSms => "send_sms",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    /// Accepts the snake_case tags and the older `Action*` class-style tags
    /// still present in stored configurations.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "send_chat_message" | "ActionSendChatMessage" => Ok(Self::SendChatMessage),
            "send_email" | "ActionSendEmail" => Ok(Self::SendEmail),
            "send_sms" | "ActionSendSms" => Ok(Self::SendSms),
            "webhook" | "ActionWebhook" => Ok(Self::Webhook),
            other => Err(format!("unknown action type: {other}")),
        }
    }
}

/// Decoded `type` field of an action configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Known(ActionKind),
    /// A tag outside the known set, kept verbatim for the error report.
    Unknown(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(kind) => kind.as_str(),
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<String> for ActionType {
    fn from(tag: String) -> Self {
        match tag.parse() {
            Ok(kind) => Self::Known(kind),
            Err(_) => Self::Unknown(tag),
        }
    }
}

impl From<&str> for ActionType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<ActionKind> for ActionType {
    fn from(kind: ActionKind) -> Self {
        Self::Known(kind)
    }
}

impl From<ActionType> for String {
    fn from(kind: ActionType) -> Self {
        match kind {
            ActionType::Known(kind) => kind.as_str().to_string(),
            ActionType::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Decoded form of the `conditions` field.
///
/// Stored JSON is either a bare boolean or a list of `{field, operator, value}`
/// objects. A missing or null value means "always run".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawConditions", into = "RawConditions")]
pub enum Conditions {
    #[default]
    AlwaysRun,
    AlwaysSkip,
    Predicates(Vec<Predicate>),
}

/// A per-field predicate. Accepted and stored, but not evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Conditions {
    /// Whether the guarded action should run.
    ///
    /// Predicate lists have no defined semantics yet and pass unconditionally.
    pub fn evaluate(&self) -> bool {
        match self {
            Conditions::AlwaysRun => true,
            Conditions::AlwaysSkip => false,
            Conditions::Predicates(predicates) => {
                debug!(
                    count = predicates.len(),
                    "Predicate conditions are not evaluated; treating as always-run"
                );
                true
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawConditions {
    Null,
    Flag(bool),
    List(Vec<Predicate>),
}

impl From<RawConditions> for Conditions {
    fn from(raw: RawConditions) -> Self {
        match raw {
            RawConditions::Null | RawConditions::Flag(true) => Conditions::AlwaysRun,
            RawConditions::Flag(false) => Conditions::AlwaysSkip,
            RawConditions::List(predicates) => Conditions::Predicates(predicates),
        }
    }
}

impl From<Conditions> for RawConditions {
    fn from(conditions: Conditions) -> Self {
        match conditions {
            Conditions::AlwaysRun => RawConditions::Flag(true),
            Conditions::AlwaysSkip => RawConditions::Flag(false),
            Conditions::Predicates(predicates) => RawConditions::List(predicates),
        }
    }
}
