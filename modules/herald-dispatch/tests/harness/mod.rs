//! Shared wiring for the pipeline tests: in-memory broker and stores, and
//! recording channel clients that share one call journal.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use herald_broker::MemoryBroker;
use herald_common::{ActionConfig, EventMessage, EventProcessingState, EventType, Payload};
use herald_dispatch::{
    ActionRegistry, ChannelClient, ChannelError, Channels, EventConsumer, EventProcessor,
    EventSender,
};
use herald_events::{EventLogEntry, EventLogStore, MemoryActionConfigStore, MemoryEventLog};
use uuid::Uuid;

pub const TOPIC: &str = "events";
pub const GROUP: &str = "event-processor";
pub const DEFAULT_CHAT: &str = "ops-chat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub channel: &'static str,
    pub recipient: String,
    pub message: String,
    pub subject: Option<String>,
}

pub type Journal = Arc<Mutex<Vec<Call>>>;

/// Channel client that records every call; can be switched to fail.
pub struct RecordingChannel {
    name: &'static str,
    journal: Journal,
    fail: AtomicBool,
}

impl RecordingChannel {
    pub fn new(name: &'static str, journal: Journal) -> Self {
        Self {
            name,
            journal,
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChannelClient for RecordingChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(
        &self,
        recipient: &str,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Rejected {
                channel: self.name,
                status: 503,
                body: "provider unavailable".into(),
            });
        }
        self.journal.lock().unwrap().push(Call {
            channel: self.name,
            recipient: recipient.to_string(),
            message: message.to_string(),
            subject: subject.map(str::to_string),
        });
        Ok(())
    }
}

pub struct Pipeline {
    pub broker: MemoryBroker,
    pub log: Arc<MemoryEventLog>,
    pub configs: Arc<MemoryActionConfigStore>,
    pub journal: Journal,
    pub chat: Arc<RecordingChannel>,
    pub email: Arc<RecordingChannel>,
    pub sms: Arc<RecordingChannel>,
    pub webhook: Arc<RecordingChannel>,
    pub processor: Arc<EventProcessor>,
    pub sender: EventSender,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_registry(|registry| registry)
    }

    /// Build with the standard registry, then let the test adjust it.
    pub fn with_registry(customize: impl FnOnce(ActionRegistry) -> ActionRegistry) -> Self {
        let broker = MemoryBroker::new();
        let log = Arc::new(MemoryEventLog::new());
        let configs = Arc::new(MemoryActionConfigStore::new());
        let journal: Journal = Arc::default();

        let chat = Arc::new(RecordingChannel::new("chat", journal.clone()));
        let email = Arc::new(RecordingChannel::new("email", journal.clone()));
        let sms = Arc::new(RecordingChannel::new("sms", journal.clone()));
        let webhook = Arc::new(RecordingChannel::new("webhook", journal.clone()));

        let channels = Channels {
            chat: chat.clone(),
            email: email.clone(),
            sms: sms.clone(),
            webhook: webhook.clone(),
        };
        let registry = customize(ActionRegistry::standard(
            &channels,
            Some(DEFAULT_CHAT.to_string()),
        ));

        let processor = Arc::new(EventProcessor::new(log.clone(), configs.clone(), registry));
        let sender = EventSender::new(Arc::new(broker.clone()), log.clone(), TOPIC);

        Self {
            broker,
            log,
            configs,
            journal,
            chat,
            email,
            sms,
            webhook,
            processor,
            sender,
        }
    }

    pub fn configure(&self, event_type: EventType, actions: Vec<ActionConfig>) {
        self.configs.put(event_type, actions);
    }

    pub fn consumer(&self) -> Arc<EventConsumer> {
        Arc::new(EventConsumer::new(
            Arc::new(self.broker.clone()),
            self.processor.clone(),
            TOPIC,
            GROUP,
        ))
    }

    /// Build a message and write its SENT row, as the sender would.
    pub async fn record(&self, event_type: EventType, payload: Payload) -> EventMessage {
        let message = EventMessage::new(event_type, payload);
        self.log.record_sent(&message).await.unwrap();
        message
    }

    pub fn calls(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }

    pub async fn entry(&self, id: Uuid) -> EventLogEntry {
        self.log.get(id).await.unwrap().expect("no event log row")
    }

    pub async fn state(&self, id: Uuid) -> Option<EventProcessingState> {
        self.log.get(id).await.unwrap().map(|entry| entry.state)
    }

    /// Poll the event log until `id` reaches a terminal state.
    pub async fn wait_terminal(&self, id: Uuid) -> EventProcessingState {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(state) = self.state(id).await {
                    if state.is_terminal() {
                        return state;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("event never reached a terminal state")
    }
}

pub fn payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("payload must be a JSON object, got {other}"),
    }
}
