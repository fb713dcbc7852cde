//! In-memory stores for tests and local runs. No database required.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use herald_common::{ActionConfig, EventMessage, EventProcessingState, EventType};
use uuid::Uuid;

use crate::configs::ActionConfigStore;
use crate::error::{Result, StoreError};
use crate::log::EventLogStore;
use crate::types::EventLogEntry;

// ---------------------------------------------------------------------------
// MemoryEventLog
// ---------------------------------------------------------------------------

/// Event log backed by a map. Also remembers every state written per id so
/// tests can assert on the full transition sequence.
#[derive(Default)]
pub struct MemoryEventLog {
    entries: Mutex<HashMap<Uuid, EventLogEntry>>,
    history: Mutex<HashMap<Uuid, Vec<EventProcessingState>>>,
    fail_writes: AtomicBool,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, to exercise error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every state written for `id`, in write order.
    pub fn history(&self, id: Uuid) -> Vec<EventProcessingState> {
        self.history
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of distinct rows.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    fn push_history(&self, id: Uuid, state: EventProcessingState) {
        self.history.lock().unwrap().entry(id).or_default().push(state);
    }
}

#[async_trait]
impl EventLogStore for MemoryEventLog {
    async fn record_sent(&self, message: &EventMessage) -> Result<()> {
        self.check_writable()?;

        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&message.id) {
            return Ok(());
        }

        let now = Utc::now();
        entries.insert(
            message.id,
            EventLogEntry {
                id: message.id,
                event_type: message.event_type.clone(),
                state: EventProcessingState::Sent,
                payload: serde_json::Value::Object(message.payload.clone()),
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        drop(entries);

        self.push_history(message.id, EventProcessingState::Sent);
        Ok(())
    }

    async fn transition(
        &self,
        message: &EventMessage,
        state: EventProcessingState,
        error: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;

        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(message.id).or_insert_with(|| EventLogEntry {
            id: message.id,
            event_type: message.event_type.clone(),
            state,
            payload: serde_json::Value::Object(message.payload.clone()),
            error: None,
            created_at: now,
            updated_at: now,
        });
        entry.state = state;
        entry.error = error.map(str::to_string);
        entry.updated_at = now;
        drop(entries);

        self.push_history(message.id, state);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<EventLogEntry>> {
        Ok(self.entries.lock().unwrap().get(&id).cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryActionConfigStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryActionConfigStore {
    configs: Mutex<HashMap<EventType, Vec<ActionConfig>>>,
}

impl MemoryActionConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, event_type: EventType, actions: Vec<ActionConfig>) {
        self.configs.lock().unwrap().insert(event_type, actions);
    }

    pub fn with(self, event_type: EventType, actions: Vec<ActionConfig>) -> Self {
        self.put(event_type, actions);
        self
    }
}

#[async_trait]
impl ActionConfigStore for MemoryActionConfigStore {
    async fn load(&self, event_type: &EventType) -> Result<Option<Vec<ActionConfig>>> {
        Ok(self.configs.lock().unwrap().get(event_type).cloned())
    }
}
