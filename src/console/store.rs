//! Remote persistence seams
//!
//! The console talks to its persistence backend through these traits. The
//! production implementation is [`StoreClient`](super::store_client::StoreClient);
//! [`MemoryStore`] keeps everything in process and is used offline and by tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::notes::Notes;
use super::registry::Script;

/// Annotation persistence
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Fetch the annotation document
    async fn load_notes(&self) -> StoreResult<Notes>;
    /// Replace the annotation document
    async fn save_notes(&self, notes: &Notes) -> StoreResult<()>;
}

/// Script persistence
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Fetch every script
    async fn list_scripts(&self) -> StoreResult<Vec<Script>>;
    /// Create (empty id) or update a script; returns the canonical record
    async fn save_script(&self, script: &Script) -> StoreResult<Script>;
    /// Remove a script by id
    async fn delete_script(&self, id: &str) -> StoreResult<()>;
}

/// Injection of synthetic client messages into the observed session
#[async_trait]
pub trait DebugSink: Send + Sync {
    /// Queue `{command, data}` for delivery
    async fn send_debug(&self, command: &str, data: &Value) -> StoreResult<()>;
}

/// Everything the console needs from its backend
pub trait RemoteStore: NoteStore + ScriptStore + DebugSink {}

impl<T> RemoteStore for T where T: NoteStore + ScriptStore + DebugSink {}

#[derive(Debug, Default)]
struct MemoryState {
    notes: Notes,
    scripts: Vec<Script>,
    debug_outbox: Vec<(String, Value)>,
    calls: Vec<&'static str>,
}

/// In-process store with an availability switch for failure testing
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty, available store
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Store pre-populated with notes
    pub fn with_notes(notes: Notes) -> Self {
        let store = Self::new();
        store.state.lock().notes = notes;
        store
    }

    /// Make every subsequent call succeed (`true`) or fail (`false`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Names of the operations invoked so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// Stored scripts, in store order
    pub fn scripts(&self) -> Vec<Script> {
        self.state.lock().scripts.clone()
    }

    /// Stored notes
    pub fn notes(&self) -> Notes {
        self.state.lock().notes.clone()
    }

    /// Debug messages queued so far
    pub fn debug_outbox(&self) -> Vec<(String, Value)> {
        self.state.lock().debug_outbox.clone()
    }

    fn enter(&self, op: &'static str) -> StoreResult<parking_lot::MutexGuard<'_, MemoryState>> {
        let mut state = self.state.lock();
        state.calls.push(op);
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{op}: store offline")));
        }
        Ok(state)
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn load_notes(&self) -> StoreResult<Notes> {
        Ok(self.enter("notes.load")?.notes.clone())
    }

    async fn save_notes(&self, notes: &Notes) -> StoreResult<()> {
        self.enter("notes.save")?.notes = notes.clone();
        Ok(())
    }
}

#[async_trait]
impl ScriptStore for MemoryStore {
    async fn list_scripts(&self) -> StoreResult<Vec<Script>> {
        Ok(self.enter("scripts.list")?.scripts.clone())
    }

    async fn save_script(&self, script: &Script) -> StoreResult<Script> {
        let mut state = self.enter("scripts.save")?;
        let now = Utc::now();
        let mut canonical = script.clone();
        canonical.updated_at = Some(now);

        if let Some(existing) = state.scripts.iter_mut().find(|s| s.id == canonical.id) {
            canonical.created_at = existing.created_at;
            *existing = canonical.clone();
            return Ok(canonical);
        }

        if canonical.id.is_empty() {
            canonical.id = Uuid::new_v4().simple().to_string();
        }
        canonical.created_at = now;
        state.scripts.push(canonical.clone());
        Ok(canonical)
    }

    async fn delete_script(&self, id: &str) -> StoreResult<()> {
        self.enter("scripts.delete")?.scripts.retain(|s| s.id != id);
        Ok(())
    }
}

#[async_trait]
impl DebugSink for MemoryStore {
    async fn send_debug(&self, command: &str, data: &Value) -> StoreResult<()> {
        self.enter("debug.send")?
            .debug_outbox
            .push((command.to_string(), data.clone()));
        Ok(())
    }
}
