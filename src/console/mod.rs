//! Session controller for the live debugging console
//!
//! [`Console`] owns every component and is the only thing the rendering layer
//! talks to. It reads snapshots through accessors, raises intents through the
//! public operations and learns about changes from the [`Notice`] stream.
//!
//! Inbound frames are processed one at a time, in receipt order, by a single
//! ingestion loop (see [`Console::spawn_ingestion`]): decode, push into the
//! buffer, then dispatch to scripts when the event is server-directed and its
//! command is not excluded.

pub mod buffer;
pub mod cache;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod logs;
pub mod notes;
pub mod registry;
pub mod store;
pub mod store_client;

pub use buffer::EventBuffer;
pub use cache::{CacheKey, LocalCache};
pub use config::{ConsoleConfig, load_config, load_config_or_default, write_config};
pub use connection::{ConnectionManager, ConnectionState};
pub use engine::{DispatchReport, ScriptEngine, ScriptSink};
pub use error::{ConsoleError, DecodeError, Result, StoreError, TransportError};
pub use event::{Direction, Event, Frame};
pub use filter::{DirectionFilter, EventFilter, ExclusionSet, Exclusions};
pub use logs::{LogChannel, LogLevel, LogRecord};
pub use notes::{AnnotationStore, NoteScope, Notes};
pub use registry::{Confirm, DeleteOutcome, Script, ScriptRegistry};
pub use store::{DebugSink, MemoryStore, NoteStore, RemoteStore, ScriptStore};
pub use store_client::StoreClient;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::script::Limits;
use connection::{Accepted, Inbound};
use error::{DecodeResult, StoreResult};

/// Change events and toasts for the rendering layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Transient operator-facing message
    Toast {
        /// Severity
        level: LogLevel,
        /// Text
        message: String,
    },
    /// An event was pushed into the buffer
    EventAdded {
        /// Event id
        id: u64,
    },
    /// A script log record was appended
    LogAppended(LogRecord),
    /// The script log was emptied
    LogsCleared,
    /// The connection moved to a new state
    ConnectionChanged(ConnectionState),
    /// The script collection changed
    ScriptsChanged,
    /// The annotations changed
    NotesChanged,
    /// The exclusion set changed
    ExclusionsChanged,
}

/// One debugging session
pub struct Console {
    config: ConsoleConfig,
    connection: ConnectionManager,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    buffer: RwLock<EventBuffer>,
    filter: RwLock<EventFilter>,
    exclusions: Exclusions,
    notes: AnnotationStore,
    registry: ScriptRegistry,
    engine: ScriptEngine,
    logs: LogChannel,
    debug: Arc<dyn DebugSink>,
    notices: broadcast::Sender<Notice>,
    next_event_id: AtomicU64,
}

impl Console {
    /// Create a session backed by `remote`, restoring exclusions from `cache`
    ///
    /// Nothing is fetched or connected yet; see [`Console::start`] and
    /// [`Console::connect`].
    pub fn new<R>(config: ConsoleConfig, remote: Arc<R>, cache: Arc<LocalCache>) -> Self
    where
        R: RemoteStore + 'static,
    {
        let (connection, inbound) = ConnectionManager::new(config.event_source.clone());
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));

        Self {
            connection,
            inbound: Mutex::new(Some(inbound)),
            buffer: RwLock::new(EventBuffer::new(config.max_events)),
            filter: RwLock::new(EventFilter::default()),
            exclusions: Exclusions::load(cache.clone()),
            notes: AnnotationStore::new(remote.clone(), cache),
            registry: ScriptRegistry::new(remote.clone()),
            engine: ScriptEngine::new(Limits::with_steps(config.script_step_limit)),
            logs: LogChannel::new(config.max_script_logs),
            debug: remote,
            notices,
            next_event_id: AtomicU64::new(1),
            config,
        }
    }

    /// Session configuration
    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Subscribe to notices emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn emit_toast(&self, level: LogLevel, message: impl Into<String>) {
        self.notify(Notice::Toast {
            level,
            message: message.into(),
        });
    }

    /// Load annotations and scripts from the store
    ///
    /// Failures are reported as toasts; the session stays usable.
    pub async fn start(&self) {
        match self.notes.load().await {
            Ok(()) => self.notify(Notice::NotesChanged),
            Err(err) => {
                self.emit_toast(LogLevel::Error, format!("Failed to load notes: {err}"));
                self.notify(Notice::NotesChanged);
            }
        }
        if let Err(err) = self.refresh_scripts().await {
            self.emit_toast(LogLevel::Error, format!("Failed to load scripts: {err}"));
        }
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Open a fresh connection to the event source
    pub fn connect(&self) {
        self.connection.connect();
        self.notify(Notice::ConnectionChanged(ConnectionState::Connecting));
    }

    /// Close the connection
    pub fn disconnect(&self) {
        if self.connection.disconnect() {
            self.notify(Notice::ConnectionChanged(ConnectionState::Disconnected));
        }
    }

    /// Close if connected, otherwise connect
    pub fn reconnect(&self) {
        let state = self.connection.reconnect();
        self.notify(Notice::ConnectionChanged(state));
    }

    /// Run the ingestion loop on a tokio task
    ///
    /// Returns `None` if the loop was already started.
    pub fn spawn_ingestion(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut inbound = self.inbound.lock().take()?;
        let console = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            while let Some(signal) = inbound.recv().await {
                let Some(console) = console.upgrade() else {
                    break;
                };
                console.handle(signal);
            }
            tracing::debug!("Ingestion loop finished");
        }))
    }

    /// Process one signal from a reader task
    pub fn handle(&self, inbound: Inbound) {
        match self.connection.accept(inbound) {
            None => {}
            Some(Accepted::Frame(text)) => match self.ingest_frame(&text) {
                Ok(id) => tracing::trace!("Ingested event {}", id),
                Err(err) => tracing::trace!("Frame dropped: {}", err),
            },
            Some(Accepted::Undecodable) => {
                let err = DecodeError::NotUtf8;
                tracing::warn!("Dropping frame: {}", err);
                self.emit_toast(LogLevel::Error, format!("Failed to decode message: {err}"));
            }
            Some(Accepted::StateChanged { state, detail }) => {
                self.notify(Notice::ConnectionChanged(state));
                match state {
                    ConnectionState::Connected => {
                        self.emit_toast(LogLevel::Success, "Connected to event source");
                    }
                    ConnectionState::Disconnected => {
                        let message = match detail {
                            Some(reason) => format!("Connection closed: {reason}"),
                            None => "Connection closed".to_string(),
                        };
                        self.emit_toast(LogLevel::Warning, message);
                    }
                    ConnectionState::Errored => {
                        let err = TransportError::ConnectFailed {
                            url: self.connection.url().to_string(),
                            detail: detail.unwrap_or_default(),
                        };
                        self.emit_toast(LogLevel::Error, format!("Connection error: {err}"));
                    }
                    ConnectionState::Connecting => {}
                }
            }
        }
    }

    /// Decode one frame, buffer it and run scripts on it when eligible
    ///
    /// A frame that fails to decode is reported with an error toast and
    /// dropped; nothing else changes. Returns the new event's id.
    pub fn ingest_frame(&self, text: &str) -> DecodeResult<u64> {
        let decoded = Frame::parse(text).and_then(|frame| Event::from_frame(0, &frame));
        let mut event = match decoded {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!("Dropping frame: {}", err);
                self.emit_toast(LogLevel::Error, format!("Failed to decode message: {err}"));
                return Err(err);
            }
        };

        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        event.id = id;
        let eligible = event.direction == Direction::Server
            && !event
                .command()
                .is_some_and(|command| self.exclusions.contains(command));

        let dispatched = eligible.then(|| event.clone());
        self.buffer.write().push(event);
        self.notify(Notice::EventAdded { id });

        if let Some(event) = dispatched {
            let scripts = self.registry.enabled();
            let report = self.engine.dispatch(&event, &scripts, self);
            if report.failed > 0 {
                tracing::debug!("Event {}: {} script(s) failed", id, report.failed);
            }
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Events and filtering
    // ------------------------------------------------------------------

    /// Every buffered event, newest first
    pub fn events(&self) -> Vec<Event> {
        self.buffer.read().snapshot()
    }

    /// Visible events under the current filter and exclusions, newest first
    pub fn filtered_view(&self) -> Vec<Event> {
        let filter = self.filter.read().clone();
        let exclusions = self.exclusions.snapshot();
        filter::filtered_view(&self.buffer.read(), &filter, &exclusions)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Look up a buffered event
    pub fn event(&self, id: u64) -> Option<Event> {
        self.buffer.read().get(id).cloned()
    }

    /// Distinct commands present in the buffer
    pub fn commands(&self) -> Vec<String> {
        self.buffer.read().commands()
    }

    /// Flip an event's expanded flag; returns the new value
    pub fn toggle_expanded(&self, id: u64) -> Option<bool> {
        self.buffer.write().toggle_expanded(id)
    }

    /// Drop every buffered event
    pub fn clear_events(&self) {
        self.buffer.write().clear();
        self.emit_toast(LogLevel::Success, "Messages cleared");
    }

    /// Current display criteria
    pub fn filter(&self) -> EventFilter {
        self.filter.read().clone()
    }

    /// Replace the display criteria
    pub fn set_filter(&self, filter: EventFilter) {
        *self.filter.write() = filter;
    }

    /// Show only one direction (or both)
    pub fn set_direction_filter(&self, direction: DirectionFilter) {
        self.filter.write().direction = direction;
    }

    /// Show only commands containing `needle`, case-insensitively
    pub fn set_command_filter(&self, needle: &str) {
        self.filter.write().command = needle.to_string();
    }

    /// Restore the default display criteria
    pub fn reset_filter(&self) {
        self.filter.write().reset();
        self.emit_toast(LogLevel::Success, "Filters reset");
    }

    // ------------------------------------------------------------------
    // Exclusions
    // ------------------------------------------------------------------

    /// Current exclusion set
    pub fn exclusions(&self) -> ExclusionSet {
        self.exclusions.snapshot()
    }

    /// Hide `command` and stop dispatching it to scripts
    pub fn exclude(&self, command: &str) -> bool {
        let changed = self.apply_exclusion(self.exclusions.add(command));
        if changed {
            self.emit_toast(LogLevel::Success, format!("Excluded command: {command}"));
        }
        changed
    }

    /// Undo [`Console::exclude`]
    pub fn include(&self, command: &str) -> bool {
        let changed = self.apply_exclusion(self.exclusions.remove(command));
        if changed {
            self.emit_toast(LogLevel::Success, format!("Included command: {command}"));
        }
        changed
    }

    /// Remove every exclusion
    pub fn clear_exclusions(&self) -> bool {
        let changed = self.apply_exclusion(self.exclusions.clear());
        if changed {
            self.emit_toast(LogLevel::Success, "All exclusions cleared");
        }
        changed
    }

    /// A failed cache write still leaves the in-memory change in place.
    fn apply_exclusion(&self, outcome: error::CacheResult<bool>) -> bool {
        let changed = match outcome {
            Ok(changed) => changed,
            Err(err) => {
                tracing::warn!("Failed to persist exclusions: {}", err);
                self.emit_toast(
                    LogLevel::Warning,
                    format!("Failed to persist exclusions: {err}"),
                );
                true
            }
        };
        if changed {
            self.notify(Notice::ExclusionsChanged);
        }
        changed
    }

    // ------------------------------------------------------------------
    // Annotations
    // ------------------------------------------------------------------

    /// Every note
    pub fn notes(&self) -> Notes {
        self.notes.snapshot()
    }

    /// Note for `command`, or "" when absent
    pub fn command_note(&self, command: &str) -> String {
        self.notes.command_note(command)
    }

    /// Note for `path` under `command`, or "" when absent
    pub fn key_note(&self, command: &str, path: &str) -> String {
        self.notes.key_note(command, path)
    }

    /// Whether `command` has a note
    pub fn has_command_note(&self, command: &str) -> bool {
        self.notes.has_command_note(command)
    }

    /// Whether `path` under `command` has a note
    pub fn has_key_note(&self, command: &str, path: &str) -> bool {
        self.notes.has_key_note(command, path)
    }

    /// Set (or, with blank text, delete) a note and persist all notes
    ///
    /// The in-memory edit stands even when saving fails. Returns whether the
    /// edit changed anything.
    pub async fn set_note_and_save(&self, scope: &NoteScope, text: &str) -> StoreResult<bool> {
        let changed = self.notes.set_note(scope, text);
        if changed {
            self.notify(Notice::NotesChanged);
        }
        match self.notes.save().await {
            Ok(()) => {
                self.emit_toast(LogLevel::Success, "Note saved");
                Ok(changed)
            }
            Err(err) => {
                self.emit_toast(LogLevel::Error, format!("Failed to save notes: {err}"));
                Err(err)
            }
        }
    }

    /// Reload notes from the store, falling back to the local cache
    pub async fn reload_notes(&self) -> StoreResult<()> {
        let outcome = self.notes.load().await;
        self.notify(Notice::NotesChanged);
        if let Err(err) = &outcome {
            self.emit_toast(LogLevel::Error, format!("Failed to load notes: {err}"));
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Scripts
    // ------------------------------------------------------------------

    /// Every script in registry order
    pub fn scripts(&self) -> Vec<Script> {
        self.registry.snapshot()
    }

    /// Look up a script by id
    pub fn script(&self, id: &str) -> Option<Script> {
        self.registry.get(id)
    }

    /// Replace the local script collection with the store's
    pub async fn refresh_scripts(&self) -> StoreResult<Vec<Script>> {
        let scripts = self.registry.list().await?;
        self.notify(Notice::ScriptsChanged);
        Ok(scripts)
    }

    /// Create or update a script
    pub async fn save_script(&self, script: &Script) -> StoreResult<Script> {
        match self.registry.save(script).await {
            Ok(saved) => {
                self.notify(Notice::ScriptsChanged);
                self.emit_toast(LogLevel::Success, "Script saved");
                Ok(saved)
            }
            Err(err) => {
                self.emit_toast(LogLevel::Error, format!("Failed to save script: {err}"));
                Err(err)
            }
        }
    }

    /// Delete a script once `confirm` agrees
    pub async fn delete_script<C>(&self, script: &Script, confirm: C) -> StoreResult<DeleteOutcome>
    where
        C: Confirm,
    {
        match self.registry.delete(script, confirm).await {
            Ok(DeleteOutcome::Deleted) => {
                self.engine.forget(&script.id);
                self.notify(Notice::ScriptsChanged);
                self.emit_toast(LogLevel::Success, "Script deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Ok(DeleteOutcome::Cancelled) => Ok(DeleteOutcome::Cancelled),
            Err(err) => {
                self.emit_toast(LogLevel::Error, format!("Failed to delete script: {err}"));
                Err(err)
            }
        }
    }

    /// Enable or disable a script; the flag is rolled back if saving fails
    pub async fn set_script_enabled(&self, id: &str, enabled: bool) -> StoreResult<Script> {
        let outcome = self.registry.set_enabled(id, enabled).await;
        self.notify(Notice::ScriptsChanged);
        match &outcome {
            Ok(_) if enabled => self.emit_toast(LogLevel::Success, "Script enabled"),
            Ok(_) => self.emit_toast(LogLevel::Success, "Script disabled"),
            Err(err) => self.emit_toast(
                LogLevel::Error,
                format!("Failed to update script state: {err}"),
            ),
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Script logs
    // ------------------------------------------------------------------

    /// Every log record, oldest first
    pub fn logs(&self) -> Vec<LogRecord> {
        self.logs.snapshot()
    }

    /// Records from one script, or all when `script_name` is empty
    pub fn logs_for(&self, script_name: &str) -> Vec<LogRecord> {
        self.logs.filter_by(script_name)
    }

    /// Script names that have logged, in first-seen order
    pub fn log_script_names(&self) -> Vec<String> {
        self.logs.script_names()
    }

    /// Drop every log record
    pub fn clear_logs(&self) {
        self.logs.clear();
        self.notify(Notice::LogsCleared);
        self.emit_toast(LogLevel::Success, "Script logs cleared");
    }

    // ------------------------------------------------------------------
    // Debug send
    // ------------------------------------------------------------------

    /// Queue a synthetic `{command, data}` message for the observed session
    ///
    /// Requires a live connection. `data_text` must be JSON; nothing is sent
    /// otherwise.
    pub async fn send_debug(&self, command: &str, data_text: &str) -> Result<()> {
        if self.connection_state() != ConnectionState::Connected {
            let err = TransportError::NotConnected;
            self.emit_toast(LogLevel::Error, format!("Cannot send: {err}"));
            return Err(err.into());
        }

        let data: Value = match serde_json::from_str(data_text) {
            Ok(data) => data,
            Err(err) => {
                let err = DecodeError::DebugData(err);
                self.emit_toast(LogLevel::Error, err.to_string());
                return Err(err.into());
            }
        };

        match self.debug.send_debug(command, &data).await {
            Ok(()) => {
                tracing::info!("Queued debug message '{}'", command);
                self.emit_toast(
                    LogLevel::Success,
                    "Message queued; it will be sent within 2 seconds",
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Debug send failed: {}", err);
                self.emit_toast(LogLevel::Error, format!("Send failed: {err}"));
                Err(err.into())
            }
        }
    }
}

impl ScriptSink for Console {
    fn record(&self, record: LogRecord) {
        self.logs.append(record.clone());
        self.notify(Notice::LogAppended(record));
    }

    fn toast(&self, level: LogLevel, message: &str) {
        self.emit_toast(level, message);
    }
}
