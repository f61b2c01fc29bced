//! Annotation store
//!
//! Operators attach free-text notes to commands and to individual field paths
//! inside a command's payload (`body.user.id`). Notes are persisted to the
//! remote store as one document and mirrored into the local cache, which is
//! the fallback when the remote load fails.
//!
//! A note whose text is empty or whitespace-only is the same as no note: it is
//! never stored, never reported as present, and dropped when loaded.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::cache::{CacheKey, LocalCache};
use super::error::StoreResult;
use super::store::NoteStore;

/// Notes keyed by command, then by field path
pub type KeyNotes = BTreeMap<String, BTreeMap<String, String>>;

/// The persisted annotation document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notes {
    /// command -> note
    #[serde(default)]
    pub command_notes: BTreeMap<String, String>,
    /// command -> field path -> note
    #[serde(default)]
    pub key_notes: KeyNotes,
}

/// What a note is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NoteScope {
    /// The command as a whole
    Command(String),
    /// One field path within a command's payload
    Key {
        /// Command name
        command: String,
        /// Dot-joined field path
        path: String,
    },
}

impl NoteScope {
    /// Scope for a whole command
    pub fn command(command: impl Into<String>) -> Self {
        NoteScope::Command(command.into())
    }

    /// Scope for a field path within a command
    pub fn key(command: impl Into<String>, path: impl Into<String>) -> Self {
        NoteScope::Key {
            command: command.into(),
            path: path.into(),
        }
    }
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

impl Notes {
    /// Note for `command`, or "" when absent
    pub fn command_note(&self, command: &str) -> &str {
        self.command_notes
            .get(command)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Note for `path` under `command`, or "" when absent
    pub fn key_note(&self, command: &str, path: &str) -> &str {
        self.key_notes
            .get(command)
            .and_then(|fields| fields.get(path))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Whether `command` has a non-blank note
    pub fn has_command_note(&self, command: &str) -> bool {
        !is_blank(self.command_note(command))
    }

    /// Whether `path` under `command` has a non-blank note
    pub fn has_key_note(&self, command: &str, path: &str) -> bool {
        !is_blank(self.key_note(command, path))
    }

    /// Upsert or delete a note; blank text deletes. Returns whether anything changed.
    pub fn set(&mut self, scope: &NoteScope, text: &str) -> bool {
        match scope {
            NoteScope::Command(command) => {
                if is_blank(text) {
                    self.command_notes.remove(command).is_some()
                } else {
                    self.command_notes.insert(command.clone(), text.to_string())
                        != Some(text.to_string())
                }
            }
            NoteScope::Key { command, path } => {
                if is_blank(text) {
                    let Some(fields) = self.key_notes.get_mut(command) else {
                        return false;
                    };
                    let removed = fields.remove(path).is_some();
                    if fields.is_empty() {
                        self.key_notes.remove(command);
                    }
                    removed
                } else {
                    self.key_notes
                        .entry(command.clone())
                        .or_default()
                        .insert(path.clone(), text.to_string())
                        != Some(text.to_string())
                }
            }
        }
    }

    /// Drop blank entries and empty inner maps
    pub fn normalized(mut self) -> Self {
        self.command_notes.retain(|_, text| !is_blank(text));
        for fields in self.key_notes.values_mut() {
            fields.retain(|_, text| !is_blank(text));
        }
        self.key_notes.retain(|_, fields| !fields.is_empty());
        self
    }

    /// Whether there are no notes at all
    pub fn is_empty(&self) -> bool {
        self.command_notes.is_empty() && self.key_notes.is_empty()
    }
}

/// Session-owned annotation state with remote persistence
pub struct AnnotationStore {
    notes: RwLock<Notes>,
    remote: Arc<dyn NoteStore>,
    cache: Arc<LocalCache>,
}

impl AnnotationStore {
    /// Create an empty store; call [`AnnotationStore::load`] to populate it
    pub fn new(remote: Arc<dyn NoteStore>, cache: Arc<LocalCache>) -> Self {
        Self {
            notes: RwLock::new(Notes::default()),
            remote,
            cache,
        }
    }

    /// Note for `command`, or "" when absent
    pub fn command_note(&self, command: &str) -> String {
        self.notes.read().command_note(command).to_string()
    }

    /// Note for `path` under `command`, or "" when absent
    pub fn key_note(&self, command: &str, path: &str) -> String {
        self.notes.read().key_note(command, path).to_string()
    }

    /// Whether `command` has a note
    pub fn has_command_note(&self, command: &str) -> bool {
        self.notes.read().has_command_note(command)
    }

    /// Whether `path` under `command` has a note
    pub fn has_key_note(&self, command: &str, path: &str) -> bool {
        self.notes.read().has_key_note(command, path)
    }

    /// Copy of every note
    pub fn snapshot(&self) -> Notes {
        self.notes.read().clone()
    }

    /// Upsert or delete a note in memory; returns whether anything changed
    pub fn set_note(&self, scope: &NoteScope, text: &str) -> bool {
        self.notes.write().set(scope, text)
    }

    /// Persist all notes: local cache first, then the remote store
    ///
    /// A remote failure is returned; the in-memory copy stays authoritative.
    pub async fn save(&self) -> StoreResult<()> {
        let notes = self.snapshot();
        self.write_cache(&notes);
        self.remote.save_notes(&notes).await.inspect_err(|err| {
            tracing::warn!("Failed to save notes remotely: {}", err);
        })
    }

    /// Fetch notes from the remote store, falling back to the local cache
    ///
    /// On remote failure the cached copy (if any) is installed and the
    /// remote error is returned so it can be reported.
    pub async fn load(&self) -> StoreResult<()> {
        match self.remote.load_notes().await {
            Ok(notes) => {
                let notes = notes.normalized();
                self.write_cache(&notes);
                *self.notes.write() = notes;
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Failed to load notes remotely, using local cache: {}", err);
                if let Some(cached) = self.read_cache() {
                    *self.notes.write() = cached;
                }
                Err(err)
            }
        }
    }

    fn write_cache(&self, notes: &Notes) {
        if let Err(err) = self
            .cache
            .store(CacheKey::CommandNotes, &notes.command_notes)
            .and_then(|_| self.cache.store(CacheKey::KeyNotes, &notes.key_notes))
        {
            tracing::warn!("Failed to cache notes locally: {}", err);
        }
    }

    fn read_cache(&self) -> Option<Notes> {
        let command_notes = self.cache.load::<BTreeMap<String, String>>(CacheKey::CommandNotes);
        let key_notes = self.cache.load::<KeyNotes>(CacheKey::KeyNotes);
        match (command_notes, key_notes) {
            (Ok(None), Ok(None)) => None,
            (Ok(command_notes), Ok(key_notes)) => Some(
                Notes {
                    command_notes: command_notes.unwrap_or_default(),
                    key_notes: key_notes.unwrap_or_default(),
                }
                .normalized(),
            ),
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!("Ignoring unreadable notes cache: {}", err);
                None
            }
        }
    }
}
