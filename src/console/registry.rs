//! Script registry
//!
//! Local collection of automation scripts mirrored from the remote store. The
//! remote store owns identity: a script with an empty id is created remotely
//! and comes back with its canonical id; a non-empty id updates in place.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{StoreError, StoreResult};
use super::store::ScriptStore;

/// Name given to scripts saved with a blank name
pub const UNTITLED_SCRIPT: &str = "Untitled script";

const DRAFT_TEMPLATE: &str = r#"// Runs once for every server event that is not excluded.
// `data` is the decoded payload; `data.cmd` is its command name.
function process(data) {
  const cmd = data.cmd;

  if (cmd === 'some_command') {
    log('received ' + cmd);

    if (data.body && data.body.someField) {
      notify('found someField: ' + data.body.someField, 'success');
    }
    return 'handled';
  }
}
"#;

/// A user-authored automation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    /// Store-assigned identity; empty until first saved
    #[serde(default)]
    pub id: String,
    /// Display name, also used to tag log records
    pub name: String,
    /// Source text
    #[serde(default)]
    pub content: String,
    /// Whether the script runs on inbound events
    #[serde(default)]
    pub enabled: bool,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last update time, as reported by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Script {
    /// New unsaved script
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            content: content.into(),
            enabled: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// New unsaved, disabled script prefilled with a commented template
    pub fn draft() -> Self {
        Script::new("New script", DRAFT_TEMPLATE)
    }

    /// Whether the store has assigned an id yet
    pub fn is_saved(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Operator confirmation for destructive actions
pub trait Confirm {
    /// Ask the operator; `true` means proceed
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Removed remotely and locally
    Deleted,
    /// The operator declined; nothing was sent
    Cancelled,
}

/// Remote-backed script collection in registry order
pub struct ScriptRegistry {
    scripts: RwLock<Vec<Script>>,
    remote: Arc<dyn ScriptStore>,
}

impl ScriptRegistry {
    /// Empty registry; call [`ScriptRegistry::list`] to populate it
    pub fn new(remote: Arc<dyn ScriptStore>) -> Self {
        Self {
            scripts: RwLock::new(Vec::new()),
            remote,
        }
    }

    /// Copy of every script in registry order
    pub fn snapshot(&self) -> Vec<Script> {
        self.scripts.read().clone()
    }

    /// Enabled scripts in registry order
    pub fn enabled(&self) -> Vec<Script> {
        self.scripts
            .read()
            .iter()
            .filter(|script| script.enabled)
            .cloned()
            .collect()
    }

    /// Look up a script by id
    pub fn get(&self, id: &str) -> Option<Script> {
        self.scripts.read().iter().find(|s| s.id == id).cloned()
    }

    /// Number of scripts
    pub fn len(&self) -> usize {
        self.scripts.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.scripts.read().is_empty()
    }

    /// Replace the local collection with the remote one
    ///
    /// On failure the local collection is left as it was.
    pub async fn list(&self) -> StoreResult<Vec<Script>> {
        let scripts = self.remote.list_scripts().await.inspect_err(|err| {
            tracing::warn!("Failed to list scripts: {}", err);
        })?;
        *self.scripts.write() = scripts.clone();
        Ok(scripts)
    }

    /// Create or update `script` remotely and mirror the canonical record
    pub async fn save(&self, script: &Script) -> StoreResult<Script> {
        let mut outgoing = script.clone();
        if outgoing.name.trim().is_empty() {
            outgoing.name = UNTITLED_SCRIPT.to_string();
        }

        let canonical = self.remote.save_script(&outgoing).await.inspect_err(|err| {
            tracing::warn!("Failed to save script '{}': {}", outgoing.name, err);
        })?;
        self.upsert(canonical.clone());
        Ok(canonical)
    }

    /// Delete `script` after the operator confirms
    pub async fn delete<C>(&self, script: &Script, confirm: C) -> StoreResult<DeleteOutcome>
    where
        C: Confirm,
    {
        let prompt = format!("Delete script \"{}\"?", script.name);
        if !confirm.confirm(&prompt) {
            return Ok(DeleteOutcome::Cancelled);
        }

        self.remote.delete_script(&script.id).await.inspect_err(|err| {
            tracing::warn!("Failed to delete script '{}': {}", script.name, err);
        })?;
        self.scripts.write().retain(|s| s.id != script.id);
        Ok(DeleteOutcome::Deleted)
    }

    /// Set the enabled flag and save; the flag is rolled back if the save fails
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> StoreResult<Script> {
        let (updated, previous) = {
            let mut scripts = self.scripts.write();
            let Some(script) = scripts.iter_mut().find(|s| s.id == id) else {
                return Err(StoreError::NotFound(format!("script '{id}'")));
            };
            let previous = script.enabled;
            script.enabled = enabled;
            (script.clone(), previous)
        };

        match self.remote.save_script(&updated).await {
            Ok(canonical) => {
                self.upsert(canonical.clone());
                Ok(canonical)
            }
            Err(err) => {
                tracing::warn!("Failed to update script '{}': {}", updated.name, err);
                if let Some(script) = self.scripts.write().iter_mut().find(|s| s.id == id) {
                    script.enabled = previous;
                }
                Err(err)
            }
        }
    }

    fn upsert(&self, canonical: Script) {
        let mut scripts = self.scripts.write();
        match scripts.iter_mut().find(|s| s.id == canonical.id) {
            Some(existing) => *existing = canonical,
            None => scripts.insert(0, canonical),
        }
    }
}
