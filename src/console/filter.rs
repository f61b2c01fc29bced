//! Filtering of the event buffer into the visible subset
//!
//! Filtering is a pure read: it never mutates events. The exclusion set also
//! gates script dispatch, so it lives here and is persisted to the local cache
//! whenever it changes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::buffer::EventBuffer;
use super::cache::{CacheKey, LocalCache};
use super::error::CacheResult;
use super::event::{Direction, Event};

/// Direction criterion for the visible view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionFilter {
    /// Both directions
    #[default]
    All,
    /// Client-originated only
    Client,
    /// Server-originated only
    Server,
}

impl DirectionFilter {
    /// Whether an event travelling in `direction` passes
    pub fn matches(self, direction: Direction) -> bool {
        match self {
            DirectionFilter::All => true,
            DirectionFilter::Client => direction == Direction::Client,
            DirectionFilter::Server => direction == Direction::Server,
        }
    }
}

/// Operator-chosen display criteria
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Direction criterion
    pub direction: DirectionFilter,
    /// Case-insensitive command substring; empty matches everything
    pub command: String,
}

impl EventFilter {
    /// Restore the default criteria
    pub fn reset(&mut self) {
        *self = EventFilter::default();
    }
}

/// Commands suppressed from display and from script dispatch
///
/// Keeps insertion order so pickers list commands the way they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionSet {
    commands: Vec<String>,
}

impl ExclusionSet {
    /// Build a set from a list, dropping duplicates
    pub fn from_commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = ExclusionSet::default();
        for command in commands {
            set.insert(command.into());
        }
        set
    }

    /// Whether `command` is excluded
    pub fn contains(&self, command: &str) -> bool {
        self.commands.iter().any(|existing| existing == command)
    }

    /// Whether an event's command is excluded; events without a command never are
    pub fn excludes(&self, event: &Event) -> bool {
        event.command().is_some_and(|command| self.contains(command))
    }

    /// Add a command; returns false if it was already present
    pub fn insert(&mut self, command: String) -> bool {
        if self.contains(&command) {
            return false;
        }
        self.commands.push(command);
        true
    }

    /// Remove a command; returns false if it was absent
    pub fn remove(&mut self, command: &str) -> bool {
        let before = self.commands.len();
        self.commands.retain(|existing| existing != command);
        self.commands.len() != before
    }

    /// Remove everything; returns false if already empty
    pub fn clear(&mut self) -> bool {
        let changed = !self.commands.is_empty();
        self.commands.clear();
        changed
    }

    /// Excluded commands in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(String::as_str)
    }

    /// Number of excluded commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is excluded
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Whether `event` is visible under `filter` and `exclusions`
pub fn is_visible(event: &Event, filter: &EventFilter, exclusions: &ExclusionSet) -> bool {
    if exclusions.excludes(event) {
        return false;
    }

    if !filter.direction.matches(event.direction) {
        return false;
    }

    if filter.command.is_empty() {
        return true;
    }

    let needle = filter.command.to_lowercase();
    event
        .command()
        .is_some_and(|command| command.to_lowercase().contains(&needle))
}

/// Visible subset of `buffer`, newest first
pub fn filtered_view<'a>(
    buffer: &'a EventBuffer,
    filter: &EventFilter,
    exclusions: &ExclusionSet,
) -> Vec<&'a Event> {
    buffer
        .iter()
        .filter(|event| is_visible(event, filter, exclusions))
        .collect()
}

/// Exclusion set bound to its cache entry
///
/// Every successful mutation is written through to the local cache. A failed
/// write is returned to the caller but the in-memory change stands.
#[derive(Debug)]
pub struct Exclusions {
    set: RwLock<ExclusionSet>,
    cache: Arc<LocalCache>,
}

impl Exclusions {
    /// Restore the set from the cache, starting empty if nothing usable is cached
    pub fn load(cache: Arc<LocalCache>) -> Self {
        let set = match cache.load::<Vec<String>>(CacheKey::ExcludedCommands) {
            Ok(Some(commands)) => ExclusionSet::from_commands(commands),
            Ok(None) => ExclusionSet::default(),
            Err(err) => {
                tracing::warn!("Ignoring unreadable exclusion cache: {}", err);
                ExclusionSet::default()
            }
        };
        Self {
            set: RwLock::new(set),
            cache,
        }
    }

    /// Whether `command` is currently excluded
    pub fn contains(&self, command: &str) -> bool {
        self.set.read().contains(command)
    }

    /// Copy of the current set
    pub fn snapshot(&self) -> ExclusionSet {
        self.set.read().clone()
    }

    /// Exclude `command`; returns whether the set changed
    pub fn add(&self, command: &str) -> CacheResult<bool> {
        self.mutate(|set| set.insert(command.to_string()))
    }

    /// Stop excluding `command`; returns whether the set changed
    pub fn remove(&self, command: &str) -> CacheResult<bool> {
        self.mutate(|set| set.remove(command))
    }

    /// Stop excluding everything; returns whether the set changed
    pub fn clear(&self) -> CacheResult<bool> {
        self.mutate(ExclusionSet::clear)
    }

    fn mutate(&self, op: impl FnOnce(&mut ExclusionSet) -> bool) -> CacheResult<bool> {
        let mut set = self.set.write();
        if !op(&mut *set) {
            return Ok(false);
        }
        self.cache
            .store(CacheKey::ExcludedCommands, &set.commands)
            .map(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn event(id: u64, direction: Direction, cmd: Option<&str>) -> Event {
        let decoded = match cmd {
            Some(cmd) => json!({ "cmd": cmd }),
            None => json!({ "body": {} }),
        };
        Event {
            id,
            direction,
            raw_payload: decoded.to_string(),
            decoded,
            received_at: Utc::now(),
            expanded: false,
        }
    }

    fn sample_buffer() -> EventBuffer {
        let mut buffer = EventBuffer::new(10);
        buffer.push(event(1, Direction::Client, Some("Login")));
        buffer.push(event(2, Direction::Server, Some("login_ack")));
        buffer.push(event(3, Direction::Server, Some("ping")));
        buffer.push(event(4, Direction::Server, None));
        buffer
    }

    fn ids(view: &[&Event]) -> Vec<u64> {
        view.iter().map(|e| e.id).collect()
    }

    #[test]
    fn default_filter_shows_everything() {
        let buffer = sample_buffer();
        let view = filtered_view(&buffer, &EventFilter::default(), &ExclusionSet::default());
        assert_eq!(ids(&view), vec![4, 3, 2, 1]);
    }

    #[test]
    fn direction_and_substring_combine() {
        let buffer = sample_buffer();
        let filter = EventFilter {
            direction: DirectionFilter::Server,
            command: "LOGIN".into(),
        };
        let view = filtered_view(&buffer, &filter, &ExclusionSet::default());
        assert_eq!(ids(&view), vec![2]);
    }

    #[test]
    fn substring_never_matches_commandless_events() {
        let buffer = sample_buffer();
        let filter = EventFilter {
            direction: DirectionFilter::All,
            command: "i".into(),
        };
        let view = filtered_view(&buffer, &filter, &ExclusionSet::default());
        assert_eq!(ids(&view), vec![3, 2, 1]);
    }

    #[test]
    fn exclusion_wins_over_matching_criteria() {
        let buffer = sample_buffer();
        let exclusions = ExclusionSet::from_commands(["ping"]);
        let filter = EventFilter {
            direction: DirectionFilter::Server,
            command: "ping".into(),
        };
        assert!(filtered_view(&buffer, &filter, &exclusions).is_empty());
    }

    #[test]
    fn filtering_is_pure() {
        let buffer = sample_buffer();
        let exclusions = ExclusionSet::from_commands(["Login"]);
        let filter = EventFilter {
            direction: DirectionFilter::All,
            command: "log".into(),
        };
        let first = ids(&filtered_view(&buffer, &filter, &exclusions));
        let second = ids(&filtered_view(&buffer, &filter, &exclusions));
        assert_eq!(first, second);
        assert_eq!(buffer.len(), 4);
        assert!(buffer.iter().all(|e| !e.expanded));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut filter = EventFilter {
            direction: DirectionFilter::Client,
            command: "x".into(),
        };
        filter.reset();
        assert_eq!(filter, EventFilter::default());
    }

    #[test]
    fn exclusion_set_deduplicates() {
        let mut set = ExclusionSet::from_commands(["a", "b", "a"]);
        assert_eq!(set.len(), 2);
        assert!(!set.insert("b".into()));
        assert!(set.remove("a"));
        assert!(!set.remove("a"));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn exclusions_persist_every_mutation() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(LocalCache::in_dir(temp.path()));

        let exclusions = Exclusions::load(cache.clone());
        assert!(exclusions.add("ping").unwrap());
        assert!(exclusions.add("tick").unwrap());
        assert!(!exclusions.add("ping").unwrap());
        assert!(exclusions.remove("tick").unwrap());

        let restored = Exclusions::load(Arc::new(LocalCache::in_dir(temp.path())));
        assert!(restored.contains("ping"));
        assert!(!restored.contains("tick"));

        assert!(restored.clear().unwrap());
        assert!(!restored.clear().unwrap());
        let emptied = Exclusions::load(Arc::new(LocalCache::in_dir(temp.path())));
        assert!(emptied.snapshot().is_empty());
    }
}
