//! Bounded, newest-first event history

use std::collections::VecDeque;

use super::event::Event;

/// Default number of events retained
pub const DEFAULT_MAX_EVENTS: usize = 100;

/// Insertion-ordered event store that evicts the oldest entries when full.
///
/// Index 0 is always the most recently pushed event.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: VecDeque<Event>,
    max_capacity: usize,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

impl EventBuffer {
    /// Create an empty buffer holding at most `max_capacity` events
    pub fn new(max_capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_capacity.min(1024)),
            max_capacity,
        }
    }

    /// Prepend an event, dropping the oldest entries beyond capacity
    pub fn push(&mut self, event: Event) {
        self.events.push_front(event);
        self.events.truncate(self.max_capacity);
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Configured capacity
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Iterate newest first
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Look up an event by id
    pub fn get(&self, id: u64) -> Option<&Event> {
        self.events.iter().find(|event| event.id == id)
    }

    /// Flip the display-only `expanded` flag; returns the new value
    pub fn toggle_expanded(&mut self, id: u64) -> Option<bool> {
        let event = self.events.iter_mut().find(|event| event.id == id)?;
        event.expanded = !event.expanded;
        Some(event.expanded)
    }

    /// Distinct commands currently buffered, newest first
    pub fn commands(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for command in self.events.iter().filter_map(Event::command) {
            if !seen.iter().any(|existing: &String| existing == command) {
                seen.push(command.to_string());
            }
        }
        seen
    }

    /// Drop every buffered event
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Owned copy of the buffer contents, newest first
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::event::Direction;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::json;

    fn event(id: u64, cmd: &str) -> Event {
        Event {
            id,
            direction: Direction::Server,
            raw_payload: String::new(),
            decoded: json!({ "cmd": cmd }),
            received_at: Utc::now(),
            expanded: false,
        }
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut buffer = EventBuffer::new(2);
        buffer.push(event(1, "A"));
        buffer.push(event(2, "B"));
        buffer.push(event(3, "C"));

        let commands: Vec<_> = buffer.iter().filter_map(Event::command).collect();
        assert_eq!(commands, vec!["C", "B"]);
        assert!(buffer.get(1).is_none());
    }

    #[test]
    fn toggle_expanded_flips_only_the_flag() {
        let mut buffer = EventBuffer::default();
        buffer.push(event(1, "ping"));
        assert_eq!(buffer.toggle_expanded(1), Some(true));
        assert_eq!(buffer.toggle_expanded(1), Some(false));
        assert_eq!(buffer.toggle_expanded(99), None);
        assert_eq!(buffer.get(1).unwrap().command(), Some("ping"));
    }

    #[test]
    fn commands_are_distinct_newest_first() {
        let mut buffer = EventBuffer::default();
        buffer.push(event(1, "a"));
        buffer.push(event(2, "b"));
        buffer.push(event(3, "a"));
        assert_eq!(buffer.commands(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buffer = EventBuffer::default();
        buffer.push(event(1, "a"));
        buffer.clear();
        assert!(buffer.is_empty());
    }

    proptest! {
        #[test]
        fn length_and_order_follow_capacity(pushes in 0usize..300, capacity in 1usize..50) {
            let mut buffer = EventBuffer::new(capacity);
            for id in 0..pushes as u64 {
                buffer.push(event(id, "x"));
            }
            prop_assert_eq!(buffer.len(), pushes.min(capacity));

            let ids: Vec<u64> = buffer.iter().map(|e| e.id).collect();
            let expected: Vec<u64> = (0..pushes as u64).rev().take(capacity).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
