//! Script log channel
//!
//! Bounded, append-only record of everything scripts report through `log`
//! and `notify`, plus one error record per failing script invocation.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Default number of records kept
pub const DEFAULT_MAX_SCRIPT_LOGS: usize = 500;

/// Severity of a log record or toast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational
    #[default]
    Info,
    /// Something went as hoped
    Success,
    /// Worth a look
    Warning,
    /// Something failed
    Error,
}

impl LogLevel {
    /// Parse a level name as scripts pass it; anything unknown is `Info`
    pub fn from_script(level: &str) -> Self {
        match level {
            "success" => LogLevel::Success,
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of script output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// When the record was produced
    pub timestamp: DateTime<Utc>,
    /// Name of the script that produced it
    pub script_name: String,
    /// Message text
    pub message: String,
    /// Severity
    pub level: LogLevel,
}

impl LogRecord {
    /// Record stamped with the current time
    pub fn now(script_name: impl Into<String>, message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            timestamp: Utc::now(),
            script_name: script_name.into(),
            message: message.into(),
            level,
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level,
            self.script_name,
            self.message
        )
    }
}

/// Bounded log of script output, oldest first
pub struct LogChannel {
    records: RwLock<VecDeque<LogRecord>>,
    max_records: usize,
}

impl LogChannel {
    /// Channel keeping at most `max_records` records
    pub fn new(max_records: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            max_records,
        }
    }

    /// Append a record, evicting the oldest ones over capacity
    pub fn append(&self, record: LogRecord) {
        let mut records = self.records.write();
        records.push_back(record);
        while records.len() > self.max_records {
            records.pop_front();
        }
    }

    /// Records from `script_name`, or all of them when it is empty
    pub fn filter_by(&self, script_name: &str) -> Vec<LogRecord> {
        self.records
            .read()
            .iter()
            .filter(|record| script_name.is_empty() || record.script_name == script_name)
            .cloned()
            .collect()
    }

    /// Distinct script names in first-seen order
    pub fn script_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for record in self.records.read().iter() {
            if !names.contains(&record.script_name) {
                names.push(record.script_name.clone());
            }
        }
        names
    }

    /// Drop every record
    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Copy of every record, oldest first
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.read().iter().cloned().collect()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the channel is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Capacity
    pub fn max_records(&self) -> usize {
        self.max_records
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SCRIPT_LOGS)
    }
}
