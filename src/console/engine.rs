//! Script execution engine
//!
//! Runs every enabled script against each dispatched event. Scripts are
//! isolated from each other: a failure is reported once (one error record and
//! one error toast) and the remaining scripts still run. Compiled programs are
//! cached per script id and invalidated when the content hash changes.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::event::Event;
use super::logs::{LogLevel, LogRecord};
use super::registry::Script;
use crate::script::{CompiledScript, Limits, ScriptError, ScriptHost, compile};

/// Where script output goes
pub trait ScriptSink {
    /// Append a log record
    fn record(&self, record: LogRecord);

    /// Show a transient message to the operator
    fn toast(&self, level: LogLevel, message: &str);
}

/// Outcome of dispatching one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Scripts that ran to completion
    pub succeeded: usize,
    /// Scripts that failed to compile or threw
    pub failed: usize,
}

struct CacheEntry {
    hash: blake3::Hash,
    compiled: Result<Arc<CompiledScript>, ScriptError>,
}

/// Compiles and runs scripts with per-invocation limits
pub struct ScriptEngine {
    cache: Mutex<HashMap<String, CacheEntry>>,
    limits: Limits,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl ScriptEngine {
    /// Engine applying `limits` to every invocation
    pub fn new(limits: Limits) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// Limits applied to each invocation
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Compile `script`, reusing the cached program when its content is unchanged
    pub fn compile(&self, script: &Script) -> Result<Arc<CompiledScript>, ScriptError> {
        if script.id.is_empty() {
            return compile(&script.content).map(Arc::new);
        }

        let hash = blake3::hash(script.content.as_bytes());
        if let Some(entry) = self.cache.lock().get(&script.id) {
            if entry.hash == hash {
                return entry.compiled.clone();
            }
        }

        tracing::debug!("Compiling script '{}' ({})", script.name, script.id);
        let compiled = compile(&script.content).map(Arc::new);
        self.cache.lock().insert(
            script.id.clone(),
            CacheEntry {
                hash,
                compiled: compiled.clone(),
            },
        );
        compiled
    }

    /// Drop the cached program for a script id
    pub fn forget(&self, id: &str) {
        self.cache.lock().remove(id);
    }

    /// Number of cached programs
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    /// Run one script against `payload`, reporting any failure to `sink`
    pub fn run(
        &self,
        script: &Script,
        payload: &Value,
        sink: &dyn ScriptSink,
    ) -> Result<Value, ScriptError> {
        let outcome = self.compile(script).and_then(|compiled| {
            let mut host = SinkHost {
                script_name: &script.name,
                sink,
            };
            compiled.invoke(payload, &mut host, self.limits)
        });

        if let Err(err) = &outcome {
            tracing::warn!("Script '{}' failed: {}", script.name, err);
            sink.record(LogRecord::now(
                script.name.clone(),
                err.to_string(),
                LogLevel::Error,
            ));
            sink.toast(
                LogLevel::Error,
                &format!("Script \"{}\" failed: {}", script.name, err),
            );
        }
        outcome
    }

    /// Run every enabled script, in order, against the event's decoded payload
    pub fn dispatch(&self, event: &Event, scripts: &[Script], sink: &dyn ScriptSink) -> DispatchReport {
        let mut report = DispatchReport::default();
        for script in scripts.iter().filter(|script| script.enabled) {
            match self.run(script, &event.decoded, sink) {
                Ok(_) => report.succeeded += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }
}

/// Host handed to a running script; tags everything with the script name.
struct SinkHost<'a> {
    script_name: &'a str,
    sink: &'a dyn ScriptSink,
}

impl ScriptHost for SinkHost<'_> {
    fn log(&mut self, message: &str, level: &str) {
        self.sink.record(LogRecord::now(
            self.script_name,
            message,
            LogLevel::from_script(level),
        ));
    }

    fn notify(&mut self, message: &str, level: &str) {
        let level = LogLevel::from_script(level);
        self.sink
            .record(LogRecord::now(self.script_name, message, level));
        self.sink.toast(level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::event::{Direction, Frame};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<LogRecord>>,
        toasts: Mutex<Vec<(LogLevel, String)>>,
    }

    impl ScriptSink for RecordingSink {
        fn record(&self, record: LogRecord) {
            self.records.lock().push(record);
        }

        fn toast(&self, level: LogLevel, message: &str) {
            self.toasts.lock().push((level, message.to_string()));
        }
    }

    fn script(id: &str, name: &str, content: &str) -> Script {
        let mut script = Script::new(name, content);
        script.id = id.to_string();
        script.enabled = true;
        script
    }

    fn server_event(payload: Value) -> Event {
        let frame = Frame {
            direction: Direction::Server,
            payload: Value::String(payload.to_string()),
        };
        Event::from_frame(1, &frame).expect("valid frame")
    }

    #[test]
    fn failing_script_does_not_stop_siblings() {
        let engine = ScriptEngine::default();
        let sink = RecordingSink::default();
        let scripts = vec![
            script("1", "thrower", "function process() { throw 'boom' }"),
            script("2", "logger", "function process(d) { log('got ' + d.cmd) }"),
        ];

        let report = engine.dispatch(&server_event(json!({"cmd": "ping"})), &scripts, &sink);
        assert_eq!(report, DispatchReport { succeeded: 1, failed: 1 });

        let records = sink.records.lock();
        let errors: Vec<_> = records.iter().filter(|r| r.level == LogLevel::Error).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].script_name, "thrower");
        assert!(records.iter().any(|r| r.script_name == "logger" && r.message == "got ping"));

        let toasts = sink.toasts.lock();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].0, LogLevel::Error);
    }

    #[test]
    fn disabled_scripts_are_skipped() {
        let engine = ScriptEngine::default();
        let sink = RecordingSink::default();
        let mut disabled = script("1", "off", "log('ran')");
        disabled.enabled = false;

        let report = engine.dispatch(&server_event(json!({})), &[disabled], &sink);
        assert_eq!(report, DispatchReport::default());
        assert!(sink.records.lock().is_empty());
    }

    #[test]
    fn compile_errors_are_reported_like_runtime_errors() {
        let engine = ScriptEngine::default();
        let sink = RecordingSink::default();
        let broken = script("1", "broken", "function process( {");

        let report = engine.dispatch(&server_event(json!({})), &[broken], &sink);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.records.lock().len(), 1);
        assert_eq!(sink.toasts.lock().len(), 1);
    }

    #[test]
    fn notify_toasts_with_its_severity() {
        let engine = ScriptEngine::default();
        let sink = RecordingSink::default();
        let notifier = script("1", "n", "notify('heads up', 'warning')");

        engine.dispatch(&server_event(json!({})), &[notifier], &sink);
        assert_eq!(
            sink.toasts.lock().as_slice(),
            &[(LogLevel::Warning, "heads up".to_string())]
        );
        assert_eq!(sink.records.lock()[0].level, LogLevel::Warning);
    }

    #[test]
    fn compiled_programs_are_reused_until_content_changes() {
        let engine = ScriptEngine::default();
        let mut s = script("1", "cached", "log('a')");

        let first = engine.compile(&s).unwrap();
        let second = engine.compile(&s).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        s.content = "log('b')".to_string();
        let third = engine.compile(&s).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(engine.cached(), 1);

        engine.forget("1");
        assert_eq!(engine.cached(), 0);
    }

    #[test]
    fn runaway_script_is_stopped_by_the_step_budget() {
        let engine = ScriptEngine::new(Limits::with_steps(200));
        let sink = RecordingSink::default();
        let spinner = script("1", "spinner", "function process() { while (true) {} }");

        let report = engine.dispatch(&server_event(json!({})), &[spinner], &sink);
        assert_eq!(report.failed, 1);
        assert!(sink.records.lock()[0].message.contains("step limit"));
    }
}
