use std::sync::Arc;
use tapline::console::{
    ConnectionState, Console, ConsoleConfig, ConsoleError, DecodeError, DeleteOutcome,
    DirectionFilter, LocalCache, LogLevel, MemoryStore, NoteScope, Notes, Notice, Script,
    TransportError,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

fn server_frame(payload: &str) -> String {
    serde_json::json!({ "direction": "server", "payload": payload }).to_string()
}

fn client_frame(payload: &str) -> String {
    serde_json::json!({ "direction": "client", "payload": payload }).to_string()
}

fn console_with(config: ConsoleConfig, store: Arc<MemoryStore>) -> Console {
    Console::new(config, store, Arc::new(LocalCache::ephemeral()))
}

fn console() -> (Console, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (console_with(ConsoleConfig::default(), store.clone()), store)
}

fn drain(rx: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        notices.push(notice);
    }
    notices
}

async fn enabled_script(console: &Console, name: &str, content: &str) -> Script {
    let mut script = Script::new(name, content);
    script.enabled = true;
    console.save_script(&script).await.expect("save script")
}

#[tokio::test]
async fn ping_event_runs_enabled_script() {
    let (console, _store) = console();
    enabled_script(&console, "echo", "function process(d){ log(\"got \"+d.cmd); }").await;

    let id = console
        .ingest_frame(&server_frame(r#"{"cmd":"ping"}"#))
        .expect("frame decodes");

    let events = console.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, id);
    assert_eq!(events[0].command(), Some("ping"));

    let logs = console.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].script_name, "echo");
    assert_eq!(logs[0].message, "got ping");
    assert_eq!(logs[0].level, LogLevel::Info);
}

#[tokio::test]
async fn excluded_commands_are_buffered_but_not_dispatched() {
    let (console, _store) = console();
    enabled_script(&console, "echo", "function process(d){ log(\"got \"+d.cmd); }").await;

    assert!(console.exclude("ping"));
    assert!(!console.exclude("ping"));
    console
        .ingest_frame(&server_frame(r#"{"cmd":"ping"}"#))
        .unwrap();

    assert!(console.logs().is_empty());
    assert_eq!(console.events().len(), 1);
    assert!(console.filtered_view().is_empty());

    assert!(console.include("ping"));
    assert_eq!(console.filtered_view().len(), 1);
}

#[tokio::test]
async fn client_events_never_reach_scripts() {
    let (console, _store) = console();
    enabled_script(&console, "echo", "function process(d){ log(d.cmd); }").await;

    console
        .ingest_frame(&client_frame(r#"{"cmd":"ping"}"#))
        .unwrap();
    assert_eq!(console.events().len(), 1);
    assert!(console.logs().is_empty());
}

#[tokio::test]
async fn buffer_keeps_only_the_newest_events() {
    let store = Arc::new(MemoryStore::new());
    let config = ConsoleConfig {
        max_events: 2,
        ..ConsoleConfig::default()
    };
    let console = console_with(config, store);

    for cmd in ["A", "B", "C"] {
        console
            .ingest_frame(&server_frame(&format!(r#"{{"cmd":"{cmd}"}}"#)))
            .unwrap();
    }

    let commands: Vec<_> = console
        .events()
        .iter()
        .map(|event| event.command().unwrap_or_default().to_string())
        .collect();
    assert_eq!(commands, vec!["C", "B"]);
}

#[tokio::test]
async fn undecodable_frames_are_dropped_with_a_toast() {
    let (console, _store) = console();
    let mut notices = console.subscribe();

    let err = console.ingest_frame("not json").unwrap_err();
    assert!(matches!(err, DecodeError::Envelope(_)));

    let err = console
        .ingest_frame(&server_frame("{broken"))
        .unwrap_err();
    assert!(matches!(err, DecodeError::Payload(_)));

    assert!(console.events().is_empty());
    let toasts: Vec<_> = drain(&mut notices)
        .into_iter()
        .filter(|n| matches!(n, Notice::Toast { level: LogLevel::Error, .. }))
        .collect();
    assert_eq!(toasts.len(), 2);
}

#[tokio::test]
async fn failing_script_is_isolated_from_its_sibling() {
    let (console, _store) = console();
    enabled_script(&console, "thrower", "function process() { throw new Error('boom') }").await;
    enabled_script(&console, "echo", "function process(d) { log('got ' + d.cmd) }").await;
    let mut notices = console.subscribe();

    console
        .ingest_frame(&server_frame(r#"{"cmd":"ping"}"#))
        .unwrap();

    let logs = console.logs();
    let errors: Vec<_> = logs.iter().filter(|r| r.level == LogLevel::Error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].script_name, "thrower");
    assert!(errors[0].message.contains("boom"));
    assert!(logs.iter().any(|r| r.script_name == "echo" && r.message == "got ping"));

    let error_toasts = drain(&mut notices)
        .into_iter()
        .filter(|n| matches!(n, Notice::Toast { level: LogLevel::Error, .. }))
        .count();
    assert_eq!(error_toasts, 1);
}

#[tokio::test]
async fn notify_appends_a_record_and_toasts() {
    let (console, _store) = console();
    enabled_script(
        &console,
        "watcher",
        "function process(d) { if (d.body?.hp < 10) notify(`low hp: ${d.body.hp}`, 'warning') }",
    )
    .await;
    let mut notices = console.subscribe();

    console
        .ingest_frame(&server_frame(r#"{"cmd":"status","body":{"hp":3}}"#))
        .unwrap();

    assert_eq!(console.logs()[0].message, "low hp: 3");
    assert!(drain(&mut notices).contains(&Notice::Toast {
        level: LogLevel::Warning,
        message: "low hp: 3".to_string(),
    }));
}

#[tokio::test]
async fn saving_twice_keeps_identity() {
    let (console, store) = console();
    let created = console
        .save_script(&Script::new("", "log('a')"))
        .await
        .unwrap();
    assert!(created.is_saved());
    assert_eq!(created.name, "Untitled script");

    let mut edited = created.clone();
    edited.content = "log('b')".to_string();
    let updated = console.save_script(&edited).await.unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(console.scripts().len(), 1);
    assert_eq!(console.scripts()[0].content, "log('b')");
    assert_eq!(store.scripts().len(), 1);
}

#[tokio::test]
async fn enabling_rolls_back_when_the_store_fails() {
    let (console, store) = console();
    let script = console
        .save_script(&Script::new("s", "log('x')"))
        .await
        .unwrap();
    assert!(!script.enabled);

    store.set_available(false);
    assert!(console.set_script_enabled(&script.id, true).await.is_err());
    assert!(!console.script(&script.id).unwrap().enabled);

    store.set_available(true);
    let enabled = console.set_script_enabled(&script.id, true).await.unwrap();
    assert!(enabled.enabled);
    assert!(console.script(&script.id).unwrap().enabled);
}

#[tokio::test]
async fn store_failures_leave_the_registry_untouched() {
    let (console, store) = console();
    let one = console.save_script(&Script::new("one", "log(1)")).await.unwrap();
    console.save_script(&Script::new("two", "log(2)")).await.unwrap();

    store.set_available(false);
    assert!(console.refresh_scripts().await.is_err());
    let names: Vec<_> = console.scripts().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["two", "one"]);

    assert!(console.save_script(&Script::new("three", "")).await.is_err());
    let mut edited = one.clone();
    edited.content = "log('edited')".to_string();
    assert!(console.save_script(&edited).await.is_err());

    assert_eq!(console.scripts().len(), 2);
    assert!(console.scripts().iter().all(|s| s.name != "three"));
    assert_eq!(console.script(&one.id).unwrap().content, "log(1)");
}

#[tokio::test]
async fn delete_requires_confirmation() {
    let (console, store) = console();
    let script = console
        .save_script(&Script::new("doomed", "log('x')"))
        .await
        .unwrap();

    let outcome = console
        .delete_script(&script, |_: &str| false)
        .await
        .unwrap();
    assert_eq!(outcome, DeleteOutcome::Cancelled);
    assert!(!store.calls().contains(&"scripts.delete"));
    assert_eq!(console.scripts().len(), 1);

    let outcome = console
        .delete_script(&script, |prompt: &str| prompt.contains("doomed"))
        .await
        .unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert!(console.scripts().is_empty());
    assert!(store.scripts().is_empty());
}

#[tokio::test]
async fn start_loads_scripts_in_store_order() {
    let store = Arc::new(MemoryStore::new());
    {
        let seed = console_with(ConsoleConfig::default(), store.clone());
        seed.save_script(&Script::new("one", "")).await.unwrap();
        seed.save_script(&Script::new("two", "")).await.unwrap();
    }

    let console = console_with(ConsoleConfig::default(), store);
    assert!(console.scripts().is_empty());
    console.start().await;
    let names: Vec<_> = console.scripts().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["one", "two"]);
}

#[tokio::test]
async fn notes_are_saved_remotely_and_blank_text_deletes() {
    let (console, store) = console();

    console
        .set_note_and_save(&NoteScope::command("ping"), "liveness check")
        .await
        .unwrap();
    console
        .set_note_and_save(&NoteScope::key("ping", "body.seq"), "sequence number")
        .await
        .unwrap();
    assert_eq!(console.command_note("ping"), "liveness check");
    assert!(console.has_key_note("ping", "body.seq"));
    assert_eq!(store.notes().key_notes["ping"]["body.seq"], "sequence number");

    console
        .set_note_and_save(&NoteScope::key("ping", "body.seq"), "   ")
        .await
        .unwrap();
    assert!(!console.has_key_note("ping", "body.seq"));
    assert!(!store.notes().key_notes.contains_key("ping"));
}

#[tokio::test]
async fn notes_fall_back_to_the_local_cache() {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");

    let mut notes = Notes::default();
    notes
        .command_notes
        .insert("login".to_string(), "auth handshake".to_string());
    let online = Arc::new(MemoryStore::with_notes(notes));
    let first = Console::new(
        ConsoleConfig::default(),
        online,
        Arc::new(LocalCache::in_dir(&cache_dir)),
    );
    first.start().await;
    assert_eq!(first.command_note("login"), "auth handshake");

    let offline = Arc::new(MemoryStore::new());
    offline.set_available(false);
    let second = Console::new(
        ConsoleConfig::default(),
        offline,
        Arc::new(LocalCache::in_dir(&cache_dir)),
    );
    let mut notices = second.subscribe();
    second.start().await;

    assert_eq!(second.command_note("login"), "auth handshake");
    assert!(drain(&mut notices)
        .iter()
        .any(|n| matches!(n, Notice::Toast { level: LogLevel::Error, .. })));
}

#[tokio::test]
async fn exclusions_survive_a_new_session() {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");

    let first = Console::new(
        ConsoleConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(LocalCache::in_dir(&cache_dir)),
    );
    first.exclude("heartbeat");
    first.exclude("ping");
    first.include("ping");

    let second = Console::new(
        ConsoleConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(LocalCache::in_dir(&cache_dir)),
    );
    let excluded: Vec<_> = second.exclusions().iter().map(str::to_string).collect();
    assert_eq!(excluded, vec!["heartbeat"]);
}

#[tokio::test]
async fn filters_narrow_the_view() {
    let (console, _store) = console();
    console
        .ingest_frame(&client_frame(r#"{"cmd":"GetUser"}"#))
        .unwrap();
    console
        .ingest_frame(&server_frame(r#"{"cmd":"UserInfo"}"#))
        .unwrap();
    console.ingest_frame(&server_frame(r#"{"ok":1}"#)).unwrap();

    console.set_command_filter("user");
    assert_eq!(console.filtered_view().len(), 2);

    console.set_direction_filter(DirectionFilter::Server);
    let view = console.filtered_view();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].command(), Some("UserInfo"));

    console.reset_filter();
    assert_eq!(console.filtered_view().len(), 3);
    assert_eq!(console.events().len(), 3);
}

#[tokio::test]
async fn debug_send_requires_a_connection() {
    let (console, store) = console();
    let err = console.send_debug("ping", "{}").await.unwrap_err();
    assert!(matches!(
        err,
        ConsoleError::Transport(TransportError::NotConnected)
    ));
    assert!(store.debug_outbox().is_empty());
    assert_eq!(console.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn log_channel_is_bounded() {
    let store = Arc::new(MemoryStore::new());
    let config = ConsoleConfig {
        max_script_logs: 3,
        ..ConsoleConfig::default()
    };
    let console = console_with(config, store);
    enabled_script(
        &console,
        "counter",
        "function process(d) { for (let i = 0; i < 5; i++) log(`${d.cmd} ${i}`) }",
    )
    .await;

    let mut notices = console.subscribe();
    console
        .ingest_frame(&server_frame(r#"{"cmd":"tick"}"#))
        .unwrap();
    let messages: Vec<_> = console.logs().into_iter().map(|r| r.message).collect();
    assert_eq!(messages, vec!["tick 2", "tick 3", "tick 4"]);

    // Every record is broadcast, including those already trimmed from the channel.
    let announced: Vec<_> = drain(&mut notices)
        .into_iter()
        .filter_map(|notice| match notice {
            Notice::LogAppended(record) => Some(record.message),
            _ => None,
        })
        .collect();
    assert_eq!(announced, vec!["tick 0", "tick 1", "tick 2", "tick 3", "tick 4"]);

    console.clear_logs();
    assert!(console.logs().is_empty());
    let after_clear = drain(&mut notices);
    assert!(after_clear.contains(&Notice::LogsCleared));
    assert!(!after_clear.iter().any(|n| matches!(n, Notice::LogAppended(_))));
}
