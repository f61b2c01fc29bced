use futures::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use tapline::console::{
    ConnectionState, Console, ConsoleConfig, ConsoleError, DecodeError, LocalCache, MemoryStore,
    Notice, Script,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Event source that sends `frames` once a client connects, then waits for
/// `release` before closing.
async fn spawn_event_source(frames: Vec<String>) -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (release, released) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        for frame in frames {
            ws.send(Message::Text(frame)).await.expect("send");
        }
        let _ = released.await;
        let _ = ws.close(None).await;
    });

    (format!("ws://{addr}"), release)
}

async fn wait_for<F>(notices: &mut broadcast::Receiver<Notice>, mut pred: F) -> Notice
where
    F: FnMut(&Notice) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match notices.recv().await {
                Ok(notice) if pred(&notice) => return notice,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("notices closed"),
            }
        }
    })
    .await
    .expect("notice within timeout")
}

fn frame(direction: &str, payload: &str) -> String {
    serde_json::json!({ "direction": direction, "payload": payload }).to_string()
}

#[tokio::test]
async fn frames_flow_from_socket_to_scripts() {
    let (url, release) = spawn_event_source(vec![
        frame("client", r#"{"cmd":"ping"}"#),
        "garbage".to_string(),
        frame("server", r#"{"cmd":"ping"}"#),
    ])
    .await;

    let store = Arc::new(MemoryStore::new());
    let config = ConsoleConfig {
        event_source: url,
        ..ConsoleConfig::default()
    };
    let console = Arc::new(Console::new(
        config,
        store.clone(),
        Arc::new(LocalCache::ephemeral()),
    ));
    let mut script = Script::new("echo", "function process(d){ log(\"got \"+d.cmd); }");
    script.enabled = true;
    console.save_script(&script).await.unwrap();

    let mut notices = console.subscribe();
    assert!(console.spawn_ingestion().is_some());
    assert!(console.spawn_ingestion().is_none());
    console.connect();

    wait_for(&mut notices, |n| {
        *n == Notice::ConnectionChanged(ConnectionState::Connected)
    })
    .await;
    let appended = wait_for(&mut notices, |n| matches!(n, Notice::LogAppended(_))).await;
    assert!(matches!(appended, Notice::LogAppended(record) if record.message == "got ping"));

    let events = console.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].direction.as_str(), "server");
    assert_eq!(events[1].direction.as_str(), "client");
    assert!(events[0].id > events[1].id);

    let logs = console.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "got ping");

    console.send_debug("ping", r#"{"seq": 7}"#).await.unwrap();
    assert_eq!(
        store.debug_outbox(),
        vec![("ping".to_string(), serde_json::json!({ "seq": 7 }))]
    );

    let err = console.send_debug("ping", "{seq").await.unwrap_err();
    assert!(matches!(err, ConsoleError::Decode(DecodeError::DebugData(_))));
    assert_eq!(store.debug_outbox().len(), 1);

    release.send(()).unwrap();
    wait_for(&mut notices, |n| {
        *n == Notice::ConnectionChanged(ConnectionState::Disconnected)
    })
    .await;
    assert_eq!(console.connection_state(), ConnectionState::Disconnected);
    assert_eq!(console.events().len(), 2);
}

#[tokio::test]
async fn reconnect_supersedes_the_previous_socket() {
    let (url, _release) = spawn_event_source(vec![frame("server", r#"{"cmd":"hello"}"#)]).await;
    let config = ConsoleConfig {
        event_source: url,
        ..ConsoleConfig::default()
    };
    let console = Arc::new(Console::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(LocalCache::ephemeral()),
    ));
    let mut notices = console.subscribe();
    console.spawn_ingestion();

    console.connect();
    wait_for(&mut notices, |n| matches!(n, Notice::EventAdded { .. })).await;
    assert_eq!(console.connection_state(), ConnectionState::Connected);

    console.reconnect();
    assert_eq!(console.connection_state(), ConnectionState::Disconnected);

    console.disconnect();
    assert_eq!(console.connection_state(), ConnectionState::Disconnected);
    assert_eq!(console.events().len(), 1);
}
