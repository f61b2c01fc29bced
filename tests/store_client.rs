use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tapline::console::{NoteStore, Script, ScriptStore, DebugSink, StoreClient, StoreError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

type Handler = fn(&str, &Value) -> Value;

/// Requests seen by the fake store, as `(command, params)`
type Seen = Arc<Mutex<Vec<(String, Value)>>>;

/// NDJSON store that answers each request with `handler(command, params)`,
/// merged into `{"id": ...}`.
async fn spawn_store(handler: Handler) -> (String, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let seen: Seen = Arc::default();
    let log = seen.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let log = log.clone();
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut lines = BufReader::new(read_half).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let request: Value = serde_json::from_str(&line).expect("request json");
                    let command = request["command"].as_str().unwrap_or_default().to_string();
                    let params = request["params"].clone();
                    log.lock().push((command.clone(), params.clone()));

                    let mut reply = handler(&command, &params);
                    reply["id"] = request["id"].clone();
                    let mut bytes = serde_json::to_vec(&reply).unwrap();
                    bytes.push(b'\n');
                    if write_half.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (addr, seen)
}

fn handshake_reply() -> Value {
    json!({
        "result": {
            "protocol_version": tapline::PROTOCOL_VERSION,
            "service": { "version": "test-store" }
        }
    })
}

fn happy_store(command: &str, params: &Value) -> Value {
    match command {
        "handshake" => handshake_reply(),
        "notes.load" => json!({
            "result": {
                "commandNotes": { "ping": "liveness" },
                "keyNotes": { "ping": { "body.seq": "counter" } }
            }
        }),
        "scripts.list" => json!({
            "result": { "scripts": [
                { "id": "s1", "name": "echo", "content": "log(1)", "enabled": true,
                  "createdAt": "2026-01-02T03:04:05Z" }
            ]}
        }),
        "scripts.save" => {
            let mut script = params.clone();
            if script["id"].as_str().unwrap_or_default().is_empty() {
                script["id"] = json!("generated-1");
            }
            json!({ "result": script })
        }
        "notes.save" | "scripts.delete" | "debug.send" => json!({ "result": { "ok": true } }),
        other => json!({ "error": { "code": "unknown_command", "message": format!("unknown command {other}") } }),
    }
}

#[tokio::test]
async fn handshake_is_recorded() {
    let (addr, seen) = spawn_store(happy_store).await;
    let client = StoreClient::connect(addr, "store-client-test")
        .await
        .expect("connect");

    let handshake = client.handshake().await.expect("handshake");
    assert_eq!(handshake.protocol_version, tapline::PROTOCOL_VERSION);
    assert_eq!(handshake.service_version, "test-store");

    let seen = seen.lock();
    assert_eq!(seen[0].0, "handshake");
    assert_eq!(seen[0].1["client"], "store-client-test");
}

#[tokio::test]
async fn notes_and_scripts_round_trip() {
    let (addr, seen) = spawn_store(happy_store).await;
    let client = StoreClient::lazy(addr, "store-client-test");

    let notes = client.load_notes().await.expect("notes");
    assert_eq!(notes.command_note("ping"), "liveness");
    assert_eq!(notes.key_note("ping", "body.seq"), "counter");

    client.save_notes(&notes).await.expect("save notes");

    let scripts = client.list_scripts().await.expect("scripts");
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].id, "s1");
    assert!(scripts[0].enabled);

    let created = client
        .save_script(&Script::new("new", "log(2)"))
        .await
        .expect("save script");
    assert_eq!(created.id, "generated-1");

    client.delete_script("s1").await.expect("delete");
    client
        .send_debug("ping", &json!({ "seq": 1 }))
        .await
        .expect("debug send");

    let seen = seen.lock();
    let commands: Vec<_> = seen.iter().map(|(command, _)| command.as_str()).collect();
    assert_eq!(
        commands,
        vec![
            "handshake",
            "notes.load",
            "notes.save",
            "scripts.list",
            "scripts.save",
            "scripts.delete",
            "debug.send"
        ]
    );
    assert_eq!(seen[2].1["commandNotes"]["ping"], "liveness");
    assert_eq!(seen[5].1, json!({ "id": "s1" }));
    assert_eq!(seen[6].1, json!({ "command": "ping", "data": { "seq": 1 } }));
}

#[tokio::test]
async fn protocol_errors_are_surfaced() {
    fn refusing_store(command: &str, _params: &Value) -> Value {
        match command {
            "handshake" => handshake_reply(),
            _ => json!({ "error": { "code": "read_only", "message": "store is read-only", "details": { "retry": false } } }),
        }
    }

    let (addr, _) = spawn_store(refusing_store).await;
    let client = StoreClient::lazy(addr, "store-client-test");

    match client.save_script(&Script::new("x", "")).await {
        Err(StoreError::Protocol(err)) => {
            assert_eq!(err.code.as_deref(), Some("read_only"));
            assert_eq!(err.message, "store is read-only");
            assert_eq!(err.details["retry"], false);
        }
        other => panic!("expected protocol error, got {other:?}"),
    }

    // The connection survives a protocol error.
    assert!(client.handshake().await.is_some());
}

#[tokio::test]
async fn cancelled_request_is_retried_on_a_fresh_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = opened.clone();

    // The first connection answers `notes.load` late; later ones answer at once.
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let slow = counter.fetch_add(1, Ordering::SeqCst) == 0;
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut lines = BufReader::new(read_half).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let request: Value = serde_json::from_str(&line).expect("request json");
                    let command = request["command"].as_str().unwrap_or_default().to_string();
                    if slow && command == "notes.load" {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                    }
                    let mut reply = happy_store(&command, &request["params"]);
                    reply["id"] = request["id"].clone();
                    let mut bytes = serde_json::to_vec(&reply).unwrap();
                    bytes.push(b'\n');
                    if write_half.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    let client = StoreClient::lazy(addr, "store-client-test");
    let cancelled = tokio::time::timeout(Duration::from_millis(50), client.load_notes()).await;
    assert!(cancelled.is_err());
    assert!(client.handshake().await.is_none());

    for _ in 0..3 {
        let notes = client.load_notes().await.expect("retry succeeds");
        assert_eq!(notes.command_note("ping"), "liveness");
    }
    assert_eq!(opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn save_without_id_is_malformed() {
    fn forgetful_store(command: &str, params: &Value) -> Value {
        match command {
            "handshake" => handshake_reply(),
            _ => json!({ "result": params }),
        }
    }

    let (addr, _) = spawn_store(forgetful_store).await;
    let client = StoreClient::lazy(addr, "store-client-test");
    assert!(matches!(
        client.save_script(&Script::new("x", "")).await,
        Err(StoreError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn version_mismatch_fails_the_handshake() {
    fn future_store(_command: &str, _params: &Value) -> Value {
        json!({ "result": { "protocol_version": "99.0.0", "service": { "version": "x" } } })
    }

    let (addr, _) = spawn_store(future_store).await;
    assert!(matches!(
        StoreClient::connect(addr, "store-client-test").await,
        Err(StoreError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn unreachable_store_is_an_io_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = StoreClient::lazy(addr, "store-client-test");
    assert!(matches!(client.load_notes().await, Err(StoreError::Io(_))));
    assert!(client.handshake().await.is_none());
}
