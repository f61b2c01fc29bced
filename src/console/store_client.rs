//! Client for the newline-delimited JSON persistence service.
//!
//! Each request is one line `{"id", "command", "params"}` and is answered by
//! one line carrying the same id plus either `result` or `error`. Requests are
//! serialised over a single TCP connection. The connection is checked out for
//! the duration of a request and only returned once the matching reply has
//! been read, so a transport failure, an unexpected reply or a cancelled
//! request drops it. The next request reconnects and repeats the handshake,
//! so every operation can simply be retried.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use super::error::{ProtocolError, StoreError, StoreResult};
use super::notes::Notes;
use super::registry::Script;
use super::store::{DebugSink, NoteStore, ScriptStore};
use crate::PROTOCOL_VERSION;

/// What the store reported when the connection was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// Negotiated protocol version
    pub protocol_version: String,
    /// Store build, for diagnostics
    pub service_version: String,
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    next_request_id: u64,
    handshake: HandshakeInfo,
}

/// Asynchronous client for the persistence service.
pub struct StoreClient {
    addr: String,
    client_name: String,
    connection: Mutex<Option<Connection>>,
}

impl StoreClient {
    /// Connect to `addr` and perform the handshake.
    pub async fn connect(addr: impl Into<String>, client_name: &str) -> StoreResult<Self> {
        let client = StoreClient {
            addr: addr.into(),
            client_name: client_name.to_string(),
            connection: Mutex::new(None),
        };
        let connection = client.open().await?;
        *client.connection.lock().await = Some(connection);
        Ok(client)
    }

    /// Build a client that connects on first use.
    pub fn lazy(addr: impl Into<String>, client_name: &str) -> Self {
        StoreClient {
            addr: addr.into(),
            client_name: client_name.to_string(),
            connection: Mutex::new(None),
        }
    }

    /// Address of the service.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Handshake details of the current connection, if connected.
    pub async fn handshake(&self) -> Option<HandshakeInfo> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|conn| conn.handshake.clone())
    }

    /// Issue a command against the service.
    pub async fn call<P>(&self, command: &str, params: P) -> StoreResult<Value>
    where
        P: Serialize,
    {
        let params = serde_json::to_value(params)?;
        let mut guard = self.connection.lock().await;
        let mut connection = match guard.take() {
            Some(connection) => connection,
            None => self.open().await?,
        };

        let outcome = connection.send_request(command, params).await;
        match &outcome {
            Ok(_) | Err(StoreError::Protocol(_)) => *guard = Some(connection),
            Err(err) => {
                tracing::debug!("Dropping store connection to {} after: {}", self.addr, err);
            }
        }
        outcome
    }

    async fn open(&self) -> StoreResult<Connection> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        let mut connection = Connection {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            next_request_id: 1,
            handshake: HandshakeInfo {
                protocol_version: String::new(),
                service_version: String::new(),
            },
        };
        connection.handshake = connection.perform_handshake(&self.client_name).await?;
        tracing::info!(
            "Connected to store {} (service {})",
            self.addr,
            connection.handshake.service_version
        );
        Ok(connection)
    }
}

impl Connection {
    async fn perform_handshake(&mut self, client_name: &str) -> StoreResult<HandshakeInfo> {
        let response = self
            .send_request(
                "handshake",
                json!({
                    "client": client_name,
                    "protocol_version": PROTOCOL_VERSION,
                }),
            )
            .await?;

        let protocol_version = response
            .get("protocol_version")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StoreError::MalformedResponse("handshake missing protocol_version".into())
            })?
            .to_owned();

        if protocol_version != PROTOCOL_VERSION {
            return Err(StoreError::MalformedResponse(format!(
                "unsupported protocol version: expected {PROTOCOL_VERSION}, got {protocol_version}"
            )));
        }

        let service = response.get("service").ok_or_else(|| {
            StoreError::MalformedResponse("handshake missing service object".into())
        })?;

        let service_version = service
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StoreError::MalformedResponse("handshake missing service.version".into())
            })?
            .to_owned();

        Ok(HandshakeInfo {
            protocol_version,
            service_version,
        })
    }

    async fn send_request(&mut self, command: &str, params: Value) -> StoreResult<Value> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let envelope = json!({
            "id": request_id,
            "command": command,
            "params": params,
        });

        let mut payload = serde_json::to_vec(&envelope)?;
        payload.push(b'\n');
        self.writer.write_all(&payload).await?;
        self.writer.flush().await?;

        let mut line = Vec::with_capacity(256);
        let bytes = self.reader.read_until(b'\n', &mut line).await?;
        if bytes == 0 {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by store",
            )));
        }

        let response: Value = serde_json::from_slice(&line)?;
        let response_id = response
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::MalformedResponse("response missing id".into()))?;

        if response_id != request_id {
            return Err(StoreError::MalformedResponse(format!(
                "response id mismatch (expected {request_id}, got {response_id})"
            )));
        }

        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(Value::as_str).map(String::from);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown store error")
                .to_owned();
            let details = error.get("details").cloned().unwrap_or(Value::Null);
            return Err(StoreError::Protocol(ProtocolError {
                code,
                message,
                details,
            }));
        }

        match response.get("result") {
            Some(result) => Ok(result.clone()),
            None => Ok(Value::Null),
        }
    }
}

#[async_trait]
impl NoteStore for StoreClient {
    async fn load_notes(&self) -> StoreResult<Notes> {
        let response = self.call("notes.load", json!({})).await?;
        serde_json::from_value(response).map_err(StoreError::from)
    }

    async fn save_notes(&self, notes: &Notes) -> StoreResult<()> {
        self.call("notes.save", notes).await.map(|_| ())
    }
}

#[async_trait]
impl ScriptStore for StoreClient {
    async fn list_scripts(&self) -> StoreResult<Vec<Script>> {
        let response = self.call("scripts.list", json!({})).await?;
        let scripts_value = response
            .get("scripts")
            .cloned()
            .unwrap_or(Value::Array(vec![]));
        serde_json::from_value(scripts_value).map_err(StoreError::from)
    }

    async fn save_script(&self, script: &Script) -> StoreResult<Script> {
        let response = self.call("scripts.save", script).await?;
        let canonical: Script = serde_json::from_value(response)?;
        if canonical.id.is_empty() {
            return Err(StoreError::MalformedResponse(
                "scripts.save returned a record without an id".into(),
            ));
        }
        Ok(canonical)
    }

    async fn delete_script(&self, id: &str) -> StoreResult<()> {
        self.call("scripts.delete", json!({ "id": id }))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl DebugSink for StoreClient {
    async fn send_debug(&self, command: &str, data: &Value) -> StoreResult<()> {
        self.call("debug.send", json!({ "command": command, "data": data }))
            .await
            .map(|_| ())
    }
}
