//! Event source connection lifecycle
//!
//! One persistent WebSocket at a time. Every `connect` starts a new
//! generation: the previous reader task is aborted and anything it already
//! queued is discarded by [`ConnectionManager::accept`], so a superseded
//! socket can never deliver frames or state changes.

use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and none pending
    #[default]
    Disconnected,
    /// Handshake in flight
    Connecting,
    /// Frames are flowing
    Connected,
    /// The last attempt failed or the socket broke
    Errored,
}

impl ConnectionState {
    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Errored => "errored",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reader task reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Handshake completed
    Opened,
    /// A text frame (binary frames are accepted when they are UTF-8)
    Frame(String),
    /// A binary frame that is not UTF-8
    Undecodable,
    /// The peer closed, with its reason if one was given
    Closed(Option<String>),
    /// Connecting or reading failed
    Failed(String),
}

/// A signal tagged with the generation of the socket that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Connection instance
    pub generation: u64,
    /// Payload
    pub signal: Signal,
}

/// A signal from the live connection, after state bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// Frame text to ingest
    Frame(String),
    /// Frame that could not be read as text
    Undecodable,
    /// The lifecycle state moved
    StateChanged {
        /// New state
        state: ConnectionState,
        /// Close reason or failure detail
        detail: Option<String>,
    },
}

#[derive(Debug, Default)]
struct Inner {
    state: ConnectionState,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Inner {
    /// Abort the reader and retire its generation
    fn retire(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
    }
}

/// Owner of the single event source connection
pub struct ConnectionManager {
    url: String,
    inner: Mutex<Inner>,
    inbound: mpsc::UnboundedSender<Inbound>,
}

impl ConnectionManager {
    /// Manager for `url` plus the receiving end its reader tasks feed
    pub fn new(url: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (inbound, rx) = mpsc::unbounded_channel();
        let manager = Self {
            url: url.into(),
            inner: Mutex::new(Inner::default()),
            inbound,
        };
        (manager, rx)
    }

    /// Event source URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Generation of the current (or last) connection instance
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Open a fresh connection, closing any existing one first
    ///
    /// Must be called from within a tokio runtime. Returns the new generation.
    pub fn connect(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.retire();
        inner.state = ConnectionState::Connecting;

        let generation = inner.generation;
        tracing::info!("Connecting to {} (generation {})", self.url, generation);
        inner.task = Some(tokio::spawn(read_loop(
            self.url.clone(),
            generation,
            self.inbound.clone(),
        )));
        generation
    }

    /// Close the connection; returns whether the state changed
    pub fn disconnect(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.retire();
        let changed = inner.state != ConnectionState::Disconnected;
        if changed {
            tracing::info!("Disconnected from {}", self.url);
        }
        inner.state = ConnectionState::Disconnected;
        changed
    }

    /// Close if connected, otherwise connect; returns the resulting state
    pub fn reconnect(&self) -> ConnectionState {
        if self.state() == ConnectionState::Connected {
            self.disconnect();
        } else {
            self.connect();
        }
        self.state()
    }

    /// Apply a reader signal; signals from retired generations yield `None`
    pub fn accept(&self, inbound: Inbound) -> Option<Accepted> {
        let mut inner = self.inner.lock();
        if inbound.generation != inner.generation {
            tracing::trace!(
                "Dropping signal from retired generation {} (current {})",
                inbound.generation,
                inner.generation
            );
            return None;
        }

        let (state, detail) = match inbound.signal {
            Signal::Frame(text) => return Some(Accepted::Frame(text)),
            Signal::Undecodable => return Some(Accepted::Undecodable),
            Signal::Opened => {
                tracing::info!("Connected to {}", self.url);
                (ConnectionState::Connected, None)
            }
            Signal::Closed(reason) => {
                tracing::info!("Connection to {} closed", self.url);
                inner.task = None;
                (ConnectionState::Disconnected, reason)
            }
            Signal::Failed(detail) => {
                tracing::warn!("Connection to {} failed: {}", self.url, detail);
                inner.task = None;
                (ConnectionState::Errored, Some(detail))
            }
        };
        inner.state = state;
        Some(Accepted::StateChanged { state, detail })
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.inner.get_mut().task.take() {
            task.abort();
        }
    }
}

async fn read_loop(url: String, generation: u64, tx: mpsc::UnboundedSender<Inbound>) {
    let send = |signal| {
        let _ = tx.send(Inbound { generation, signal });
    };

    let mut socket = match connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(err) => {
            send(Signal::Failed(err.to_string()));
            return;
        }
    };
    send(Signal::Opened);

    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Text(text)) => send(Signal::Frame(text)),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => send(Signal::Frame(text)),
                Err(_) => send(Signal::Undecodable),
            },
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|frame| frame.reason.to_string())
                    .filter(|reason| !reason.is_empty());
                send(Signal::Closed(reason));
                return;
            }
            Ok(_) => {}
            Err(err) => {
                send(Signal::Failed(err.to_string()));
                return;
            }
        }
    }
    send(Signal::Closed(None));
}
