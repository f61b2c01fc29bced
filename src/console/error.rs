//! Error types for the console core
//!
//! Each concern gets its own `thiserror` enum; [`ConsoleError`] aggregates
//! them at the session boundary. None of these are fatal: callers report
//! them and keep going.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::script::ScriptError;

/// Top-level console error
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Event source connection errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed inbound frames or operator input
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Remote persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Local cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Script compilation or execution errors
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Connection-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The event source refused or failed the handshake
    #[error("failed to connect to {url}: {detail}")]
    ConnectFailed {
        /// Event source URL
        url: String,
        /// Underlying failure
        detail: String,
    },

    /// The connection dropped while reading
    #[error("connection dropped: {0}")]
    Dropped(String),

    /// An operation needed an open connection
    #[error("not connected")]
    NotConnected,
}

/// Decoding errors for frames and operator-supplied JSON
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The outer frame envelope was not valid
    #[error("invalid frame envelope: {0}")]
    Envelope(String),

    /// The frame payload did not parse as JSON
    #[error("invalid payload: {0}")]
    Payload(#[source] serde_json::Error),

    /// A frame arrived as binary data that is not UTF-8
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,

    /// Debug-send data did not parse as JSON
    #[error("invalid debug data: {0}")]
    DebugData(#[source] serde_json::Error),
}

/// Remote store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error while talking to the store
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialisation error for envelopes
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store reported a structured protocol error
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// The store returned an unexpected or malformed payload
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The store is unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The referenced record does not exist
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Structured protocol error surfaced by the store.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProtocolError {
    /// Optional service-defined error code.
    pub code: Option<String>,
    /// Human-readable error message.
    pub message: String,
    /// Arbitrary structured details.
    pub details: serde_json::Value,
}

/// Local cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Atomic write failed
    #[error("Atomic write failed for {path}: {detail}")]
    AtomicWriteFailed {
        /// Path where write failed
        path: PathBuf,
        /// Error details
        detail: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Convenience result alias for decode operations
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Convenience result alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Convenience result alias for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Result type using ConsoleError
pub type Result<T> = std::result::Result<T, ConsoleError>;
