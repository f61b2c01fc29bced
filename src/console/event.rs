//! Inbound events and frame decoding
//!
//! A frame is the envelope delivered by the event source; an [`Event`] is what
//! the console keeps after the frame's payload has been decoded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::error::{DecodeError, DecodeResult};

/// Which side of the observed protocol produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent by the client towards the server
    Client,
    /// Sent by the server towards the client
    Server,
}

impl Direction {
    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Client => "client",
            Direction::Server => "server",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = DecodeError;

    fn from_str(s: &str) -> DecodeResult<Self> {
        match s {
            "client" => Ok(Direction::Client),
            "server" => Ok(Direction::Server),
            other => Err(DecodeError::Envelope(format!("unknown direction '{other}'"))),
        }
    }
}

/// Envelope of one inbound frame: `{ direction, payload }`.
///
/// The legacy field names `call` and `msg` are accepted as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Producing side
    #[serde(alias = "call")]
    pub direction: Direction,
    /// JSON-encoded payload text (or an already structured value)
    #[serde(alias = "msg")]
    pub payload: Value,
}

impl Frame {
    /// Parse the outer envelope of a text frame.
    pub fn parse(text: &str) -> DecodeResult<Self> {
        serde_json::from_str(text).map_err(|err| DecodeError::Envelope(err.to_string()))
    }

    /// Decode the payload into `(raw text, structured value)`.
    pub fn decode_payload(&self) -> DecodeResult<(String, Value)> {
        match &self.payload {
            Value::String(raw) => {
                let decoded = serde_json::from_str(raw).map_err(DecodeError::Payload)?;
                Ok((raw.clone(), decoded))
            }
            structured => {
                let raw = serde_json::to_string(structured).map_err(DecodeError::Payload)?;
                Ok((raw, structured.clone()))
            }
        }
    }
}

/// A decoded message held by the event buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic identifier assigned at ingestion
    pub id: u64,
    /// Producing side
    pub direction: Direction,
    /// Payload text as received
    pub raw_payload: String,
    /// Structured payload
    pub decoded: Value,
    /// Ingestion time
    pub received_at: DateTime<Utc>,
    /// Display flag owned by the rendering layer
    pub expanded: bool,
}

impl Event {
    /// Build an event from a frame, decoding its payload.
    pub fn from_frame(id: u64, frame: &Frame) -> DecodeResult<Self> {
        let (raw_payload, decoded) = frame.decode_payload()?;
        Ok(Self {
            id,
            direction: frame.direction,
            raw_payload,
            decoded,
            received_at: Utc::now(),
            expanded: false,
        })
    }

    /// Command discriminator (`cmd` field), if the payload carries one.
    pub fn command(&self) -> Option<&str> {
        self.decoded.get("cmd").and_then(Value::as_str)
    }

    /// Payload body (`body` field), if present.
    pub fn body(&self) -> Option<&Value> {
        self.decoded.get("body")
    }
}
