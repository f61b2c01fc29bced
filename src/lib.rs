//! Tapline – a live debugging console core for framed client/server message streams
//!
//! This crate implements the session logic behind an interactive protocol
//! debugger:
//! - A single WebSocket connection to an event source, with generation-tagged
//!   reconnects
//! - A bounded, newest-first event history with direction, command and
//!   exclusion filtering
//! - Per-command and per-field annotations persisted remotely with a local
//!   fallback cache
//! - User-authored automation scripts run against every qualifying server
//!   event, each isolated from the others and bounded by a step budget
//!
//! Rendering is left to the caller, which drives a [`Console`] and listens
//! to its [`Notice`] stream.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Session controller and its components
pub mod console;

/// The automation script language
pub mod script;

// Re-export key types for convenience
pub use console::{Console, ConsoleConfig, ConsoleError, Notice, Result};

/// Current version of Tapline
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version spoken to the persistence service
pub const PROTOCOL_VERSION: &str = "1.0.0";
