//! Instruction type for the gateway protocol
//!
//! An instruction is an opcode followed by zero or more string arguments.
//! Everything a user sends and everything the gateway sends back is an
//! instruction; the framing lives in `codec.rs`.
//!
//! # Handshake
//!
//! 1. User sends `select` with a protocol name or a connection id
//! 2. Gateway attaches the user and answers `ready` with the connection id
//! 3. Instructions flow in both directions until either side disconnects

use std::fmt;

use crate::connection_id::ConnectionId;
use crate::status::ProtocolStatus;

/// A single protocol instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Instruction name
    pub opcode: String,
    /// Positional arguments
    pub args: Vec<String>,
}

impl Instruction {
    /// Create a new instruction
    pub fn new<I, S>(opcode: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            opcode: opcode.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Get an argument by position
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Number of arguments (excluding the opcode)
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    /// `select <identifier>`: first instruction of every connection
    pub fn select(identifier: impl Into<String>) -> Self {
        Self::new("select", [identifier.into()])
    }

    /// `ready <connection-id>`: sent once a user is attached
    pub fn ready(connection_id: &ConnectionId) -> Self {
        Self::new("ready", [connection_id.as_str()])
    }

    /// `error <message> <status>`
    pub fn error(message: impl Into<String>, status: ProtocolStatus) -> Self {
        Self::new("error", [message.into(), status.to_string()])
    }

    /// `ack <stream> <message> <status>`
    pub fn ack(stream: u32, message: impl Into<String>, status: ProtocolStatus) -> Self {
        Self::new("ack", [stream.to_string(), message.into(), status.to_string()])
    }

    /// `sync <timestamp>`
    pub fn sync(timestamp: u64) -> Self {
        Self::new("sync", [timestamp.to_string()])
    }

    /// `clipboard <stream> <mimetype>`
    pub fn clipboard(stream: u32, mimetype: impl Into<String>) -> Self {
        Self::new("clipboard", [stream.to_string(), mimetype.into()])
    }

    /// `blob <stream> <data>`
    pub fn blob(stream: u32, data: impl Into<String>) -> Self {
        Self::new("blob", [stream.to_string(), data.into()])
    }

    /// `end <stream>`
    pub fn end(stream: u32) -> Self {
        Self::new("end", [stream.to_string()])
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if !self.args.is_empty() {
            write!(f, " [{}]", self.args.join(", "))?;
        }
        Ok(())
    }
}
