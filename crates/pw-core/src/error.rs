//! Core error types for Portway

use pw_protocol::{ProtocolError, ProtocolStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Routing error
    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Registry error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Socket error
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while routing an inbound connection
#[derive(Error, Debug)]
pub enum RouteError {
    /// No `select` arrived before the deadline, or the connection closed first
    #[error("Timed out waiting for \"select\"")]
    ProtocolTimeout,

    /// The first instruction was not a well-formed `select`
    #[error("Malformed \"select\": {0}")]
    ProtocolMalformed(String),

    /// Join target is not in the registry
    #[error("Connection \"{0}\" does not exist")]
    UnknownConnection(String),

    /// The backend for a new connection could not be started
    #[error("Unable to start backend: {0}")]
    BackendSpawn(String),

    /// The user's transport could not be handed to the backend
    #[error("Unable to add user: {0}")]
    UserAttach(String),
}

/// Session-related errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// An index pool or stream table is at capacity
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// A handle was released that is not currently allocated
    #[error("Invalid {kind} handle: {index}")]
    InvalidHandle { kind: &'static str, index: i64 },

    /// A peer opened a stream at an index that is still open
    #[error("Stream {0} is already open")]
    StreamInUse(u32),

    /// The session is no longer running
    #[error("Session is not running")]
    Stopped,

    /// An instruction had missing or unparsable arguments
    #[error("Bad arguments to \"{0}\"")]
    BadArguments(String),

    /// A protocol plugin handler failed
    #[error("Handler error: {0}")]
    Handler(String),

    /// Socket error while talking to users
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),
}

impl SessionError {
    /// Protocol status used when reporting this error to a user
    pub fn status(&self) -> ProtocolStatus {
        match self {
            SessionError::ResourceExhausted(_) => ProtocolStatus::ClientTooMany,
            SessionError::InvalidHandle { .. } => ProtocolStatus::ResourceNotFound,
            SessionError::Stopped => ProtocolStatus::SessionClosed,
            SessionError::StreamInUse(_) | SessionError::BadArguments(_) => {
                ProtocolStatus::ClientBadRequest
            }
            SessionError::Handler(_) | SessionError::Socket(_) => ProtocolStatus::ServerError,
        }
    }
}

/// Index pool errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has reached its configured maximum
    #[error("Pool exhausted ({max} active)")]
    Exhausted { max: usize },

    /// The released index was not active
    #[error("Index {0} is not active")]
    NotActive(u32),
}

/// Process registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A connection with this id is already registered
    #[error("Connection \"{0}\" is already registered")]
    Conflict(String),
}

/// Socket errors
#[derive(Error, Debug)]
pub enum SocketError {
    /// The socket has been closed
    #[error("Socket closed")]
    Closed,

    /// Operation not supported by this socket
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// Some members of a broadcast failed
    #[error("Broadcast failed for {failed} of {total} users")]
    Broadcast { failed: usize, total: usize },

    /// Protocol error on the underlying transport
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
