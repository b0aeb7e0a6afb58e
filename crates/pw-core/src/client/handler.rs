//! Callbacks a protocol plugin supplies to its session
//!
//! Every method has a no-op default so plugins only implement the events
//! they care about.

use std::sync::Arc;

use async_trait::async_trait;

use pw_protocol::{Instruction, ProtocolStatus};

use crate::error::SessionError;

use super::user::User;
use super::ClientSession;

/// Severity passed to [`ClientHandler::on_log`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

/// Session-level event handlers
#[async_trait]
pub trait ClientHandler: Send + Sync {
    /// A user is attaching. Errors are logged; the user still joins.
    async fn on_join(&self, _session: &ClientSession, _user: &User) -> Result<(), SessionError> {
        Ok(())
    }

    /// A user is leaving and has not yet been unlinked
    async fn on_leave(&self, _session: &ClientSession, _user: &User) -> Result<(), SessionError> {
        Ok(())
    }

    /// All users are gone and the session is being freed
    async fn on_free(&self, _session: &ClientSession) -> Result<(), SessionError> {
        Ok(())
    }

    /// A message the session logged
    fn on_log(&self, _level: LogLevel, _message: &str) {}

    /// User input (`mouse`, `key`, `size`)
    async fn on_instruction(
        &self,
        _session: &ClientSession,
        _user: &User,
        _instruction: &Instruction,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    /// A user opened an input stream. `None` refuses it.
    async fn on_stream_open(
        &self,
        _session: &ClientSession,
        _user: &User,
        _stream: u32,
        _instruction: &Instruction,
    ) -> Option<Arc<dyn StreamHandler>> {
        None
    }
}

/// Handlers attached to one open stream
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// The receiving side acknowledged a blob on an output stream
    async fn on_ack(
        &self,
        _session: &ClientSession,
        _user: &User,
        _stream: u32,
        _message: &str,
        _status: ProtocolStatus,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    /// Data arrived on an input stream
    async fn on_blob(
        &self,
        _session: &ClientSession,
        _user: &User,
        _stream: u32,
        _data: &str,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    /// The input stream was closed by the user
    async fn on_end(
        &self,
        _session: &ClientSession,
        _user: &User,
        _stream: u32,
    ) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Handler that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ClientHandler for NoopHandler {}

impl StreamHandler for NoopHandler {}
