//! Socket that writes to every user of a session

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};

use pw_protocol::Instruction;

use crate::error::SocketError;
use crate::socket::Socket;

use super::users::UserList;

/// Fans each write out to all attached users.
///
/// The member list is snapshotted under the list lock and the writes happen
/// after it is released. Every member is attempted even if some fail.
pub struct BroadcastSocket {
    users: Arc<UserList>,
}

impl BroadcastSocket {
    pub(crate) fn new(users: Arc<UserList>) -> Self {
        Self { users }
    }

    fn tally(results: Vec<Result<(), SocketError>>) -> Result<(), SocketError> {
        let total = results.len();
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed == 0 {
            Ok(())
        } else {
            Err(SocketError::Broadcast { failed, total })
        }
    }
}

#[async_trait]
impl Socket for BroadcastSocket {
    async fn write(&self, instruction: &Instruction) -> Result<(), SocketError> {
        let sockets = self.users.sockets();
        let results = join_all(sockets.iter().map(|socket| socket.write(instruction))).await;
        Self::tally(results)
    }

    async fn flush(&self) -> Result<(), SocketError> {
        let sockets = self.users.sockets();
        let results = join_all(sockets.iter().map(|socket| socket.flush())).await;
        Self::tally(results)
    }

    async fn read(&self) -> Result<Option<Instruction>, SocketError> {
        Err(SocketError::Unsupported("read from broadcast socket"))
    }

    async fn select(&self, timeout: Duration) -> Result<bool, SocketError> {
        let sockets = self.users.sockets();
        if sockets.is_empty() {
            return Ok(false);
        }

        let mut pending: FuturesUnordered<_> =
            sockets.iter().map(|socket| socket.select(timeout)).collect();
        while let Some(result) = pending.next().await {
            if let Ok(true) = result {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Users' sockets are closed when they are removed, not here
    async fn close(&self) {}
}
