//! Handle to a running backend

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use pw_core::error::{RouteError, SessionError};
use pw_core::{ClientSession, Transport};
use pw_protocol::ConnectionId;

use super::pid::BackendPid;

/// Messages accepted on a backend's control channel
pub enum BackendCommand {
    /// Hand a user's connection to the backend. Ownership of the transport
    /// moves with the message; the backend answers once the user is
    /// attached or has been turned away.
    AttachUser {
        transport: Transport,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Everything the gateway keeps about one backend.
///
/// The backend itself runs in its own task and is only reachable through
/// the control channel held here.
pub struct ProcessHandle {
    pid: BackendPid,
    connection_id: ConnectionId,
    control: mpsc::Sender<BackendCommand>,
    session: Arc<ClientSession>,
    /// Cancelled to ask the backend to exit
    cancel: CancellationToken,
    /// Cancelled by the backend once it has exited
    exited: CancellationToken,
}

impl ProcessHandle {
    pub(crate) fn new(
        pid: BackendPid,
        connection_id: ConnectionId,
        control: mpsc::Sender<BackendCommand>,
        session: Arc<ClientSession>,
        cancel: CancellationToken,
        exited: CancellationToken,
    ) -> Self {
        Self {
            pid,
            connection_id,
            control,
            session,
            cancel,
            exited,
        }
    }

    pub fn pid(&self) -> BackendPid {
        self.pid
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// The session the backend hosts
    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    /// Transfer a user's connection to the backend and wait for it to be
    /// attached. On failure the transport has been dropped.
    pub async fn attach_user(&self, transport: Transport) -> Result<(), RouteError> {
        let (reply, response) = oneshot::channel();

        self.control
            .send(BackendCommand::AttachUser { transport, reply })
            .await
            .map_err(|_| {
                RouteError::UserAttach(format!("backend {} is not accepting users", self.pid))
            })?;

        response
            .await
            .map_err(|_| {
                RouteError::UserAttach(format!("backend {} exited before replying", self.pid))
            })?
            .map_err(|e| RouteError::UserAttach(e.to_string()))
    }

    /// Ask the backend to exit
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    /// Wait until the backend has exited
    pub async fn wait(&self) {
        self.exited.cancelled().await;
    }

    pub fn has_exited(&self) -> bool {
        self.exited.is_cancelled()
    }
}
