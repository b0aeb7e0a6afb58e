//! Backend host task
//!
//! Each backend is a task that owns one client session. It accepts users
//! over its control channel, runs an input loop per user, and exits once
//! its last user has left or it is told to terminate. On exit it frees the
//! session, which closes any remaining user sockets.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use pw_core::config::GatewayConfig;
use pw_core::error::SessionError;
use pw_core::{ClientHandler, ClientSession, Socket, Transport, TransportSocket, User};
use pw_protocol::{ConnectionId, Instruction};

use super::handle::{BackendCommand, ProcessHandle};
use super::pid::BackendPid;

/// Start a backend hosting a new session and return its handle
pub fn spawn_backend(
    connection_id: ConnectionId,
    handler: Arc<dyn ClientHandler>,
    config: &GatewayConfig,
) -> ProcessHandle {
    let pid = BackendPid::next();
    let session = Arc::new(ClientSession::new(
        connection_id.clone(),
        handler,
        &config.session,
    ));
    let (control_tx, control_rx) = mpsc::channel(config.control_channel_capacity);
    let cancel = CancellationToken::new();
    let exited = CancellationToken::new();

    let host = BackendHost {
        pid,
        session: Arc::clone(&session),
        poll_interval: config.user_poll_interval,
        cancel: cancel.clone(),
        exited: exited.clone(),
    };
    tokio::spawn(host.run(control_rx));

    ProcessHandle::new(pid, connection_id, control_tx, session, cancel, exited)
}

struct BackendHost {
    pid: BackendPid,
    session: Arc<ClientSession>,
    poll_interval: Duration,
    cancel: CancellationToken,
    exited: CancellationToken,
}

impl BackendHost {
    async fn run(self, mut control: mpsc::Receiver<BackendCommand>) {
        tracing::info!(
            "Backend {} started for connection \"{}\"",
            self.pid,
            self.session.connection_id()
        );

        let mut users = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Backend {} terminated", self.pid);
                    break;
                }

                command = control.recv() => match command {
                    Some(BackendCommand::AttachUser { transport, reply }) => {
                        let result = self.attach(transport, &mut users).await;
                        if let Err(e) = &result {
                            tracing::warn!("Backend {} refused user: {}", self.pid, e);
                        }
                        let _ = reply.send(result);
                    }
                    None => {
                        tracing::debug!("Backend {} control channel closed", self.pid);
                        break;
                    }
                },

                Some(result) = users.join_next(), if !users.is_empty() => {
                    if let Err(e) = result {
                        tracing::warn!("User task in backend {} failed: {}", self.pid, e);
                    }
                    if self.session.user_count() == 0 {
                        tracing::info!("Last user left backend {}", self.pid);
                        break;
                    }
                }
            }
        }

        // Pending attach requests are answered with a closed reply channel
        control.close();
        self.session.stop();
        self.session.free().await;
        users.shutdown().await;
        self.exited.cancel();

        tracing::info!(
            "Backend {} for connection \"{}\" exited",
            self.pid,
            self.session.connection_id()
        );
    }

    async fn attach(
        &self,
        transport: Transport,
        users: &mut JoinSet<()>,
    ) -> Result<(), SessionError> {
        let socket: Arc<dyn Socket> = Arc::new(TransportSocket::new(transport));
        let user = self.session.add_user(Arc::clone(&socket)).await?;

        let ready = Instruction::ready(self.session.connection_id());
        if let Err(e) = socket.send(&ready).await {
            self.session.remove_user(&user).await;
            return Err(e.into());
        }

        users.spawn(run_user(
            Arc::clone(&self.session),
            user,
            self.poll_interval,
        ));
        Ok(())
    }
}

/// Read and dispatch a user's instructions until the user leaves, the
/// socket fails or the session stops, then remove the user
async fn run_user(session: Arc<ClientSession>, user: Arc<User>, poll_interval: Duration) {
    let socket = Arc::clone(user.socket());

    while session.is_running() && user.is_active() {
        match socket.select(poll_interval).await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                tracing::warn!("User {} sent invalid data: {}", user.id(), e);
                break;
            }
        }

        let instruction = match socket.read().await {
            Ok(Some(instruction)) => instruction,
            Ok(None) => {
                tracing::debug!("User {} disconnected", user.id());
                break;
            }
            Err(e) => {
                tracing::warn!("User {} sent invalid data: {}", user.id(), e);
                break;
            }
        };

        if let Err(e) = session.handle_instruction(&user, &instruction).await {
            tracing::warn!(
                "Instruction \"{}\" from user {} failed: {}",
                instruction.opcode,
                user.id(),
                e
            );
            if socket
                .send(&Instruction::error(e.to_string(), e.status()))
                .await
                .is_err()
            {
                break;
            }
        }
    }

    session.remove_user(&user).await;
}
