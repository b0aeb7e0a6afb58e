//! Client sessions
//!
//! A [`ClientSession`] is the state one backend keeps for its remote
//! connection: the users attached to it, the layer, buffer and stream
//! handles it has handed out, and the protocol plugin's callbacks. Output
//! goes to every user at once through the session's [`BroadcastSocket`].
//!
//! # Lifecycle
//!
//! `Running` → `Stopping` → `Stopped`. `stop` and `abort` move a running
//! session to `Stopping`; `free` removes every user and settles the session
//! in `Stopped`. The state never moves backwards.

mod broadcast;
mod dispatch;
mod handler;
mod layer;
mod stream;
mod user;
mod users;

pub use broadcast::BroadcastSocket;
pub use handler::{ClientHandler, LogLevel, NoopHandler, StreamHandler};
pub use layer::Layer;
pub use stream::{Stream, StreamData, StreamTable};
pub use user::{LeaveHandler, User, UserId};
pub use users::UserList;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use pw_protocol::{ConnectionId, Instruction, ProtocolStatus};

use crate::config::SessionLimits;
use crate::error::{PoolError, SessionError, SocketError};
use crate::pool::IndexPool;
use crate::socket::Socket;
use crate::time::{elapsed_millis, Timestamp};

/// Message broadcast to users when a session aborts; details stay in the log
const ABORT_MESSAGE: &str = "Aborted. See logs.";

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ClientState {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientState::Running,
            1 => ClientState::Stopping,
            _ => ClientState::Stopped,
        }
    }
}

/// State shared by every user of one backend connection
pub struct ClientSession {
    connection_id: ConnectionId,
    state: AtomicU8,
    last_received: Timestamp,
    last_sent: Timestamp,
    layers: Mutex<IndexPool>,
    buffers: Mutex<IndexPool>,
    output_streams: Mutex<StreamTable>,
    max_streams: usize,
    users: Arc<UserList>,
    broadcast: BroadcastSocket,
    handler: Arc<dyn ClientHandler>,
    freed: AtomicBool,
}

impl ClientSession {
    /// Create a running session with no users
    pub fn new(
        connection_id: ConnectionId,
        handler: Arc<dyn ClientHandler>,
        limits: &SessionLimits,
    ) -> Self {
        let pool = |max: Option<usize>| max.map_or_else(IndexPool::new, IndexPool::with_max);
        let users = Arc::new(UserList::new());

        Self {
            connection_id,
            state: AtomicU8::new(ClientState::Running as u8),
            last_received: Timestamp::now(),
            last_sent: Timestamp::now(),
            layers: Mutex::new(pool(limits.max_layers)),
            buffers: Mutex::new(pool(limits.max_buffers)),
            output_streams: Mutex::new(StreamTable::new(limits.max_streams)),
            max_streams: limits.max_streams,
            broadcast: BroadcastSocket::new(Arc::clone(&users)),
            users,
            handler,
            freed: AtomicBool::new(false),
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ClientState::Running
    }

    pub fn handler(&self) -> &Arc<dyn ClientHandler> {
        &self.handler
    }

    /// Socket that writes to every attached user
    pub fn socket(&self) -> &BroadcastSocket {
        &self.broadcast
    }

    pub fn users(&self) -> &Arc<UserList> {
        &self.users
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Capacity of each stream table
    pub fn max_streams(&self) -> usize {
        self.max_streams
    }

    /// Unix milliseconds of the last instruction received from any user
    pub fn last_received(&self) -> u64 {
        self.last_received.get()
    }

    /// Unix milliseconds of the last broadcast
    pub fn last_sent(&self) -> u64 {
        self.last_sent.get()
    }

    /// Write and flush an instruction to every user
    pub async fn broadcast(&self, instruction: &Instruction) -> Result<(), SocketError> {
        self.last_sent.touch();
        self.broadcast.send(instruction).await
    }

    /// Attach a user owning `socket`.
    ///
    /// The join handler runs before the user is linked; its errors are
    /// logged and do not prevent the join.
    pub async fn add_user(&self, socket: Arc<dyn Socket>) -> Result<Arc<User>, SessionError> {
        if !self.is_running() || self.users.is_closed() {
            return Err(SessionError::Stopped);
        }

        let user = Arc::new(User::new(self.users.next_id(), socket, self.max_streams));
        if let Err(e) = self.handler.on_join(self, &user).await {
            tracing::warn!(
                "Join handler failed for user {} on {}: {}",
                user.id(),
                self.connection_id,
                e
            );
        }

        if !self.users.insert(Arc::clone(&user)) {
            // The session started freeing while the join handler ran
            user.depart();
            self.run_leave_handler(&user).await;
            user.mark_unlinked();
            return Err(SessionError::Stopped);
        }

        tracing::info!(
            "User {} joined connection \"{}\" ({} users)",
            user.id(),
            self.connection_id,
            self.users.len()
        );
        Ok(user)
    }

    /// Detach a user and close its socket.
    ///
    /// Only the first call for a given user does anything; later calls
    /// return false.
    pub async fn remove_user(&self, user: &User) -> bool {
        if !user.depart() {
            return false;
        }

        self.run_leave_handler(user).await;
        self.users.remove(user.id());
        user.mark_unlinked();

        self.end_input_streams(user).await;
        user.socket().close().await;

        tracing::info!(
            "User {} left connection \"{}\" after {}ms ({} users)",
            user.id(),
            self.connection_id,
            elapsed_millis(user.joined_at()),
            self.users.len()
        );
        true
    }

    async fn run_leave_handler(&self, user: &User) {
        match user.take_leave_handler() {
            Some(leave) => leave(user),
            None => {
                if let Err(e) = self.handler.on_leave(self, user).await {
                    tracing::warn!(
                        "Leave handler failed for user {} on {}: {}",
                        user.id(),
                        self.connection_id,
                        e
                    );
                }
            }
        }
    }

    /// Run the end handler of every stream the user left open
    async fn end_input_streams(&self, user: &User) {
        for stream in user.take_input_streams() {
            if let Err(e) = stream
                .handler()
                .on_end(self, user, stream.index())
                .await
            {
                tracing::warn!(
                    "Closing stream {} of user {} failed: {}",
                    stream.index(),
                    user.id(),
                    e
                );
            }
        }
    }

    /// End the input stream open at `index`, if any, so the index can be
    /// reused
    pub(crate) async fn end_input_stream(
        &self,
        user: &User,
        index: u32,
    ) -> Result<(), SessionError> {
        match user.close_input_stream(index) {
            Some(stream) => stream.handler().on_end(self, user, index).await,
            None => Ok(()),
        }
    }

    /// Request a stop. A stopped session stays stopped.
    pub fn stop(&self) {
        let _ = self.state.compare_exchange(
            ClientState::Running as u8,
            ClientState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Log a failure, tell every user the session aborted, and stop.
    ///
    /// Has no effect unless the session is running. User sockets are left
    /// open so the users drain and leave normally.
    pub async fn abort(&self, status: ProtocolStatus, message: &str) {
        if self
            .state
            .compare_exchange(
                ClientState::Running as u8,
                ClientState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        self.log_error(&format!("Connection aborted ({}): {}", status, message));
        if let Err(e) = self
            .broadcast(&Instruction::error(ABORT_MESSAGE, status))
            .await
        {
            tracing::debug!("Unable to notify users of abort: {}", e);
        }
    }

    /// Remove every user, run the free handler and release all handles.
    ///
    /// Only the first call does anything.
    pub async fn free(&self) {
        if self.freed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.stop();
        self.users.close();

        while let Some(user) = self.users.head() {
            if !self.remove_user(&user).await {
                // Another task is mid-removal of this user
                user.unlinked().await;
            }
        }

        if let Err(e) = self.handler.on_free(self).await {
            tracing::warn!("Free handler failed on {}: {}", self.connection_id, e);
        }

        let open = self.output_streams.lock().open_count();
        if open > 0 {
            tracing::debug!(
                "Closing {} output streams of connection \"{}\"",
                open,
                self.connection_id
            );
        }

        self.layers.lock().reset();
        self.buffers.lock().reset();
        self.output_streams.lock().reset();
        self.state
            .store(ClientState::Stopped as u8, Ordering::Release);

        tracing::debug!("Connection \"{}\" freed", self.connection_id);
    }

    /// Dispatch one instruction received from `user`
    pub async fn handle_instruction(
        &self,
        user: &User,
        instruction: &Instruction,
    ) -> Result<(), SessionError> {
        self.last_received.touch();

        match dispatch::lookup(&instruction.opcode) {
            Some(handler) => handler(self, user, instruction).await,
            None => {
                tracing::trace!("Ignoring instruction {} from {}", instruction, user.id());
                Ok(())
            }
        }
    }

    pub fn log_info(&self, message: &str) {
        tracing::info!(connection = %self.connection_id, "{}", message);
        self.handler.on_log(LogLevel::Info, message);
    }

    pub fn log_error(&self, message: &str) {
        tracing::error!(connection = %self.connection_id, "{}", message);
        self.handler.on_log(LogLevel::Error, message);
    }

    /// Allocate a visible layer
    pub fn alloc_layer(&self) -> Result<Layer, SessionError> {
        let slot = self.layers.lock().allocate().map_err(exhausted("layer"))?;
        Layer::from_layer_slot(slot).ok_or(SessionError::ResourceExhausted("layer"))
    }

    pub fn free_layer(&self, layer: Layer) -> Result<(), SessionError> {
        let slot = layer.layer_slot().ok_or_else(|| invalid("layer", layer))?;
        self.layers
            .lock()
            .release(slot)
            .map_err(|_| invalid("layer", layer))
    }

    /// Allocate an off-screen buffer
    pub fn alloc_buffer(&self) -> Result<Layer, SessionError> {
        let slot = self.buffers.lock().allocate().map_err(exhausted("buffer"))?;
        Layer::from_buffer_slot(slot).ok_or(SessionError::ResourceExhausted("buffer"))
    }

    pub fn free_buffer(&self, buffer: Layer) -> Result<(), SessionError> {
        let slot = buffer.buffer_slot().ok_or_else(|| invalid("buffer", buffer))?;
        self.buffers
            .lock()
            .release(slot)
            .map_err(|_| invalid("buffer", buffer))
    }

    /// Open an output stream handled by `handler`
    pub fn alloc_stream(&self, handler: Arc<dyn StreamHandler>) -> Result<u32, SessionError> {
        self.output_streams.lock().allocate(handler)
    }

    pub fn free_stream(&self, index: u32) -> Result<(), SessionError> {
        self.output_streams.lock().release(index)
    }

    pub fn output_stream(&self, index: u32) -> Option<Stream> {
        self.output_streams.lock().get(index)
    }

    pub fn set_stream_data(&self, index: u32, data: StreamData) -> Result<(), SessionError> {
        self.output_streams.lock().set_data(index, data)
    }
}

fn exhausted(kind: &'static str) -> impl Fn(PoolError) -> SessionError {
    move |_| SessionError::ResourceExhausted(kind)
}

fn invalid(kind: &'static str, layer: Layer) -> SessionError {
    SessionError::InvalidHandle {
        kind,
        index: layer.index().into(),
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if !self.freed.load(Ordering::Acquire) && !self.users.is_empty() {
            tracing::warn!(
                "Connection \"{}\" dropped with {} users still attached",
                self.connection_id,
                self.users.len()
            );
        }
    }
}
