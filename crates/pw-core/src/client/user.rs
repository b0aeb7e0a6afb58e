//! A single participant attached to a session

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::socket::Socket;
use crate::time::{current_time_millis, Timestamp};

use super::handler::StreamHandler;
use super::stream::{Stream, StreamTable};

/// Identifier of a user within one session.
///
/// Ids are handed out in increasing order, so the highest id is the most
/// recently attached user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(u64);

impl UserId {
    /// Wrap a raw id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Callback run once when a specific user leaves, in place of the session's
/// leave handler
pub type LeaveHandler = Box<dyn FnOnce(&User) + Send>;

/// One attached participant
pub struct User {
    id: UserId,
    socket: Arc<dyn Socket>,
    joined_at: u64,
    /// Cleared by `disconnect` or removal; ends the user's input loop
    active: AtomicBool,
    /// Set by whichever caller removes this user first
    departed: AtomicBool,
    /// Cancelled once the user is no longer in the session's list
    unlinked: CancellationToken,
    leave_handler: Mutex<Option<LeaveHandler>>,
    /// Timestamp of the last `sync` this user acknowledged
    last_sync: Timestamp,
    /// Streams this user opened towards the session
    input_streams: Mutex<StreamTable>,
}

impl User {
    pub(crate) fn new(id: UserId, socket: Arc<dyn Socket>, max_streams: usize) -> Self {
        Self {
            id,
            socket,
            joined_at: current_time_millis(),
            active: AtomicBool::new(true),
            departed: AtomicBool::new(false),
            unlinked: CancellationToken::new(),
            leave_handler: Mutex::new(None),
            last_sync: Timestamp::now(),
            input_streams: Mutex::new(StreamTable::new(max_streams)),
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    /// The user's own socket, for unicast replies
    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.socket
    }

    /// Unix milliseconds at which the user attached
    pub fn joined_at(&self) -> u64 {
        self.joined_at
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ask the user's input loop to end
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Install a leave handler that overrides the session's for this user
    pub fn set_leave_handler(&self, handler: LeaveHandler) {
        *self.leave_handler.lock() = Some(handler);
    }

    pub fn last_sync(&self) -> u64 {
        self.last_sync.get()
    }

    pub(crate) fn record_sync(&self, timestamp: u64) {
        self.last_sync.set(timestamp);
    }

    /// Mark the user as departing; true only for the first caller
    pub(crate) fn depart(&self) -> bool {
        self.stop();
        !self.departed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn mark_unlinked(&self) {
        self.unlinked.cancel();
    }

    /// Wait until whoever is removing this user has unlinked it
    pub(crate) async fn unlinked(&self) {
        self.unlinked.cancelled().await;
    }

    pub(crate) fn take_leave_handler(&self) -> Option<LeaveHandler> {
        self.leave_handler.lock().take()
    }

    /// Open the input stream the user named in `clipboard`, `file` or `pipe`
    pub fn open_input_stream(
        &self,
        index: u32,
        handler: Arc<dyn StreamHandler>,
    ) -> Result<(), SessionError> {
        self.input_streams.lock().open_at(index, handler)
    }

    pub fn input_stream(&self, index: u32) -> Option<Stream> {
        self.input_streams.lock().get(index)
    }

    pub fn close_input_stream(&self, index: u32) -> Option<Stream> {
        self.input_streams.lock().close(index)
    }

    /// Close every input stream, returning those that were still open
    pub(crate) fn take_input_streams(&self) -> Vec<Stream> {
        self.input_streams.lock().drain()
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("joined_at", &self.joined_at)
            .field("active", &self.is_active())
            .finish()
    }
}
