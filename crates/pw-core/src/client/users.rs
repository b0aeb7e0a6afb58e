//! The session's user collection
//!
//! Every structural change happens under one lock. Join and leave handlers
//! never run while it is held; callers take a snapshot and work on that.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::socket::Socket;

use super::user::{User, UserId};

#[derive(Default)]
struct Inner {
    users: BTreeMap<UserId, Arc<User>>,
    /// Set once the session is being freed; no further inserts
    closed: bool,
}

/// Users attached to one session, newest first
#[derive(Default)]
pub struct UserList {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl UserList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the id for the next user
    pub fn next_id(&self) -> UserId {
        UserId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Link a user at the head of the list.
    ///
    /// Returns false if the list has been closed.
    pub fn insert(&self, user: Arc<User>) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.users.insert(user.id(), user);
        true
    }

    /// Unlink a user
    pub fn remove(&self, id: UserId) -> Option<Arc<User>> {
        self.inner.lock().users.remove(&id)
    }

    /// Most recently attached user
    pub fn head(&self) -> Option<Arc<User>> {
        self.inner
            .lock()
            .users
            .last_key_value()
            .map(|(_, user)| Arc::clone(user))
    }

    pub fn get(&self, id: UserId) -> Option<Arc<User>> {
        self.inner.lock().users.get(&id).cloned()
    }

    /// Refuse all further inserts
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().users.is_empty()
    }

    /// Users in list order, newest first
    pub fn snapshot(&self) -> Vec<Arc<User>> {
        self.inner.lock().users.values().rev().cloned().collect()
    }

    /// Sockets of every attached user
    pub fn sockets(&self) -> Vec<Arc<dyn Socket>> {
        self.inner
            .lock()
            .users
            .values()
            .rev()
            .map(|user| Arc::clone(user.socket()))
            .collect()
    }
}
