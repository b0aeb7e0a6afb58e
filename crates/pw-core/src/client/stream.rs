//! Fixed-capacity stream tables
//!
//! A session keeps one table for the streams it opens towards its users and
//! each user keeps one for the streams it opens towards the session. Slots
//! are preallocated; an empty slot is a closed stream.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{PoolError, SessionError};
use crate::pool::IndexPool;

use super::handler::StreamHandler;

/// Opaque per-stream state owned by whoever opened the stream
pub type StreamData = Arc<dyn Any + Send + Sync>;

/// An open stream
#[derive(Clone)]
pub struct Stream {
    index: u32,
    handler: Arc<dyn StreamHandler>,
    data: Option<StreamData>,
}

impl Stream {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn handler(&self) -> &Arc<dyn StreamHandler> {
        &self.handler
    }

    pub fn data(&self) -> Option<&StreamData> {
        self.data.as_ref()
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("index", &self.index)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

/// Preallocated stream slots plus the pool that names them
pub struct StreamTable {
    slots: Vec<Option<Stream>>,
    pool: IndexPool,
}

impl StreamTable {
    /// Table with `capacity` closed slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            pool: IndexPool::with_max(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of open streams
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Open a stream under a freshly allocated index
    pub fn allocate(&mut self, handler: Arc<dyn StreamHandler>) -> Result<u32, SessionError> {
        let index = self.pool.allocate().map_err(|e| match e {
            PoolError::Exhausted { .. } => SessionError::ResourceExhausted("stream"),
            PoolError::NotActive(index) => SessionError::InvalidHandle {
                kind: "stream",
                index: index.into(),
            },
        })?;

        let Some(slot) = self.slots.get_mut(index as usize) else {
            // Only reachable if the pool outgrew the table; give the index back
            let _ = self.pool.release(index);
            return Err(SessionError::ResourceExhausted("stream"));
        };
        *slot = Some(Stream {
            index,
            handler,
            data: None,
        });
        Ok(index)
    }

    /// Close a stream opened by [`allocate`](Self::allocate) and recycle its index
    pub fn release(&mut self, index: u32) -> Result<(), SessionError> {
        self.pool
            .release(index)
            .map_err(|_| SessionError::InvalidHandle {
                kind: "stream",
                index: index.into(),
            })?;
        if let Some(slot) = self.slots.get_mut(index as usize) {
            *slot = None;
        }
        Ok(())
    }

    /// Open a stream at an index chosen by the peer.
    ///
    /// The slot must be closed; a stream still open there has to be ended
    /// and closed first.
    pub fn open_at(
        &mut self,
        index: u32,
        handler: Arc<dyn StreamHandler>,
    ) -> Result<(), SessionError> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(SessionError::InvalidHandle {
                kind: "stream",
                index: index.into(),
            })?;
        if slot.is_some() {
            return Err(SessionError::StreamInUse(index));
        }
        *slot = Some(Stream {
            index,
            handler,
            data: None,
        });
        Ok(())
    }

    /// Close a peer-indexed stream, returning what was open there
    pub fn close(&mut self, index: u32) -> Option<Stream> {
        self.slots.get_mut(index as usize).and_then(Option::take)
    }

    /// Clone of the stream open at `index`
    pub fn get(&self, index: u32) -> Option<Stream> {
        self.slots.get(index as usize).and_then(Clone::clone)
    }

    /// Attach opaque state to an open stream
    pub fn set_data(&mut self, index: u32, data: StreamData) -> Result<(), SessionError> {
        match self.slots.get_mut(index as usize) {
            Some(Some(stream)) => {
                stream.data = Some(data);
                Ok(())
            }
            _ => Err(SessionError::InvalidHandle {
                kind: "stream",
                index: index.into(),
            }),
        }
    }

    /// Close every stream, returning the ones that were open
    pub fn drain(&mut self) -> Vec<Stream> {
        let open = self.slots.iter_mut().filter_map(Option::take).collect();
        self.pool.reset();
        open
    }

    /// Close every stream and recycle all indices
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.pool.reset();
    }
}
