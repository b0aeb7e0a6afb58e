//! Recycling integer allocator
//!
//! Layers, buffers and streams are all named by small integers. An
//! [`IndexPool`] hands those integers out, preferring the oldest released
//! value before growing its counter, so indices stay small and dense over
//! the life of a session.
//!
//! The pool is not synchronized; the session wraps each pool in its own
//! mutex.

use std::collections::VecDeque;

use crate::error::PoolError;

/// Allocator of unique non-negative indices with reuse
#[derive(Debug, Clone, Default)]
pub struct IndexPool {
    /// Next never-allocated value
    next: u32,
    /// Released values, oldest first
    free: VecDeque<u32>,
    /// `active[i]` is set while `i` is allocated
    active: Vec<bool>,
    /// Number of set entries in `active`
    active_count: usize,
    /// Upper bound on `active_count`
    max: Option<usize>,
}

impl IndexPool {
    /// Create an unbounded pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool that refuses to hold more than `max` active indices.
    ///
    /// A maximum of zero means no limit.
    pub fn with_max(max: usize) -> Self {
        Self {
            max: (max > 0).then_some(max),
            ..Self::default()
        }
    }

    /// Allocate an index, reusing a released one if possible
    pub fn allocate(&mut self) -> Result<u32, PoolError> {
        if let Some(max) = self.max {
            if self.active_count >= max {
                return Err(PoolError::Exhausted { max });
            }
        }

        let index = match self.free.pop_front() {
            Some(index) => index,
            None => {
                let index = self.next;
                self.next += 1;
                self.active.push(false);
                index
            }
        };

        self.active[index as usize] = true;
        self.active_count += 1;
        Ok(index)
    }

    /// Return an index to the pool.
    ///
    /// Releasing an index that is not active is rejected and leaves the pool
    /// unchanged.
    pub fn release(&mut self, index: u32) -> Result<(), PoolError> {
        match self.active.get_mut(index as usize) {
            Some(slot) if *slot => {
                *slot = false;
                self.active_count -= 1;
                self.free.push_back(index);
                Ok(())
            }
            _ => Err(PoolError::NotActive(index)),
        }
    }

    /// Whether `index` is currently allocated
    pub fn is_active(&self, index: u32) -> bool {
        self.active.get(index as usize).copied().unwrap_or(false)
    }

    /// Number of currently allocated indices
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Configured maximum, if any
    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Release everything and start over from zero
    pub fn reset(&mut self) {
        self.next = 0;
        self.free.clear();
        self.active.clear();
        self.active_count = 0;
    }
}
