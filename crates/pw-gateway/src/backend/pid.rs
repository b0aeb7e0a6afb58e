//! Backend process ids

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Next id to hand out; 0 is never used
static NEXT_PID: AtomicU32 = AtomicU32::new(1);

/// Identifier of one backend within this gateway process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendPid(u32);

impl BackendPid {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_PID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BackendPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
