//! Backends
//!
//! A backend hosts one client session in its own task. The gateway talks
//! to it only through the [`ProcessHandle`] returned when it is spawned.

mod handle;
mod host;
mod pid;
mod spawner;

pub use handle::{BackendCommand, ProcessHandle};
pub use host::spawn_backend;
pub use pid::BackendPid;
pub use spawner::{BackendSpawner, LocalSpawner};
