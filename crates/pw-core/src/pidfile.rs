//! PID file handling for the gateway daemon
//!
//! The daemon optionally records its PID so service managers can find it.
//! A PID file left by a live process blocks startup; one left by a dead
//! process is treated as stale and replaced.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Read the PID from the PID file
///
/// Returns `Ok(Some(pid))` if the file exists and contains a valid PID,
/// `Ok(None)` if the file doesn't exist, or an error if the file is malformed.
pub fn read_pid_file(path: &Path) -> io::Result<Option<u32>> {
    match fs::File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let pid = contents
                .trim()
                .parse::<u32>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(pid))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write a PID to the PID file, creating parent directories
pub fn write_pid_file(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(path)?;
    writeln!(file, "{}", pid)?;
    Ok(())
}

/// Remove the PID file; a missing file is not an error
pub fn remove_pid_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Check if a process with the given PID is still alive
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };

    // kill(pid, 0) probes without signalling; EPERM means it exists but isn't ours
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Process probing is unavailable here, so every PID file is treated as stale
#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

/// PID file owned by the running daemon, removed on drop
#[derive(Debug)]
pub struct PidFileGuard {
    path: PathBuf,
}

impl PidFileGuard {
    /// Claim the PID file for `pid`.
    ///
    /// Fails with `AddrInUse` if the file names another live process.
    pub fn acquire(path: PathBuf, pid: u32) -> io::Result<Self> {
        if let Some(existing) = read_pid_file(&path).unwrap_or(None) {
            if existing != pid && is_process_alive(existing) {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("gateway already running with PID {}", existing),
                ));
            }
            tracing::warn!("Replacing stale PID file {:?} (PID {})", path, existing);
        }

        write_pid_file(&path, pid)?;
        Ok(Self { path })
    }

    /// Path of the claimed file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_pid_file(&self.path) {
            tracing::warn!("Failed to remove PID file {:?}: {}", self.path, e);
        }
    }
}
