//! Advisory pid marker file.
//!
//! The file holds the decimal PID of the running daemon. It is created when
//! the controller starts and removed once it has stopped, so control
//! commands can find the process and a second instance refuses to start.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::DaemonError;

#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    owned: bool,
}

impl PidFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            owned: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Whether this instance wrote the file and will remove it.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Read the recorded PID, if the file exists and holds one.
    pub fn read_pid(&self) -> Result<Option<u32>, DaemonError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DaemonError::PidFileRead {
                    path: self.path.clone(),
                    reason: e.to_string(),
                });
            }
        };

        // An empty file is one handed over before the fork.
        let contents = contents.trim();
        if contents.is_empty() {
            return Ok(None);
        }

        contents
            .parse::<u32>()
            .map(Some)
            .map_err(|e| DaemonError::PidFileRead {
                path: self.path.clone(),
                reason: format!("Invalid PID format: {}", e),
            })
    }

    /// PID of a live process recorded in the file.
    ///
    /// Returns `NotRunning` when the file is missing or the process is gone.
    pub fn running_pid(&self) -> Result<u32, DaemonError> {
        match self.read_pid()? {
            Some(pid) if is_process_running(pid) => Ok(pid),
            _ => Err(DaemonError::NotRunning),
        }
    }

    /// Record `pid` in the file, creating parent directories as needed.
    pub fn write_pid(&mut self, pid: u32) -> Result<(), DaemonError> {
        let creation_error = |reason: String| DaemonError::PidFileCreation {
            path: self.path.clone(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| creation_error(format!("Failed to create parent directory: {}", e)))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| creation_error(e.to_string()))?;
        writeln!(file, "{}", pid).map_err(|e| creation_error(e.to_string()))?;

        self.owned = true;
        info!("PID file created: {} (PID: {})", self.path.display(), pid);
        Ok(())
    }

    /// Claim the file for the current process.
    ///
    /// Fails if another live process is recorded; a stale file is replaced.
    pub fn try_acquire(&mut self) -> Result<(), DaemonError> {
        let own_pid = std::process::id();

        if let Some(existing) = self.read_pid()? {
            if existing != own_pid && is_process_running(existing) {
                return Err(DaemonError::AlreadyRunning {
                    path: self.path.clone(),
                    pid: existing,
                });
            }
            if existing != own_pid {
                warn!(
                    "Replacing stale PID file (PID {} not running): {}",
                    existing,
                    self.path.display()
                );
            }
        }

        self.write_pid(own_pid)
    }

    /// Remove the file if this instance owns it.
    pub fn release(&mut self) -> Result<(), DaemonError> {
        if !self.owned {
            return Ok(());
        }
        self.owned = false;

        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("PID file removed: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("PID file already gone: {}", self.path.display());
                Ok(())
            }
            Err(e) => Err(DaemonError::PidFileRemoval {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to remove PID file on drop: {}", e);
        }
    }
}

/// Whether a process with `pid` exists.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    // Signal 0 only checks for existence. EPERM means it exists but is not ours.
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
    // Without a way to check, assume the recorded process is alive.
    true
}

#[cfg(test)]
#[path = "pid_tests.rs"]
mod tests;
