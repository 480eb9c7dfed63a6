//! Control subcommands: talk to a running daemon through its pid file.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use vigil_config::ConfigSnapshot;
use vigil_daemon::pid::is_process_running;
use vigil_daemon::signal::send_signal_to_pid;
use vigil_daemon::{DaemonError, Intent, PidFile};

use crate::cli::UserSignal;

const EXIT_POLL: Duration = Duration::from_millis(100);

/// Resolve the pid file from the flag or the configuration.
pub(crate) fn pid_file(
    flag: Option<PathBuf>,
    snapshot: &ConfigSnapshot,
) -> Result<PidFile, DaemonError> {
    flag.or_else(|| snapshot.daemon.pidfile.clone())
        .map(PidFile::new)
        .ok_or_else(|| {
            DaemonError::Custom("no pid file: pass --pid-file or set daemon.pidfile".to_string())
        })
}

/// Send SIGTERM and wait until the process is gone.
pub(crate) fn stop(pid_file: &PidFile, timeout: Duration) -> Result<(), DaemonError> {
    let pid = match pid_file.running_pid() {
        Ok(pid) => pid,
        Err(DaemonError::NotRunning) => {
            println!("vigil is not running");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    info!("Stopping vigil (PID: {})...", pid);
    send_signal_to_pid(pid, Intent::Stop)?;

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !is_process_running(pid) {
            println!("vigil stopped");
            return Ok(());
        }
        thread::sleep(EXIT_POLL);
    }

    warn!("PID {} still running after {:?}", pid, timeout);
    Err(DaemonError::Custom(format!(
        "vigil (PID {}) did not stop within {:?}",
        pid, timeout
    )))
}

pub(crate) fn reload(pid_file: &PidFile) -> Result<(), DaemonError> {
    deliver(pid_file, Intent::Reload)
}

pub(crate) fn signal(pid_file: &PidFile, which: UserSignal) -> Result<(), DaemonError> {
    let intent = match which {
        UserSignal::Usr1 => Intent::UserSignal1,
        UserSignal::Usr2 => Intent::UserSignal2,
    };
    deliver(pid_file, intent)
}

/// Print status. Returns whether the daemon is running.
pub(crate) fn status(pid_file: &PidFile) -> Result<bool, DaemonError> {
    println!("PID file: {}", pid_file.path().display());
    match pid_file.running_pid() {
        Ok(pid) => {
            println!("vigil is RUNNING (PID: {})", pid);
            Ok(true)
        }
        Err(DaemonError::NotRunning) => {
            if pid_file.exists() {
                println!("vigil is NOT RUNNING (stale pid file)");
            } else {
                println!("vigil is NOT RUNNING");
            }
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn deliver(pid_file: &PidFile, intent: Intent) -> Result<(), DaemonError> {
    let pid = pid_file.running_pid()?;
    send_signal_to_pid(pid, intent)?;
    println!("Sent {} to vigil (PID: {})", intent, pid);
    Ok(())
}
