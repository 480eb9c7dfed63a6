use super::*;
use tempfile::TempDir;

fn temp_pid_file() -> (TempDir, PidFile) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vigil.pid");
    (dir, PidFile::new(path))
}

/// PID of a process that has already exited and been reaped.
#[cfg(unix)]
fn exited_pid() -> u32 {
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

#[test]
fn test_pid_file_new() {
    let pid = PidFile::new("/tmp/vigil.pid");
    assert_eq!(pid.path(), Path::new("/tmp/vigil.pid"));
    assert!(!pid.is_owned());
}

#[test]
fn test_missing_file_reads_none() {
    let (_dir, pid) = temp_pid_file();
    assert!(!pid.exists());
    assert!(pid.read_pid().unwrap().is_none());
    assert!(matches!(pid.running_pid(), Err(DaemonError::NotRunning)));
}

#[test]
fn test_write_and_read_pid() {
    let (_dir, mut pid) = temp_pid_file();
    pid.write_pid(12345).unwrap();

    assert!(pid.exists());
    assert_eq!(pid.read_pid().unwrap(), Some(12345));
    assert!(pid.is_owned());
}

#[test]
fn test_garbage_contents() {
    let (_dir, pid) = temp_pid_file();
    fs::write(pid.path(), "not-a-pid").unwrap();

    let err = pid.read_pid().unwrap_err();
    assert!(matches!(err, DaemonError::PidFileRead { .. }));
    assert!(err.to_string().contains("Invalid PID format"));
}

#[test]
fn test_empty_file_reads_none() {
    let (_dir, pid) = temp_pid_file();
    fs::write(pid.path(), "").unwrap();
    assert!(pid.read_pid().unwrap().is_none());

    fs::write(pid.path(), " \n").unwrap();
    assert!(pid.read_pid().unwrap().is_none());
}

#[test]
fn test_try_acquire_pre_created_empty_file() {
    let (_dir, mut pid) = temp_pid_file();
    fs::write(pid.path(), "").unwrap();

    pid.try_acquire().unwrap();

    assert!(pid.is_owned());
    assert_eq!(pid.read_pid().unwrap(), Some(std::process::id()));
}

#[test]
fn test_try_acquire_new() {
    let (_dir, mut pid) = temp_pid_file();
    pid.try_acquire().unwrap();

    assert!(pid.is_owned());
    assert_eq!(pid.read_pid().unwrap(), Some(std::process::id()));
    assert_eq!(pid.running_pid().unwrap(), std::process::id());
}

#[test]
fn test_try_acquire_own_pid_again() {
    let (_dir, mut first) = temp_pid_file();
    first.try_acquire().unwrap();

    let mut second = PidFile::new(first.path());
    assert!(second.try_acquire().is_ok());
}

#[cfg(unix)]
#[test]
fn test_try_acquire_refuses_live_process() {
    let (_dir, mut pid) = temp_pid_file();
    let mut sleeper = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .unwrap();
    fs::write(pid.path(), sleeper.id().to_string()).unwrap();

    let result = pid.try_acquire();
    sleeper.kill().unwrap();
    sleeper.wait().unwrap();

    assert!(matches!(
        result,
        Err(DaemonError::AlreadyRunning { pid: running, .. }) if running == sleeper.id()
    ));
    assert!(!pid.is_owned());
    assert!(pid.exists());
}

#[cfg(unix)]
#[test]
fn test_try_acquire_replaces_stale_file() {
    let (_dir, mut pid) = temp_pid_file();
    fs::write(pid.path(), exited_pid().to_string()).unwrap();

    pid.try_acquire().unwrap();
    assert_eq!(pid.read_pid().unwrap(), Some(std::process::id()));
}

#[test]
fn test_release_only_when_owned() {
    let (_dir, mut pid) = temp_pid_file();
    fs::write(pid.path(), "12345").unwrap();

    pid.release().unwrap();
    assert!(pid.exists(), "a file written by someone else must be left alone");

    pid.write_pid(12345).unwrap();
    pid.release().unwrap();
    assert!(!pid.exists());
    assert!(!pid.is_owned());

    // Second release is a no-op.
    pid.release().unwrap();
}

#[test]
fn test_release_tolerates_missing_file() {
    let (_dir, mut pid) = temp_pid_file();
    pid.write_pid(12345).unwrap();
    fs::remove_file(pid.path()).unwrap();

    assert!(pid.release().is_ok());
}

#[test]
fn test_creates_parent_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run").join("vigil").join("vigil.pid");
    let mut pid = PidFile::new(&path);

    pid.write_pid(12345).unwrap();
    assert!(path.exists());
}

#[test]
fn test_drop_removes_owned_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vigil.pid");

    {
        let mut pid = PidFile::new(&path);
        pid.write_pid(12345).unwrap();
        assert!(path.exists());
    }

    assert!(!path.exists());
}

#[cfg(unix)]
#[test]
fn test_is_process_running() {
    assert!(is_process_running(std::process::id()));
    assert!(!is_process_running(exited_pid()));
    assert!(!is_process_running(0));
    assert!(!is_process_running(u32::MAX));
}
