//! Detach the current process from its terminal.
//!
//! Must run before any tokio runtime or other thread exists: `fork` only
//! carries the calling thread into the child.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::sys::resource::{setrlimit, Resource};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{
    chdir, chown, dup2, fork, setgid, setsid, setuid, ForkResult, Gid, Group, Uid, User,
};
use tracing::debug;
use vigil_config::DaemonSettings;

use crate::error::DaemonError;

/// Supplementary groups to install before dropping privileges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplementaryGroups {
    /// Identity unchanged, leave the list alone.
    Keep,
    /// The configured user's groups, as `initgroups(3)` computes them.
    OfUser(CString, Gid),
    /// Only the target group.
    Only(Gid),
}

/// Turns the current process into a daemon according to [`DaemonSettings`].
#[derive(Debug)]
pub struct Daemonizer<'a> {
    settings: &'a DaemonSettings,
}

impl<'a> Daemonizer<'a> {
    pub fn new(settings: &'a DaemonSettings) -> Self {
        Self { settings }
    }

    /// Double-fork into the background.
    ///
    /// Only the grandchild returns; both parents exit with status 0.
    pub fn daemonize(&self) -> Result<(), DaemonError> {
        let (uid, gid) = self.resolve_ids()?;

        if let Some(pidfile) = &self.settings.pidfile {
            if uid != Uid::current() {
                Self::hand_over_pidfile(pidfile, uid, gid)?;
            }
        }

        if self.settings.prevent_core {
            setrlimit(Resource::RLIMIT_CORE, 0, 0)
                .map_err(|e| DaemonError::Custom(format!("Failed to disable core dumps: {}", e)))?;
        }

        // SAFETY: called before any other thread is started.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { .. }) => std::process::exit(0),
            Ok(ForkResult::Child) => {}
            Err(e) => return Err(DaemonError::ForkFailed(e.to_string())),
        }

        let groups = self.supplementary_groups(uid, gid)?;
        Self::set_supplementary_groups(&groups)?;
        if gid != Gid::current() {
            setgid(gid)
                .map_err(|e| DaemonError::PrivilegeDrop(format!("setgid({}): {}", gid, e)))?;
        }
        if uid != Uid::current() {
            setuid(uid)
                .map_err(|e| DaemonError::PrivilegeDrop(format!("setuid({}): {}", uid, e)))?;
        }

        chdir("/").map_err(|e| DaemonError::Custom(format!("Failed to chdir to /: {}", e)))?;
        setsid().map_err(|e| DaemonError::Custom(format!("Failed to create session: {}", e)))?;
        umask(Mode::from_bits_truncate(0o022));

        // SAFETY: still single-threaded.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { .. }) => std::process::exit(0),
            Ok(ForkResult::Child) => {}
            Err(e) => return Err(DaemonError::ForkFailed(e.to_string())),
        }

        Self::redirect_stdio()?;
        debug!(pid = std::process::id(), "Daemonized");
        Ok(())
    }

    /// Target uid and gid. Unset user or group keeps the current one; a user
    /// without a group gets the user's primary group.
    pub fn resolve_ids(&self) -> Result<(Uid, Gid), DaemonError> {
        let user = match &self.settings.user {
            Some(name) => Some(Self::lookup("user", name, User::from_name(name))?),
            None => None,
        };

        let gid = match &self.settings.group {
            Some(name) => Self::lookup("group", name, Group::from_name(name))?.gid,
            None => user.as_ref().map(|u| u.gid).unwrap_or_else(Gid::current),
        };
        let uid = user.map(|u| u.uid).unwrap_or_else(Uid::current);

        Ok((uid, gid))
    }

    /// Which supplementary groups to install when switching to `uid`/`gid`.
    pub fn supplementary_groups(
        &self,
        uid: Uid,
        gid: Gid,
    ) -> Result<SupplementaryGroups, DaemonError> {
        if uid == Uid::current() && gid == Gid::current() {
            return Ok(SupplementaryGroups::Keep);
        }
        match &self.settings.user {
            Some(name) => {
                let name = CString::new(name.as_str())
                    .map_err(|e| DaemonError::PrivilegeDrop(format!("user '{}': {}", name, e)))?;
                Ok(SupplementaryGroups::OfUser(name, gid))
            }
            None => Ok(SupplementaryGroups::Only(gid)),
        }
    }

    #[cfg(not(target_vendor = "apple"))]
    fn set_supplementary_groups(groups: &SupplementaryGroups) -> Result<(), DaemonError> {
        use nix::unistd::{initgroups, setgroups};

        match groups {
            SupplementaryGroups::Keep => Ok(()),
            SupplementaryGroups::OfUser(name, gid) => initgroups(name, *gid).map_err(|e| {
                DaemonError::PrivilegeDrop(format!("initgroups({:?}): {}", name, e))
            }),
            SupplementaryGroups::Only(gid) => setgroups(&[*gid])
                .map_err(|e| DaemonError::PrivilegeDrop(format!("setgroups([{}]): {}", gid, e))),
        }
    }

    #[cfg(target_vendor = "apple")]
    fn set_supplementary_groups(groups: &SupplementaryGroups) -> Result<(), DaemonError> {
        if *groups != SupplementaryGroups::Keep {
            tracing::warn!("Supplementary groups are left unchanged on this platform");
        }
        Ok(())
    }

    fn lookup<T>(kind: &str, name: &str, found: nix::Result<Option<T>>) -> Result<T, DaemonError> {
        found
            .map_err(|e| DaemonError::PrivilegeDrop(format!("{} '{}': {}", kind, name, e)))?
            .ok_or_else(|| DaemonError::PrivilegeDrop(format!("unknown {} '{}'", kind, name)))
    }

    /// Pre-create the pid file so the unprivileged daemon can write it.
    fn hand_over_pidfile(path: &Path, uid: Uid, gid: Gid) -> Result<(), DaemonError> {
        let creation_error = |reason: String| DaemonError::PidFileCreation {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| creation_error(e.to_string()))?;
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| creation_error(e.to_string()))?;
        chown(path, Some(uid), Some(gid)).map_err(|e| creation_error(e.to_string()))?;
        Ok(())
    }

    fn redirect_stdio() -> Result<(), DaemonError> {
        let dev_null = OpenOptions::new().read(true).write(true).open("/dev/null")?;
        let fd = dev_null.as_raw_fd();

        for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            dup2(fd, target)
                .map_err(|e| DaemonError::Custom(format!("Failed to redirect stdio: {}", e)))?;
        }
        Ok(())
    }
}
