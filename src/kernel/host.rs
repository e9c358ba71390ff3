//! Narrow capability interface over host OS actions.
//!
//! Registry and enforcer logic reach the operating system only through
//! [`HostOps`], so both can run against [`crate::testing::FakeHost`] and
//! alternate backends can be substituted without touching invariant logic.

use crate::config::types::{HostError, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Numeric OS identity of a tenant
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// Captured result of a spawned tool
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            success: true,
            status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: &str) -> Self {
        Self {
            success: false,
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// Convert a non-zero exit into a command error naming the tool
    pub fn check(self, program: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(HostError::Command(format!(
                "{} exited with {:?}: {}",
                program,
                self.status,
                self.stderr.trim()
            )))
        }
    }
}

pub trait HostOps: Send + Sync {
    /// Whether the host offers the Linux isolation primitives at all
    fn is_linux(&self) -> bool;
    /// Resolve an owner reference (numeric uid or account name)
    fn lookup_account(&self, owner: &str) -> Option<Account>;
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;
    /// Whether an external tool can be spawned
    fn has_program(&self, program: &str) -> bool;
    /// Spawn a tool and wait for it; no timeout is imposed
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Directories searched for administrative tools in addition to `PATH`
const SBIN_DIRS: &[&str] = &["/usr/local/sbin", "/usr/sbin", "/sbin"];

/// Real host backed by libc, nix and `std::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }

    fn resolve_program(program: &str) -> Option<PathBuf> {
        let path_dirs = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect::<Vec<_>>())
            .unwrap_or_default();

        path_dirs
            .into_iter()
            .chain(SBIN_DIRS.iter().map(PathBuf::from))
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }
}

impl HostOps for SystemHost {
    fn is_linux(&self) -> bool {
        cfg!(target_os = "linux")
    }

    fn lookup_account(&self, owner: &str) -> Option<Account> {
        use nix::unistd::{Uid, User};

        if owner.is_empty() {
            return None;
        }

        // Owner references may be a uid or an account name
        let by_uid = owner
            .parse::<u32>()
            .ok()
            .and_then(|uid| User::from_uid(Uid::from_raw(uid)).ok().flatten());
        let user = match by_uid {
            Some(user) => user,
            None => User::from_name(owner).ok().flatten()?,
        };

        Some(Account {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
        })
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        use nix::unistd::{chown, Gid, Uid};

        chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    fn has_program(&self, program: &str) -> bool {
        Self::resolve_program(program).is_some()
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let executable = Self::resolve_program(program).unwrap_or_else(|| PathBuf::from(program));
        log::debug!("Running {} {}", program, args.join(" "));

        let output = Command::new(&executable)
            .args(args)
            .output()
            .map_err(|e| HostError::Command(format!("Failed to spawn {}: {}", program, e)))?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Whether the current process runs with euid 0
pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}
