//! Per-user disk quotas through the `quota` tool suite.

use crate::config::types::{HostError, Result};
use crate::kernel::host::{Account, HostOps};
use std::fs;
use std::path::Path;

pub const SETQUOTA: &str = "setquota";
pub const QUOTA: &str = "quota";

/// Block and inode ceilings handed to setquota
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaLimits {
    pub soft_kb: u64,
    pub hard_kb: u64,
    pub soft_inodes: u64,
    pub hard_inodes: u64,
}

impl QuotaLimits {
    /// Soft and hard block limits are both the full allowance
    pub fn from_mb(max_disk_mb: u64, soft_inodes: u64, hard_inodes: u64) -> Self {
        let kb = max_disk_mb.saturating_mul(1024);
        Self {
            soft_kb: kb,
            hard_kb: kb,
            soft_inodes,
            hard_inodes,
        }
    }
}

/// Device column of the first data row of `df -P`
pub fn parse_df_filesystem(output: &str) -> Option<String> {
    output
        .lines()
        .nth(1)
        .and_then(|row| row.split_whitespace().next())
        .map(str::to_string)
}

/// Filesystem holding `path`
pub fn filesystem_for(host: &dyn HostOps, path: &Path) -> Result<String> {
    let path_arg = path.to_string_lossy();
    let output = host.run("df", &["-P", &path_arg])?.check("df")?;
    parse_df_filesystem(&output.stdout).ok_or_else(|| {
        HostError::Command(format!("unexpected df output for {}", path.display()))
    })
}

/// Install block and inode limits for a user on `filesystem`
pub fn set_user_quota(
    host: &dyn HostOps,
    account: &Account,
    limits: QuotaLimits,
    filesystem: &str,
) -> Result<()> {
    let soft = limits.soft_kb.to_string();
    let hard = limits.hard_kb.to_string();
    let soft_inodes = limits.soft_inodes.to_string();
    let hard_inodes = limits.hard_inodes.to_string();

    host.run(
        SETQUOTA,
        &[
            "-u",
            &account.name,
            &soft,
            &hard,
            &soft_inodes,
            &hard_inodes,
            filesystem,
        ],
    )?
    .check(SETQUOTA)?;

    log::info!(
        "Disk quota for {} set to {} KB on {}",
        account.name,
        limits.hard_kb,
        filesystem
    );
    Ok(())
}

/// Used blocks (KB) from the first device row of `quota -u`.
/// An over-limit marker `*` may trail the figure.
pub fn parse_quota_output(output: &str) -> Option<u64> {
    let mut lines = output.lines();
    while let Some(line) = lines.next() {
        if !line.contains('/') {
            continue;
        }
        let mut fields = line.split_whitespace();
        fields.next();
        // Long device names sit alone and push the numbers to the next line
        let used = match fields.next() {
            Some(used) => used,
            None => match lines.next().and_then(|l| l.split_whitespace().next()) {
                Some(used) => used,
                None => continue,
            },
        };
        if let Ok(kb) = used.trim_end_matches('*').parse::<u64>() {
            return Some(kb);
        }
    }
    None
}

/// Disk usage in MB as accounted by the quota subsystem
pub fn quota_used_mb(host: &dyn HostOps, account_name: &str) -> Option<u64> {
    if !host.has_program(QUOTA) {
        return None;
    }
    let output = host.run(QUOTA, &["-u", account_name]).ok()?;
    if !output.success {
        return None;
    }
    parse_quota_output(&output.stdout).map(|kb| kb / 1024)
}

/// Recursive apparent size of a tree in MB. Symlinks are not followed.
pub fn directory_size_mb(path: &Path) -> u64 {
    directory_size_bytes(path) / (1024 * 1024)
}

fn directory_size_bytes(path: &Path) -> u64 {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return 0,
    };

    if !meta.is_dir() {
        return meta.len();
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Skipping unreadable directory {}: {}", path.display(), e);
            return 0;
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| directory_size_bytes(&entry.path()))
        .sum()
}
