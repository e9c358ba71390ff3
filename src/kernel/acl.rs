//! Directory permissions and POSIX ACLs for tenant trees.

use crate::config::types::{HostError, Result};
use crate::kernel::host::HostOps;
use std::path::Path;

pub const SETFACL: &str = "setfacl";

/// Mode of a tenant root before ACLs are layered on
pub const TENANT_ROOT_MODE: u32 = 0o750;

/// Mode of the shared sites base directory
pub const BASE_DIR_MODE: u32 = 0o751;

/// setfacl argument lists granting rwx to the tenant and root only,
/// on both the access and the default ACL
pub fn owner_only_rules(account_name: &str) -> Vec<Vec<String>> {
    let entries = [
        format!("u:{}:rwx", account_name),
        "u:root:rwx".to_string(),
        "g::---".to_string(),
        "o::---".to_string(),
    ];

    let mut rules = vec![vec!["-b".to_string()]];
    for entry in &entries {
        rules.push(vec!["-m".to_string(), entry.clone()]);
    }
    for entry in &entries {
        rules.push(vec!["-d".to_string(), "-m".to_string(), entry.clone()]);
    }
    rules
}

/// Restrict `path` to its tenant and root
pub fn restrict_to_owner(host: &dyn HostOps, path: &Path, account_name: &str) -> Result<()> {
    host.set_mode(path, TENANT_ROOT_MODE)?;

    if !host.has_program(SETFACL) {
        log::warn!(
            "setfacl not available, {} relies on mode bits only",
            path.display()
        );
        return Ok(());
    }

    let path_arg = path.to_string_lossy();
    let mut failures = Vec::new();
    for rule in owner_only_rules(account_name) {
        let mut args: Vec<&str> = rule.iter().map(String::as_str).collect();
        args.push(&path_arg);

        match host.run(SETFACL, &args).and_then(|out| out.check(SETFACL)) {
            Ok(_) => {}
            Err(e) => failures.push(e.to_string()),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(HostError::Command(failures.join("; ")))
    }
}

/// Base directory owned by root with traverse-only access for others
pub fn secure_base_directory(host: &dyn HostOps, sites_dir: &Path) -> Result<()> {
    host.chown(sites_dir, 0, 0)?;
    host.set_mode(sites_dir, BASE_DIR_MODE)?;
    Ok(())
}
