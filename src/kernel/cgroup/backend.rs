//! Cgroup backend abstraction for per-tenant isolation groups.

use crate::config::types::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Controllers every tenant group needs delegated
pub const TENANT_CONTROLLERS: &[&str] = &["cpu", "memory", "pids"];

pub trait CgroupBackend: Send + Sync {
    fn backend_name(&self) -> &str;
    /// Delegate controllers to child groups of the root
    fn enable_controllers(&self, controllers: &[&str]) -> Result<()>;
    fn exists(&self, group: &str) -> bool;
    fn create(&self, group: &str) -> Result<()>;
    /// Delete an empty group; callers migrate members first
    fn remove(&self, group: &str) -> Result<()>;
    fn attach_process(&self, group: &str, pid: u32) -> Result<()>;
    fn list_processes(&self, group: &str) -> Result<Vec<u32>>;
    /// Move a process back to the root group
    fn release_process(&self, pid: u32) -> Result<()>;
    fn set_memory_limit(&self, group: &str, limit_bytes: u64) -> Result<()>;
    fn set_process_limit(&self, group: &str, limit: u32) -> Result<()>;
    fn set_cpu_max(&self, group: &str, quota_usec: u64, period_usec: u64) -> Result<()>;
    fn memory_current(&self, group: &str) -> Result<u64>;
    fn cpu_usage_usec(&self, group: &str) -> Result<u64>;
    fn process_count(&self, group: &str) -> Result<u32>;
    fn get_cgroup_path(&self, group: &str) -> PathBuf;
}

impl<T: CgroupBackend + ?Sized> CgroupBackend for Arc<T> {
    fn backend_name(&self) -> &str {
        (**self).backend_name()
    }
    fn enable_controllers(&self, controllers: &[&str]) -> Result<()> {
        (**self).enable_controllers(controllers)
    }
    fn exists(&self, group: &str) -> bool {
        (**self).exists(group)
    }
    fn create(&self, group: &str) -> Result<()> {
        (**self).create(group)
    }
    fn remove(&self, group: &str) -> Result<()> {
        (**self).remove(group)
    }
    fn attach_process(&self, group: &str, pid: u32) -> Result<()> {
        (**self).attach_process(group, pid)
    }
    fn list_processes(&self, group: &str) -> Result<Vec<u32>> {
        (**self).list_processes(group)
    }
    fn release_process(&self, pid: u32) -> Result<()> {
        (**self).release_process(pid)
    }
    fn set_memory_limit(&self, group: &str, limit_bytes: u64) -> Result<()> {
        (**self).set_memory_limit(group, limit_bytes)
    }
    fn set_process_limit(&self, group: &str, limit: u32) -> Result<()> {
        (**self).set_process_limit(group, limit)
    }
    fn set_cpu_max(&self, group: &str, quota_usec: u64, period_usec: u64) -> Result<()> {
        (**self).set_cpu_max(group, quota_usec, period_usec)
    }
    fn memory_current(&self, group: &str) -> Result<u64> {
        (**self).memory_current(group)
    }
    fn cpu_usage_usec(&self, group: &str) -> Result<u64> {
        (**self).cpu_usage_usec(group)
    }
    fn process_count(&self, group: &str) -> Result<u32> {
        (**self).process_count(group)
    }
    fn get_cgroup_path(&self, group: &str) -> PathBuf {
        (**self).get_cgroup_path(group)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CgroupBackendType {
    V2,
}

/// Detect the unified hierarchy under `root`
pub fn detect_cgroup_backend(root: &Path) -> Option<CgroupBackendType> {
    if root.join("cgroup.controllers").exists() {
        return Some(CgroupBackendType::V2);
    }
    None
}

/// Create the backend for `root`, or None when no usable hierarchy is mounted
pub fn create_cgroup_backend(root: &Path) -> Option<Box<dyn CgroupBackend>> {
    let detected = detect_cgroup_backend(root);

    log::info!(
        "Cgroup backend selection: root={}, detected={:?}",
        root.display(),
        detected
    );

    match detected {
        Some(CgroupBackendType::V2) => {
            Some(Box::new(crate::kernel::cgroup::v2::CgroupV2::new(root)))
        }
        None => {
            log::warn!("cgroup v2 not available, resource limits will not be enforced");
            None
        }
    }
}
