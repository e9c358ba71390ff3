//! Resource isolation enforcer
//!
//! Maps declarative [`UserLimits`] onto host controls: a per-tenant cgroup v2
//! group (CPU, memory, process count), a per-user disk quota, and owner-only
//! ACLs on the tenant's directory tree. Each control is attempted
//! independently; whatever could not be applied is reported together as a
//! [`HostError::PartialFailure`] while the controls that did apply stay in
//! place.
//!
//! Hosts without the primitives degrade to no-ops: a non-Linux host skips
//! everything, a missing cgroup v2 hierarchy skips the cgroup controls, and
//! missing `setquota`/`setfacl` binaries skip the matching control.

use crate::config::loader::HostboxConfig;
use crate::config::types::{
    Control, ControlFailure, HostError, ResourceUsage, Result, UserLimits,
};
use crate::config::validator::validate_path_component;
use crate::kernel::acl;
use crate::kernel::cgroup::{create_cgroup_backend, CgroupBackend, TENANT_CONTROLLERS};
use crate::kernel::host::HostOps;
use crate::kernel::quota::{self, QuotaLimits};
use std::path::PathBuf;
use std::sync::Arc;

/// Scheduling period written alongside every CPU quota
pub const DEFAULT_CPU_PERIOD_USEC: u64 = 100_000;
pub const DEFAULT_SOFT_INODES: u64 = 100_000;
pub const DEFAULT_HARD_INODES: u64 = 150_000;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnforcerSettings {
    pub cgroup_root: PathBuf,
    pub sites_dir: PathBuf,
    pub group_prefix: String,
    pub cpu_period_usec: u64,
    pub soft_inodes: u64,
    pub hard_inodes: u64,
}

impl EnforcerSettings {
    pub fn from_config(config: &HostboxConfig) -> Self {
        Self {
            cgroup_root: config.cgroup_root.clone(),
            sites_dir: config.sites_dir.clone(),
            group_prefix: config.group_prefix.clone(),
            cpu_period_usec: DEFAULT_CPU_PERIOD_USEC,
            soft_inodes: DEFAULT_SOFT_INODES,
            hard_inodes: DEFAULT_HARD_INODES,
        }
    }
}

/// `cpu.max` pair for a percentage of one core
pub fn cpu_max(percent: u32, period_usec: u64) -> (u64, u64) {
    (u64::from(percent) * period_usec / 100, period_usec)
}

/// Group names are single cgroupfs path components
fn sanitize_group_component(owner: &str) -> String {
    owner
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub struct Enforcer {
    settings: EnforcerSettings,
    cgroups: Option<Box<dyn CgroupBackend>>,
    host: Arc<dyn HostOps>,
}

impl Enforcer {
    pub fn new(
        settings: EnforcerSettings,
        cgroups: Option<Box<dyn CgroupBackend>>,
        host: Arc<dyn HostOps>,
    ) -> Self {
        Self {
            settings,
            cgroups,
            host,
        }
    }

    /// Enforcer for the real host, probing for cgroup v2 under the configured root
    pub fn from_config(config: &HostboxConfig, host: Arc<dyn HostOps>) -> Self {
        let settings = EnforcerSettings::from_config(config);
        let cgroups = if host.is_linux() {
            create_cgroup_backend(&settings.cgroup_root)
        } else {
            None
        };
        Self::new(settings, cgroups, host)
    }

    pub fn settings(&self) -> &EnforcerSettings {
        &self.settings
    }

    /// Name of the active cgroup backend, if any
    pub fn backend_name(&self) -> Option<&str> {
        self.cgroups.as_deref().map(|c| c.backend_name())
    }

    /// Isolation group name of a tenant
    pub fn group_name(&self, owner_id: &str) -> String {
        format!(
            "{}-{}",
            self.settings.group_prefix,
            sanitize_group_component(owner_id)
        )
    }

    /// Directory holding every site of a tenant
    pub fn tenant_root(&self, owner_id: &str) -> PathBuf {
        self.settings.sites_dir.join(owner_id)
    }

    /// Apply every non-zero limit of `limits` to the host
    pub fn apply(&self, limits: &UserLimits) -> Result<()> {
        let owner = limits.owner_id.as_str();
        validate_path_component("owner_id", owner)?;

        if !self.host.is_linux() {
            log::debug!("Resource isolation unsupported on this host, skipping {}", owner);
            return Ok(());
        }

        let mut failures = Vec::new();

        match self.cgroups.as_deref() {
            Some(cgroups) => self.apply_cgroup_limits(cgroups, limits, &mut failures),
            None => log::warn!(
                "cgroup v2 not available, CPU/memory/process limits for {} not enforced",
                owner
            ),
        }

        if limits.max_disk_mb > 0 {
            if let Err(e) = self.apply_disk_quota(limits) {
                failures.push(ControlFailure {
                    control: Control::Disk,
                    message: e.to_string(),
                });
            }
        }

        if let Err(e) = self.apply_acl(owner) {
            failures.push(ControlFailure {
                control: Control::Acl,
                message: e.to_string(),
            });
        }

        if failures.is_empty() {
            log::info!("Resource limits applied for {}", owner);
            Ok(())
        } else {
            for failure in &failures {
                log::warn!("Limit not applied for {}: {}", owner, failure);
            }
            Err(HostError::PartialFailure(failures))
        }
    }

    fn apply_cgroup_limits(
        &self,
        cgroups: &dyn CgroupBackend,
        limits: &UserLimits,
        failures: &mut Vec<ControlFailure>,
    ) {
        let group = self.group_name(&limits.owner_id);

        if let Err(e) = cgroups.enable_controllers(TENANT_CONTROLLERS) {
            log::warn!("Could not delegate controllers to {}: {}", group, e);
        }

        if let Err(e) = cgroups.create(&group) {
            failures.push(ControlFailure {
                control: Control::Group,
                message: e.to_string(),
            });
            return;
        }

        if limits.max_cpu_percent > 0 {
            let (quota, period) = cpu_max(limits.max_cpu_percent, self.settings.cpu_period_usec);
            if let Err(e) = cgroups.set_cpu_max(&group, quota, period) {
                failures.push(ControlFailure {
                    control: Control::Cpu,
                    message: e.to_string(),
                });
            }
        }

        if limits.max_ram_mb > 0 {
            let bytes = limits.max_ram_mb.saturating_mul(BYTES_PER_MB);
            if let Err(e) = cgroups.set_memory_limit(&group, bytes) {
                failures.push(ControlFailure {
                    control: Control::Memory,
                    message: e.to_string(),
                });
            }
        }

        if limits.max_processes > 0 {
            if let Err(e) = cgroups.set_process_limit(&group, limits.max_processes) {
                failures.push(ControlFailure {
                    control: Control::Processes,
                    message: e.to_string(),
                });
            }
        }
    }

    fn apply_disk_quota(&self, limits: &UserLimits) -> Result<()> {
        let host = self.host.as_ref();
        if !host.has_program(quota::SETQUOTA) {
            log::warn!("setquota not available, disk quotas disabled");
            return Ok(());
        }

        let account = host.lookup_account(&limits.owner_id).ok_or_else(|| {
            HostError::NotFound(format!("OS account for {}", limits.owner_id))
        })?;
        let filesystem = quota::filesystem_for(host, &self.settings.sites_dir)?;
        let quota_limits = QuotaLimits::from_mb(
            limits.max_disk_mb,
            self.settings.soft_inodes,
            self.settings.hard_inodes,
        );
        quota::set_user_quota(host, &account, quota_limits, &filesystem)
    }

    fn apply_acl(&self, owner: &str) -> Result<()> {
        let root = self.tenant_root(owner);
        if !root.is_dir() {
            log::debug!("No tenant directory at {}, ACL skipped", root.display());
            return Ok(());
        }

        let account = self
            .host
            .lookup_account(owner)
            .ok_or_else(|| HostError::NotFound(format!("OS account for {}", owner)))?;
        acl::restrict_to_owner(self.host.as_ref(), &root, &account.name)
    }

    /// Live resource usage of a tenant. Unreadable counters read as zero.
    pub fn usage(&self, owner_id: &str) -> Result<ResourceUsage> {
        validate_path_component("owner_id", owner_id)?;
        let mut usage = ResourceUsage {
            owner_id: owner_id.to_string(),
            ..ResourceUsage::default()
        };

        if !self.host.is_linux() {
            return Ok(usage);
        }

        if let Some(cgroups) = self.cgroups.as_deref() {
            let group = self.group_name(owner_id);
            if cgroups.exists(&group) {
                usage.ram_used_mb = cgroups.memory_current(&group).unwrap_or(0) / BYTES_PER_MB;
                usage.cpu_usage_micros = cgroups.cpu_usage_usec(&group).unwrap_or(0);
                usage.process_count = cgroups.process_count(&group).unwrap_or(0);
            }
        }

        let account_name = self
            .host
            .lookup_account(owner_id)
            .map(|a| a.name)
            .unwrap_or_else(|| owner_id.to_string());
        // Directory scan is the expensive fallback; callers rate-limit usage reads
        usage.disk_used_mb = quota::quota_used_mb(self.host.as_ref(), &account_name)
            .unwrap_or_else(|| quota::directory_size_mb(&self.tenant_root(owner_id)));

        Ok(usage)
    }

    /// Place a running process into the tenant's isolation group
    pub fn add_process(&self, owner_id: &str, pid: u32) -> Result<()> {
        validate_path_component("owner_id", owner_id)?;
        if !self.host.is_linux() {
            return Ok(());
        }
        let Some(cgroups) = self.cgroups.as_deref() else {
            log::warn!("cgroup v2 not available, pid {} left unconfined", pid);
            return Ok(());
        };

        let group = self.group_name(owner_id);
        if !cgroups.exists(&group) {
            return Err(HostError::NotFound(format!("isolation group {}", group)));
        }
        cgroups.attach_process(&group, pid)?;
        log::debug!("Attached pid {} to {}", pid, group);
        Ok(())
    }

    /// Tear down the tenant's isolation group, migrating members to the root group
    pub fn remove(&self, owner_id: &str) -> Result<()> {
        validate_path_component("owner_id", owner_id)?;
        if !self.host.is_linux() {
            return Ok(());
        }
        let Some(cgroups) = self.cgroups.as_deref() else {
            return Ok(());
        };

        let group = self.group_name(owner_id);
        if !cgroups.exists(&group) {
            return Ok(());
        }

        for pid in cgroups.list_processes(&group)? {
            cgroups.release_process(pid)?;
        }
        cgroups.remove(&group)?;
        log::info!("Removed isolation group {}", group);
        Ok(())
    }
}
