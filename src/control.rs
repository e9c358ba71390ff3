//! Control plane orchestration
//!
//! Ties the registry, the configuration generator and the enforcer together
//! the way an operator-facing caller would: mutate the registry, regenerate
//! and persist proxy documents, apply limits, and audit each step.

use crate::config::loader::HostboxConfig;
use crate::config::types::{
    NewSite, ResourceUsage, Result, Site, SitePatch, SiteStats, UserLimits,
};
use crate::config::validator::{check_system_capabilities, validate_config};
use crate::enforce::{Enforcer, EnforcerSettings};
use crate::kernel::cgroup::CgroupBackend;
use crate::kernel::host::{HostOps, SystemHost};
use crate::observability::{AuditEvent, AuditEventType, AuditLog};
use crate::proxy::{
    ArtifactWriter, ConfigGenerator, FrontDoorPorts, GeneratorSettings, RenderedConfig,
};
use crate::registry::{RuntimeCatalog, RuntimeTable, SiteRegistry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Limits, footprint and live usage of one tenant
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TenantReport {
    pub limits: UserLimits,
    pub site_count: usize,
    pub usage: ResourceUsage,
}

/// Registry totals plus active sites per runtime version
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StatsReport {
    #[serde(flatten)]
    pub sites: SiteStats,
    pub by_runtime: BTreeMap<String, usize>,
}

pub struct ControlPlane {
    config: HostboxConfig,
    registry: SiteRegistry,
    generator: ConfigGenerator,
    writer: ArtifactWriter,
    enforcer: Enforcer,
    audit: AuditLog,
}

impl ControlPlane {
    /// Assemble from explicit parts; nothing is loaded from disk
    pub fn new(
        config: HostboxConfig,
        host: Arc<dyn HostOps>,
        cgroups: Option<Box<dyn CgroupBackend>>,
        audit: AuditLog,
    ) -> Self {
        let catalog: Arc<dyn RuntimeCatalog> = Arc::new(RuntimeTable::from_config(&config));
        let registry = SiteRegistry::from_config(&config, catalog, host.clone());
        let enforcer = Enforcer::new(EnforcerSettings::from_config(&config), cgroups, host);

        Self {
            generator: ConfigGenerator::new(GeneratorSettings::from_config(&config)),
            writer: ArtifactWriter::from_config(&config),
            registry,
            enforcer,
            audit,
            config,
        }
    }

    /// Control plane for the real host with the registry loaded from disk
    pub fn open(config: HostboxConfig) -> Result<Self> {
        validate_config(&config)?;
        for missing in check_system_capabilities(&config) {
            log::warn!("{}", missing);
        }

        let audit = match config.audit_log.as_deref() {
            Some(path) => AuditLog::open(path).unwrap_or_else(|e| {
                log::warn!("Audit log disabled: {}", e);
                AuditLog::disabled()
            }),
            None => AuditLog::disabled(),
        };

        let host: Arc<dyn HostOps> = Arc::new(SystemHost::new());
        let enforcer = Enforcer::from_config(&config, host.clone());
        let catalog: Arc<dyn RuntimeCatalog> = Arc::new(RuntimeTable::from_config(&config));
        let registry = SiteRegistry::from_config(&config, catalog, host);
        registry.load()?;

        Ok(Self {
            generator: ConfigGenerator::new(GeneratorSettings::from_config(&config)),
            writer: ArtifactWriter::from_config(&config),
            registry,
            enforcer,
            audit,
            config,
        })
    }

    pub fn config(&self) -> &HostboxConfig {
        &self.config
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub fn enforcer(&self) -> &Enforcer {
        &self.enforcer
    }

    /// Create state directories, secure the sites base, write empty
    /// snapshots and an initial set of proxy documents
    pub fn init(&self) -> Result<Vec<PathBuf>> {
        for dir in [
            &self.config.data_dir,
            &self.config.output_dir,
            &self.config.log_dir,
            &self.config.sites_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        self.registry.layout().secure_base()?;
        self.registry.save()?;
        self.render_and_write()
    }

    pub fn create_site(&self, request: NewSite) -> Result<Site> {
        let site = self.registry.create(request)?;
        self.audit.record(
            AuditEvent::new(
                AuditEventType::SiteCreated,
                format!("{} on runtime {}", site.domain, site.runtime_version),
            )
            .with_site(&site.id)
            .with_owner(&site.owner_id),
        );
        self.refresh();
        Ok(site)
    }

    pub fn update_site(&self, id: &str, patch: SitePatch) -> Result<Site> {
        let site = self.registry.update(id, patch)?;
        self.audit.record(
            AuditEvent::new(AuditEventType::SiteUpdated, site.domain.clone())
                .with_site(&site.id)
                .with_owner(&site.owner_id),
        );
        self.refresh();
        Ok(site)
    }

    pub fn delete_site(&self, id: &str) -> Result<Site> {
        let site = self.registry.delete(id)?;
        self.audit.record(
            AuditEvent::new(
                AuditEventType::SiteDeleted,
                format!("{} (files kept at {})", site.domain, site.root_path.display()),
            )
            .with_site(&site.id)
            .with_owner(&site.owner_id),
        );
        self.refresh();
        Ok(site)
    }

    pub fn suspend_site(&self, id: &str) -> Result<Site> {
        let site = self.registry.suspend(id)?;
        self.audit.record(
            AuditEvent::new(AuditEventType::SiteSuspended, site.domain.clone())
                .with_site(&site.id)
                .with_owner(&site.owner_id),
        );
        self.refresh();
        Ok(site)
    }

    pub fn unsuspend_site(&self, id: &str) -> Result<Site> {
        let site = self.registry.unsuspend(id)?;
        self.audit.record(
            AuditEvent::new(AuditEventType::SiteUnsuspended, site.domain.clone())
                .with_site(&site.id)
                .with_owner(&site.owner_id),
        );
        self.refresh();
        Ok(site)
    }

    /// Persist limits, then enforce them. Enforcement failures never undo
    /// the persisted record.
    pub fn set_limits(&self, limits: UserLimits) -> Result<()> {
        self.registry.set_user_limit(limits.clone())?;
        self.audit.record(
            AuditEvent::new(
                AuditEventType::LimitsSet,
                format!(
                    "sites={} disk={}MB ram={}MB cpu={}% processes={}",
                    limits.max_sites,
                    limits.max_disk_mb,
                    limits.max_ram_mb,
                    limits.max_cpu_percent,
                    limits.max_processes
                ),
            )
            .with_owner(&limits.owner_id),
        );
        self.apply_limits(limits.owner_id.trim())
    }

    /// Re-apply the stored limits of an owner
    pub fn apply_limits(&self, owner_id: &str) -> Result<()> {
        let limits = self.registry.get_user_limit(owner_id);
        match self.enforcer.apply(&limits) {
            Ok(()) => {
                self.audit.record(
                    AuditEvent::new(AuditEventType::LimitsApplied, "all controls applied")
                        .with_owner(owner_id),
                );
                Ok(())
            }
            Err(e) => {
                self.audit.record(
                    AuditEvent::new(AuditEventType::EnforcementDegraded, e.to_string())
                        .with_owner(owner_id),
                );
                Err(e)
            }
        }
    }

    pub fn remove_limits(&self, owner_id: &str) -> Result<()> {
        self.enforcer.remove(owner_id)?;
        self.audit.record(
            AuditEvent::new(AuditEventType::LimitsRemoved, "isolation group removed")
                .with_owner(owner_id),
        );
        Ok(())
    }

    pub fn usage(&self, owner_id: &str) -> Result<ResourceUsage> {
        self.enforcer.usage(owner_id)
    }

    pub fn tenant(&self, owner_id: &str) -> Result<TenantReport> {
        Ok(TenantReport {
            limits: self.registry.get_user_limit(owner_id),
            site_count: self.registry.count_owner_sites(owner_id),
            usage: self.usage(owner_id)?,
        })
    }

    pub fn stats(&self) -> StatsReport {
        StatsReport {
            sites: self.registry.stats(),
            by_runtime: self.registry.count_by_runtime_version(),
        }
    }

    pub fn render(&self) -> Result<RenderedConfig> {
        let sites = self.registry.get_all();
        let runtimes = self.registry.catalog().instances();
        self.generator
            .render_all(&sites, &runtimes, FrontDoorPorts::from_config(&self.config))
    }

    pub fn render_and_write(&self) -> Result<Vec<PathBuf>> {
        let rendered = self.render()?;
        let written = self.writer.write_all(&rendered)?;
        self.audit.record(AuditEvent::new(
            AuditEventType::ConfigRendered,
            format!("{} documents written", written.len()),
        ));
        Ok(written)
    }

    /// Regenerate documents after a committed mutation. The mutation stands
    /// even when this fails.
    fn refresh(&self) {
        if let Err(e) = self.render_and_write() {
            self.audit
                .record(AuditEvent::new(AuditEventType::RenderFailed, e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{HostError, RuntimeInstance};
    use crate::testing::{FakeHost, MemoryCgroup};

    fn plane(dir: &std::path::Path) -> ControlPlane {
        let config = HostboxConfig {
            data_dir: dir.join("data"),
            sites_dir: dir.join("www"),
            log_dir: dir.join("log"),
            output_dir: dir.join("proxy"),
            audit_log: None,
            runtimes: vec![RuntimeInstance::new("8.3", 9001, 2001)],
            ..HostboxConfig::default()
        };
        ControlPlane::new(
            config,
            Arc::new(FakeHost::new()),
            Some(Box::new(MemoryCgroup::new())),
            AuditLog::disabled(),
        )
    }

    #[test]
    fn test_mutations_regenerate_documents() {
        let dir = tempfile::tempdir().unwrap();
        let plane = plane(dir.path());
        let site = plane.create_site(NewSite::new("A", "a.test", "8.3")).unwrap();

        let front = std::fs::read_to_string(dir.path().join("proxy/Caddyfile.proxy")).unwrap();
        assert!(front.contains("http://a.test {"));

        plane.suspend_site(&site.id).unwrap();
        let front = std::fs::read_to_string(dir.path().join("proxy/Caddyfile.proxy")).unwrap();
        assert!(!front.contains("http://a.test"));
        let instance =
            std::fs::read_to_string(dir.path().join("proxy/Caddyfile.php-8.3")).unwrap();
        assert!(instance.contains("respond \"No sites configured\" 503"));
    }

    #[test]
    fn test_limits_persist_even_when_enforcement_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostboxConfig {
            data_dir: dir.path().join("data"),
            sites_dir: dir.path().join("www"),
            audit_log: None,
            ..HostboxConfig::default()
        };
        let plane = ControlPlane::new(
            config,
            Arc::new(FakeHost::new()),
            Some(Box::new(MemoryCgroup::new().fail_on("memory.max"))),
            AuditLog::disabled(),
        );

        let limits = UserLimits {
            max_ram_mb: 256,
            ..UserLimits::unlimited("alice")
        };
        assert!(matches!(
            plane.set_limits(limits),
            Err(HostError::PartialFailure(_))
        ));
        assert_eq!(plane.registry().get_user_limit("alice").max_ram_mb, 256);
    }

    #[test]
    fn test_tenant_report() {
        let dir = tempfile::tempdir().unwrap();
        let plane = plane(dir.path());
        plane
            .create_site(NewSite::new("A", "a.test", "8.3").with_owner("alice"))
            .unwrap();
        let report = plane.tenant("alice").unwrap();
        assert_eq!(report.site_count, 1);
        assert!(report.limits.is_unlimited());
        assert_eq!(report.usage.owner_id, "alice");
        assert_eq!(plane.stats().by_runtime.get("8.3"), Some(&1));
    }
}
