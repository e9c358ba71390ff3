/// Site registry: authoritative in-memory state with durable snapshots
use crate::config::loader::HostboxConfig;
use crate::config::types::{
    HostError, NewSite, Result, Site, SitePatch, SiteStats, SiteStatus, UserLimits,
    DEFAULT_PUBLIC_PATH,
};
use crate::config::validator::{
    normalize_hostname, validate_env_key, validate_hostname, validate_path_component,
    validate_public_path, validate_worker_file,
};
use crate::kernel::host::HostOps;
use crate::registry::layout::SiteLayout;
use crate::registry::runtime::RuntimeCatalog;
use crate::registry::store::RegistryStore;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct State {
    sites: BTreeMap<String, Site>,
    /// Normalized hostname to owning site id
    hostnames: HashMap<String, String>,
    limits: BTreeMap<String, UserLimits>,
}

impl State {
    fn index(&mut self, site: &Site) {
        for hostname in site.hostnames() {
            self.hostnames.insert(hostname.to_string(), site.id.clone());
        }
    }

    fn unindex(&mut self, site: &Site) {
        for hostname in site.hostnames() {
            if self.hostnames.get(hostname) == Some(&site.id) {
                self.hostnames.remove(hostname);
            }
        }
    }

    /// First hostname already owned by a site other than `except`
    fn claimed<'a>(
        &self,
        hostnames: &'a [String],
        except: Option<&str>,
    ) -> Option<(&'a str, String)> {
        hostnames.iter().find_map(|hostname| match self.hostnames.get(hostname) {
            Some(owner) if Some(owner.as_str()) != except => {
                Some((hostname.as_str(), owner.clone()))
            }
            _ => None,
        })
    }

    fn owner_site_count(&self, owner_id: &str) -> usize {
        self.sites.values().filter(|s| s.owner_id == owner_id).count()
    }
}

/// Single-writer registry of sites and tenant limits.
///
/// Every mutation validates first, then changes memory and rewrites the
/// snapshot while still holding the write lock. A failed snapshot write
/// restores the previous in-memory state.
pub struct SiteRegistry {
    store: RegistryStore,
    layout: SiteLayout,
    catalog: Arc<dyn RuntimeCatalog>,
    state: RwLock<State>,
}

impl SiteRegistry {
    pub fn new(store: RegistryStore, layout: SiteLayout, catalog: Arc<dyn RuntimeCatalog>) -> Self {
        Self {
            store,
            layout,
            catalog,
            state: RwLock::new(State::default()),
        }
    }

    pub fn from_config(
        config: &HostboxConfig,
        catalog: Arc<dyn RuntimeCatalog>,
        host: Arc<dyn HostOps>,
    ) -> Self {
        Self::new(
            RegistryStore::from_config(config),
            SiteLayout::from_config(config, host),
            catalog,
        )
    }

    pub fn layout(&self) -> &SiteLayout {
        &self.layout
    }

    pub fn catalog(&self) -> &dyn RuntimeCatalog {
        self.catalog.as_ref()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild state from the last snapshot, replacing whatever is in memory
    pub fn load(&self) -> Result<()> {
        let sites = self.store.load_sites()?;
        let limits = match self.store.load_limits() {
            Ok(limits) => limits,
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable {}: {}",
                    self.store.limits_file().display(),
                    e
                );
                Vec::new()
            }
        };

        let mut state = State::default();
        for mut site in sites {
            site.domain = normalize_hostname(&site.domain);
            site.aliases = site.aliases.iter().map(|a| normalize_hostname(a)).collect();
            state.sites.insert(site.id.clone(), site);
        }
        for site in state.sites.values() {
            for hostname in site.hostnames() {
                let hostname = hostname.to_string();
                match state.hostnames.get(&hostname) {
                    Some(owner) => log::warn!(
                        "Hostname {} of site {} already claimed by {}, keeping the first claim",
                        hostname,
                        site.id,
                        owner
                    ),
                    None => {
                        state.hostnames.insert(hostname, site.id.clone());
                    }
                }
            }
        }
        for limit in limits {
            state.limits.insert(limit.owner_id.clone(), limit);
        }

        log::info!(
            "Loaded {} sites and {} limit records",
            state.sites.len(),
            state.limits.len()
        );
        *self.write() = state;
        Ok(())
    }

    /// Rewrite both snapshots from current state
    pub fn save(&self) -> Result<()> {
        let state = self.write();
        self.store.save_sites(state.sites.values())?;
        self.store.save_limits(state.limits.values())
    }

    pub fn create(&self, request: NewSite) -> Result<Site> {
        let mut state = self.write();

        let domain = normalize_hostname(&request.domain);
        let aliases: Vec<String> = request.aliases.iter().map(|a| normalize_hostname(a)).collect();
        let hostnames = check_hostnames(&domain, &aliases)?;

        if let Some((hostname, site_id)) = state.claimed(&hostnames, None) {
            return Err(HostError::Conflict {
                hostname: hostname.to_string(),
                site_id,
            });
        }

        self.check_runtime(&request.runtime_version)?;

        let owner_id = request.owner_id.trim().to_string();
        if !self.layout.is_exempt(&owner_id) {
            if let Some(limit) = state.limits.get(&owner_id) {
                if limit.max_sites > 0
                    && state.owner_site_count(&owner_id) >= limit.max_sites as usize
                {
                    return Err(HostError::QuotaExceeded {
                        owner: owner_id,
                        limit: limit.max_sites,
                    });
                }
            }
            validate_path_component("owner_id", &owner_id)?;
        }

        let id = match request.id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };
        validate_path_component("site id", &id)?;
        if state.sites.contains_key(&id) {
            return Err(HostError::Validation(format!("site id {} already exists", id)));
        }

        let public_path = request
            .public_path
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PUBLIC_PATH.to_string());
        validate_public_path(&public_path)?;
        validate_worker_file(&request.worker_file)?;
        for key in request.environment.keys() {
            validate_env_key(key)?;
        }

        let root_path = request
            .root_path
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| self.layout.default_root(&owner_id, &domain));
        self.layout.check_root(&owner_id, &root_path)?;
        let name = if request.name.trim().is_empty() {
            domain.clone()
        } else {
            request.name
        };

        let now = Utc::now();
        let site = Site {
            id,
            name,
            domain,
            aliases,
            runtime_version: request.runtime_version,
            root_path,
            public_path,
            status: request.status.unwrap_or_default(),
            worker_mode: request.worker_mode,
            worker_file: request.worker_file,
            worker_num: request.worker_num,
            environment: request.environment,
            owner_id,
            created_at: now,
            updated_at: now,
        };

        let provisioned = self.layout.materialize(&site)?;

        state.index(&site);
        state.sites.insert(site.id.clone(), site.clone());

        if let Err(e) = self.store.save_sites(state.sites.values()) {
            state.unindex(&site);
            state.sites.remove(&site.id);
            self.layout.rollback(&provisioned);
            return Err(e);
        }

        log::info!("Created site {} ({})", site.id, site.domain);
        Ok(site)
    }

    pub fn get(&self, id: &str) -> Result<Site> {
        self.read()
            .sites
            .get(id)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("site {}", id)))
    }

    pub fn get_by_domain(&self, hostname: &str) -> Result<Site> {
        let hostname = normalize_hostname(hostname);
        let state = self.read();
        state
            .hostnames
            .get(&hostname)
            .and_then(|id| state.sites.get(id))
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("site for hostname {}", hostname)))
    }

    /// Sites of one owner ordered by id; an empty filter lists every site
    pub fn list(&self, owner_filter: &str) -> Vec<Site> {
        self.read()
            .sites
            .values()
            .filter(|s| owner_filter.is_empty() || s.owner_id == owner_filter)
            .cloned()
            .collect()
    }

    pub fn get_all(&self) -> Vec<Site> {
        self.list("")
    }

    pub fn update(&self, id: &str, patch: SitePatch) -> Result<Site> {
        let mut state = self.write();
        let current = state
            .sites
            .get(id)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("site {}", id)))?;

        let mut next = current.clone();

        if let Some(name) = patch.name.filter(|n| !n.is_empty()) {
            next.name = name;
        }
        if let Some(domain) = patch.domain.filter(|d| !d.trim().is_empty()) {
            next.domain = normalize_hostname(&domain);
        }
        if let Some(aliases) = patch.aliases {
            next.aliases = aliases.iter().map(|a| normalize_hostname(a)).collect();
        }
        if next.domain != current.domain || next.aliases != current.aliases {
            let hostnames = check_hostnames(&next.domain, &next.aliases)?;
            if let Some((hostname, site_id)) = state.claimed(&hostnames, Some(id)) {
                return Err(HostError::Conflict {
                    hostname: hostname.to_string(),
                    site_id,
                });
            }
        }

        if let Some(version) = patch.runtime_version.filter(|v| !v.is_empty()) {
            if version != current.runtime_version {
                self.check_runtime(&version)?;
            }
            next.runtime_version = version;
        }
        if let Some(public_path) = patch.public_path.filter(|p| !p.is_empty()) {
            validate_public_path(&public_path)?;
            next.public_path = public_path;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(worker_mode) = patch.worker_mode {
            next.worker_mode = worker_mode;
        }
        if let Some(worker_file) = patch.worker_file.filter(|f| !f.is_empty()) {
            validate_worker_file(&worker_file)?;
            next.worker_file = worker_file;
        }
        if let Some(worker_num) = patch.worker_num.filter(|n| *n > 0) {
            next.worker_num = worker_num;
        }
        if let Some(environment) = patch.environment {
            for key in environment.keys() {
                validate_env_key(key)?;
            }
            next.environment = environment;
        }

        next.updated_at = Utc::now();
        self.commit_replacement(&mut state, &current, next)
    }

    /// Swap `current` for `next` in memory and on disk, or neither
    fn commit_replacement(&self, state: &mut State, current: &Site, next: Site) -> Result<Site> {
        state.unindex(current);
        state.index(&next);
        state.sites.insert(next.id.clone(), next.clone());

        if let Err(e) = self.store.save_sites(state.sites.values()) {
            state.unindex(&next);
            state.index(current);
            state.sites.insert(current.id.clone(), current.clone());
            return Err(e);
        }
        Ok(next)
    }

    /// Drop a site from the registry. Its files stay on disk.
    pub fn delete(&self, id: &str) -> Result<Site> {
        let mut state = self.write();
        let site = state
            .sites
            .remove(id)
            .ok_or_else(|| HostError::NotFound(format!("site {}", id)))?;
        state.unindex(&site);

        if let Err(e) = self.store.save_sites(state.sites.values()) {
            state.index(&site);
            state.sites.insert(site.id.clone(), site);
            return Err(e);
        }

        log::info!("Deleted site {} ({})", site.id, site.domain);
        Ok(site)
    }

    pub fn suspend(&self, id: &str) -> Result<Site> {
        self.set_status(id, SiteStatus::Suspended)
    }

    pub fn unsuspend(&self, id: &str) -> Result<Site> {
        self.set_status(id, SiteStatus::Active)
    }

    fn set_status(&self, id: &str, status: SiteStatus) -> Result<Site> {
        let mut state = self.write();
        let current = state
            .sites
            .get(id)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("site {}", id)))?;

        let mut next = current.clone();
        next.status = status;
        next.updated_at = Utc::now();
        let site = self.commit_replacement(&mut state, &current, next)?;
        log::info!("Site {} is now {}", site.id, site.status);
        Ok(site)
    }

    /// Insert or replace the limits of one owner
    pub fn set_user_limit(&self, limits: UserLimits) -> Result<()> {
        let owner_id = limits.owner_id.trim().to_string();
        validate_path_component("owner_id", &owner_id)?;
        let limits = UserLimits { owner_id, ..limits };

        let mut state = self.write();
        let previous = state.limits.insert(limits.owner_id.clone(), limits.clone());

        if let Err(e) = self.store.save_limits(state.limits.values()) {
            match previous {
                Some(previous) => {
                    state.limits.insert(previous.owner_id.clone(), previous);
                }
                None => {
                    state.limits.remove(&limits.owner_id);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Limits of an owner; unknown owners are unlimited
    pub fn get_user_limit(&self, owner_id: &str) -> UserLimits {
        self.read()
            .limits
            .get(owner_id)
            .cloned()
            .unwrap_or_else(|| UserLimits::unlimited(owner_id))
    }

    pub fn list_user_limits(&self) -> Vec<UserLimits> {
        self.read().limits.values().cloned().collect()
    }

    /// Active sites per runtime version
    pub fn count_by_runtime_version(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for site in self.read().sites.values().filter(|s| s.is_active()) {
            *counts.entry(site.runtime_version.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn stats(&self) -> SiteStats {
        let state = self.read();
        SiteStats {
            total: state.sites.len(),
            active: state.sites.values().filter(|s| s.is_active()).count(),
        }
    }

    pub fn count_owner_sites(&self, owner_id: &str) -> usize {
        self.read().owner_site_count(owner_id)
    }

    fn check_runtime(&self, version: &str) -> Result<()> {
        if self.catalog.is_enabled(version) {
            Ok(())
        } else {
            Err(HostError::Validation(format!(
                "runtime version {:?} is not an enabled instance",
                version
            )))
        }
    }
}

/// Syntax-check a site's hostnames and reject repeats within the request
fn check_hostnames(domain: &str, aliases: &[String]) -> Result<Vec<String>> {
    let mut hostnames = Vec::with_capacity(aliases.len() + 1);
    let mut seen = HashSet::new();
    for hostname in std::iter::once(domain).chain(aliases.iter().map(String::as_str)) {
        validate_hostname(hostname)?;
        if !seen.insert(hostname) {
            return Err(HostError::Validation(format!(
                "hostname {} listed more than once",
                hostname
            )));
        }
        hostnames.push(hostname.to_string());
    }
    Ok(hostnames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::RuntimeInstance;
    use crate::testing::FakeHost;
    use std::path::Path;

    fn registry(dir: &Path) -> SiteRegistry {
        let host: Arc<dyn HostOps> = Arc::new(FakeHost::new());
        let catalog: Arc<dyn RuntimeCatalog> = Arc::new(vec![
            RuntimeInstance::new("8.3", 9001, 2001),
            RuntimeInstance {
                enabled: false,
                ..RuntimeInstance::new("8.1", 9002, 2002)
            },
        ]);
        SiteRegistry::new(
            RegistryStore::new(&dir.join("data")),
            SiteLayout::new(&dir.join("www"), &dir.join("log"), vec!["admin".to_string()], host),
            catalog,
        )
    }

    #[test]
    fn test_create_defaults_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let site = registry
            .create(NewSite::new("Shop", " Shop.Test ", "8.3").with_aliases(["www.shop.test"]))
            .unwrap();

        assert_eq!(site.domain, "shop.test");
        assert_eq!(site.status, SiteStatus::Active);
        assert_eq!(site.public_path, "public");
        assert_eq!(site.root_path, dir.path().join("www/shop.test"));
        assert!(Uuid::parse_str(&site.id).is_ok());
        assert_eq!(registry.get_by_domain("WWW.SHOP.TEST").unwrap().id, site.id);
    }

    #[test]
    fn test_validation_precedes_conflict_and_runtime_checks() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.create(NewSite::new("A", "a.test", "8.3")).unwrap();

        let dup_in_request = NewSite::new("B", "b.test", "8.3").with_aliases(["B.test"]);
        assert!(matches!(
            registry.create(dup_in_request),
            Err(HostError::Validation(_))
        ));
        assert!(matches!(
            registry.create(NewSite::new("C", "a.test", "9.9")),
            Err(HostError::Conflict { .. })
        ));
        assert!(matches!(
            registry.create(NewSite::new("D", "d.test", "8.1")),
            Err(HostError::Validation(_))
        ));
        assert!(!dir.path().join("www/d.test").exists());
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let site = registry.create(NewSite::new("A", "a.test", "8.3")).unwrap();

        let patch = SitePatch {
            name: Some("Renamed".to_string()),
            public_path: Some("../escape".to_string()),
            ..SitePatch::default()
        };
        assert!(registry.update(&site.id, patch).is_err());
        assert_eq!(registry.get(&site.id).unwrap().name, "A");
    }

    #[test]
    fn test_explicit_false_worker_mode_applies() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let site = registry
            .create(NewSite::new("A", "a.test", "8.3").with_worker("worker.php", 4))
            .unwrap();

        let updated = registry
            .update(
                &site.id,
                SitePatch {
                    worker_mode: Some(false),
                    worker_num: Some(0),
                    ..SitePatch::default()
                },
            )
            .unwrap();
        assert!(!updated.worker_mode);
        assert_eq!(updated.worker_num, 4);
        assert_eq!(updated.worker_file, "worker.php");
    }

    #[test]
    fn test_unknown_owner_limits_are_unlimited() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(registry.get_user_limit("nobody").is_unlimited());
        assert!(matches!(
            registry.set_user_limit(UserLimits::unlimited(" ")),
            Err(HostError::Validation(_))
        ));
    }

    #[test]
    fn test_load_keeps_first_claim_on_duplicate_hostnames() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry
            .create(NewSite::new("A", "a.test", "8.3").with_owner("admin"))
            .unwrap();
        registry.create(NewSite::new("B", "b.test", "8.3")).unwrap();

        // Hand-edit the snapshot so both sites claim a.test
        let path = dir.path().join("data/sites.json");
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("\"b.test\"", "\"a.test\"")).unwrap();

        let reloaded = SiteRegistry::new(
            RegistryStore::new(&dir.path().join("data")),
            SiteLayout::new(
                &dir.path().join("www"),
                &dir.path().join("log"),
                vec![],
                Arc::new(FakeHost::new()),
            ),
            Arc::new(Vec::<RuntimeInstance>::new()),
        );
        reloaded.load().unwrap();
        assert_eq!(reloaded.stats().total, 2);
        let first = reloaded
            .get_all()
            .into_iter()
            .map(|s| s.id)
            .min()
            .unwrap();
        assert_eq!(reloaded.get_by_domain("a.test").unwrap().id, first);
    }

    /// A directory on the temp name makes the next snapshot write fail
    fn block_snapshot(dir: &Path, file: &str) {
        let squatter = dir
            .join("data")
            .join(format!(".{}.tmp.{}", file, std::process::id()));
        std::fs::create_dir_all(squatter).unwrap();
    }

    #[test]
    fn test_failed_snapshot_rolls_back_create() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let kept = registry.create(NewSite::new("A", "a.test", "8.3")).unwrap();
        block_snapshot(dir.path(), "sites.json");

        let err = registry
            .create(NewSite::new("B", "b.test", "8.3").with_owner("alice"))
            .unwrap_err();
        assert!(matches!(err, HostError::Io(_)));
        assert_eq!(registry.get_all(), vec![kept.clone()]);
        assert!(matches!(
            registry.get_by_domain("b.test"),
            Err(HostError::NotFound(_))
        ));
        assert!(!dir.path().join("www/alice").exists());
        assert!(!dir.path().join("www/alice/b.test").exists());
        assert!(dir.path().join("www/a.test").is_dir());
    }

    #[test]
    fn test_failed_snapshot_rolls_back_update_delete_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let site = registry.create(NewSite::new("A", "a.test", "8.3")).unwrap();
        block_snapshot(dir.path(), "sites.json");
        block_snapshot(dir.path(), "user_limits.json");

        let patch = SitePatch {
            domain: Some("renamed.test".to_string()),
            ..SitePatch::default()
        };
        assert!(registry.update(&site.id, patch).is_err());
        assert!(registry.suspend(&site.id).is_err());
        assert!(registry.delete(&site.id).is_err());
        assert_eq!(registry.get(&site.id).unwrap(), site);
        assert_eq!(registry.get_by_domain("a.test").unwrap().id, site.id);
        assert!(registry.get_by_domain("renamed.test").is_err());

        let limits = UserLimits {
            max_sites: 2,
            ..UserLimits::unlimited("alice")
        };
        assert!(registry.set_user_limit(limits).is_err());
        assert!(registry.get_user_limit("alice").is_unlimited());
        assert!(registry.list_user_limits().is_empty());
    }

    #[test]
    fn test_tenant_roots_are_confined_to_the_tenant_tree() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(FakeHost::new().with_account("alice", 1001, 1001));
        let registry = SiteRegistry::new(
            RegistryStore::new(&dir.path().join("data")),
            SiteLayout::new(
                &dir.path().join("www"),
                &dir.path().join("log"),
                vec!["admin".to_string()],
                host.clone(),
            ),
            Arc::new(vec![RuntimeInstance::new("8.3", 9001, 2001)]),
        );
        let other = dir.path().join("other_tenant_tree");
        std::fs::create_dir_all(other.join("deep")).unwrap();
        std::fs::write(other.join("deep/secret.txt"), "mine").unwrap();

        let request = NewSite {
            root_path: Some(other.clone()),
            ..NewSite::new("A", "a.test", "8.3").with_owner("alice")
        };
        assert!(matches!(
            registry.create(request),
            Err(HostError::Validation(_))
        ));
        assert!(host.chowns().is_empty());
        assert!(!other.join("public").exists());
        assert!(registry.get_all().is_empty());

        let inside = dir.path().join("www/alice/custom");
        let request = NewSite {
            root_path: Some(inside.clone()),
            ..NewSite::new("A", "a.test", "8.3").with_owner("alice")
        };
        assert_eq!(registry.create(request).unwrap().root_path, inside);
    }

    #[test]
    fn test_limit_owners_must_be_directory_names() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        for owner in ["../outside", "a/b", ".."] {
            assert!(matches!(
                registry.set_user_limit(UserLimits::unlimited(owner)),
                Err(HostError::Validation(_))
            ));
        }
        assert!(registry.list_user_limits().is_empty());
        assert!(!dir.path().join("data/user_limits.json").exists());
    }

    #[test]
    fn test_load_normalizes_stored_hostnames() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let site = registry
            .create(NewSite::new("A", "a.test", "8.3").with_aliases(["www.a.test"]))
            .unwrap();

        let path = dir.path().join("data/sites.json");
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(
            &path,
            raw.replace("\"a.test\"", "\"A.Test\"")
                .replace("\"www.a.test\"", "\"WWW.a.test\""),
        )
        .unwrap();

        registry.load().unwrap();
        let loaded = registry.get(&site.id).unwrap();
        assert_eq!(loaded.domain, "a.test");
        assert_eq!(loaded.aliases, vec!["www.a.test"]);

        // Deleting must release every index entry so the names can be reused
        registry.delete(&site.id).unwrap();
        assert!(registry.get_by_domain("a.test").is_err());
        registry
            .create(NewSite::new("B", "a.test", "8.3").with_aliases(["www.a.test"]))
            .unwrap();
    }
}
