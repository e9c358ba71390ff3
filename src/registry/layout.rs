/// On-disk layout of tenant and site directories
use crate::config::loader::HostboxConfig;
use crate::config::types::{HostError, Result, Site};
use crate::kernel::acl;
use crate::kernel::host::{Account, HostOps};
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Mode of every directory created for a site
pub const SITE_DIR_MODE: u32 = 0o750;

/// Landing document written into a fresh document root
pub const LANDING_FILE: &str = "index.php";

/// Directories a single materialization created, outermost first
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub created: Vec<PathBuf>,
}

pub struct SiteLayout {
    sites_dir: PathBuf,
    log_dir: PathBuf,
    exempt_owners: Vec<String>,
    host: Arc<dyn HostOps>,
}

impl SiteLayout {
    pub fn new(
        sites_dir: &Path,
        log_dir: &Path,
        exempt_owners: Vec<String>,
        host: Arc<dyn HostOps>,
    ) -> Self {
        Self {
            sites_dir: sites_dir.to_path_buf(),
            log_dir: log_dir.to_path_buf(),
            exempt_owners,
            host,
        }
    }

    pub fn from_config(config: &HostboxConfig, host: Arc<dyn HostOps>) -> Self {
        Self::new(
            &config.sites_dir,
            &config.log_dir,
            config.exempt_owners.clone(),
            host,
        )
    }

    pub fn sites_dir(&self) -> &Path {
        &self.sites_dir
    }

    /// Empty and administrative owners get no tenant tree and no quota
    pub fn is_exempt(&self, owner_id: &str) -> bool {
        owner_id.is_empty() || self.exempt_owners.iter().any(|o| o == owner_id)
    }

    pub fn tenant_base(&self, owner_id: &str) -> Option<PathBuf> {
        if self.is_exempt(owner_id) {
            None
        } else {
            Some(self.sites_dir.join(owner_id))
        }
    }

    /// `<sites_dir>/<owner>/<domain>`, or `<sites_dir>/<domain>` for exempt owners
    pub fn default_root(&self, owner_id: &str, domain: &str) -> PathBuf {
        match self.tenant_base(owner_id) {
            Some(base) => base.join(domain),
            None => self.sites_dir.join(domain),
        }
    }

    /// A tenant's site root must sit strictly inside the tenant base.
    /// Exempt owners may place roots anywhere.
    pub fn check_root(&self, owner_id: &str, root: &Path) -> Result<()> {
        let Some(base) = self.tenant_base(owner_id) else {
            return Ok(());
        };
        let confined = root.starts_with(&base)
            && root != base
            && !root.components().any(|c| matches!(c, Component::ParentDir));
        if confined {
            Ok(())
        } else {
            Err(HostError::Validation(format!(
                "root path {} is outside the tree of {} ({})",
                root.display(),
                owner_id,
                base.display()
            )))
        }
    }

    pub fn site_log_dir(&self, site_id: &str) -> PathBuf {
        self.log_dir.join("sites").join(site_id)
    }

    /// Create the tenant base, site root, document root and log directory,
    /// then drop a landing page and hand those entries to the tenant.
    /// Content that already existed keeps its ownership.
    /// On failure every directory created here is removed again.
    pub fn materialize(&self, site: &Site) -> Result<Provisioned> {
        let mut provisioned = Provisioned::default();
        match self.materialize_into(site, &mut provisioned) {
            Ok(()) => Ok(provisioned),
            Err(e) => {
                self.rollback(&provisioned);
                Err(e)
            }
        }
    }

    fn materialize_into(&self, site: &Site, provisioned: &mut Provisioned) -> Result<()> {
        self.check_root(&site.owner_id, &site.root_path)?;

        let account = if self.is_exempt(&site.owner_id) {
            None
        } else {
            self.host.lookup_account(&site.owner_id)
        };

        if let Some(base) = self.tenant_base(&site.owner_id) {
            create_dir_tracked(&base, provisioned)?;
            self.host.set_mode(&base, SITE_DIR_MODE)?;
            if let Some(ref account) = account {
                self.secure_tenant_base(&base, account);
            }
        }

        let document_root = site.document_root();
        let log_dir = self.site_log_dir(&site.id);
        for dir in [&site.root_path, &document_root, &log_dir] {
            create_dir_tracked(dir, provisioned)?;
        }

        let landing = document_root.join(LANDING_FILE);
        let wrote_landing = !landing.exists();
        if wrote_landing {
            fs::write(&landing, landing_document(site))?;
        }

        if let Some(ref account) = account {
            if self.host.is_linux() {
                for dir in [&site.root_path, &document_root, &log_dir] {
                    self.host.chown(dir, account.uid, account.gid)?;
                }
                if wrote_landing {
                    self.host.chown(&landing, account.uid, account.gid)?;
                }
            }
        } else if !self.is_exempt(&site.owner_id) {
            log::warn!(
                "Owner {} has no OS account, {} left owned by the control plane",
                site.owner_id,
                site.root_path.display()
            );
        }

        Ok(())
    }

    fn secure_tenant_base(&self, base: &Path, account: &Account) {
        if !self.host.is_linux() {
            return;
        }
        if let Err(e) = self.host.chown(base, account.uid, account.gid) {
            log::warn!("Could not chown {}: {}", base.display(), e);
        }
        if let Err(e) = acl::restrict_to_owner(self.host.as_ref(), base, &account.name) {
            log::warn!("Could not restrict {}: {}", base.display(), e);
        }
    }

    /// Remove what a materialization created, innermost first
    pub fn rollback(&self, provisioned: &Provisioned) {
        for dir in provisioned.created.iter().rev() {
            match fs::remove_dir_all(dir) {
                Ok(()) => log::debug!("Rolled back {}", dir.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to roll back {}: {}", dir.display(), e),
            }
        }
    }

    /// Root-owned base directory that others may traverse but not list
    pub fn secure_base(&self) -> Result<()> {
        if !self.host.is_linux() {
            return Ok(());
        }
        fs::create_dir_all(&self.sites_dir)?;
        acl::secure_base_directory(self.host.as_ref(), &self.sites_dir)
    }
}

/// Create `path` and record the outermost directory that did not exist
fn create_dir_tracked(path: &Path, provisioned: &mut Provisioned) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    let outermost_missing = path
        .ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .last()
        .map(Path::to_path_buf);

    DirBuilder::new()
        .recursive(true)
        .mode(SITE_DIR_MODE)
        .create(path)?;

    if let Some(dir) = outermost_missing {
        provisioned.created.push(dir);
    }
    Ok(())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Placeholder page served until the tenant uploads an application
pub fn landing_document(site: &Site) -> String {
    let name = escape_html(&site.name);
    let domain = escape_html(&site.domain);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{name}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; min-height: 100vh; margin: 0;
               display: flex; align-items: center; justify-content: center;
               background: #0f172a; color: #f8fafc; }}
        .card {{ text-align: center; max-width: 480px; padding: 2rem; }}
        .domain {{ color: #10b981; }}
        p {{ color: #94a3b8; line-height: 1.7; }}
    </style>
</head>
<body>
    <div class="card">
        <h1>{name}</h1>
        <p class="domain">{domain}</p>
        <p>This site is live. Replace this page by uploading your application to the public directory.</p>
        <p>Runtime <?= PHP_VERSION ?></p>
    </div>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{SiteStatus, DEFAULT_PUBLIC_PATH};
    use crate::testing::FakeHost;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn site(root: &Path, owner: &str) -> Site {
        Site {
            id: "site-1".to_string(),
            name: "<Blog>".to_string(),
            domain: "blog.test".to_string(),
            aliases: vec![],
            runtime_version: "8.3".to_string(),
            root_path: root.to_path_buf(),
            public_path: DEFAULT_PUBLIC_PATH.to_string(),
            status: SiteStatus::Active,
            worker_mode: false,
            worker_file: String::new(),
            worker_num: 0,
            environment: BTreeMap::new(),
            owner_id: owner.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn layout(dir: &Path, host: Arc<dyn HostOps>) -> SiteLayout {
        SiteLayout::new(
            &dir.join("www"),
            &dir.join("log"),
            vec!["admin".to_string()],
            host,
        )
    }

    #[test]
    fn test_default_roots() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path(), Arc::new(FakeHost::new()));
        assert_eq!(
            layout.default_root("alice", "a.test"),
            dir.path().join("www/alice/a.test")
        );
        assert_eq!(layout.default_root("", "a.test"), dir.path().join("www/a.test"));
        assert_eq!(layout.default_root("admin", "a.test"), dir.path().join("www/a.test"));
    }

    #[test]
    fn test_materialize_creates_tree_and_chowns() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(FakeHost::new().with_account("alice", 1001, 1001));
        let layout = layout(dir.path(), host.clone());
        let root = layout.default_root("alice", "blog.test");
        let site = site(&root, "alice");

        let provisioned = layout.materialize(&site).unwrap();

        let landing = fs::read_to_string(root.join("public/index.php")).unwrap();
        assert!(landing.contains("&lt;Blog&gt;"));
        assert!(dir.path().join("log/sites/site-1").is_dir());
        assert!(provisioned.created.contains(&dir.path().join("www")));
        assert!(host
            .chowns()
            .iter()
            .any(|(p, uid, _)| p == &root.join("public/index.php") && *uid == 1001));
        assert!(host
            .modes()
            .contains(&(dir.path().join("www/alice"), SITE_DIR_MODE)));
    }

    #[test]
    fn test_existing_landing_page_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path(), Arc::new(FakeHost::new()));
        let root = layout.default_root("", "blog.test");
        fs::create_dir_all(root.join("public")).unwrap();
        fs::write(root.join("public/index.php"), "custom").unwrap();

        layout.materialize(&site(&root, "")).unwrap();
        assert_eq!(fs::read_to_string(root.join("public/index.php")).unwrap(), "custom");
    }

    #[test]
    fn test_failed_materialize_removes_created_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path(), Arc::new(FakeHost::new()));
        // A file where the log tree should go makes the last mkdir fail
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("log"), "not a directory").unwrap();

        let root = layout.default_root("", "blog.test");
        assert!(layout.materialize(&site(&root, "")).is_err());
        assert!(!dir.path().join("www").exists());
    }

    #[test]
    fn test_roots_outside_the_tenant_tree_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(FakeHost::new().with_account("alice", 1001, 1001));
        let layout = layout(dir.path(), host.clone());
        let other = dir.path().join("other_tenant_tree");
        fs::create_dir_all(other.join("deep")).unwrap();
        fs::write(other.join("deep/secret.txt"), "mine").unwrap();

        for root in [
            other.clone(),
            dir.path().join("www/alice"),
            dir.path().join("www/alice/../bob/site"),
            PathBuf::from("alice/site"),
        ] {
            assert!(
                matches!(layout.check_root("alice", &root), Err(HostError::Validation(_))),
                "{} should be rejected",
                root.display()
            );
        }
        assert!(layout.materialize(&site(&other, "alice")).is_err());
        assert!(host.chowns().is_empty());
        assert!(!dir.path().join("www").exists());

        // Exempt owners are not confined
        layout.check_root("admin", &other).unwrap();
        layout
            .check_root("alice", &dir.path().join("www/alice/blog.test"))
            .unwrap();
    }

    #[test]
    fn test_existing_content_keeps_its_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(FakeHost::new().with_account("alice", 1001, 1001));
        let layout = layout(dir.path(), host.clone());
        let root = layout.default_root("alice", "blog.test");
        fs::create_dir_all(root.join("public/uploads")).unwrap();
        fs::write(root.join("public/uploads/photo.jpg"), "jpeg").unwrap();
        fs::write(root.join("public/index.php"), "custom").unwrap();

        layout.materialize(&site(&root, "alice")).unwrap();

        let chowned: Vec<PathBuf> = host.chowns().into_iter().map(|(p, _, _)| p).collect();
        assert!(chowned.contains(&root));
        assert!(chowned.contains(&root.join("public")));
        assert!(chowned.contains(&dir.path().join("log/sites/site-1")));
        assert!(!chowned.contains(&root.join("public/uploads")));
        assert!(!chowned.contains(&root.join("public/uploads/photo.jpg")));
        assert!(!chowned.contains(&root.join("public/index.php")));
    }
}
