/// Configuration loading from hostbox.json
use crate::config::types::{HostError, Result, RuntimeInstance};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "HOSTBOX_CONFIG";

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hostbox/hostbox.json";

/// Full hostbox.json structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostboxConfig {
    /// Directory holding sites.json and user_limits.json
    pub data_dir: PathBuf,
    /// Base directory for tenant and site trees
    pub sites_dir: PathBuf,
    /// Base directory for proxy and per-site logs
    pub log_dir: PathBuf,
    /// Directory generated proxy documents are written to
    pub output_dir: PathBuf,
    /// Mount point of the unified cgroup hierarchy
    pub cgroup_root: PathBuf,
    /// Prefix of per-tenant isolation group names
    pub group_prefix: String,
    pub http_port: u16,
    pub https_port: u16,
    /// Admin endpoint of the front-door proxy
    pub proxy_admin_listen: String,
    /// Owners never counted against site quotas
    pub exempt_owners: Vec<String>,
    /// Audit log location; None disables the audit file
    pub audit_log: Option<PathBuf>,
    pub runtimes: Vec<RuntimeInstance>,
}

impl Default for HostboxConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/hostbox"),
            sites_dir: PathBuf::from("/var/www"),
            log_dir: PathBuf::from("/var/log/hostbox"),
            output_dir: PathBuf::from("/etc/hostbox/proxy"),
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
            group_prefix: "hostbox".to_string(),
            http_port: 80,
            https_port: 443,
            proxy_admin_listen: "localhost:2019".to_string(),
            exempt_owners: vec!["admin".to_string()],
            audit_log: Some(PathBuf::from("/var/log/hostbox/audit.log")),
            runtimes: vec![
                RuntimeInstance::new("8.2", 9082, 2082),
                RuntimeInstance::new("8.3", 9083, 2083),
            ],
        }
    }
}

impl HostboxConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            HostError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: HostboxConfig = serde_json::from_str(&content)
            .map_err(|e| HostError::Config(format!("Failed to parse config JSON: {}", e)))?;

        Ok(config)
    }

    /// Resolve the configuration: explicit path, then `HOSTBOX_CONFIG`, then
    /// the default location, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from_file(PathBuf::from(path));
        }

        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::load_from_file(default_path);
        }

        log::info!("No configuration file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn sites_file(&self) -> PathBuf {
        self.data_dir.join("sites.json")
    }

    pub fn limits_file(&self) -> PathBuf {
        self.data_dir.join("user_limits.json")
    }

    pub fn runtime(&self, version: &str) -> Option<&RuntimeInstance> {
        self.runtimes.iter().find(|r| r.version == version)
    }
}
