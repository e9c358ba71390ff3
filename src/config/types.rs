/// Core types and structures for the hostbox control plane
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Worker count used when worker mode is on and no positive count is set
pub const DEFAULT_WORKER_NUM: u32 = 2;

/// Served subdirectory used when a site does not name one
pub const DEFAULT_PUBLIC_PATH: &str = "public";

/// Serving state of a site
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    /// Routed by generated configuration
    #[default]
    Active,
    /// Kept in the registry but dropped from routing
    Suspended,
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteStatus::Active => write!(f, "active"),
            SiteStatus::Suspended => write!(f, "suspended"),
        }
    }
}

impl std::str::FromStr for SiteStatus {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(SiteStatus::Active),
            "suspended" => Ok(SiteStatus::Suspended),
            other => Err(HostError::Validation(format!("unknown site status: {}", other))),
        }
    }
}

/// A hosted web property bound to one runtime instance
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Site {
    pub id: String,
    pub name: String,
    /// Primary hostname, unique across every site's domain and aliases
    pub domain: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Version of the runtime instance serving this site
    pub runtime_version: String,
    pub root_path: PathBuf,
    pub public_path: String,
    #[serde(default)]
    pub status: SiteStatus,
    #[serde(default)]
    pub worker_mode: bool,
    #[serde(default)]
    pub worker_file: String,
    /// Persistent worker count; 0 means unset
    #[serde(default)]
    pub worker_num: u32,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Opaque tenant reference supplied by the identity subsystem
    #[serde(default)]
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Site {
    pub fn is_active(&self) -> bool {
        self.status == SiteStatus::Active
    }

    /// Primary domain followed by aliases, in declaration order
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.domain.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Directory the proxy serves files from
    pub fn document_root(&self) -> PathBuf {
        self.root_path.join(&self.public_path)
    }

    /// Worker count with the default applied
    pub fn effective_worker_num(&self) -> u32 {
        if self.worker_num == 0 {
            DEFAULT_WORKER_NUM
        } else {
            self.worker_num
        }
    }
}

/// Creation request for a site; unset fields are defaulted by the registry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewSite {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub runtime_version: String,
    #[serde(default)]
    pub root_path: Option<PathBuf>,
    #[serde(default)]
    pub public_path: Option<String>,
    #[serde(default)]
    pub status: Option<SiteStatus>,
    #[serde(default)]
    pub worker_mode: bool,
    #[serde(default)]
    pub worker_file: String,
    #[serde(default)]
    pub worker_num: u32,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub owner_id: String,
}

impl NewSite {
    pub fn new(name: &str, domain: &str, runtime_version: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
            runtime_version: runtime_version.to_string(),
            ..Self::default()
        }
    }

    pub fn with_owner(mut self, owner_id: &str) -> Self {
        self.owner_id = owner_id.to_string();
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_worker(mut self, worker_file: &str, worker_num: u32) -> Self {
        self.worker_mode = true;
        self.worker_file = worker_file.to_string();
        self.worker_num = worker_num;
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.environment.insert(key.to_string(), value.to_string());
        self
    }
}

/// Partial update for a site.
///
/// `None`, empty strings and a zero worker count leave the field unchanged.
/// `status` and `worker_mode` replace the stored value whenever present, so an
/// explicit `false` or `Suspended` is honoured. Collections replace wholesale.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SitePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub runtime_version: Option<String>,
    #[serde(default)]
    pub public_path: Option<String>,
    #[serde(default)]
    pub status: Option<SiteStatus>,
    #[serde(default)]
    pub worker_mode: Option<bool>,
    #[serde(default)]
    pub worker_file: Option<String>,
    #[serde(default)]
    pub worker_num: Option<u32>,
    #[serde(default)]
    pub environment: Option<BTreeMap<String, String>>,
}

/// A running language-runtime backend reachable on a fixed port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeInstance {
    pub version: String,
    /// Application traffic port
    pub port: u16,
    /// Proxy admin endpoint port for this instance
    pub admin_port: u16,
    pub enabled: bool,
}

impl RuntimeInstance {
    pub fn new(version: &str, port: u16, admin_port: u16) -> Self {
        Self {
            version: version.to_string(),
            port,
            admin_port,
            enabled: true,
        }
    }
}

/// Declared per-tenant resource limits. Zero means unlimited in every field.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserLimits {
    pub owner_id: String,
    #[serde(default)]
    pub max_sites: u32,
    #[serde(default)]
    pub max_disk_mb: u64,
    #[serde(default)]
    pub max_ram_mb: u64,
    /// Percent of one core; 200 allows two full cores
    #[serde(default)]
    pub max_cpu_percent: u32,
    #[serde(default)]
    pub max_processes: u32,
}

impl UserLimits {
    /// Limits record with every dimension unconstrained
    pub fn unlimited(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            ..Self::default()
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_sites == 0
            && self.max_disk_mb == 0
            && self.max_ram_mb == 0
            && self.max_cpu_percent == 0
            && self.max_processes == 0
    }
}

/// Point-in-time resource usage for a tenant
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceUsage {
    pub owner_id: String,
    pub ram_used_mb: u64,
    /// Cumulative CPU time consumed by the isolation group
    pub cpu_usage_micros: u64,
    pub disk_used_mb: u64,
    pub process_count: u32,
}

/// Aggregate site counts
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteStats {
    pub total: usize,
    pub active: usize,
}

/// Host-level control touched by the enforcer
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Group,
    Cpu,
    Memory,
    Processes,
    Disk,
    Acl,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Control::Group => "group",
            Control::Cpu => "cpu",
            Control::Memory => "memory",
            Control::Processes => "processes",
            Control::Disk => "disk",
            Control::Acl => "acl",
        };
        f.write_str(name)
    }
}

/// One sub-control that could not be applied
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlFailure {
    pub control: Control,
    pub message: String,
}

impl fmt::Display for ControlFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.control, self.message)
    }
}

fn join_failures(failures: &[ControlFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error taxonomy for hostbox
#[derive(Error, Debug)]
pub enum HostError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("hostname {hostname} is already claimed by site {site_id}")]
    Conflict { hostname: String, site_id: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("site limit reached for {owner} (max {limit})")]
    QuotaExceeded { owner: String, limit: u32 },

    #[error("failed to apply some limits: {}", join_failures(.0))]
    PartialFailure(Vec<ControlFailure>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cgroup error: {0}")]
    Cgroup(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HostError {
    /// Exit code used by the CLI for this error class
    pub fn exit_code(&self) -> i32 {
        match self {
            HostError::NotFound(_) => 4,
            HostError::Conflict { .. } => 5,
            HostError::Validation(_) | HostError::Config(_) => 2,
            HostError::QuotaExceeded { .. } => 6,
            HostError::PartialFailure(_) => 7,
            HostError::Io(_) => 74,
            HostError::Serialization(_) => 65,
            HostError::Cgroup(_) | HostError::Command(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrips_through_lowercase_names() {
        assert_eq!("Suspended".parse::<SiteStatus>().unwrap(), SiteStatus::Suspended);
        assert_eq!(SiteStatus::Active.to_string(), "active");
        assert!("paused".parse::<SiteStatus>().is_err());
        let json = serde_json::to_string(&SiteStatus::Suspended).unwrap();
        assert_eq!(json, "\"suspended\"");
    }

    #[test]
    fn test_partial_failure_message_lists_every_control() {
        let err = HostError::PartialFailure(vec![
            ControlFailure {
                control: Control::Memory,
                message: "permission denied".to_string(),
            },
            ControlFailure {
                control: Control::Disk,
                message: "setquota exited with 1".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "failed to apply some limits: memory: permission denied; disk: setquota exited with 1"
        );
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_site_defaults_when_fields_missing_from_json() {
        let json = r#"{
            "id": "abc",
            "name": "Blog",
            "domain": "blog.test",
            "runtime_version": "8.3",
            "root_path": "/var/www/blog.test",
            "public_path": "public",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let site: Site = serde_json::from_str(json).unwrap();
        assert_eq!(site.status, SiteStatus::Active);
        assert!(site.aliases.is_empty());
        assert_eq!(site.effective_worker_num(), DEFAULT_WORKER_NUM);
        assert_eq!(site.document_root(), PathBuf::from("/var/www/blog.test/public"));
        assert_eq!(site.hostnames().collect::<Vec<_>>(), vec!["blog.test"]);
    }

    #[test]
    fn test_unlimited_limits() {
        let limits = UserLimits::unlimited("alice");
        assert!(limits.is_unlimited());
        let capped = UserLimits {
            max_ram_mb: 512,
            ..limits
        };
        assert!(!capped.is_unlimited());
    }
}
