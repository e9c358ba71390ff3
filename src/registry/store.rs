/// Durable JSON snapshots of registry state
use crate::config::loader::HostboxConfig;
use crate::config::types::{Result, Site, UserLimits};
use crate::safety::atomic_write_json;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const SITES_FILE: &str = "sites.json";
pub const LIMITS_FILE: &str = "user_limits.json";

/// Reads and rewrites `sites.json` and `user_limits.json`.
/// Every save rewrites the whole document atomically.
#[derive(Clone, Debug)]
pub struct RegistryStore {
    sites_file: PathBuf,
    limits_file: PathBuf,
}

impl RegistryStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            sites_file: data_dir.join(SITES_FILE),
            limits_file: data_dir.join(LIMITS_FILE),
        }
    }

    pub fn from_config(config: &HostboxConfig) -> Self {
        Self {
            sites_file: config.sites_file(),
            limits_file: config.limits_file(),
        }
    }

    pub fn sites_file(&self) -> &Path {
        &self.sites_file
    }

    pub fn limits_file(&self) -> &Path {
        &self.limits_file
    }

    /// Missing snapshot reads as empty
    pub fn load_sites(&self) -> Result<Vec<Site>> {
        read_array(&self.sites_file)
    }

    pub fn load_limits(&self) -> Result<Vec<UserLimits>> {
        read_array(&self.limits_file)
    }

    /// Callers pass sites ordered by id
    pub fn save_sites<'a, I>(&self, sites: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Site>,
    {
        let sites: Vec<&Site> = sites.into_iter().collect();
        atomic_write_json(&self.sites_file, &sites)
    }

    /// Callers pass limits ordered by owner
    pub fn save_limits<'a, I>(&self, limits: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a UserLimits>,
    {
        let limits: Vec<&UserLimits> = limits.into_iter().collect();
        atomic_write_json(&self.limits_file, &limits)
    }
}

fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}
