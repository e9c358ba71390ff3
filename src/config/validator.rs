// Config and input validation.
// Startup configuration is validated once and fails fast with actionable errors;
// site input helpers are shared by the registry and the generator.

use crate::config::loader::HostboxConfig;
use crate::config::types::{HostError, Result};
use std::collections::HashSet;
use std::path::{Component, Path};

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate config at startup. Errors are fatal, warnings are returned.
pub fn validate_config(config: &HostboxConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_paths(config, &mut result);
    validate_ports(config, &mut result);
    validate_runtimes(config, &mut result);

    if config.group_prefix.is_empty() || config.group_prefix.contains('/') {
        result.add_error(format!(
            "group_prefix must be a non-empty path component: {:?}",
            config.group_prefix
        ));
    }

    if !result.is_valid() {
        return Err(HostError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    for warning in &result.warnings {
        log::warn!("{}", warning);
    }

    Ok(result)
}

fn validate_paths(config: &HostboxConfig, result: &mut ValidationResult) {
    let paths = [
        ("data_dir", &config.data_dir),
        ("sites_dir", &config.sites_dir),
        ("log_dir", &config.log_dir),
        ("output_dir", &config.output_dir),
        ("cgroup_root", &config.cgroup_root),
    ];

    for (name, path) in paths {
        if !path.is_absolute() {
            result.add_error(format!("{} must be an absolute path: {:?}", name, path));
        }
    }

    if let Some(ref audit) = config.audit_log {
        if !audit.is_absolute() {
            result.add_error(format!("audit_log must be an absolute path: {:?}", audit));
        }
    }
}

fn validate_ports(config: &HostboxConfig, result: &mut ValidationResult) {
    if config.http_port == 0 {
        result.add_error("http_port cannot be zero".to_string());
    }
    if config.https_port == 0 {
        result.add_error("https_port cannot be zero".to_string());
    }
    if config.http_port == config.https_port {
        result.add_error(format!(
            "http_port and https_port must differ (both {})",
            config.http_port
        ));
    }
}

fn validate_runtimes(config: &HostboxConfig, result: &mut ValidationResult) {
    let mut versions = HashSet::new();
    let mut ports = HashSet::new();
    ports.insert(config.http_port);
    ports.insert(config.https_port);

    if config.runtimes.iter().all(|r| !r.enabled) {
        result.add_warning("no runtime instance is enabled; site creation will fail".to_string());
    }

    for runtime in &config.runtimes {
        if let Err(e) = validate_runtime_version(&runtime.version) {
            result.add_error(e.to_string());
        }
        if !versions.insert(runtime.version.as_str()) {
            result.add_error(format!("duplicate runtime version: {}", runtime.version));
        }
        for (label, port) in [("port", runtime.port), ("admin_port", runtime.admin_port)] {
            if port == 0 {
                result.add_error(format!("runtime {} {} cannot be zero", runtime.version, label));
            } else if !ports.insert(port) {
                result.add_error(format!(
                    "runtime {} {} {} collides with another listener",
                    runtime.version, label, port
                ));
            }
        }
    }
}

/// Characters that would break out of a token in the proxy grammar
const GRAMMAR_METACHARS: &[char] = &['{', '}', '#', ',', '"', '\\', '`', '@'];

/// Trim and ASCII-lowercase a hostname
pub fn normalize_hostname(hostname: &str) -> String {
    hostname.trim().to_ascii_lowercase()
}

/// Reject hostnames that cannot be emitted safely as a host matcher
pub fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.is_empty() {
        return Err(HostError::Validation("hostname cannot be empty".to_string()));
    }
    if hostname.len() > 253 {
        return Err(HostError::Validation(format!("hostname too long: {}", hostname)));
    }
    if hostname.chars().any(|c| c.is_whitespace() || c.is_control() || c == '/')
        || hostname.contains(GRAMMAR_METACHARS)
    {
        return Err(HostError::Validation(format!("invalid hostname: {:?}", hostname)));
    }
    Ok(())
}

/// Runtime versions become file name suffixes and log names
pub fn validate_runtime_version(version: &str) -> Result<()> {
    if version.is_empty()
        || !version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        || version.starts_with('.')
    {
        return Err(HostError::Validation(format!(
            "invalid runtime version: {:?}",
            version
        )));
    }
    Ok(())
}

/// A served subdirectory must stay inside the site root
pub fn validate_public_path(public_path: &str) -> Result<()> {
    let path = Path::new(public_path);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if public_path.is_empty() || escapes || public_path.chars().any(char::is_control) {
        return Err(HostError::Validation(format!(
            "public_path must be a relative path inside the site root: {:?}",
            public_path
        )));
    }
    Ok(())
}

/// Single directory name such as an owner id used in a site path
pub fn validate_path_component(label: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.chars().any(char::is_control)
    {
        return Err(HostError::Validation(format!(
            "{} is not usable as a directory name: {:?}",
            label, value
        )));
    }
    Ok(())
}

/// Worker file paths are emitted verbatim into directives
pub fn validate_worker_file(worker_file: &str) -> Result<()> {
    if worker_file.chars().any(char::is_control) || worker_file.contains(['{', '}']) {
        return Err(HostError::Validation(format!(
            "malformed worker file: {:?}",
            worker_file
        )));
    }
    Ok(())
}

/// Environment keys become bare tokens in `env` directives
pub fn validate_env_key(key: &str) -> Result<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(HostError::Validation(format!(
            "environment key must match [A-Za-z0-9_]+: {:?}",
            key
        )));
    }
    Ok(())
}

/// Report which host isolation primitives are missing
pub fn check_system_capabilities(config: &HostboxConfig) -> Vec<String> {
    let mut missing = Vec::new();

    #[cfg(target_os = "linux")]
    {
        if !config.cgroup_root.join("cgroup.controllers").exists() {
            missing.push(format!(
                "cgroup v2 not mounted at {}",
                config.cgroup_root.display()
            ));
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = config;
        missing.push("resource isolation is only available on Linux".to_string());
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::RuntimeInstance;

    #[test]
    fn test_valid_default_config() {
        let config = HostboxConfig::default();
        let result = validate_config(&config).unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn test_duplicate_runtime_port_rejected() {
        let mut config = HostboxConfig::default();
        config.runtimes = vec![
            RuntimeInstance::new("8.2", 9000, 2019),
            RuntimeInstance::new("8.3", 9000, 2020),
        ];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn test_relative_paths_rejected() {
        let mut config = HostboxConfig::default();
        config.data_dir = "data".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("data_dir must be an absolute path"));
    }

    #[test]
    fn test_all_disabled_runtimes_is_only_a_warning() {
        let mut config = HostboxConfig::default();
        for runtime in &mut config.runtimes {
            runtime.enabled = false;
        }
        let result = validate_config(&config).unwrap();
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_hostname_rules() {
        assert_eq!(normalize_hostname("  Shop.Example.COM "), "shop.example.com");
        assert!(validate_hostname("shop.example.com").is_ok());
        assert!(validate_hostname("*.example.com").is_ok());
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("a b.test").is_err());
        assert!(validate_hostname("evil.test{").is_err());
        assert!(validate_hostname("a.test,b.test").is_err());
    }

    #[test]
    fn test_public_path_must_stay_inside_root() {
        assert!(validate_public_path("public").is_ok());
        assert!(validate_public_path("web/public").is_ok());
        assert!(validate_public_path("../etc").is_err());
        assert!(validate_public_path("/srv").is_err());
        assert!(validate_public_path("").is_err());
    }

    #[test]
    fn test_runtime_version_rules() {
        assert!(validate_runtime_version("8.3").is_ok());
        assert!(validate_runtime_version("8.3-zts").is_ok());
        assert!(validate_runtime_version("../8.3").is_err());
        assert!(validate_runtime_version("").is_err());
    }

    #[test]
    fn test_env_key_and_worker_file_rules() {
        assert!(validate_env_key("APP_ENV").is_ok());
        assert!(validate_env_key("APP ENV").is_err());
        assert!(validate_worker_file("worker.php").is_ok());
        assert!(validate_worker_file("worker.php\n}").is_err());
    }
}
