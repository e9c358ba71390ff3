/// Caddyfile generation from registry snapshots
///
/// Rendering is a pure function of its inputs apart from one stat per worker
/// file: the same sites and runtime table always produce byte-identical text.
use crate::config::loader::HostboxConfig;
use crate::config::types::{HostError, Result, RuntimeInstance, Site};
use crate::config::validator::validate_runtime_version;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

const GENERATED_BANNER: &str = "# Generated by hostbox. Do not edit manually.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratorSettings {
    /// Base directory of proxy, runtime and per-site logs
    pub log_dir: PathBuf,
    /// Admin endpoint of the front-door proxy
    pub proxy_admin_listen: String,
}

impl GeneratorSettings {
    pub fn from_config(config: &HostboxConfig) -> Self {
        Self {
            log_dir: config.log_dir.clone(),
            proxy_admin_listen: config.proxy_admin_listen.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrontDoorPorts {
    pub http: u16,
    pub https: u16,
}

impl FrontDoorPorts {
    pub fn from_config(config: &HostboxConfig) -> Self {
        Self {
            http: config.http_port,
            https: config.https_port,
        }
    }
}

/// Front-door document plus one document per enabled instance, keyed by version
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedConfig {
    pub front_door: String,
    pub instances: BTreeMap<String, String>,
}

/// Line-oriented document builder with tab indentation
#[derive(Default)]
struct Doc {
    out: String,
}

impl Doc {
    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push('\t');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Matcher names allow only `[A-Za-z0-9_]`
pub fn sanitize_name(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Comment text must stay on its line
pub fn sanitize_comment(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Emit a value as a single Caddyfile token, quoting when needed
pub fn quote_token(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '"' | '{' | '}' | '\\' | '#'));
    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            c if c.is_control() => quoted.push(' '),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn path_token(path: &Path) -> String {
    quote_token(&path.to_string_lossy())
}

fn sorted_by_id<'a, I>(sites: I) -> Vec<&'a Site>
where
    I: IntoIterator<Item = &'a Site>,
{
    let mut sites: Vec<&Site> = sites.into_iter().collect();
    sites.sort_by(|a, b| a.id.cmp(&b.id));
    sites
}

fn check_instance(instance: &RuntimeInstance) -> Result<()> {
    validate_runtime_version(&instance.version)?;
    if instance.port == 0 || instance.admin_port == 0 {
        return Err(HostError::Validation(format!(
            "runtime {} needs non-zero ports",
            instance.version
        )));
    }
    Ok(())
}

pub struct ConfigGenerator {
    settings: GeneratorSettings,
}

impl ConfigGenerator {
    pub fn new(settings: GeneratorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    fn log_block(&self, doc: &mut Doc, depth: usize, file: &Path, size: &str, keep: u32, json: bool) {
        doc.line(depth, "log {");
        doc.line(depth + 1, &format!("output file {} {{", path_token(file)));
        doc.line(depth + 2, &format!("roll_size {}", size));
        doc.line(depth + 2, &format!("roll_keep {}", keep));
        doc.line(depth + 1, "}");
        if json {
            doc.line(depth + 1, "format json");
        }
        doc.line(depth, "}");
    }

    /// Public listener routing every active site to its runtime instance
    pub fn render_front_door(
        &self,
        sites: &[Site],
        runtimes: &[RuntimeInstance],
        ports: FrontDoorPorts,
    ) -> Result<String> {
        if ports.http == 0 || ports.https == 0 {
            return Err(HostError::Validation("front-door ports must be non-zero".to_string()));
        }

        let instance_ports: BTreeMap<&str, u16> = runtimes
            .iter()
            .filter(|r| r.enabled)
            .map(|r| (r.version.as_str(), r.port))
            .collect();

        let mut doc = Doc::default();
        doc.line(0, "# Front-door proxy configuration");
        doc.line(0, GENERATED_BANNER);
        doc.blank();
        doc.line(0, "{");
        doc.line(1, &format!("admin {}", quote_token(&self.settings.proxy_admin_listen)));
        doc.line(1, "auto_https off");
        doc.line(1, &format!("http_port {}", ports.http));
        doc.line(1, &format!("https_port {}", ports.https));
        doc.blank();
        self.log_block(&mut doc, 1, &self.settings.log_dir.join("proxy.log"), "100mb", 5, true);
        doc.line(0, "}");
        doc.blank();

        for site in sorted_by_id(sites.iter().filter(|s| s.is_active())) {
            let Some(port) = instance_ports.get(site.runtime_version.as_str()) else {
                log::warn!(
                    "Site {} ({}) skipped: runtime {} is not an enabled instance",
                    site.id,
                    site.domain,
                    site.runtime_version
                );
                continue;
            };

            let addresses = site
                .hostnames()
                .map(|h| quote_token(&format!("http://{}", h)))
                .collect::<Vec<_>>()
                .join(", ");

            doc.line(
                0,
                &format!(
                    "# Site: {} (runtime {})",
                    sanitize_comment(&site.name),
                    sanitize_comment(&site.runtime_version)
                ),
            );
            doc.line(0, &format!("{} {{", addresses));
            doc.line(1, &format!("reverse_proxy localhost:{}", port));
            doc.line(0, "}");
            doc.blank();
        }

        doc.line(0, "# Default fallback for unmatched hostnames");
        doc.line(0, &format!(":{} {{", ports.http));
        doc.line(1, "respond \"Site not found. Configure this domain in hostbox.\" 404");
        doc.line(0, "}");

        Ok(doc.finish())
    }

    /// Document for one runtime instance serving every active site bound to it
    pub fn render_instance(&self, instance: &RuntimeInstance, sites: &[Site]) -> Result<String> {
        check_instance(instance)?;

        let served = sorted_by_id(
            sites
                .iter()
                .filter(|s| s.is_active() && s.runtime_version == instance.version),
        );

        let mut doc = Doc::default();
        doc.line(0, &format!("# Runtime {} instance configuration", instance.version));
        doc.line(0, GENERATED_BANNER);
        doc.blank();
        doc.line(0, "{");
        doc.line(1, &format!("admin localhost:{}", instance.admin_port));
        doc.line(1, "frankenphp");
        doc.blank();
        let log_file = self
            .settings
            .log_dir
            .join(format!("runtime-{}.log", instance.version));
        self.log_block(&mut doc, 1, &log_file, "100mb", 5, true);
        doc.line(0, "}");
        doc.blank();

        if served.is_empty() {
            doc.line(0, &format!("# No sites configured for runtime {}", instance.version));
            doc.line(0, &format!(":{} {{", instance.port));
            doc.line(1, "respond \"No sites configured\" 503");
            doc.line(0, "}");
            return Ok(doc.finish());
        }

        doc.line(0, &format!(":{} {{", instance.port));

        let mut matchers = HashSet::new();
        for site in served {
            let base = sanitize_name(&site.id);
            let mut matcher = base.clone();
            let mut suffix = 2;
            while !matchers.insert(matcher.clone()) {
                matcher = format!("{}_{}", base, suffix);
                suffix += 1;
            }

            let hosts = site
                .hostnames()
                .map(quote_token)
                .collect::<Vec<_>>()
                .join(" ");

            doc.blank();
            doc.line(
                1,
                &format!(
                    "# Site: {} ({})",
                    sanitize_comment(&site.name),
                    sanitize_comment(&site.domain)
                ),
            );
            doc.line(1, &format!("@{} host {}", matcher, hosts));
            doc.line(1, &format!("handle @{} {{", matcher));
            doc.line(2, &format!("root * {}", path_token(&site.document_root())));
            doc.line(2, "encode zstd br gzip");
            execution_mode(&mut doc, 2, site);
            doc.line(1, "}");
        }

        doc.blank();
        doc.line(1, "# Default fallback");
        doc.line(1, "handle {");
        doc.line(2, "respond \"Site not found\" 404");
        doc.line(1, "}");
        doc.line(0, "}");

        Ok(doc.finish())
    }

    /// Standalone document for a single site with its own access log
    pub fn render_site(&self, site: &Site) -> Result<String> {
        let mut doc = Doc::default();
        doc.line(0, &format!("# Site: {}", sanitize_comment(&site.name)));
        doc.line(0, &format!("# Domain: {}", sanitize_comment(&site.domain)));
        doc.line(0, &format!("# Runtime: {}", sanitize_comment(&site.runtime_version)));
        doc.line(0, GENERATED_BANNER);
        doc.blank();

        let addresses = site
            .hostnames()
            .map(quote_token)
            .collect::<Vec<_>>()
            .join(", ");
        doc.line(0, &format!("{} {{", addresses));
        doc.line(1, &format!("root * {}", path_token(&site.document_root())));
        doc.line(1, "encode zstd br gzip");
        execution_mode(&mut doc, 1, site);
        let access_log = self
            .settings
            .log_dir
            .join("sites")
            .join(&site.id)
            .join("access.log");
        self.log_block(&mut doc, 1, &access_log, "50mb", 3, false);
        doc.line(0, "}");

        Ok(doc.finish())
    }

    /// Front door plus one document per enabled instance
    pub fn render_all(
        &self,
        sites: &[Site],
        runtimes: &[RuntimeInstance],
        ports: FrontDoorPorts,
    ) -> Result<RenderedConfig> {
        let front_door = self.render_front_door(sites, runtimes, ports)?;
        let mut instances = BTreeMap::new();
        for instance in runtimes.iter().filter(|r| r.enabled) {
            instances.insert(instance.version.clone(), self.render_instance(instance, sites)?);
        }
        Ok(RenderedConfig {
            front_door,
            instances,
        })
    }
}

/// `php_server` directive, in worker mode when the worker file exists
fn execution_mode(doc: &mut Doc, depth: usize, site: &Site) {
    if site.worker_mode && !site.worker_file.is_empty() {
        let worker = Path::new(&site.worker_file);
        let worker_path = if worker.is_absolute() {
            worker.to_path_buf()
        } else {
            site.document_root().join(worker)
        };

        if worker_path.exists() {
            doc.line(depth, "php_server {");
            doc.line(
                depth + 1,
                &format!(
                    "worker {} {}",
                    path_token(&worker_path),
                    site.effective_worker_num()
                ),
            );
            env_lines(doc, depth + 1, site);
            doc.line(depth, "}");
            return;
        }

        log::warn!(
            "Worker file {} of site {} not found, serving in regular mode",
            worker_path.display(),
            site.id
        );
        doc.line(depth, "# WARNING: Worker file not found, falling back to regular mode");
        doc.line(
            depth,
            &format!("# Expected: {}", sanitize_comment(&worker_path.to_string_lossy())),
        );
    }

    if site.environment.is_empty() {
        doc.line(depth, "php_server");
    } else {
        doc.line(depth, "php_server {");
        env_lines(doc, depth + 1, site);
        doc.line(depth, "}");
    }
}

fn env_lines(doc: &mut Doc, depth: usize, site: &Site) {
    for (key, value) in &site.environment {
        doc.line(depth, &format!("env {} {}", quote_token(key), quote_token(value)));
    }
}
