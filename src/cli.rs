use crate::config::loader::HostboxConfig;
use crate::config::types::{NewSite, SitePatch, SiteStatus, UserLimits};
use crate::control::ControlPlane;
use crate::kernel::host::running_as_root;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Multi-tenant hosting control plane", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $HOSTBOX_CONFIG, then /etc/hostbox/hostbox.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create state directories and write initial proxy documents
    Init,
    /// Manage sites
    #[command(subcommand)]
    Site(SiteCommand),
    /// Manage per-tenant resource limits
    #[command(subcommand)]
    Limits(LimitsCommand),
    /// Show live resource usage of a tenant
    Usage {
        owner: String,
    },
    /// Show limits, site count and usage of a tenant
    Tenant {
        owner: String,
    },
    /// Render proxy documents to stdout, or write them with --write
    Render {
        #[arg(long)]
        write: bool,
    },
    /// Show site totals and active sites per runtime
    Stats,
}

#[derive(Subcommand)]
enum SiteCommand {
    /// Register a site and materialize its directories
    Create(CreateArgs),
    /// List sites, optionally of one owner
    List {
        #[arg(long, default_value = "")]
        owner: String,
    },
    /// Show one site by id, or by hostname with --domain
    Show {
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        domain: Option<String>,
    },
    /// Change fields of a site
    Update(UpdateArgs),
    /// Remove a site from the registry; its files stay on disk
    Delete {
        id: String,
    },
    Suspend {
        id: String,
    },
    Unsuspend {
        id: String,
    },
}

#[derive(Args)]
struct CreateArgs {
    /// Primary hostname
    #[arg(long)]
    domain: String,
    /// Runtime version serving the site
    #[arg(long)]
    runtime: String,
    /// Display name (defaults to the domain)
    #[arg(long, default_value = "")]
    name: String,
    /// Owning tenant
    #[arg(long, default_value = "")]
    owner: String,
    /// Additional hostname (repeatable)
    #[arg(long = "alias")]
    aliases: Vec<String>,
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    root_path: Option<PathBuf>,
    #[arg(long)]
    public_path: Option<String>,
    /// Enable worker mode with this entry script
    #[arg(long)]
    worker_file: Option<String>,
    #[arg(long, default_value_t = 0)]
    worker_num: u32,
    /// Environment variable KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_env_pair)]
    environment: Vec<(String, String)>,
    /// Register the site suspended
    #[arg(long)]
    suspended: bool,
}

#[derive(Args)]
struct UpdateArgs {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    domain: Option<String>,
    /// Replacement alias list (repeatable)
    #[arg(long = "alias")]
    aliases: Vec<String>,
    /// Remove every alias
    #[arg(long, conflicts_with = "aliases")]
    clear_aliases: bool,
    #[arg(long)]
    runtime: Option<String>,
    #[arg(long)]
    public_path: Option<String>,
    #[arg(long)]
    status: Option<SiteStatus>,
    /// Turn worker mode on or off
    #[arg(long)]
    worker: Option<bool>,
    #[arg(long)]
    worker_file: Option<String>,
    #[arg(long)]
    worker_num: Option<u32>,
    /// Replacement environment KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_env_pair)]
    environment: Vec<(String, String)>,
    /// Remove every environment variable
    #[arg(long, conflicts_with = "environment")]
    clear_env: bool,
}

#[derive(Subcommand)]
enum LimitsCommand {
    /// Store limits for a tenant and enforce them
    Set(SetLimitsArgs),
    /// Show limits of one tenant, or of every tenant
    Show {
        owner: Option<String>,
    },
    /// Re-apply stored limits to the host
    Apply {
        owner: String,
    },
    /// Tear down a tenant's isolation group
    Remove {
        owner: String,
    },
}

/// Zero leaves a dimension unlimited
#[derive(Args)]
struct SetLimitsArgs {
    owner: String,
    #[arg(long, default_value_t = 0)]
    max_sites: u32,
    #[arg(long, default_value_t = 0)]
    max_disk_mb: u64,
    #[arg(long, default_value_t = 0)]
    max_ram_mb: u64,
    /// Percent of one core; 200 allows two cores
    #[arg(long, default_value_t = 0)]
    max_cpu_percent: u32,
    #[arg(long, default_value_t = 0)]
    max_processes: u32,
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", raw)),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn warn_unless_root() {
    if !running_as_root() {
        log::warn!("Not running as root: ownership, quota and cgroup changes may fail");
    }
}

impl CreateArgs {
    fn into_request(self) -> NewSite {
        NewSite {
            id: self.id,
            name: self.name,
            domain: self.domain,
            aliases: self.aliases,
            runtime_version: self.runtime,
            root_path: self.root_path,
            public_path: self.public_path,
            status: self.suspended.then_some(SiteStatus::Suspended),
            worker_mode: self.worker_file.is_some(),
            worker_file: self.worker_file.unwrap_or_default(),
            worker_num: self.worker_num,
            environment: self.environment.into_iter().collect(),
            owner_id: self.owner,
        }
    }
}

impl UpdateArgs {
    fn into_patch(self) -> (String, SitePatch) {
        let aliases = if self.clear_aliases {
            Some(Vec::new())
        } else if self.aliases.is_empty() {
            None
        } else {
            Some(self.aliases)
        };
        let environment = if self.clear_env {
            Some(BTreeMap::new())
        } else if self.environment.is_empty() {
            None
        } else {
            Some(self.environment.into_iter().collect())
        };

        let patch = SitePatch {
            name: self.name,
            domain: self.domain,
            aliases,
            runtime_version: self.runtime,
            public_path: self.public_path,
            status: self.status,
            worker_mode: self.worker,
            worker_file: self.worker_file,
            worker_num: self.worker_num,
            environment,
        };
        (self.id, patch)
    }
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = HostboxConfig::load(cli.config.as_deref())?;
    let plane = ControlPlane::open(config).context("failed to open control plane")?;

    match cli.command {
        Commands::Init => {
            warn_unless_root();
            for path in plane.init()? {
                eprintln!("Wrote {}", path.display());
            }
            Ok(())
        }
        Commands::Site(command) => run_site(&plane, command),
        Commands::Limits(command) => run_limits(&plane, command),
        Commands::Usage { owner } => print_json(&plane.usage(&owner)?),
        Commands::Tenant { owner } => print_json(&plane.tenant(&owner)?),
        Commands::Render { write } => {
            if write {
                for path in plane.render_and_write()? {
                    eprintln!("Wrote {}", path.display());
                }
            } else {
                let rendered = plane.render()?;
                println!("{}", rendered.front_door);
                for (version, document) in &rendered.instances {
                    println!("# ---- runtime {} ----", version);
                    println!("{}", document);
                }
            }
            Ok(())
        }
        Commands::Stats => print_json(&plane.stats()),
    }
}

fn run_site(plane: &ControlPlane, command: SiteCommand) -> Result<()> {
    match command {
        SiteCommand::Create(args) => {
            warn_unless_root();
            print_json(&plane.create_site(args.into_request())?)
        }
        SiteCommand::List { owner } => print_json(&plane.registry().list(&owner)),
        SiteCommand::Show { id, domain } => {
            let site = match (id, domain) {
                (Some(id), _) => plane.registry().get(&id)?,
                (None, Some(domain)) => plane.registry().get_by_domain(&domain)?,
                (None, None) => anyhow::bail!("site show needs an id or --domain"),
            };
            print_json(&site)
        }
        SiteCommand::Update(args) => {
            let (id, patch) = args.into_patch();
            print_json(&plane.update_site(&id, patch)?)
        }
        SiteCommand::Delete { id } => {
            let site = plane.delete_site(&id)?;
            eprintln!(
                "Deleted site {}; files remain at {}",
                site.id,
                site.root_path.display()
            );
            Ok(())
        }
        SiteCommand::Suspend { id } => print_json(&plane.suspend_site(&id)?),
        SiteCommand::Unsuspend { id } => print_json(&plane.unsuspend_site(&id)?),
    }
}

fn run_limits(plane: &ControlPlane, command: LimitsCommand) -> Result<()> {
    match command {
        LimitsCommand::Set(args) => {
            warn_unless_root();
            let limits = UserLimits {
                owner_id: args.owner,
                max_sites: args.max_sites,
                max_disk_mb: args.max_disk_mb,
                max_ram_mb: args.max_ram_mb,
                max_cpu_percent: args.max_cpu_percent,
                max_processes: args.max_processes,
            };
            plane.set_limits(limits)?;
            Ok(())
        }
        LimitsCommand::Show { owner: Some(owner) } => {
            print_json(&plane.registry().get_user_limit(&owner))
        }
        LimitsCommand::Show { owner: None } => print_json(&plane.registry().list_user_limits()),
        LimitsCommand::Apply { owner } => {
            warn_unless_root();
            plane.apply_limits(&owner)?;
            Ok(())
        }
        LimitsCommand::Remove { owner } => {
            plane.remove_limits(&owner)?;
            Ok(())
        }
    }
}
