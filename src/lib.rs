//! hostbox: a single-node hosting control plane
//! Keeps a registry of tenant sites, renders reverse-proxy configuration for
//! them, and holds each tenant inside kernel-enforced resource ceilings.
//!
//! # Architecture
//!
//! ## Site Registry ([`registry`])
//! - [`registry::sites`]: Site records, hostname uniqueness, per-owner limits
//! - [`registry::store`]: JSON snapshots of sites and limits
//! - [`registry::layout`]: On-disk site directories and their ownership
//! - [`registry::runtime`]: Runtime instance catalog
//!
//! ## Configuration Generation ([`proxy`])
//! - [`proxy::generator`]: Front-door and per-runtime Caddyfile rendering
//! - [`proxy::writer`]: Durable placement of rendered documents
//!
//! ## Resource Isolation ([`enforce`], [`kernel`])
//! - [`enforce`]: Applies and reads back tenant limits
//! - [`kernel::cgroup`]: cgroup v2 groups for CPU, memory and process ceilings
//! - [`kernel::quota`]: Disk quotas through the quota tools
//! - [`kernel::acl`]: Owner-only access control on tenant directories
//! - [`kernel::host`]: Accounts, external commands and ownership changes
//!
//! ## Orchestration ([`control`])
//! - [`control::ControlPlane`]: Mutate, regenerate, enforce and audit in one place
//!
//! ## Safety ([`safety`])
//! - [`safety::atomic`]: Temp-file-and-rename writes
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured JSON-lines audit events
//!
//! ## Configuration ([`config`])
//! - [`config::loader`]: Configuration file loading and defaults
//! - [`config::validator`]: Configuration checks and host capability probes
//! - [`config::types`]: Shared records and the error taxonomy
//!
//! ## Testing Infrastructure ([`testing`])
//! - [`testing::host`]: Scripted host for exercising enforcement without root
//! - [`testing::cgroup`]: In-memory cgroup hierarchy
//!
//! # Design Principles
//!
//! 1. **Registry is the source of truth** - Generated files are derived, never read back
//! 2. **Kernel as truth** - Usage comes from cgroup counters and quota reports
//! 3. **Degrade, don't abort** - A failed control is reported, the others still apply
//! 4. **Durable writes** - Snapshots and documents are replaced atomically

// Site Registry
pub mod registry;

// Configuration Generation
pub mod proxy;

// Resource Isolation
pub mod enforce;
pub mod kernel;

// Orchestration
pub mod control;

// Safety
pub mod safety;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Testing Infrastructure
pub mod testing;

// CLI entrypoint wiring for the hostbox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
