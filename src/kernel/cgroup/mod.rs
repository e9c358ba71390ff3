//! Cgroup resource governance
//!
//! Per-tenant isolation groups on the unified (v2) hierarchy.

pub mod backend;
pub mod v2;

// Re-export commonly used items
pub use backend::{create_cgroup_backend, CgroupBackend, TENANT_CONTROLLERS};
pub use v2::CgroupV2;
