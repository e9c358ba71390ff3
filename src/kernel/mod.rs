//! Thin wrappers around host OS primitives.
//!
//! Everything that touches cgroupfs, quota tools, ACLs or account data lives
//! here behind [`host::HostOps`] and [`cgroup::CgroupBackend`].

pub mod acl;
pub mod cgroup;
pub mod host;
pub mod quota;
