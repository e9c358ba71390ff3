//! Site registry
//!
//! Authoritative store of sites and tenant limits. The registry owns the
//! hostname index, enforces uniqueness and quota rules, persists JSON
//! snapshots and lays out site directories on disk.

pub mod layout;
pub mod runtime;
pub mod sites;
pub mod store;

pub use layout::SiteLayout;
pub use runtime::{RuntimeCatalog, RuntimeTable};
pub use sites::SiteRegistry;
pub use store::RegistryStore;
