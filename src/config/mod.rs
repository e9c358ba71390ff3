//! Configuration and validation
//!
//! Data model, configuration loading, and input validation.

pub mod loader;
pub mod types;
pub mod validator;

pub use loader::HostboxConfig;
