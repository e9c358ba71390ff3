//! Durable file replacement
//!
//! Whole-document writes that never leave a truncated file behind.

pub mod atomic;

pub use atomic::{atomic_write, atomic_write_json};
