//! Testing infrastructure
//!
//! In-memory implementations of the host capability traits so registry,
//! generator and enforcer logic can be exercised without root or cgroupfs.

pub mod cgroup;
pub mod host;

// Re-export commonly used items
pub use cgroup::MemoryCgroup;
pub use host::FakeHost;

use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
