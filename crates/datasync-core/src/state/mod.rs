// # In-Process Collaborators
//
// This module provides in-memory implementations of the collaborator
// traits so the core can run without an application shell: in the daemon,
// in embedding applications that have no store of their own, and in tests.

pub mod memory;
pub mod push;
pub mod session;
pub mod tab;

pub use memory::MemoryStore;
pub use push::LocalPushChannel;
pub use session::LocalSession;
pub use tab::TabFlag;

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

// A panicked reducer or listener must not wedge every later caller.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
