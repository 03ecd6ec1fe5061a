use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Names of the locks whose poisoning has already been reported.
static LOCK_POISON_WARNED: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

// A panicking tick or render hook must not take the whole engine down with a
// poisoned lock, so every engine lock recovers its inner value.
fn warn_lock_poison_once(lock: &'static str) -> bool {
    let mut warned = LOCK_POISON_WARNED
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if warned.contains(&lock) {
        return false;
    }
    warned.push(lock);
    warn!(lock, "engine lock poisoned; recovered inner value");
    true
}

pub(crate) fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, lock: &'static str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn_lock_poison_once(lock);
        poisoned.into_inner()
    })
}

pub(crate) fn read_or_recover<'a, T>(
    rwlock: &'a RwLock<T>,
    lock: &'static str,
) -> RwLockReadGuard<'a, T> {
    rwlock.read().unwrap_or_else(|poisoned| {
        warn_lock_poison_once(lock);
        poisoned.into_inner()
    })
}

pub(crate) fn write_or_recover<'a, T>(
    rwlock: &'a RwLock<T>,
    lock: &'static str,
) -> RwLockWriteGuard<'a, T> {
    rwlock.write().unwrap_or_else(|poisoned| {
        warn_lock_poison_once(lock);
        poisoned.into_inner()
    })
}
