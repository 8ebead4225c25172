//! Poison-tolerant lock access for the registries owned by a contract.
//!
//! A panic while a registry is held leaves its data intact, so the guard is
//! taken back and the recovery is logged against the owning registry.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(
    poisoned: PoisonError<G>,
    registry: &'static str,
    op: &'static str,
    access: &'static str,
) -> G {
    warn!(
        registry,
        op,
        access,
        "Lock on {registry} was poisoned by a panicking holder; continuing with its last state"
    );
    poisoned.into_inner()
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    registry: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| recover(poisoned, registry, op, "read"))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    registry: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| recover(poisoned, registry, op, "write"))
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    registry: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| recover(poisoned, registry, op, "lock"))
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_registry_keeps_its_contents() {
        let registry = RwLock::new(vec!["Widgets".to_string()]);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let mut guard = registry.write().expect("registry lock");
            guard.push("Users".to_string());
            panic!("poison registry lock");
        }));
        assert!(registry.is_poisoned());

        rw_write(&registry, "test::registry", "push").push("Posts".to_string());
        assert_eq!(
            *rw_read(&registry, "test::registry", "read"),
            vec!["Widgets", "Users", "Posts"]
        );
    }
}
