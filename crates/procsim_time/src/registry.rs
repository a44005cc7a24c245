// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;

use crate::Dependent;

/// Identity of a dependent: the address of its shared allocation.
///
/// A weak reference keeps the allocation (though not the value) alive, so the address of a
/// registered entry cannot be reused by another dependent while the entry exists.
type DependentKey = usize;

fn key_of<T: ?Sized>(ptr: *const T) -> DependentKey {
    ptr.cast::<()>().addr()
}

/// Non-owning bookkeeping of the dependents bound to a timer.
///
/// Entries may go stale when their dependents are dropped; they are purged lazily by every
/// registry operation. The lock is re-entrant because purging runs both on its own and from
/// within the other operations.
pub(crate) struct DependentRegistry {
    entries: ReentrantMutex<RefCell<HashMap<DependentKey, Weak<dyn Dependent>>>>,
}

impl DependentRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: ReentrantMutex::new(RefCell::new(HashMap::new())),
        }
    }

    /// Records a dependent. Binding the same dependent twice keeps a single entry.
    pub(crate) fn bind(&self, dependent: Weak<dyn Dependent>) {
        let entries = self.entries.lock();

        if dependent.strong_count() > 0 {
            entries.borrow_mut().insert(key_of(dependent.as_ptr()), dependent);
        }

        self.purge();
    }

    /// Forgets a dependent. Returns `false` if it was not registered.
    pub(crate) fn remove<T: Dependent + ?Sized>(&self, dependent: &Arc<T>) -> bool {
        let entries = self.entries.lock();

        let removed = entries.borrow_mut().remove(&key_of(Arc::as_ptr(dependent))).is_some();

        self.purge();
        removed
    }

    /// Drops every entry whose dependent no longer exists.
    fn purge(&self) {
        let entries = self.entries.lock();

        entries.borrow_mut().retain(|_, dependent| dependent.strong_count() > 0);
    }

    pub(crate) fn len(&self) -> usize {
        let entries = self.entries.lock();

        self.purge();
        entries.borrow().len()
    }

    /// Strong references to every live dependent.
    ///
    /// The references are handed to the caller so that any final drop happens outside the lock.
    pub(crate) fn live(&self) -> Vec<Arc<dyn Dependent>> {
        let entries = self.entries.lock();

        self.purge();
        entries.borrow().values().filter_map(Weak::upgrade).collect()
    }
}

impl fmt::Debug for DependentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        let len = entries.borrow().len();

        f.debug_struct("DependentRegistry").field("entries", &len).finish()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    #[derive(Debug, Default)]
    struct Probe;

    impl Dependent for Probe {
        fn start(&self) -> Result<()> {
            Ok(())
        }

        fn stop(&self) -> Result<()> {
            Ok(())
        }

        fn running(&self) -> bool {
            false
        }
    }

    fn bind(registry: &DependentRegistry, probe: &Arc<Probe>) {
        let weak: Weak<dyn Dependent> = Arc::downgrade(probe) as Weak<dyn Dependent>;
        registry.bind(weak);
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(DependentRegistry: Send, Sync);
    }

    #[test]
    fn bind_deduplicates() {
        let registry = DependentRegistry::new();
        let probe = Arc::new(Probe);

        bind(&registry, &probe);
        bind(&registry, &probe);

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn dropped_dependents_are_purged() {
        let registry = DependentRegistry::new();
        let probes: Vec<_> = (0..3).map(|_| Arc::new(Probe)).collect();
        for probe in &probes {
            bind(&registry, probe);
        }

        let mut probes = probes;
        drop(probes.pop());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.live().len(), 2);
    }

    #[test]
    fn expired_dependents_are_not_bound() {
        let registry = DependentRegistry::new();
        let probe = Arc::new(Probe);
        let weak: Weak<dyn Dependent> = Arc::downgrade(&probe) as Weak<dyn Dependent>;
        drop(probe);

        registry.bind(weak);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn remove_forgets_dependent() {
        let registry = DependentRegistry::new();
        let kept = Arc::new(Probe);
        let removed = Arc::new(Probe);
        bind(&registry, &kept);
        bind(&registry, &removed);

        assert!(registry.remove(&removed));
        assert!(!registry.remove(&removed));
        assert_eq!(registry.len(), 1);

        let erased: Arc<dyn Dependent> = kept;
        assert!(registry.remove(&erased));
        assert_eq!(registry.len(), 0);
    }
}
