use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

#[cfg(test)]
#[path = "tests/hooks.rs"]
mod tests;

/// A registry of hook callbacks keyed by registration order.
pub struct Hooks<F: ?Sized> {
    next_id: AtomicU64,
    entries: DashMap<u64, Arc<F>>,
}

impl<F: ?Sized> Default for Hooks<F> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: DashMap::new(),
        }
    }
}

impl<F: ?Sized + Send + Sync + 'static> Hooks<F> {
    /// Adds `hook`; it stays registered until the returned handle is
    /// unregistered.
    pub fn register(self: &Arc<Self>, hook: Arc<F>) -> HookHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        drop(self.entries.insert(id, hook));

        let weak: Weak<Self> = Arc::downgrade(self);
        let slot: Weak<dyn HookSlot> = weak;

        HookHandle { id, slot }
    }

    /// Snapshot of the current hooks in registration order.
    ///
    /// Callers invoke the snapshot, so a hook may register or unregister
    /// others without deadlocking.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        let mut hooks: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        hooks.sort_unstable_by_key(|(id, _)| *id);

        hooks.into_iter().map(|(_, hook)| hook).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<F: ?Sized> core::fmt::Debug for Hooks<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hooks")
            .field("registered", &self.entries.len())
            .finish()
    }
}

trait HookSlot: Send + Sync {
    fn remove(&self, id: u64);
}

impl<F: ?Sized + Send + Sync> HookSlot for Hooks<F> {
    fn remove(&self, id: u64) {
        drop(self.entries.remove(&id));
    }
}

/// Registration receipt for a hook.
///
/// Dropping the handle leaves the hook registered.
#[must_use = "a hook can only be removed through its handle"]
pub struct HookHandle {
    id: u64,
    slot: Weak<dyn HookSlot>,
}

impl HookHandle {
    pub fn unregister(self) {
        if let Some(slot) = self.slot.upgrade() {
            slot.remove(self.id);
        }
    }
}

impl core::fmt::Debug for HookHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HookHandle").field("id", &self.id).finish()
    }
}
