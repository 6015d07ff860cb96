//! Instance registry
//!
//! Every proxy substitute owns an `InstanceTracker`. Construction through a
//! substitute (or through any subclass whose chain crosses one) registers
//! the new instance with each tracker on the chain; after an update the
//! owning proxy sweeps its tracker so every live instance runs its refresh
//! callback against the new target.
//!
//! The tracker only holds `Weak` references and is never the reason an
//! instance stays alive; dead and torn-down entries are pruned on the next
//! register or sweep.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::object::Instance;

/// Weak set of live instances built from one substitute class
#[derive(Default)]
pub struct InstanceTracker {
    instances: Mutex<Vec<Weak<Instance>>>,
}

impl InstanceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly constructed instance. Duplicate registration of
    /// the same object is a no-op.
    pub fn register(&self, instance: &Arc<Instance>) {
        let mut list = self.instances.lock();
        list.retain(|weak| {
            weak.upgrade()
                .map_or(false, |existing| !existing.is_torn_down())
        });
        let already_tracked = list.iter().any(|weak| {
            weak.upgrade()
                .map_or(false, |existing| existing.object_id() == instance.object_id())
        });
        if !already_tracked {
            list.push(Arc::downgrade(instance));
        }
    }

    /// Number of live, not-torn-down instances currently tracked
    pub fn live_count(&self) -> usize {
        self.instances
            .lock()
            .iter()
            .filter(|weak| {
                weak.upgrade()
                    .map_or(false, |instance| !instance.is_torn_down())
            })
            .count()
    }

    /// Notify every live instance to refresh.
    ///
    /// The list is snapshotted before any callback runs so a refresh that
    /// constructs new instances cannot deadlock against registration.
    pub fn sweep(&self) {
        let snapshot: Vec<Weak<Instance>> = {
            let mut list = self.instances.lock();
            list.retain(|weak| {
                weak.upgrade()
                    .map_or(false, |instance| !instance.is_torn_down())
            });
            list.clone()
        };
        for weak in snapshot {
            if let Some(instance) = weak.upgrade() {
                instance.refresh();
            }
        }
    }
}

impl std::fmt::Debug for InstanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceTracker")
            .field("live", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn instance() -> Arc<Instance> {
        Class::builder("View").build().construct(&[]).unwrap()
    }

    #[test]
    fn test_register_and_dedup() {
        let tracker = InstanceTracker::new();
        let a = instance();

        tracker.register(&a);
        tracker.register(&a);
        assert_eq!(tracker.live_count(), 1);

        let b = instance();
        tracker.register(&b);
        assert_eq!(tracker.live_count(), 2);
    }

    #[test]
    fn test_dropped_instances_are_pruned() {
        let tracker = InstanceTracker::new();
        let a = instance();
        tracker.register(&a);
        assert_eq!(tracker.live_count(), 1);

        drop(a);
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn test_sweep_refreshes_live_instances_only() {
        let tracker = InstanceTracker::new();
        let hits = Arc::new(AtomicU64::new(0));

        let live = instance();
        let counter = hits.clone();
        live.set_refresh(Box::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        tracker.register(&live);

        let dead = instance();
        let counter = hits.clone();
        dead.set_refresh(Box::new(move || {
            counter.fetch_add(100, Ordering::Relaxed);
        }));
        tracker.register(&dead);
        dead.teardown();

        tracker.sweep();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(tracker.live_count(), 1);
    }

    #[test]
    fn test_sweep_on_empty_tracker_is_a_noop() {
        let tracker = InstanceTracker::new();
        tracker.sweep();
        assert_eq!(tracker.live_count(), 0);
    }
}
