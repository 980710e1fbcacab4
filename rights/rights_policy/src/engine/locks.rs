//! Usage locks.
//!
//! Counting prior grants and appending the next decision must not interleave
//! for the same policy and actor, or a burst of requests can overrun a
//! `max_uses` cap. The lock table holds one mutex per `(policy, actor)` pair
//! touched by a usage-capped permission.

use dashmap::DashMap;
use parking_lot::Mutex;
use rights_core::error::{Error, Result};
use rights_core::id::{ActorId, PolicyId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Entries kept before idle slots are pruned.
const PRUNE_THRESHOLD: usize = 4096;

/// Key of one usage lock.
pub type UsageKey = (PolicyId, ActorId);

/// Table of per-policy, per-actor usage locks.
pub struct UsageLocks {
    /// One slot per key.
    slots: DashMap<UsageKey, Arc<Mutex<()>>>,

    /// How long to wait for each slot.
    timeout: Duration,
}

impl UsageLocks {
    /// Create an empty table.
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            timeout,
        }
    }

    /// The bounded wait applied to each slot.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of slots currently allocated.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slots are allocated.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Run `f` while holding the locks for every key.
    ///
    /// Keys are locked in sorted order, so two callers with overlapping key
    /// sets cannot deadlock. With no keys `f` runs immediately.
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - Whatever `f` returned.
    /// * `Err(Error::Timeout)` - If a slot could not be acquired in time.
    pub fn run_exclusive<T, F>(&self, mut keys: Vec<UsageKey>, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if keys.is_empty() {
            return f();
        }
        keys.sort();
        keys.dedup();

        let slots: Vec<Arc<Mutex<()>>> = keys
            .iter()
            .map(|key| self.slots.entry(*key).or_default().value().clone())
            .collect();
        self.prune();

        let mut guards = Vec::with_capacity(slots.len());
        for (key, slot) in keys.iter().zip(&slots) {
            match slot.try_lock_for(self.timeout) {
                Some(guard) => guards.push(guard),
                None => {
                    warn!(
                        policy_id = %key.0,
                        actor_id = %key.1,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Timed out waiting for usage lock"
                    );
                    return Err(Error::Timeout(self.timeout));
                }
            }
        }
        trace!(locks = guards.len(), "Acquired usage locks");

        let result = f();
        drop(guards);
        result
    }

    /// Drop slots nobody is holding once the table grows large.
    fn prune(&self) {
        if self.slots.len() > PRUNE_THRESHOLD {
            self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn key(policy: i64, actor: i64) -> UsageKey {
        (PolicyId::new(policy), ActorId::new(actor))
    }

    #[test]
    fn test_no_keys_runs_immediately() {
        let locks = UsageLocks::new(Duration::from_millis(10));
        assert_eq!(locks.run_exclusive(Vec::new(), || Ok(7)).unwrap(), 7);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_duplicate_keys_do_not_self_deadlock() {
        let locks = UsageLocks::new(Duration::from_millis(50));
        let result = locks.run_exclusive(vec![key(1, 3), key(1, 3)], || Ok(()));
        assert!(result.is_ok());
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_timeout_when_held() {
        let locks = Arc::new(UsageLocks::new(Duration::from_millis(20)));
        let inner = Arc::clone(&locks);

        let result = locks.run_exclusive(vec![key(1, 3)], move || {
            thread::spawn(move || inner.run_exclusive(vec![key(1, 3)], || Ok(())))
                .join()
                .map_err(|_| Error::Config("thread panicked".to_string()))?
        });

        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[test]
    fn test_mutual_exclusion() {
        let locks = Arc::new(UsageLocks::new(Duration::from_secs(5)));
        let inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    // Opposite key orders must still not deadlock
                    let keys = if i % 2 == 0 {
                        vec![key(1, 3), key(2, 3)]
                    } else {
                        vec![key(2, 3), key(1, 3)]
                    };
                    locks
                        .run_exclusive(keys, || {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            thread::sleep(Duration::from_millis(2));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
