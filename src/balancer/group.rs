//! Concurrent keyed registry of balancer instances
//!
//! A [`Group`] maps an identifier to a lazily-constructed balancer and
//! guarantees exactly one surviving instance per identifier, no matter how
//! many callers race the first access. First access is optimistic: the
//! factory runs outside any lock, and an atomic insert-if-absent picks the
//! winner; losing candidates are closed on the spot. A single `close` call
//! drains every held instance and makes the group permanently unusable.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::{Balancer, BalancerFactory, BalancerResult};

/// Registry of one balancer per destination identifier
///
/// All methods take `&self`; the group is safe to share across threads
/// without external locking.
pub struct Group {
    /// Constructor invoked on first access of a new identifier
    factory: BalancerFactory,
    /// Installed balancers by identifier
    store: DashMap<String, Arc<dyn Balancer>>,
    /// Set once by `close`; gates every store access
    closed: AtomicBool,
}

impl Group {
    /// Create an empty group backed by the given factory
    pub fn new(factory: BalancerFactory) -> Self {
        Self {
            factory,
            store: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the balancer for `id`, creating it on first access
    ///
    /// Concurrent first accesses for the same identifier may each construct
    /// a candidate; exactly one wins the install and every caller gets the
    /// winner. Losing candidates are closed before this returns (a failed
    /// close is logged, never propagated).
    ///
    /// # Panics
    ///
    /// Panics if the group has been closed. Using a group after teardown is
    /// a contract violation, not a recoverable condition.
    pub fn get(&self, id: &str) -> Arc<dyn Balancer> {
        assert!(
            !self.closed.load(Ordering::SeqCst),
            "balancer group has been closed"
        );

        if let Some(existing) = self.store.get(id) {
            return existing.value().clone();
        }

        // Construct outside the shard lock: the factory may be arbitrarily
        // slow and must not stall lookups for other identifiers.
        let candidate = (self.factory)();

        let installed = match self.store.entry(id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(candidate.clone());
                debug!(id = %id, "installed new balancer");
                candidate
            }
            Entry::Occupied(slot) => {
                let winner = slot.get().clone();
                drop(slot);
                if let Err(e) = candidate.close() {
                    warn!(id = %id, error = %e, "failed to close losing balancer candidate");
                }
                winner
            }
        };

        // A close may have started after the entry check above. Whichever
        // of this path or the drain wins the removal releases the entry,
        // so nothing installed mid-teardown can leak.
        if self.closed.load(Ordering::SeqCst) {
            if let Some((_, straggler)) = self.store.remove(id) {
                if let Err(e) = straggler.close() {
                    warn!(id = %id, error = %e, "failed to close balancer for identifier");
                }
            }
            panic!("balancer group has been closed");
        }

        installed
    }

    /// Close the group, draining and releasing every held balancer
    ///
    /// Entries are released one at a time; a failed release is logged with
    /// its identifier and does not stop the drain. Blocks until the drain
    /// has visited every entry. Calling `close` on an already-closed group
    /// is a no-op returning `Ok`.
    ///
    /// Per-entry release failures are not aggregated into the returned
    /// error; a complete drain reports `Ok` even when individual releases
    /// failed (they are visible in the warn log).
    pub fn close(&self) -> BalancerResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Serial drain: one release at a time bounds the pressure teardown
        // puts on whatever the balancers hold (sockets, upstream sessions).
        let ids: Vec<String> = self.store.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, balancer)) = self.store.remove(&id) {
                if let Err(e) = balancer.close() {
                    warn!(id = %id, error = %e, "failed to close balancer for identifier");
                }
            }
        }
        Ok(())
    }

    /// Number of installed balancers
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True if no balancer has been installed yet
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// True once `close` has begun
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("entries", &self.store.len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
