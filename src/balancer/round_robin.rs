//! Round-robin balancer over labeled endpoints
//!
//! The stock [`Balancer`] implementation: endpoints join under a label
//! (auto-generated for anonymous puts), selection walks them in insertion
//! order with an atomic cursor, and closing the balancer releases every
//! endpoint it still owns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{Balancer, BalancerResult};

/// An upstream handle a balancer distributes and owns
///
/// Typically wraps a client connection to one member of the destination
/// group. The balancer only needs to be able to release it.
pub trait Endpoint: Send + Sync {
    /// Release the endpoint (e.g. tear down its connection)
    fn close(&self) -> BalancerResult<()>;
}

/// Round-robin balancer
///
/// Selection is lock-light: a shared read lock on the endpoint list plus an
/// atomic cursor. Membership changes take the write lock; any endpoint
/// displaced by a change is closed before the call returns.
pub struct RoundRobin {
    /// Selection cursor, wraps via modulo
    seq: AtomicUsize,
    /// Counter feeding auto-generated labels
    label_seq: AtomicUsize,
    /// Labeled endpoints in insertion order
    endpoints: RwLock<Vec<(String, Arc<dyn Endpoint>)>>,
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobin {
    /// Create an empty round-robin balancer
    pub fn new() -> Self {
        Self {
            seq: AtomicUsize::new(0),
            label_seq: AtomicUsize::new(0),
            endpoints: RwLock::new(Vec::new()),
        }
    }

    /// Add an endpoint under an auto-generated label
    pub fn put(&self, endpoint: Arc<dyn Endpoint>) {
        let label = format!("__{}", self.label_seq.fetch_add(1, Ordering::SeqCst));
        self.put_labeled(label, endpoint);
    }

    /// Add or replace the endpoint under `label`
    ///
    /// A replaced endpoint is closed immediately; a failed close is logged
    /// and not propagated.
    pub fn put_labeled(&self, label: impl Into<String>, endpoint: Arc<dyn Endpoint>) {
        let label = label.into();
        let displaced = {
            let mut endpoints = self.endpoints.write();
            match endpoints.iter_mut().find(|(l, _)| *l == label) {
                Some((_, slot)) => Some(std::mem::replace(slot, endpoint)),
                None => {
                    endpoints.push((label.clone(), endpoint));
                    None
                }
            }
        };
        if let Some(old) = displaced {
            debug!(label = %label, "replaced endpoint");
            if let Err(e) = old.close() {
                warn!(label = %label, error = %e, "failed to close replaced endpoint");
            }
        }
    }

    /// Remove and close the endpoint under `label`
    ///
    /// Returns false if no such endpoint exists.
    pub fn remove(&self, label: &str) -> bool {
        let removed = {
            let mut endpoints = self.endpoints.write();
            endpoints
                .iter()
                .position(|(l, _)| l == label)
                .map(|idx| endpoints.remove(idx))
        };
        match removed {
            Some((label, endpoint)) => {
                if let Err(e) = endpoint.close() {
                    warn!(label = %label, error = %e, "failed to close removed endpoint");
                }
                true
            }
            None => false,
        }
    }

    /// Pick the next endpoint in round-robin order
    ///
    /// Returns None when the balancer holds no endpoints.
    pub fn next(&self) -> Option<Arc<dyn Endpoint>> {
        let endpoints = self.endpoints.read();
        if endpoints.is_empty() {
            return None;
        }
        let idx = self.seq.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        Some(endpoints[idx].1.clone())
    }

    /// Number of endpoints currently held
    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    /// True if the balancer holds no endpoints
    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }
}

impl Balancer for RoundRobin {
    /// Release every held endpoint, one at a time
    ///
    /// Same failure policy as the group drain: a failed endpoint close is
    /// logged and the remaining endpoints are still attempted.
    fn close(&self) -> BalancerResult<()> {
        let drained = std::mem::take(&mut *self.endpoints.write());
        for (label, endpoint) in drained {
            if let Err(e) = endpoint.close() {
                warn!(label = %label, error = %e, "failed to close endpoint");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::BalancerError;

    struct TestEndpoint {
        name: &'static str,
        closes: AtomicUsize,
        fail: bool,
    }

    impl TestEndpoint {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                closes: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                closes: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl Endpoint for TestEndpoint {
        fn close(&self) -> BalancerResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BalancerError::Release(format!("{} refuses", self.name)))
            } else {
                Ok(())
            }
        }
    }

    fn picked_ptr(endpoint: &Arc<dyn Endpoint>) -> *const () {
        Arc::as_ptr(endpoint) as *const ()
    }

    #[test]
    fn test_next_cycles_in_insertion_order() {
        let balancer = RoundRobin::new();
        let a = TestEndpoint::new("a");
        let b = TestEndpoint::new("b");
        let c = TestEndpoint::new("c");
        balancer.put_labeled("a", a.clone());
        balancer.put_labeled("b", b.clone());
        balancer.put_labeled("c", c.clone());

        let picks: Vec<_> = (0..4).map(|_| balancer.next().unwrap()).collect();
        assert_eq!(picked_ptr(&picks[0]), Arc::as_ptr(&a) as *const ());
        assert_eq!(picked_ptr(&picks[1]), Arc::as_ptr(&b) as *const ());
        assert_eq!(picked_ptr(&picks[2]), Arc::as_ptr(&c) as *const ());
        // wraps around
        assert_eq!(picked_ptr(&picks[3]), Arc::as_ptr(&a) as *const ());
    }

    #[test]
    fn test_next_on_empty_is_none() {
        let balancer = RoundRobin::new();
        assert!(balancer.next().is_none());
        assert!(balancer.is_empty());
    }

    #[test]
    fn test_put_labeled_replaces_and_closes_old() {
        let balancer = RoundRobin::new();
        let old = TestEndpoint::new("old");
        let new = TestEndpoint::new("new");

        balancer.put_labeled("x", old.clone());
        balancer.put_labeled("x", new.clone());

        assert_eq!(balancer.len(), 1);
        assert_eq!(old.close_count(), 1);
        assert_eq!(new.close_count(), 0);
    }

    #[test]
    fn test_remove_closes_endpoint() {
        let balancer = RoundRobin::new();
        let a = TestEndpoint::new("a");
        balancer.put_labeled("a", a.clone());

        assert!(balancer.remove("a"));
        assert_eq!(a.close_count(), 1);
        assert!(!balancer.remove("a"));
        assert!(balancer.next().is_none());
    }

    #[test]
    fn test_close_drains_all_despite_failures() {
        let balancer = RoundRobin::new();
        let a = TestEndpoint::failing("a");
        let b = TestEndpoint::new("b");
        balancer.put(a.clone());
        balancer.put(b.clone());

        balancer.close().unwrap();

        assert_eq!(a.close_count(), 1);
        assert_eq!(b.close_count(), 1);
        assert!(balancer.is_empty());
    }

    #[test]
    fn test_anonymous_puts_get_distinct_labels() {
        let balancer = RoundRobin::new();
        balancer.put(TestEndpoint::new("a"));
        balancer.put(TestEndpoint::new("b"));
        assert_eq!(balancer.len(), 2);
    }
}
