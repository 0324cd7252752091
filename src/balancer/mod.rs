//! Balancer group management for the broker
//!
//! Each logical destination (a service name, a connection group) gets its
//! own balancing instance, created lazily on first use and shared by every
//! caller that asks for the same identifier afterwards.
//!
//! The registry requires exactly one capability of a balancer: it can be
//! closed. Selection semantics (round-robin, weighted, ...) are the
//! balancer's own business; [`RoundRobin`] is the stock implementation.

pub mod error;
pub mod group;
pub mod round_robin;

pub use error::{BalancerError, BalancerResult};
pub use group::Group;
pub use round_robin::{Endpoint, RoundRobin};

use std::sync::Arc;

/// A routing/load-distribution instance owned by a [`Group`]
///
/// The group uses exactly one capability: release. Everything else a
/// balancer can do is opaque to the registry.
pub trait Balancer: Send + Sync {
    /// Release the balancer and whatever resources it holds
    ///
    /// May fail; callers that own the instance decide whether the failure
    /// is fatal (the group never treats it as such).
    fn close(&self) -> BalancerResult<()>;
}

/// Niladic constructor producing a fresh balancer
///
/// Supplied once at group construction and invoked on first access of each
/// new identifier.
pub type BalancerFactory = Box<dyn Fn() -> Arc<dyn Balancer> + Send + Sync>;
