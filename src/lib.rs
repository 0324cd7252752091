//! Hermes broker primitives
//!
//! The crate centers on [`balancer::Group`]: a concurrency-safe keyed
//! registry that gives each logical destination its own lazily-created
//! balancing instance. First access races are resolved optimistically
//! (construct outside the lock, atomic insert-if-absent, losers released),
//! and a single `close` drains every held instance.

pub mod balancer;

pub use balancer::{
    Balancer, BalancerError, BalancerFactory, BalancerResult, Endpoint, Group, RoundRobin,
};
