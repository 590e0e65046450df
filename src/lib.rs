//! Discrete-time water-allocation simulator.
//!
//! Exogenous hydrological inflows are routed through a directed network of
//! reservoirs, junctions, farms, urban offtakes and outlets. Each node
//! carries a deterministic allocation policy; the routing engine evaluates
//! the nodes in topological order once per timestep, writes the resulting
//! flows onto the links, updates reservoir storage by mass balance and
//! records every tracked field into an append-only history. No optimization
//! is performed anywhere.
//!
//! Typical use: assemble a [`NetworkBuilder`], attach schedules and policies,
//! `build(horizon)` the immutable [`Network`], then drive it with a
//! [`Simulator`] (or a parallel [`scenario`] sweep) and read the results back
//! through [`History::series`].

pub mod display;
pub mod engine;
pub mod error;
pub mod history;
pub mod network;
pub mod policy;
pub mod scenario;
pub mod schedule;
pub mod simulator;

// Re-exports for convenient access
pub use engine::{RoutingEngine, RunState};
pub use error::{BuildError, SimError};
pub use history::History;
pub use network::{
    LinkId, LinkKind, Network, NetworkBuilder, NodeId, NodeKind, OverflowRule, Policy,
    RemainderRule,
};
pub use schedule::Schedule;
pub use simulator::{RunStatus, Simulator};
