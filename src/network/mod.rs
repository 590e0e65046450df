//! Core data structures for the water network.
pub mod builder;
pub mod registry;
pub mod topology;
pub mod types;

// Re-export key types for convenient access
pub use builder::{Network, NetworkBuilder};
pub use registry::Registry;
pub use types::{
    LinkId, LinkKind, LinkMetadata, NodeId, NodeKind, NodeMetadata, OverflowRule, Policy,
    RemainderRule,
};
