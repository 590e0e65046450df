use super::types::*;
use crate::error::BuildError;
use crate::schedule::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Columnar store for nodes and links.
///
/// Every per-node and per-link attribute lives in its own dense column
/// indexed by `NodeId`/`LinkId`, so the routing engine's hot loop walks
/// parallel arrays instead of chasing pointers through a node object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    // Node columns
    pub node_kinds: Vec<NodeKind>,
    pub node_meta: Vec<NodeMetadata>,
    pub inflow: Vec<Option<Schedule>>,
    pub demand: Vec<Option<Schedule>>,
    pub policies: Vec<Option<Policy>>,

    // Link columns
    pub link_kinds: Vec<LinkKind>,
    pub link_meta: Vec<LinkMetadata>,
    pub link_from: Vec<NodeId>,
    pub link_to: Vec<NodeId>,
    pub capacity: Vec<Option<f64>>,

    // Name lookup caches. Not serialized, rebuilt on load.
    #[serde(skip)]
    node_index: HashMap<String, NodeId>,
    #[serde(skip)]
    link_index: HashMap<String, LinkId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.node_kinds.len()
    }

    pub fn link_count(&self) -> usize {
        self.link_kinds.len()
    }

    /// Rebuilds the name caches after deserialization.
    pub fn rebuild_name_cache(&mut self) {
        self.node_index = self
            .node_meta
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), NodeId::new(i)))
            .collect();
        self.link_index = self
            .link_meta
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), LinkId::new(i)))
            .collect();
    }

    // Nodes and links share one namespace: history lookups are by bare
    // entity name, so a link shadowing a node's name would be unreadable.
    pub fn add_node(&mut self, name: &str, kind: NodeKind) -> Result<NodeId, BuildError> {
        if self.node_index.contains_key(name) || self.link_index.contains_key(name) {
            return Err(BuildError::DuplicateName { name: name.to_string() });
        }
        let id = NodeId::new(self.node_kinds.len());
        self.node_kinds.push(kind);
        self.node_meta.push(NodeMetadata { name: name.to_string() });
        self.inflow.push(None);
        self.demand.push(None);
        self.policies.push(None);
        self.node_index.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_link(
        &mut self,
        name: &str,
        kind: LinkKind,
        from: &str,
        to: &str,
        capacity: Option<f64>,
    ) -> Result<LinkId, BuildError> {
        if self.link_index.contains_key(name) || self.node_index.contains_key(name) {
            return Err(BuildError::DuplicateName { name: name.to_string() });
        }
        let from_id = self.node_id(from).ok_or_else(|| BuildError::DanglingEndpoint {
            link: name.to_string(),
            node: from.to_string(),
        })?;
        let to_id = self.node_id(to).ok_or_else(|| BuildError::DanglingEndpoint {
            link: name.to_string(),
            node: to.to_string(),
        })?;

        let id = LinkId::new(self.link_kinds.len());
        self.link_kinds.push(kind);
        self.link_meta.push(LinkMetadata { name: name.to_string() });
        self.link_from.push(from_id);
        self.link_to.push(to_id);
        self.capacity.push(capacity);
        self.link_index.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_index.get(name).copied()
    }

    pub fn link_id(&self, name: &str) -> Option<LinkId> {
        self.link_index.get(name).copied()
    }

    pub fn node_name(&self, id: NodeId) -> &str {
        &self.node_meta[id.index()].name
    }

    pub fn link_name(&self, id: LinkId) -> &str {
        &self.link_meta[id.index()].name
    }
}
