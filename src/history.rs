//! Append-only record of a simulation run.
//!
//! One snapshot of every tracked field per completed timestep, stored as
//! dense per-entity series. The routing engine appends after a step fully
//! passes its checks, so on an aborted run the history holds exactly the
//! completed timesteps and nothing from the failed one. Read-only for
//! consumers; reporting and plotting live outside this crate and take the
//! JSON export.

use crate::engine::RunState;
use crate::network::Network;
use serde::Serialize;
use std::collections::HashMap;

/// Node field names accepted by [`History::series`].
pub const NODE_FIELDS: &[&str] = &[
    "inflow",
    "outflow",
    "consumption",
    "unmet_demand",
    "spill",
    "release",
    "storage",
];

/// Link field names accepted by [`History::series`].
pub const LINK_FIELDS: &[&str] = &["flow"];

#[derive(Debug, Clone, Serialize)]
pub struct History {
    /// Timestep indices recorded, in completion order.
    timesteps: Vec<usize>,

    node_names: Vec<String>,
    link_names: Vec<String>,

    // Per-node series, one inner Vec per node, one value per recorded step.
    inflow: Vec<Vec<f64>>,
    outflow: Vec<Vec<f64>>,
    consumption: Vec<Vec<f64>>,
    unmet_demand: Vec<Vec<f64>>,
    spill: Vec<Vec<f64>>,
    release: Vec<Vec<f64>>,
    storage: Vec<Vec<f64>>,

    // Per-link series.
    flow: Vec<Vec<f64>>,

    #[serde(skip)]
    node_index: HashMap<String, usize>,
    #[serde(skip)]
    link_index: HashMap<String, usize>,
}

impl History {
    pub fn new(network: &Network) -> Self {
        let n = network.node_count();
        let m = network.link_count();

        let node_names: Vec<String> = (0..n)
            .map(|i| network.node_name(crate::network::NodeId::new(i)).to_string())
            .collect();
        let link_names: Vec<String> = (0..m)
            .map(|i| network.link_name(crate::network::LinkId::new(i)).to_string())
            .collect();

        let node_index = node_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let link_index = link_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        Self {
            timesteps: Vec::new(),
            node_names,
            link_names,
            inflow: vec![Vec::new(); n],
            outflow: vec![Vec::new(); n],
            consumption: vec![Vec::new(); n],
            unmet_demand: vec![Vec::new(); n],
            spill: vec![Vec::new(); n],
            release: vec![Vec::new(); n],
            storage: vec![Vec::new(); n],
            flow: vec![Vec::new(); m],
            node_index,
            link_index,
        }
    }

    /// Number of fully completed, recorded timesteps.
    pub fn steps(&self) -> usize {
        self.timesteps.len()
    }

    pub fn timesteps(&self) -> &[usize] {
        &self.timesteps
    }

    /// Appends one snapshot of every tracked field. Called by the routing
    /// engine only after the whole step has passed its checks.
    pub fn record_step(&mut self, network: &Network, state: &RunState, t: usize) {
        self.timesteps.push(t);
        for i in 0..network.node_count() {
            self.inflow[i].push(state.node_inflow[i]);
            self.outflow[i].push(state.node_outflow[i]);
            self.consumption[i].push(state.consumed[i]);
            self.unmet_demand[i].push(state.unmet_demand[i]);
            self.spill[i].push(state.spill[i]);
            self.release[i].push(state.release[i]);
            self.storage[i].push(state.storage[i]);
        }
        for i in 0..network.link_count() {
            self.flow[i].push(state.link_flow[i]);
        }
    }

    /// The recorded series for `(entity, field)`, one value per completed
    /// timestep. `None` if the entity or the field does not exist.
    pub fn series(&self, entity: &str, field: &str) -> Option<&[f64]> {
        if let Some(&i) = self.node_index.get(entity) {
            let column = match field {
                "inflow" => &self.inflow,
                "outflow" => &self.outflow,
                "consumption" => &self.consumption,
                "unmet_demand" => &self.unmet_demand,
                "spill" => &self.spill,
                "release" => &self.release,
                "storage" => &self.storage,
                _ => return None,
            };
            return Some(&column[i]);
        }
        if let Some(&i) = self.link_index.get(entity) {
            return match field {
                "flow" => Some(&self.flow[i]),
                _ => None,
            };
        }
        None
    }

    /// JSON export for external reporting tools.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
