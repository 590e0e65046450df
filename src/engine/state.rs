//! Dense per-run mutable state.
//!
//! The network topology is immutable; everything the routing engine mutates
//! during a run lives here, in columns indexed by `NodeId`/`LinkId`. One
//! `RunState` belongs to exactly one run, so scenario sweeps can run in
//! parallel without sharing anything.

use crate::network::{Network, NodeKind};

#[derive(Debug, Clone, Default)]
pub struct RunState {
    // Per-node, recomputed every step
    pub node_inflow: Vec<f64>,
    pub node_outflow: Vec<f64>,
    pub consumed: Vec<f64>,
    pub unmet_demand: Vec<f64>,
    pub spill: Vec<f64>,
    pub release: Vec<f64>,

    /// Reservoir storage. Persists across steps; zero for non-storage nodes.
    pub storage: Vec<f64>,
    // Storage staged during a step, committed only once the whole step
    // passes its checks. A failed step leaves `storage` untouched.
    staged_storage: Vec<f64>,

    // Per-link, recomputed every step
    pub link_flow: Vec<f64>,
}

impl RunState {
    pub fn new(network: &Network) -> Self {
        let n = network.node_count();
        let storage: Vec<f64> = (0..n)
            .map(|i| match network.node_kind(crate::network::NodeId::new(i)) {
                NodeKind::Reservoir { initial_storage, .. } => *initial_storage,
                _ => 0.0,
            })
            .collect();

        Self {
            node_inflow: vec![0.0; n],
            node_outflow: vec![0.0; n],
            consumed: vec![0.0; n],
            unmet_demand: vec![0.0; n],
            spill: vec![0.0; n],
            release: vec![0.0; n],
            staged_storage: storage.clone(),
            storage,
            link_flow: vec![0.0; network.link_count()],
        }
    }

    /// Zeroes every per-step column and stages the opening storage.
    pub fn begin_step(&mut self) {
        for column in [
            &mut self.node_inflow,
            &mut self.node_outflow,
            &mut self.consumed,
            &mut self.unmet_demand,
            &mut self.spill,
            &mut self.release,
        ] {
            column.fill(0.0);
        }
        self.link_flow.fill(0.0);
        self.staged_storage.copy_from_slice(&self.storage);
    }

    pub fn stage_storage(&mut self, idx: usize, value: f64) {
        self.staged_storage[idx] = value;
    }

    pub fn staged_storage(&self, idx: usize) -> f64 {
        self.staged_storage[idx]
    }

    /// Makes the staged storage the opening storage of the next step.
    pub fn commit_storage(&mut self) {
        self.storage.copy_from_slice(&self.staged_storage);
    }
}
