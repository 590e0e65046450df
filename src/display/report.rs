//! Human-readable audit report of one simulation step.
//!
//! Built from the network and the run state after a completed step; useful
//! when a mass-balance error report is not enough and the whole picture of a
//! timestep is needed.

use crate::engine::RunState;
use crate::network::{Network, NodeId, NodeKind};
use std::fmt::Write;

pub fn format_step_report(network: &Network, state: &RunState, t: usize) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "STEP REPORT for timestep {t}:");
    let _ = writeln!(output, "--------------------------------------------------");

    for &node in network.topological_order() {
        let idx = node.index();
        let name = network.node_name(node);
        let _ = write!(
            output,
            "{name:<12} in={:<10.3} out={:<10.3}",
            state.node_inflow[idx], state.node_outflow[idx]
        );
        if network.node_kind(node).has_storage() {
            let _ = write!(
                output,
                " storage={:<10.3} release={:<10.3}",
                state.storage[idx], state.release[idx]
            );
        }
        if state.consumed[idx] != 0.0 || state.unmet_demand[idx] != 0.0 {
            let _ = write!(
                output,
                " consumed={:<10.3} unmet={:<10.3}",
                state.consumed[idx], state.unmet_demand[idx]
            );
        }
        if state.spill[idx] != 0.0 {
            let _ = write!(output, " spill={:<10.3}", state.spill[idx]);
        }
        let _ = writeln!(output);

        for &link in network.out_links(node) {
            let _ = writeln!(
                output,
                "  -> {:<12} flow={:<10.3} (to {})",
                network.link_name(link),
                state.link_flow[link.index()],
                network.node_name(network.link_target(link))
            );
        }
    }
    output
}

/// One-line summary per reservoir, for sweep logs.
pub fn format_storage_summary(network: &Network, state: &RunState) -> String {
    let mut output = String::new();
    for i in 0..network.node_count() {
        let node = NodeId::new(i);
        if let NodeKind::Reservoir { min_storage, max_storage, .. } = network.node_kind(node) {
            let _ = writeln!(
                output,
                "{}: storage {:.3} in [{min_storage}, {max_storage}]",
                network.node_name(node),
                state.storage[i]
            );
        }
    }
    output
}
