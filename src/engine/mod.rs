//! The synchronous, single-threaded routing engine.
//!
//! One `step(t)` walks the network in topological order, so every node sees
//! its predecessors' link flows already finalized within the same step. Each
//! node's policy is evaluated exactly once; its allocations are checked
//! (non-negative, within link capacity, within the available volume) and the
//! per-node mass balance must close within the engine tolerance. Any failure
//! aborts the step before storage is committed or history is written, so a
//! step either fully completes and is recorded, or leaves no trace.

pub mod state;

pub use state::RunState;

use crate::error::SimError;
use crate::history::History;
use crate::network::{Network, NodeId};
use crate::policy;

pub const DEFAULT_TOLERANCE: f64 = 1e-9;

pub struct RoutingEngine {
    tolerance: f64,
}

impl Default for RoutingEngine {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl RoutingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Advances the simulation by one timestep. On success the step is
    /// committed and appended to `history`; on error nothing is.
    pub fn step(
        &self,
        network: &Network,
        state: &mut RunState,
        history: &mut History,
        t: usize,
    ) -> Result<(), SimError> {
        state.begin_step();

        for &node in network.topological_order() {
            self.evaluate_node(network, state, node, t)?;
        }

        state.commit_storage();
        history.record_step(network, state, t);
        Ok(())
    }

    fn evaluate_node(
        &self,
        network: &Network,
        state: &mut RunState,
        node: NodeId,
        t: usize,
    ) -> Result<(), SimError> {
        let idx = node.index();
        let name = network.node_name(node);
        let tol = self.tolerance;

        // 1. Finalize available inflow: exogenous schedule plus incoming link
        // flows, all written earlier this step by topological order.
        let mut inflow = match network.inflow(node) {
            Some(schedule) => schedule.value_at(t, name, "inflow")?,
            None => 0.0,
        };
        for &link in network.in_links(node) {
            inflow += state.link_flow[link.index()];
        }
        state.node_inflow[idx] = inflow;

        // 2. Evaluate the allocation policy.
        let has_storage = network.node_kind(node).has_storage();
        let opening_storage = has_storage.then(|| state.storage[idx]);
        let outcome = policy::evaluate(network, node, t, inflow, opening_storage)?;

        // 3. Check and write the allocations onto the outgoing links.
        let mut outflow = 0.0;
        for &(link, volume) in &outcome.allocations {
            if volume < -tol {
                return Err(SimError::Allocation {
                    node: name.to_string(),
                    timestep: t,
                    reason: format!(
                        "negative allocation {volume} onto link '{}'",
                        network.link_name(link)
                    ),
                });
            }
            if let Some(cap) = network.capacity(link) {
                if volume > cap + tol {
                    return Err(SimError::Allocation {
                        node: name.to_string(),
                        timestep: t,
                        reason: format!(
                            "allocation {volume} exceeds capacity {cap} of link '{}'",
                            network.link_name(link)
                        ),
                    });
                }
            }
            // Accumulate: flows are zeroed in begin_step, and a policy may
            // never lose an entry to an earlier one on the same link.
            let volume = volume.max(0.0);
            state.link_flow[link.index()] += volume;
            outflow += volume;
        }

        // Allocations may only exceed the inflow by what a reservoir can
        // draw from storage above its dead pool.
        let storage_headroom = opening_storage
            .map(|s| s - min_storage(network, node))
            .unwrap_or(0.0);
        if outflow + outcome.consumed + outcome.spill > inflow + storage_headroom + tol {
            return Err(SimError::Allocation {
                node: name.to_string(),
                timestep: t,
                reason: format!(
                    "allocated {} against available {}",
                    outflow + outcome.consumed + outcome.spill,
                    inflow + storage_headroom
                ),
            });
        }

        state.node_outflow[idx] = outflow;
        state.consumed[idx] = outcome.consumed;
        state.unmet_demand[idx] = outcome.unmet_demand;
        // Forced reservoir spill already travels on the release link; it is
        // recorded as spill but only the non-conveyed part enters the balance.
        state.spill[idx] = outcome.spill + outcome.forced_spill;
        state.release[idx] = outcome.release;
        if let Some(new_storage) = outcome.new_storage {
            state.stage_storage(idx, new_storage);
        }

        // 4. Mass balance: inflow == outflow + consumption + spill + Δstorage.
        // A violation is a policy bug, not a runtime condition; fatal.
        let delta_storage = state.staged_storage(idx) - opening_storage.unwrap_or(0.0);
        let residual = inflow - (outflow + outcome.consumed + outcome.spill + delta_storage);
        if residual.abs() > tol {
            return Err(SimError::MassBalance {
                node: name.to_string(),
                timestep: t,
                inflow,
                outflow,
                consumption: outcome.consumed,
                spill: outcome.spill,
                delta_storage,
                tol,
            });
        }

        Ok(())
    }
}

fn min_storage(network: &Network, node: NodeId) -> f64 {
    match network.node_kind(node) {
        crate::network::NodeKind::Reservoir { min_storage, .. } => *min_storage,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LinkKind, NetworkBuilder, OverflowRule, Policy, RemainderRule};
    use crate::schedule::Schedule;

    /// source junction splitting 50/50 to two outlets over two timesteps.
    fn split_network() -> Network {
        let mut b = NetworkBuilder::new();
        b.add_junction("J1").unwrap();
        b.add_outlet("O1").unwrap();
        b.add_outlet("O2").unwrap();
        let a = b.add_link("a", LinkKind::Transfer, "J1", "O1", None).unwrap();
        let c = b.add_link("c", LinkKind::Transfer, "J1", "O2", None).unwrap();
        b.set_inflow("J1", Schedule::new(vec![100.0, 200.0])).unwrap();
        b.set_policy(
            "J1",
            Policy::Proportional {
                shares: vec![
                    (a, Schedule::constant(50.0, 2)),
                    (c, Schedule::constant(50.0, 2)),
                ],
                remainder: RemainderRule::Unallocated,
            },
        )
        .unwrap();
        b.build(2).unwrap()
    }

    #[test]
    fn test_even_split_propagates_to_outlets() {
        let net = split_network();
        let engine = RoutingEngine::new();
        let mut state = RunState::new(&net);
        let mut history = History::new(&net);

        engine.step(&net, &mut state, &mut history, 0).unwrap();
        assert_eq!(history.series("a", "flow").unwrap(), &[50.0]);
        assert_eq!(history.series("O1", "inflow").unwrap(), &[50.0]);
        assert_eq!(history.series("O2", "consumption").unwrap(), &[50.0]);

        engine.step(&net, &mut state, &mut history, 1).unwrap();
        assert_eq!(history.series("O1", "inflow").unwrap(), &[50.0, 100.0]);
        assert_eq!(history.series("O2", "inflow").unwrap(), &[50.0, 100.0]);
        // No volume lost anywhere.
        for name in ["J1", "O1", "O2"] {
            for v in history.series(name, "spill").unwrap() {
                assert_eq!(*v, 0.0);
            }
        }
    }

    #[test]
    fn test_transfer_overflow_error_aborts_step() {
        let mut b = NetworkBuilder::new();
        b.add_junction("J1").unwrap();
        b.add_outlet("O1").unwrap();
        let l = b
            .add_link("l", LinkKind::Pipeline, "J1", "O1", Some(5.0))
            .unwrap();
        b.set_inflow("J1", Schedule::new(vec![10.0])).unwrap();
        b.set_policy("J1", Policy::Transfer { link: l, overflow: OverflowRule::Error }).unwrap();
        let net = b.build(1).unwrap();

        let engine = RoutingEngine::new();
        let mut state = RunState::new(&net);
        let mut history = History::new(&net);
        let err = engine.step(&net, &mut state, &mut history, 0).unwrap_err();
        assert!(matches!(err, SimError::Allocation { .. }), "got {err:?}");
        // The failed step left no trace.
        assert_eq!(history.steps(), 0);
    }

    #[test]
    fn test_transfer_overflow_spill_is_recorded() {
        let mut b = NetworkBuilder::new();
        b.add_junction("J1").unwrap();
        b.add_outlet("O1").unwrap();
        let l = b
            .add_link("l", LinkKind::Pipeline, "J1", "O1", Some(5.0))
            .unwrap();
        b.set_inflow("J1", Schedule::new(vec![10.0])).unwrap();
        b.set_policy("J1", Policy::Transfer { link: l, overflow: OverflowRule::Spill }).unwrap();
        let net = b.build(1).unwrap();

        let engine = RoutingEngine::new();
        let mut state = RunState::new(&net);
        let mut history = History::new(&net);
        engine.step(&net, &mut state, &mut history, 0).unwrap();
        assert_eq!(history.series("l", "flow").unwrap(), &[5.0]);
        assert_eq!(history.series("J1", "spill").unwrap(), &[5.0]);
    }

    #[test]
    fn test_reservoir_storage_persists_across_steps() {
        let mut b = NetworkBuilder::new();
        b.add_reservoir("R1", 5.0, 100.0, 50.0).unwrap();
        b.add_outlet("O1").unwrap();
        let l = b.add_link("river", LinkKind::River, "R1", "O1", None).unwrap();
        b.set_inflow("R1", Schedule::new(vec![10.0, 10.0])).unwrap();
        b.set_policy(
            "R1",
            Policy::Release {
                link: l,
                target: Schedule::constant(15.0, 2),
            },
        )
        .unwrap();
        let net = b.build(2).unwrap();

        let engine = RoutingEngine::new();
        let mut state = RunState::new(&net);
        let mut history = History::new(&net);
        engine.step(&net, &mut state, &mut history, 0).unwrap();
        engine.step(&net, &mut state, &mut history, 1).unwrap();

        // 50 + 10 - 15 = 45, then 45 + 10 - 15 = 40.
        assert_eq!(history.series("R1", "storage").unwrap(), &[45.0, 40.0]);
        assert_eq!(history.series("R1", "release").unwrap(), &[15.0, 15.0]);
        assert_eq!(history.series("river", "flow").unwrap(), &[15.0, 15.0]);
    }

    #[test]
    fn test_inflow_sums_links_and_exogenous() {
        // Two sources converging on one junction which also has its own
        // exogenous inflow.
        let mut b = NetworkBuilder::new();
        b.add_junction("S1").unwrap();
        b.add_junction("S2").unwrap();
        b.add_junction("J").unwrap();
        b.add_outlet("O").unwrap();
        let a = b.add_link("a", LinkKind::Transfer, "S1", "J", None).unwrap();
        let c = b.add_link("c", LinkKind::Transfer, "S2", "J", None).unwrap();
        let d = b.add_link("d", LinkKind::Transfer, "J", "O", None).unwrap();
        b.set_inflow("S1", Schedule::new(vec![3.0])).unwrap();
        b.set_inflow("S2", Schedule::new(vec![4.0])).unwrap();
        b.set_inflow("J", Schedule::new(vec![5.0])).unwrap();
        for (node, link) in [("S1", a), ("S2", c), ("J", d)] {
            b.set_policy(node, Policy::Transfer { link, overflow: OverflowRule::Spill }).unwrap();
        }
        let net = b.build(1).unwrap();

        let engine = RoutingEngine::new();
        let mut state = RunState::new(&net);
        let mut history = History::new(&net);
        engine.step(&net, &mut state, &mut history, 0).unwrap();
        assert_eq!(history.series("J", "inflow").unwrap(), &[12.0]);
        assert_eq!(history.series("O", "inflow").unwrap(), &[12.0]);
    }
}
