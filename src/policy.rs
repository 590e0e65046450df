//! The allocation rules.
//!
//! Each rule is a deterministic function of the current timestep, the node's
//! finalized available inflow, and the exogenous parameters for that
//! timestep. It produces the volumes written onto the node's outgoing links
//! plus the node-local quantities (consumption, spill, storage change) the
//! mass-balance check accounts for. `evaluate` dispatches on the `Policy`
//! variant attached to the node; the arithmetic itself lives in small pure
//! functions so the properties are testable without a network.

use crate::error::SimError;
use crate::network::{Network, NodeId, NodeKind, OverflowRule, Policy, RemainderRule};
use smallvec::SmallVec;

/// Per-link allocations of one node for one timestep. Nodes rarely have more
/// than a few outgoing links, so this stays on the stack.
pub type Allocations = SmallVec<[(crate::network::LinkId, f64); 4]>;

/// Everything a policy decides for one node in one timestep.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub allocations: Allocations,
    /// Volume leaving the system at this node (demand consumption, or the
    /// whole inflow at an outlet).
    pub consumed: f64,
    /// Demand not met this timestep. Informational; not part of the balance.
    pub unmet_demand: f64,
    /// Volume accounted for but not conveyed anywhere. Enters the node's
    /// mass balance.
    pub spill: f64,
    /// Reservoir release actually performed (excluding forced spill).
    pub release: f64,
    /// Reservoir spill forced by the maximum storage bound. Conveyed on the
    /// release link (so it is already part of the outflow), recorded
    /// separately from the controlled release.
    pub forced_spill: f64,
    /// Staged reservoir storage for the next timestep's opening state.
    pub new_storage: Option<f64>,
}

/// Evaluates the policy attached to `node` against its finalized `inflow`.
/// `storage` is the reservoir's opening storage for this timestep and must be
/// `Some` exactly for reservoir nodes.
pub fn evaluate(
    network: &Network,
    node: NodeId,
    t: usize,
    inflow: f64,
    storage: Option<f64>,
) -> Result<Outcome, SimError> {
    let name = network.node_name(node);
    match network.policy(node) {
        Policy::Proportional { shares, remainder } => {
            let mut outcome = Outcome::default();
            let mut allocated = 0.0;
            for (link, schedule) in shares {
                let pct = schedule.value_at(t, name, "share")?;
                let volume = inflow * pct / 100.0;
                outcome.allocations.push((*link, volume));
                allocated += volume;
            }
            let residual = (inflow - allocated).max(0.0);
            match remainder {
                RemainderRule::Unallocated => outcome.spill = residual,
                RemainderRule::ToLink(link) => outcome.allocations.push((*link, residual)),
            }
            Ok(outcome)
        }

        Policy::DemandCap { offtake, bypass, max_share } => {
            let target = network.link_target(*offtake);
            let demand = match network.demand(target) {
                Some(schedule) => schedule.value_at(t, network.node_name(target), "demand")?,
                None => {
                    return Err(SimError::Allocation {
                        node: name.to_string(),
                        timestep: t,
                        reason: format!(
                            "offtake target '{}' has no demand schedule",
                            network.node_name(target)
                        ),
                    })
                }
            };
            let (taken, passed) =
                demand_cap(inflow, demand, *max_share, network.capacity(*offtake));
            let mut outcome = Outcome::default();
            outcome.allocations.push((*offtake, taken));
            outcome.allocations.push((*bypass, passed));
            Ok(outcome)
        }

        Policy::Transfer { link, overflow } => {
            let (flow, excess) = capped_transfer(inflow, network.capacity(*link));
            if excess > 0.0 && *overflow == OverflowRule::Error {
                return Err(SimError::Allocation {
                    node: name.to_string(),
                    timestep: t,
                    reason: format!(
                        "inflow {inflow} exceeds capacity {} of link '{}'",
                        network.capacity(*link).unwrap_or(f64::INFINITY),
                        network.link_name(*link)
                    ),
                });
            }
            let mut outcome = Outcome::default();
            outcome.allocations.push((*link, flow));
            outcome.spill = excess;
            Ok(outcome)
        }

        Policy::Release { link, target } => {
            let opening = storage.unwrap_or(0.0);
            let (min_storage, max_storage) = match network.node_kind(node) {
                NodeKind::Reservoir { min_storage, max_storage, .. } => (*min_storage, *max_storage),
                _ => {
                    return Err(SimError::Allocation {
                        node: name.to_string(),
                        timestep: t,
                        reason: "Release policy on a node without storage".to_string(),
                    })
                }
            };
            let target_release = target.value_at(t, name, "target_release")?;
            let balance = mass_balance(opening, inflow, target_release, min_storage, max_storage);
            let mut outcome = Outcome::default();
            outcome
                .allocations
                .push((*link, balance.release + balance.spill));
            outcome.release = balance.release;
            outcome.forced_spill = balance.spill;
            outcome.new_storage = Some(balance.new_storage);
            Ok(outcome)
        }

        Policy::Consume { excess } => {
            let demand = match network.demand(node) {
                Some(schedule) => schedule.value_at(t, name, "demand")?,
                None => {
                    return Err(SimError::Allocation {
                        node: name.to_string(),
                        timestep: t,
                        reason: "demand node has no demand schedule".to_string(),
                    })
                }
            };
            let (consumed, unmet, surplus) = consume(inflow, demand);
            let mut outcome = Outcome {
                consumed,
                unmet_demand: unmet,
                ..Outcome::default()
            };
            match excess {
                Some(link) => outcome.allocations.push((*link, surplus)),
                None => outcome.spill = surplus,
            }
            Ok(outcome)
        }

        Policy::Terminal => Ok(Outcome {
            consumed: inflow,
            ..Outcome::default()
        }),
    }
}

/// Sequential offtake: claim `min(max_share * available, demand)` subject to
/// the conveyance capacity, pass the rest downstream. Chained along a channel
/// this gives upstream offtakes strict priority while letting downstream ones
/// claim whatever upstream left unused.
pub fn demand_cap(
    available: f64,
    demand: f64,
    max_share: f64,
    capacity: Option<f64>,
) -> (f64, f64) {
    let mut taken = (max_share * available).min(demand);
    if let Some(cap) = capacity {
        taken = taken.min(cap);
    }
    let taken = taken.max(0.0);
    (taken, available - taken)
}

/// Full inflow onto one link, bounded by its capacity. Returns (flow, excess).
pub fn capped_transfer(available: f64, capacity: Option<f64>) -> (f64, f64) {
    match capacity {
        Some(cap) if available > cap => (cap, available - cap),
        _ => (available, 0.0),
    }
}

/// Demand-node consumption. Returns (consumed, unmet, surplus).
pub fn consume(available: f64, demand: f64) -> (f64, f64, f64) {
    let consumed = available.min(demand).max(0.0);
    (consumed, (demand - consumed).max(0.0), available - consumed)
}

/// Result of one reservoir mass-balance step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirBalance {
    /// Controlled release, capped by the target and by water above the
    /// minimum pool.
    pub release: f64,
    /// Forced release above the target, when storage would exceed the
    /// maximum. Recorded separately from the controlled release.
    pub spill: f64,
    pub new_storage: f64,
}

/// `release = min(target, storage + inflow - min_storage)`, never negative;
/// anything that would push storage above `max_storage` spills regardless of
/// the target. For an opening storage within `[min_storage, max_storage]` the
/// closing storage stays within those bounds; the function conserves volume
/// exactly, so an opening below the dead pool (which the builder makes
/// unrepresentable) is carried through rather than papered over.
pub fn mass_balance(
    storage: f64,
    inflow: f64,
    target_release: f64,
    min_storage: f64,
    max_storage: f64,
) -> ReservoirBalance {
    let available = storage + inflow - min_storage;
    let release = target_release.min(available).max(0.0);

    let after_release = storage + inflow - release;
    let spill = (after_release - max_storage).max(0.0);

    ReservoirBalance {
        release,
        spill,
        new_storage: (after_release - spill).min(max_storage),
    }
}
