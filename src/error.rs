//! Error taxonomy for the crate.
//!
//! Two families: `BuildError` covers everything detectable while the network
//! is being assembled (bad topology, missing or short schedules), `SimError`
//! covers failures during a simulation run (a policy producing an invalid
//! allocation, or the per-node accounting not closing). Both are fatal: there
//! is no retry path anywhere, a failure means bad input data or a policy bug.

use thiserror::Error;

/// Construction-time errors. Detected by `NetworkBuilder`, never at run time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("duplicate name '{name}'")]
    DuplicateName { name: String },

    #[error("link '{link}' references unknown node '{node}'")]
    DanglingEndpoint { link: String, node: String },

    #[error("unknown entity '{name}'")]
    UnknownEntity { name: String },

    #[error("cycle detected involving node '{node}'")]
    CycleDetected { node: String },

    #[error("node '{node}' has no {kind} schedule")]
    MissingSchedule { node: String, kind: &'static str },

    #[error("{kind} schedule on '{entity}' has length {actual}, horizon is {expected}")]
    ScheduleLengthMismatch {
        entity: String,
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("node '{node}' has no allocation policy")]
    MissingPolicy { node: String },

    #[error("policy on node '{node}' references link '{link}' which does not leave it")]
    PolicyLinkMismatch { node: String, link: String },

    #[error("node '{node}' requires a {expected} policy")]
    PolicyKindMismatch { node: String, expected: &'static str },

    #[error("link '{link}' leaves node '{node}' but no policy ever routes flow onto it")]
    UnroutedLink { node: String, link: String },

    #[error("policy on node '{node}' routes onto link '{link}' more than once")]
    DuplicateAllocationLink { node: String, link: String },

    #[error("invalid share {value} on node '{node}': {reason}")]
    InvalidShare {
        node: String,
        value: f64,
        reason: &'static str,
    },

    #[error("reservoir '{node}' has invalid storage bounds [{min}, {max}] (initial {initial})")]
    InvalidStorageBounds {
        node: String,
        min: f64,
        max: f64,
        initial: f64,
    },

    #[error("node '{node}' is unreachable: no incoming link and no inflow schedule")]
    UnreachableNode { node: String },

    #[error("node '{node}' is a dead end: no outgoing link and not a terminal node")]
    DeadEndNode { node: String },
}

/// Run-time errors. Abort the current run; history recorded for earlier,
/// fully completed timesteps remains valid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("allocation failed at node '{node}', timestep {timestep}: {reason}")]
    Allocation {
        node: String,
        timestep: usize,
        reason: String,
    },

    #[error(
        "mass balance violated at node '{node}', timestep {timestep}: \
         inflow {inflow} != outflow {outflow} + consumption {consumption} \
         + spill {spill} + delta_storage {delta_storage} (tol {tol})"
    )]
    MassBalance {
        node: String,
        timestep: usize,
        inflow: f64,
        outflow: f64,
        consumption: f64,
        spill: f64,
        delta_storage: f64,
        tol: f64,
    },

    #[error("{kind} schedule on '{entity}' has no entry for timestep {timestep}")]
    ScheduleOutOfRange {
        entity: String,
        kind: &'static str,
        timestep: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_carries_context() {
        let e = BuildError::ScheduleLengthMismatch {
            entity: "R1".into(),
            kind: "inflow",
            expected: 12,
            actual: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("R1"));
        assert!(msg.contains("12"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn test_sim_error_names_node_and_timestep() {
        let e = SimError::Allocation {
            node: "J6".into(),
            timestep: 4,
            reason: "allocation 12 exceeds available inflow 10".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("J6"));
        assert!(msg.contains("timestep 4"));
    }
}
