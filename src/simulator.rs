//! The outer timestep loop.
//!
//! A `Simulator` owns one network, one `RunState` and one `History`, and
//! advances the routing engine over its timestep sequence. It stops at the
//! first fatal error and surfaces it with the timestep and entity context;
//! history recorded for earlier, fully completed timesteps stays valid and
//! inspectable. Scenario sweeps create one simulator per scenario so runs
//! never share state.

use crate::engine::{RoutingEngine, RunState};
use crate::error::SimError;
use crate::history::History;
use crate::network::Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// No run started, or a run was reset.
    Idle,
    /// The last run completed every requested timestep (or was stopped
    /// cooperatively between steps).
    Completed,
    /// The last run aborted on a fatal error.
    Failed,
}

pub struct Simulator {
    network: Network,
    engine: RoutingEngine,
    timesteps: Vec<usize>,
    state: RunState,
    history: History,
    status: RunStatus,
}

impl Simulator {
    pub fn new(network: Network) -> Self {
        Self::with_engine(network, RoutingEngine::new())
    }

    pub fn with_engine(network: Network, engine: RoutingEngine) -> Self {
        let timesteps = (0..network.horizon()).collect();
        let state = RunState::new(&network);
        let history = History::new(&network);
        Self {
            network,
            engine,
            timesteps,
            state,
            history,
            status: RunStatus::Idle,
        }
    }

    /// Overrides the timestep sequence (default: `0..horizon`). Indices
    /// outside the schedule horizon fail at run time with full context.
    pub fn set_timesteps(&mut self, timesteps: Vec<usize>) {
        self.timesteps = timesteps;
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Runs every timestep in order. Stops at the first fatal error.
    pub fn run(&mut self) -> Result<(), SimError> {
        self.run_while(|_| true)
    }

    /// Runs timesteps while `keep_going(t)` holds, checked before each step.
    /// Stopping between steps is clean: every recorded timestep completed
    /// fully, nothing partial is kept.
    pub fn run_while(
        &mut self,
        mut keep_going: impl FnMut(usize) -> bool,
    ) -> Result<(), SimError> {
        // Fresh per-run state so a simulator can re-run on the same network.
        self.state = RunState::new(&self.network);
        self.history = History::new(&self.network);
        self.status = RunStatus::Idle;

        for i in 0..self.timesteps.len() {
            let t = self.timesteps[i];
            if !keep_going(t) {
                break;
            }
            let result = self
                .engine
                .step(&self.network, &mut self.state, &mut self.history, t);
            if let Err(e) = result {
                self.status = RunStatus::Failed;
                return Err(e);
            }
        }

        self.status = RunStatus::Completed;
        Ok(())
    }

    /// History of all completed timesteps so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn into_history(self) -> History {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LinkKind, NetworkBuilder, OverflowRule, Policy, RemainderRule};
    use crate::schedule::Schedule;

    fn split_network(capacity: Option<f64>) -> Network {
        let mut b = NetworkBuilder::new();
        b.add_junction("src").unwrap();
        b.add_junction("J").unwrap();
        b.add_outlet("O1").unwrap();
        b.add_outlet("O2").unwrap();
        let feed = b.add_link("feed", LinkKind::River, "src", "J", capacity).unwrap();
        let a = b.add_link("a", LinkKind::Transfer, "J", "O1", None).unwrap();
        let c = b.add_link("c", LinkKind::Transfer, "J", "O2", None).unwrap();
        b.set_inflow("src", Schedule::new(vec![100.0, 200.0])).unwrap();
        b.set_policy("src", Policy::Transfer { link: feed, overflow: OverflowRule::Error }).unwrap();
        b.set_policy(
            "J",
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
    fn test_end_to_end_two_step_split() {
        let mut sim = Simulator::new(split_network(None));
        sim.run().expect("run failed");
        assert_eq!(sim.status(), RunStatus::Completed);

        let h = sim.history();
        assert_eq!(h.series("O1", "inflow").unwrap(), &[50.0, 100.0]);
        assert_eq!(h.series("O2", "inflow").unwrap(), &[50.0, 100.0]);
        // Zero unmet balance anywhere in the chain.
        for name in ["src", "J", "O1", "O2"] {
            for v in h.series(name, "spill").unwrap() {
                assert_eq!(*v, 0.0);
            }
            for v in h.series(name, "unmet_demand").unwrap() {
                assert_eq!(*v, 0.0);
            }
        }
    }

    #[test]
    fn test_failed_run_keeps_completed_history() {
        // Capacity 150 with overflow-as-error: t=0 passes, t=1 aborts.
        let mut sim = Simulator::new(split_network(Some(150.0)));
        let err = sim.run().unwrap_err();
        assert_eq!(sim.status(), RunStatus::Failed);
        match err {
            SimError::Allocation { node, timestep, .. } => {
                assert_eq!(node, "src");
                assert_eq!(timestep, 1);
            }
            other => panic!("wrong error: {other:?}"),
        }
        // The completed first step is still there, untouched by the failure.
        assert_eq!(sim.history().steps(), 1);
        assert_eq!(sim.history().series("O1", "inflow").unwrap(), &[50.0]);
    }

    #[test]
    fn test_cooperative_early_stop() {
        let mut sim = Simulator::new(split_network(None));
        sim.run_while(|t| t < 1).unwrap();
        assert_eq!(sim.status(), RunStatus::Completed);
        assert_eq!(sim.history().steps(), 1);
        assert_eq!(sim.history().timesteps(), &[0]);
    }

    #[test]
    fn test_timesteps_beyond_horizon_fail_with_context() {
        let mut sim = Simulator::new(split_network(None));
        sim.set_timesteps(vec![0, 1, 2]);
        let err = sim.run().unwrap_err();
        assert!(
            matches!(err, SimError::ScheduleOutOfRange { timestep: 2, .. }),
            "got {err:?}"
        );
        assert_eq!(sim.history().steps(), 2);
    }

    /// The sequential offtake chain from the canal example: three farms with
    /// caps 33%/50%/100% and demands 40/50/60 drawing on 100 units.
    #[test]
    fn test_demand_priority_chain_end_to_end() {
        let mut b = NetworkBuilder::new();
        b.add_junction("src").unwrap();
        for j in ["J1", "J2", "J3"] {
            b.add_junction(j).unwrap();
        }
        for f in ["F1", "F2", "F3"] {
            b.add_farm(f).unwrap();
        }
        b.add_outlet("sea").unwrap();

        let feed = b.add_link("feed", LinkKind::River, "src", "J1", None).unwrap();
        let p1 = b.add_link("p1", LinkKind::Pipeline, "J1", "F1", None).unwrap();
        let c1 = b.add_link("c1", LinkKind::River, "J1", "J2", None).unwrap();
        let p2 = b.add_link("p2", LinkKind::Pipeline, "J2", "F2", None).unwrap();
        let c2 = b.add_link("c2", LinkKind::River, "J2", "J3", None).unwrap();
        let p3 = b.add_link("p3", LinkKind::Pipeline, "J3", "F3", None).unwrap();
        let c3 = b.add_link("c3", LinkKind::River, "J3", "sea", None).unwrap();

        b.set_inflow("src", Schedule::new(vec![100.0])).unwrap();
        b.set_policy("src", Policy::Transfer { link: feed, overflow: OverflowRule::Error }).unwrap();
        b.set_policy("J1", Policy::DemandCap { offtake: p1, bypass: c1, max_share: 0.33 }).unwrap();
        b.set_policy("J2", Policy::DemandCap { offtake: p2, bypass: c2, max_share: 0.5 }).unwrap();
        b.set_policy("J3", Policy::DemandCap { offtake: p3, bypass: c3, max_share: 1.0 }).unwrap();
        for (farm, demand) in [("F1", 40.0), ("F2", 50.0), ("F3", 60.0)] {
            b.set_demand(farm, Schedule::new(vec![demand])).unwrap();
            b.set_policy(farm, Policy::Consume { excess: None }).unwrap();
        }
        let net = b.build(1).unwrap();

        let mut sim = Simulator::new(net);
        sim.run().unwrap();
        let h = sim.history();

        assert_eq!(h.series("F1", "inflow").unwrap(), &[33.0]);
        assert_eq!(h.series("F2", "inflow").unwrap(), &[33.5]);
        assert_eq!(h.series("F3", "inflow").unwrap(), &[33.5]);
        assert_eq!(h.series("sea", "inflow").unwrap(), &[0.0]);
        // Downstream farms saw upstream under-utilization; shortfalls follow.
        assert_eq!(h.series("F1", "unmet_demand").unwrap(), &[7.0]);
        assert_eq!(h.series("F2", "unmet_demand").unwrap(), &[16.5]);
        assert_eq!(h.series("F3", "unmet_demand").unwrap(), &[26.5]);
    }
}
