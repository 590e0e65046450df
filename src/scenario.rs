//! Parallel scenario execution.
//!
//! Independent simulation runs share nothing: every scenario owns its
//! network, and each run gets its own `RunState` and `History`. That makes
//! a sweep embarrassingly parallel, so it simply fans out over rayon.

use crate::error::SimError;
use crate::history::History;
use crate::network::Network;
use crate::simulator::Simulator;
use rayon::prelude::*;

pub struct Scenario {
    pub name: String,
    pub network: Network,
    /// Overrides the default `0..horizon` sequence when set.
    pub timesteps: Option<Vec<usize>>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, network: Network) -> Self {
        Self {
            name: name.into(),
            network,
            timesteps: None,
        }
    }
}

/// Runs every scenario to completion (or first fatal error), in parallel.
/// Results come back in scenario order.
pub fn run_all(scenarios: Vec<Scenario>) -> Vec<(String, Result<History, SimError>)> {
    scenarios
        .into_par_iter()
        .map(|scenario| {
            let mut sim = Simulator::new(scenario.network);
            if let Some(timesteps) = scenario.timesteps {
                sim.set_timesteps(timesteps);
            }
            let outcome = match sim.run() {
                Ok(()) => Ok(sim.into_history()),
                Err(e) => Err(e),
            };
            (scenario.name, outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LinkId, LinkKind, NetworkBuilder, OverflowRule, Policy};
    use crate::schedule::Schedule;

    fn pass_through(inflow: Vec<f64>) -> Network {
        let horizon = inflow.len();
        let mut b = NetworkBuilder::new();
        b.add_junction("J").unwrap();
        b.add_outlet("O").unwrap();
        b.add_link("L", LinkKind::Transfer, "J", "O", None).unwrap();
        b.set_inflow("J", Schedule::new(inflow)).unwrap();
        b.set_policy(
            "J",
            Policy::Transfer {
                link: LinkId::new(0),
                overflow: OverflowRule::Spill,
            },
        )
        .unwrap();
        b.build(horizon).unwrap()
    }

    #[test]
    fn test_scenarios_run_independently() {
        let scenarios = vec![
            Scenario::new("wet", pass_through(vec![100.0, 100.0])),
            Scenario::new("dry", pass_through(vec![10.0, 10.0])),
        ];
        let results = run_all(scenarios);
        assert_eq!(results.len(), 2);

        let (name, wet) = &results[0];
        assert_eq!(name, "wet");
        assert_eq!(wet.as_ref().unwrap().series("O", "inflow").unwrap(), &[100.0, 100.0]);

        let (name, dry) = &results[1];
        assert_eq!(name, "dry");
        assert_eq!(dry.as_ref().unwrap().series("O", "inflow").unwrap(), &[10.0, 10.0]);
    }

    #[test]
    fn test_truncated_scenario_timesteps() {
        let mut scenario = Scenario::new("short", pass_through(vec![1.0, 2.0, 3.0]));
        scenario.timesteps = Some(vec![0, 1]);
        let results = run_all(vec![scenario]);
        let history = results[0].1.as_ref().unwrap();
        assert_eq!(history.steps(), 2);
    }
}
