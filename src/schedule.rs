//! Fixed-horizon time series supplied as exogenous input.
//!
//! A `Schedule` is an ordered sequence of per-timestep values covering the
//! whole simulation horizon. Lookups are by timestep index and there is no
//! extrapolation: the builder checks the length against the horizon once at
//! build time, a missing index at run time is a hard error, never a default.

use crate::error::SimError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    values: Vec<f64>,
}

impl Schedule {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// A schedule with the same value at every timestep of the horizon.
    pub fn constant(value: f64, horizon: usize) -> Self {
        Self {
            values: vec![value; horizon],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at timestep `t`, if the schedule covers it.
    pub fn get(&self, t: usize) -> Option<f64> {
        self.values.get(t).copied()
    }

    /// Value at timestep `t`. `entity` and `kind` are carried for the error
    /// context only.
    pub fn value_at(
        &self,
        t: usize,
        entity: &str,
        kind: &'static str,
    ) -> Result<f64, SimError> {
        self.values
            .get(t)
            .copied()
            .ok_or_else(|| SimError::ScheduleOutOfRange {
                entity: entity.to_string(),
                kind,
                timestep: t,
            })
    }
}

impl From<Vec<f64>> for Schedule {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_at_in_range() {
        let s = Schedule::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(s.value_at(1, "R1", "inflow").unwrap(), 2.0);
    }

    #[test]
    fn test_value_at_out_of_range_is_error() {
        let s = Schedule::new(vec![1.0, 2.0]);
        let err = s.value_at(2, "R1", "inflow").unwrap_err();
        match err {
            SimError::ScheduleOutOfRange { entity, kind, timestep } => {
                assert_eq!(entity, "R1");
                assert_eq!(kind, "inflow");
                assert_eq!(timestep, 2);
            }
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[test]
    fn test_constant_covers_horizon() {
        let s = Schedule::constant(5.0, 4);
        assert_eq!(s.len(), 4);
        assert_eq!(s.value_at(3, "x", "demand").unwrap(), 5.0);
    }
}
