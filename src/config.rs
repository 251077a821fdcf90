use crate::error::{Result, SolverError};
use crate::grid::Grid;
use crate::loss::LandingLoss;
use crate::physics::{Integrator, MotorModel, RocketDynamics, DT};
use crate::sim::{EvaluationConfig, SimulationOptions};
use crate::solver::SolverOptions;
use crate::util::linspace;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub(crate) const TIME_BUCKETS: usize = 12;
pub(crate) const VELOCITY_BUCKETS: usize = 60;
pub(crate) const HEIGHT_BUCKETS: usize = 200;
pub(crate) const THROTTLE_BUCKETS: usize = 20;

/// Evenly spaced breakpoints from `min` to `max`, both included.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct AxisConfig {
    pub min: f64,
    pub max: f64,
    pub buckets: usize,
}

impl AxisConfig {
    pub fn breakpoints(&self) -> Vec<f64> {
        linspace(self.min, self.max, self.buckets)
    }
}

/// Burn times `start + i * dt` for `i` in `0..buckets`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TimeAxisConfig {
    pub dt: f64,
    pub start: f64,
    pub buckets: usize,
}

impl TimeAxisConfig {
    pub fn breakpoints(&self) -> Vec<f64> {
        (0..self.buckets).map(|i| self.start + self.dt * i as f64).collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    pub time: TimeAxisConfig,
    pub velocity: AxisConfig,
    pub height: AxisConfig,
    pub throttle: AxisConfig,
    pub motor: MotorModel,
    pub integrator: Integrator,
    pub loss: LandingLoss,
    pub solver: SolverOptions,
    pub simulation: SimulationOptions,
    pub evaluation: EvaluationConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            // one bucket below zero holds the states just past burnout
            time: TimeAxisConfig {
                dt: DT,
                start: -DT,
                buckets: TIME_BUCKETS,
            },
            velocity: AxisConfig {
                min: -2.0,
                max: 18.0,
                buckets: VELOCITY_BUCKETS,
            },
            height: AxisConfig {
                min: -2.0,
                max: 25.0,
                buckets: HEIGHT_BUCKETS,
            },
            throttle: AxisConfig {
                min: 50.0,
                max: 100.0,
                buckets: THROTTLE_BUCKETS,
            },
            motor: MotorModel::default(),
            integrator: Integrator::default(),
            loss: LandingLoss::default(),
            solver: SolverOptions::default(),
            simulation: SimulationOptions::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl SolverConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: SolverConfig = serde_json::from_slice(&std::fs::read(path)?)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded solver configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.motor.validate()?;
        self.loss.validate()?;
        if self.simulation.substeps == 0 {
            return Err(SolverError::InvalidConfig {
                reason: "simulation needs at least one substep".to_string(),
            });
        }
        self.grid().map(|_| ())
    }

    pub fn grid(&self) -> Result<Grid> {
        Grid::new(
            self.time.breakpoints(),
            self.velocity.breakpoints(),
            self.height.breakpoints(),
            self.throttle.breakpoints(),
            self.time.dt,
        )
    }

    pub fn dynamics(&self) -> Result<RocketDynamics> {
        RocketDynamics::new(self.motor.clone(), self.integrator)
    }
}
