use crate::error::{Result, SolverError};
use crate::grid::Grid;
use crate::types::{BurnTime, State, Throttle};
use crate::util;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

pub const GRAVITATIONAL_ACCELERATION: f64 = 9.8;

/// The dataset says 3.45 but it's convenient if this is a multiple of DT.
pub const TOTAL_BURN_TIME: f64 = 3.33333333333;
pub const DT: f64 = 1.0 / 3.0;

/// Shifting the dataset 50ms makes it line up with DT = 1/3.
pub const CALIBRATION_OFFSET: f64 = 0.05;

pub const MASS_AT_IGNITION: f64 = 1.10;
pub const MASS_AT_BURNOUT: f64 = 1.04;

/// Estes F15 thrust curve, seconds since ignition.
const F15_TIMES: [f64; 26] = [
    0.148, 0.228, 0.294, 0.353, 0.382, 0.419, 0.477, 0.52, 0.593, 0.688, 0.855, 1.037, 1.205, 1.423, 1.452, 1.503,
    1.736, 1.955, 2.21, 2.494, 2.763, 3.12, 3.382, 3.404, 3.418, 3.45,
];

/// Estes F15 thrust curve, Newtons.
const F15_THRUST: [f64; 26] = [
    7.638, 12.253, 16.391, 20.21, 22.756, 25.26, 23.074, 20.845, 19.093, 17.5, 16.225, 15.427, 14.948, 14.627, 15.741,
    14.785, 14.623, 14.303, 14.141, 13.819, 13.338, 13.334, 13.013, 9.352, 4.895, 0.0,
];

/// Physical description of the motor and the vehicle carrying it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorModel {
    pub curve_times: Vec<f64>,
    pub curve_thrust: Vec<f64>,
    pub total_burn_time: f64,
    pub calibration_offset: f64,
    pub mass_at_ignition: f64,
    pub mass_at_burnout: f64,
    pub gravity: f64,
}

impl Default for MotorModel {
    fn default() -> Self {
        Self {
            curve_times: F15_TIMES.to_vec(),
            curve_thrust: F15_THRUST.to_vec(),
            total_burn_time: TOTAL_BURN_TIME,
            calibration_offset: CALIBRATION_OFFSET,
            mass_at_ignition: MASS_AT_IGNITION,
            mass_at_burnout: MASS_AT_BURNOUT,
            gravity: GRAVITATIONAL_ACCELERATION,
        }
    }
}

impl MotorModel {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(SolverError::InvalidConfig {
                reason: format!("motor: {reason}"),
            })
        };
        if self.curve_times.is_empty() || self.curve_times.len() != self.curve_thrust.len() {
            return invalid("thrust curve needs matching, non-empty time and thrust samples");
        }
        if self.curve_times.windows(2).any(|w| w[1] <= w[0]) {
            return invalid("thrust curve sample times must be strictly increasing");
        }
        if self.curve_thrust.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return invalid("thrust samples must be finite and non-negative");
        }
        if !(self.total_burn_time > 0.0) || !self.calibration_offset.is_finite() || !self.gravity.is_finite() {
            return invalid("burn time must be positive, offset and gravity finite");
        }
        if !(self.mass_at_burnout > 0.0) || self.mass_at_ignition < self.mass_at_burnout {
            return invalid("masses must be positive with burnout mass <= ignition mass");
        }
        Ok(())
    }

    /// Thrust in Newtons with `burn_time` seconds of propellant left.
    pub fn thrust(&self, burn_time: BurnTime) -> f64 {
        let time_lookup = self.total_burn_time - burn_time.0 + self.calibration_offset;
        let last_sample = self.curve_times.last().copied().unwrap_or(0.0);
        if time_lookup < 0.0 || time_lookup > last_sample {
            return 0.0;
        }
        util::interp(time_lookup, &self.curve_times, &self.curve_thrust)
    }

    /// Vehicle mass in kg, burning down linearly from ignition to burnout.
    pub fn mass(&self, burn_time: BurnTime) -> f64 {
        let slope = (self.mass_at_ignition - self.mass_at_burnout) / self.total_burn_time;
        (burn_time.0 * slope + self.mass_at_burnout).clamp(self.mass_at_burnout, self.mass_at_ignition)
    }

    pub fn thrust_acceleration(&self, burn_time: BurnTime) -> f64 {
        self.thrust(burn_time) / self.mass(burn_time)
    }
}

/// How the thrust term is integrated over one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Integrator {
    /// Thrust and mass sampled at the start of the step.
    #[default]
    Euler,
    /// Composite Simpson over the step, memoized per (t, t_next, throttle).
    Quadrature { intervals: usize },
}

/// Whether the motor contributes to the step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Thrust {
    Powered,
    /// Free fall, e.g. after burnout.
    Unpowered,
}

/// Memoized thrust impulses. Keys are the bit patterns of
/// `(t, t_next, throttle)` so repeated grid queries hit exactly.
#[derive(Debug, Default)]
pub struct ImpulseCache {
    entries: DashMap<(u64, u64, u64), f64>,
}

impl ImpulseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with<F: FnOnce() -> f64>(&self, t: f64, t_next: f64, throttle: Throttle, compute: F) -> f64 {
        let key = (t.to_bits(), t_next.to_bits(), throttle.0.to_bits());
        if let Some(impulse) = self.entries.get(&key) {
            return *impulse;
        }
        let impulse = compute();
        self.entries.insert(key, impulse);
        impulse
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Anything that can advance a state by one control step.
///
/// Implementations must lower the burn time by exactly `dt` no matter the
/// throttle; the solver relies on it to finish in a single sweep.
pub trait Dynamics: Sync {
    fn transition(&self, state: &State, throttle: Throttle, dt: f64) -> State;

    /// One grid step: clamps below the last time bucket and snaps onto the lattice.
    fn grid_transition(&self, grid: &Grid, state: &State, throttle: Throttle) -> State {
        let mut next = self.transition(state, throttle, grid.dt());
        if next.burn_time < grid.min_time() {
            next.burn_time = BurnTime(grid.min_time());
        }
        grid.snap_to_lattice(&next)
    }
}

/// Rocket descending under gravity against a throttled motor.
#[derive(Debug)]
pub struct RocketDynamics {
    motor: MotorModel,
    integrator: Integrator,
    cache: ImpulseCache,
}

impl RocketDynamics {
    pub fn new(motor: MotorModel, integrator: Integrator) -> Result<Self> {
        motor.validate()?;
        if let Integrator::Quadrature { intervals: 0 } = integrator {
            return Err(SolverError::InvalidConfig {
                reason: "quadrature needs at least one interval".to_string(),
            });
        }
        Ok(Self {
            motor,
            integrator,
            cache: ImpulseCache::new(),
        })
    }

    pub fn cache(&self) -> &ImpulseCache {
        &self.cache
    }

    pub fn thrust(&self, burn_time: BurnTime) -> f64 {
        self.motor.thrust(burn_time)
    }

    pub fn mass(&self, burn_time: BurnTime) -> f64 {
        self.motor.mass(burn_time)
    }

    /// Speed the throttled motor takes off over `[t - dt, t]`.
    fn thrust_impulse(&self, burn_time: BurnTime, throttle: Throttle, dt: f64) -> f64 {
        match self.integrator {
            Integrator::Euler => throttle.fraction() * self.motor.thrust_acceleration(burn_time) * dt,
            Integrator::Quadrature { intervals } => {
                let t = burn_time.0;
                let t_next = t - dt;
                self.cache.get_or_insert_with(t, t_next, throttle, || {
                    let per_unit = util::simpson(
                        |tau| self.motor.thrust_acceleration(BurnTime(tau)),
                        t_next,
                        t,
                        intervals,
                    );
                    throttle.fraction() * per_unit
                })
            }
        }
    }

    /// Continuous step. Height uses the mean of old and new velocity.
    pub fn step(&self, state: &State, throttle: Throttle, dt: f64, thrust: Thrust) -> State {
        let braking = match thrust {
            Thrust::Powered => self.thrust_impulse(state.burn_time, throttle, dt),
            Thrust::Unpowered => 0.0,
        };
        let new_velocity = state.velocity + (self.motor.gravity * dt - braking);
        let mean_velocity = (state.velocity + new_velocity) * 0.5;
        State {
            burn_time: state.burn_time - dt,
            velocity: new_velocity,
            height: state.height - mean_velocity * dt,
        }
    }
}

impl Dynamics for RocketDynamics {
    fn transition(&self, state: &State, throttle: Throttle, dt: f64) -> State {
        self.step(state, throttle, dt, Thrust::Powered)
    }
}
