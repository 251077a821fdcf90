use crate::error::{Result, SolverError};
use crate::types::{BurnTime, Height, LatticeIndex, State, Throttle, Velocity};
use serde::{Deserialize, Serialize};

/// Relative slack when matching a value against a breakpoint.
const LATTICE_TOLERANCE: f64 = 1e-9;

/// Allowed drift between neighbouring time breakpoints and `dt`.
const DT_TOLERANCE: f64 = 1e-6;

/// Index of the breakpoint closest to `value`. Ties go to the first match.
pub fn nearest_index(breakpoints: &[f64], value: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, breakpoint) in breakpoints.iter().enumerate() {
        let distance = (breakpoint - value).abs();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

/// Breakpoint closest to `value`.
pub fn nearest(breakpoints: &[f64], value: f64) -> f64 {
    breakpoints[nearest_index(breakpoints, value)]
}

fn exact_index(breakpoints: &[f64], value: f64) -> Option<usize> {
    let i = nearest_index(breakpoints, value);
    let breakpoint = breakpoints[i];
    let slack = LATTICE_TOLERANCE * breakpoint.abs().max(1.0);
    ((breakpoint - value).abs() <= slack).then_some(i)
}

/// The state lattice: breakpoints per axis plus the throttle settings.
///
/// Tables over a grid are stored row-major as `[time][velocity][height]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid")]
pub struct Grid {
    times: Vec<f64>,
    velocities: Vec<f64>,
    heights: Vec<f64>,
    actions: Vec<f64>,
    dt: f64,
}

#[derive(Deserialize)]
struct RawGrid {
    times: Vec<f64>,
    velocities: Vec<f64>,
    heights: Vec<f64>,
    actions: Vec<f64>,
    dt: f64,
}

impl TryFrom<RawGrid> for Grid {
    type Error = SolverError;

    fn try_from(raw: RawGrid) -> Result<Self> {
        Grid::new(raw.times, raw.velocities, raw.heights, raw.actions, raw.dt)
    }
}

fn check_axis(name: &str, breakpoints: &[f64]) -> Result<()> {
    if breakpoints.is_empty() {
        return Err(SolverError::InvalidGrid {
            reason: format!("{name} axis is empty"),
        });
    }
    if breakpoints.iter().any(|b| !b.is_finite()) {
        return Err(SolverError::InvalidGrid {
            reason: format!("{name} axis has non-finite breakpoints"),
        });
    }
    if breakpoints.windows(2).any(|w| w[1] <= w[0]) {
        return Err(SolverError::InvalidGrid {
            reason: format!("{name} axis is not strictly increasing"),
        });
    }
    Ok(())
}

impl Grid {
    pub fn new(times: Vec<f64>, velocities: Vec<f64>, heights: Vec<f64>, actions: Vec<f64>, dt: f64) -> Result<Self> {
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(SolverError::InvalidGrid {
                reason: format!("dt must be positive, got {dt}"),
            });
        }
        check_axis("time", &times)?;
        check_axis("velocity", &velocities)?;
        check_axis("height", &heights)?;
        check_axis("action", &actions)?;
        if let Some(w) = times.windows(2).find(|w| (w[1] - w[0] - dt).abs() > DT_TOLERANCE) {
            return Err(SolverError::InvalidGrid {
                reason: format!("time breakpoints {} and {} are not {dt} apart", w[0], w[1]),
            });
        }
        if actions.iter().any(|a| !(0.0..=100.0).contains(a)) {
            return Err(SolverError::InvalidGrid {
                reason: "throttle settings must lie within 0..=100 percent".to_string(),
            });
        }
        Ok(Self {
            times,
            velocities,
            heights,
            actions,
            dt,
        })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }

    pub fn heights(&self) -> &[f64] {
        &self.heights
    }

    pub fn actions(&self) -> &[f64] {
        &self.actions
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn min_time(&self) -> f64 {
        self.times[0]
    }

    /// `(time, velocity, height)` bucket counts.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.times.len(), self.velocities.len(), self.heights.len())
    }

    /// Number of lattice states.
    pub fn len(&self) -> usize {
        self.times.len() * self.velocities.len() * self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn throttle(&self, action: usize) -> Throttle {
        Throttle(self.actions[action])
    }

    pub fn action_index(&self, throttle: Throttle) -> Result<usize> {
        exact_index(&self.actions, throttle.0).ok_or(SolverError::UnknownAction { action: throttle.0 })
    }

    /// Position of `index` in row-major table storage.
    pub fn flat_index(&self, index: LatticeIndex) -> usize {
        (index.time * self.velocities.len() + index.velocity) * self.heights.len() + index.height
    }

    pub fn lattice_index(&self, flat: usize) -> LatticeIndex {
        let heights = self.heights.len();
        let velocities = self.velocities.len();
        LatticeIndex::new(flat / (velocities * heights), (flat / heights) % velocities, flat % heights)
    }

    pub fn state_at(&self, index: LatticeIndex) -> State {
        State {
            burn_time: BurnTime(self.times[index.time]),
            velocity: Velocity(self.velocities[index.velocity]),
            height: Height(self.heights[index.height]),
        }
    }

    /// Lattice index of a state that sits exactly on the lattice.
    pub fn locate(&self, state: &State) -> Result<LatticeIndex> {
        let not_on_lattice = || SolverError::NotOnLattice { state: *state };
        Ok(LatticeIndex {
            time: exact_index(&self.times, state.burn_time.0).ok_or_else(not_on_lattice)?,
            velocity: exact_index(&self.velocities, state.velocity.0).ok_or_else(not_on_lattice)?,
            height: exact_index(&self.heights, state.height.0).ok_or_else(not_on_lattice)?,
        })
    }

    pub fn nearest_time_index(&self, burn_time: f64) -> usize {
        nearest_index(&self.times, burn_time)
    }

    pub fn snap_index(&self, state: &State) -> LatticeIndex {
        LatticeIndex {
            time: nearest_index(&self.times, state.burn_time.0),
            velocity: nearest_index(&self.velocities, state.velocity.0),
            height: nearest_index(&self.heights, state.height.0),
        }
    }

    /// Closest lattice state, axis by axis.
    pub fn snap_to_lattice(&self, state: &State) -> State {
        self.state_at(self.snap_index(state))
    }

    /// All lattice indices in storage order.
    pub fn indices(&self) -> impl Iterator<Item = LatticeIndex> + '_ {
        (0..self.len()).map(|flat| self.lattice_index(flat))
    }
}
