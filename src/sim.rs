//! Replays a solved policy.
//!
//! `replay_on_grid` follows the policy exactly as the solver sees the
//! world: one `dt` at a time, snapped onto the lattice. `simulate` runs
//! the continuous dynamics with finer steps, reading the throttle from the
//! interpolated policy and falling freely after burnout.

use crate::interpolate;
use crate::loss::{LandingLoss, Touchdown};
use crate::physics::{Dynamics, RocketDynamics, Thrust};
use crate::solver::Solution;
use crate::types::{State, Throttle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Landed,
    Crashed,
    Stranded,
    /// Reached a state the policy has no action for.
    NoPlan,
    /// Still airborne when the step budget ran out.
    Timeout,
}

impl Outcome {
    fn of(touchdown: Touchdown) -> Option<Self> {
        match touchdown {
            Touchdown::Flying => None,
            Touchdown::Landed => Some(Outcome::Landed),
            Touchdown::Crashed => Some(Outcome::Crashed),
            Touchdown::Stranded => Some(Outcome::Stranded),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    pub states: Vec<State>,
    /// Throttle applied after each state; `None` while unpowered.
    pub throttles: Vec<Option<Throttle>>,
    pub outcome: Outcome,
}

impl Trajectory {
    pub fn last(&self) -> &State {
        // never empty: every trajectory starts with its initial state
        &self.states[self.states.len() - 1]
    }
}

pub fn replay_on_grid<D: Dynamics + ?Sized>(
    solution: &Solution,
    dynamics: &D,
    loss: &LandingLoss,
    start: &State,
) -> Trajectory {
    let grid = solution.grid();
    let mut state = grid.snap_to_lattice(start);
    let mut states = vec![state];
    let mut throttles = vec![];
    let outcome = loop {
        if let Some(outcome) = Outcome::of(loss.classify(&state)) {
            break outcome;
        }
        let index = grid.snap_index(&state);
        if index.time == 0 {
            break Outcome::Timeout;
        }
        let Some(throttle) = solution.policy().throttle(grid, index) else {
            break Outcome::NoPlan;
        };
        state = dynamics.grid_transition(grid, &state, throttle);
        debug!(%throttle, %state, "Grid step");
        throttles.push(Some(throttle));
        states.push(state);
    };
    Trajectory {
        states,
        throttles,
        outcome,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationOptions {
    /// Integration steps per grid `dt`.
    pub substeps: usize,
    pub max_steps: usize,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            substeps: 20,
            max_steps: 10_000,
        }
    }
}

/// Fine-grained replay. States the policy can't handle read as full throttle.
pub fn simulate(
    solution: &Solution,
    dynamics: &RocketDynamics,
    loss: &LandingLoss,
    start: &State,
    options: &SimulationOptions,
) -> Trajectory {
    let grid = solution.grid();
    let full_throttle = Throttle(grid.actions()[grid.actions().len() - 1]);
    let field = solution.policy().throttle_field(grid, full_throttle);
    let dt = grid.dt() / options.substeps.max(1) as f64;

    let mut state = *start;
    let mut states = vec![state];
    let mut throttles = vec![];
    for _ in 0..options.max_steps {
        if let Some(touchdown) = loss.touchdown(&state) {
            let outcome = Outcome::of(touchdown).unwrap_or(Outcome::Crashed);
            return Trajectory {
                states,
                throttles,
                outcome,
            };
        }
        let (throttle, thrust) = if state.burn_time < grid.min_time() {
            (None, Thrust::Unpowered)
        } else {
            let throttle = Throttle(interpolate::interpolate(grid, &field, &state));
            (Some(throttle), Thrust::Powered)
        };
        state = dynamics.step(&state, throttle.unwrap_or(Throttle(0.0)), dt, thrust);
        throttles.push(throttle);
        states.push(state);
    }
    Trajectory {
        states,
        throttles,
        outcome: Outcome::Timeout,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub episodes: usize,
    pub seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            episodes: 200,
            seed: 12345_u64 ^ 0xDEAD_BEEF,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationResults {
    pub episodes: usize,
    pub landed: usize,
    pub crashed: usize,
    pub stranded: usize,
    pub no_plan: usize,
    pub timeout: usize,
    /// Mean speed at touchdown over landed and crashed episodes.
    pub mean_touchdown_speed: f64,
}

impl EvaluationResults {
    pub fn success_rate(&self) -> f64 {
        self.landed as f64 / self.episodes.max(1) as f64
    }
}

/// Replays the policy on the grid from random starts at ignition.
pub fn evaluate<D: Dynamics + ?Sized>(
    solution: &Solution,
    dynamics: &D,
    loss: &LandingLoss,
    config: &EvaluationConfig,
) -> EvaluationResults {
    let grid = solution.grid();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let top = grid.times()[grid.times().len() - 1];
    let (v_min, v_max) = (grid.velocities()[0], grid.velocities()[grid.velocities().len() - 1]);
    let h_max = grid.heights()[grid.heights().len() - 1];
    let h_min = loss.ground_height.min(h_max);

    let mut results = EvaluationResults {
        episodes: config.episodes,
        ..EvaluationResults::default()
    };
    let mut touchdown_speed = 0.0;
    let mut touchdowns = 0usize;
    for _ in 0..config.episodes {
        let start = State::new(top, rng.random_range(v_min..=v_max), rng.random_range(h_min..=h_max));
        let trajectory = replay_on_grid(solution, dynamics, loss, &start);
        match trajectory.outcome {
            Outcome::Landed => results.landed += 1,
            Outcome::Crashed => results.crashed += 1,
            Outcome::Stranded => results.stranded += 1,
            Outcome::NoPlan => results.no_plan += 1,
            Outcome::Timeout => results.timeout += 1,
        }
        if matches!(trajectory.outcome, Outcome::Landed | Outcome::Crashed) {
            touchdown_speed += trajectory.last().velocity.0;
            touchdowns += 1;
        }
    }
    if touchdowns > 0 {
        results.mean_touchdown_speed = touchdown_speed / touchdowns as f64;
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::loss::LossFunction;
    use crate::physics::{Integrator, MotorModel, DT};
    use crate::solver::{solve, SolverOptions, SuccessorLookup};
    use crate::util::linspace;

    fn solved() -> (Solution, RocketDynamics, LandingLoss) {
        let times = (0..12).map(|i| -DT + DT * i as f64).collect();
        let grid =
            Grid::new(times, linspace(-2.0, 18.0, 41), linspace(-2.0, 25.0, 55), linspace(50.0, 100.0, 6), DT).unwrap();
        let dynamics = RocketDynamics::new(MotorModel::default(), Integrator::Euler).unwrap();
        let loss = LandingLoss::default();
        // snapped successors match what replay_on_grid follows step for step
        let options = SolverOptions {
            lookup: SuccessorLookup::Nearest,
            ..SolverOptions::default()
        };
        let solution = solve(&grid, &dynamics, &loss, options).unwrap();
        (solution, dynamics, loss)
    }

    #[test]
    fn test_grid_replay_follows_finite_costs_down() {
        let (solution, dynamics, loss) = solved();
        let grid = solution.grid();
        let start = grid
            .indices()
            .filter(|i| i.time == grid.times().len() - 1)
            .map(|i| grid.state_at(i))
            .find(|s| solution.cost_at(s).unwrap().is_finite() && s.height > 1.0)
            .expect("some start at ignition can land");

        let trajectory = replay_on_grid(&solution, &dynamics, &loss, &start);
        assert_eq!(trajectory.outcome, Outcome::Landed);
        assert_eq!(trajectory.states.len(), trajectory.throttles.len() + 1);
        for pair in trajectory.states.windows(2) {
            assert!(pair[1].burn_time.0 < pair[0].burn_time.0);
        }
        // the losses along the replay add up to the solved cost of the start
        let paid: f64 = trajectory
            .states
            .iter()
            .zip(&trajectory.throttles)
            .map(|(state, throttle)| loss.loss(state, throttle.unwrap_or(Throttle(0.0))))
            .sum::<f64>()
            + loss.landed_cost;
        let expected = solution.cost_at(&start).unwrap();
        assert!((paid - expected).abs() < 1e-9, "{paid} != {expected}");
    }

    #[test]
    fn test_grid_replay_reports_missing_plan() {
        let (solution, dynamics, loss) = solved();
        let grid = solution.grid();
        let doomed = grid
            .indices()
            .map(|i| grid.state_at(i))
            .find(|s| loss.classify(s) == Touchdown::Flying && solution.cost_at(s).unwrap().is_infinite())
            .expect("some airborne state is unrecoverable");
        let trajectory = replay_on_grid(&solution, &dynamics, &loss, &doomed);
        assert_eq!(trajectory.outcome, Outcome::NoPlan);
        assert_eq!(trajectory.states.len(), 1);
    }

    #[test]
    fn test_simulate_falls_freely_after_burnout() {
        let (solution, dynamics, loss) = solved();
        let start = State::new(-0.5, 0.0, 20.0);
        let trajectory = simulate(&solution, &dynamics, &loss, &start, &SimulationOptions::default());
        assert_eq!(trajectory.outcome, Outcome::Crashed);
        assert!(trajectory.throttles.iter().all(Option::is_none));
        let impact = trajectory.last().velocity.0;
        // free fall from 20m ends near sqrt(2 g h)
        assert!((impact - (2.0 * 9.8 * 20.0_f64).sqrt()).abs() < 0.5, "impact at {impact}");
    }

    #[test]
    fn test_simulate_throttles_within_the_action_range() {
        let (solution, dynamics, loss) = solved();
        let start = State::new(solution.grid().times()[11], 4.0, 15.0);
        let trajectory = simulate(&solution, &dynamics, &loss, &start, &SimulationOptions::default());
        assert_ne!(trajectory.outcome, Outcome::Timeout);
        for throttle in trajectory.throttles.iter().flatten() {
            assert!((50.0..=100.0).contains(&throttle.0), "throttle {throttle}");
        }
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let (solution, dynamics, loss) = solved();
        let config = EvaluationConfig {
            episodes: 50,
            seed: 7,
        };
        let a = evaluate(&solution, &dynamics, &loss, &config);
        let b = evaluate(&solution, &dynamics, &loss, &config);
        assert_eq!(a, b);
        assert_eq!(a.landed + a.crashed + a.stranded + a.no_plan + a.timeout, 50);
        assert!(a.success_rate() <= 1.0);
    }
}
