//! Backward induction over the state lattice.
//!
//! Every transition lowers the burn time by exactly one bucket, so a state
//! only depends on states one bucket closer to burnout. Solving the slices
//! from the last time bucket upwards therefore finishes in a single sweep:
//! each slice reads a slice that is already final.
//!
//! Within a slice all cells are independent and are solved in parallel;
//! the slice is written back once every cell is done.

use crate::error::{Result, SolverError};
use crate::grid::Grid;
use crate::interpolate;
use crate::loss::LossFunction;
use crate::physics::Dynamics;
use crate::table::{CostTable, PolicyTable};
use crate::types::{BurnTime, LatticeIndex, State, Throttle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How the cost-to-go of an off-lattice successor is read.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessorLookup {
    #[default]
    Bilinear,
    /// Snap the successor onto the lattice.
    Nearest,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// One sweep reaches the fixed point; more only re-check it.
    pub sweeps: usize,
    pub parallel: bool,
    pub lookup: SuccessorLookup,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            sweeps: 1,
            parallel: true,
            lookup: SuccessorLookup::Bilinear,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SweepStats {
    /// Largest change of any cost during the sweep.
    pub max_change: f64,
    pub feasible: usize,
    pub states: usize,
    pub elapsed: Duration,
}

impl SweepStats {
    pub fn feasible_percent(&self) -> f64 {
        100.0 * self.feasible as f64 / self.states.max(1) as f64
    }
}

/// Solved tables together with the grid they are defined on.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    grid: Grid,
    costs: CostTable,
    policy: PolicyTable,
}

impl Solution {
    pub fn new(grid: Grid, costs: CostTable, policy: PolicyTable) -> Result<Self> {
        costs.check_grid(&grid)?;
        policy.check_grid(&grid)?;
        Ok(Self { grid, costs, policy })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    pub fn into_parts(self) -> (Grid, CostTable, PolicyTable) {
        (self.grid, self.costs, self.policy)
    }

    /// Cost-to-go of a lattice state.
    pub fn cost_at(&self, state: &State) -> Result<f64> {
        let index = self.grid.locate(state)?;
        Ok(self.costs.get(&self.grid, index))
    }

    /// Chosen throttle at a lattice state, `None` where no action is feasible.
    pub fn action_at(&self, state: &State) -> Result<Option<Throttle>> {
        let index = self.grid.locate(state)?;
        Ok(self.policy.throttle(&self.grid, index))
    }

    /// Cost-to-go anywhere inside the grid.
    pub fn interpolate_cost(&self, state: &State) -> f64 {
        self.costs.interpolate(&self.grid, state)
    }
}

fn cost_change(previous: f64, current: f64) -> f64 {
    if previous == current {
        0.0
    } else {
        (previous - current).abs()
    }
}

pub struct ValueIterator<'a, D: Dynamics + ?Sized, L: LossFunction + ?Sized> {
    grid: &'a Grid,
    dynamics: &'a D,
    loss: &'a L,
    options: SolverOptions,
    costs: CostTable,
    policy: PolicyTable,
}

impl<'a, D: Dynamics + ?Sized, L: LossFunction + ?Sized> ValueIterator<'a, D, L> {
    pub fn new(grid: &'a Grid, dynamics: &'a D, loss: &'a L, options: SolverOptions) -> Self {
        Self {
            grid,
            dynamics,
            loss,
            options,
            costs: CostTable::zeros(grid),
            policy: PolicyTable::empty(grid),
        }
    }

    /// Start from existing tables instead of zeros, e.g. to re-check a snapshot.
    pub fn with_tables(mut self, costs: CostTable, policy: PolicyTable) -> Result<Self> {
        costs.check_grid(self.grid)?;
        policy.check_grid(self.grid)?;
        self.costs = costs;
        self.policy = policy;
        Ok(self)
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    fn step_loss(&self, state: &State, throttle: Throttle) -> Result<f64> {
        let value = self.loss.loss(state, throttle);
        if value.is_nan() || value < 0.0 {
            return Err(SolverError::InvalidLoss {
                state: *state,
                action: throttle.0,
                value,
            });
        }
        Ok(value)
    }

    /// Cost-to-go after applying `throttle` at the lattice state `index`.
    fn successor_cost(&self, index: LatticeIndex, state: &State, throttle: Throttle) -> Result<f64> {
        let dt = self.grid.dt();
        let mut next = self.dynamics.transition(state, throttle, dt);
        let expected = state.burn_time.0 - dt;
        if (next.burn_time.0 - expected).abs() > 1e-6 {
            return Err(SolverError::InvalidConfig {
                reason: format!(
                    "dynamics moved burn time from {} to {} instead of by {dt}",
                    state.burn_time, next.burn_time
                ),
            });
        }
        if next.burn_time < self.grid.min_time() {
            next.burn_time = BurnTime(self.grid.min_time());
        }
        if self.grid.nearest_time_index(next.burn_time.0) >= index.time {
            // past the last time bucket nothing accrues
            return Ok(0.0);
        }
        Ok(match self.options.lookup {
            SuccessorLookup::Bilinear => interpolate::interpolate(self.grid, self.costs.values(), &next),
            SuccessorLookup::Nearest => self.costs.get(self.grid, self.grid.snap_index(&next)),
        })
    }

    /// Best cost and action at one lattice state. Ties keep the first action.
    fn solve_state(&self, index: LatticeIndex) -> Result<(f64, Option<usize>)> {
        let state = self.grid.state_at(index);
        let terminal = self.loss.is_terminal(&state);
        let mut best_cost = f64::INFINITY;
        let mut best_action = None;
        for (action, &throttle) in self.grid.actions().iter().enumerate() {
            let throttle = Throttle(throttle);
            let step = self.step_loss(&state, throttle)?;
            let cost = if terminal || step.is_infinite() {
                step
            } else {
                step + self.successor_cost(index, &state, throttle)?
            };
            if cost < best_cost {
                best_cost = cost;
                best_action = Some(action);
            }
        }
        Ok((best_cost, best_action))
    }

    fn solve_slice(&self, time: usize) -> Result<Vec<(f64, Option<usize>)>> {
        let (_, velocities, heights) = self.grid.shape();
        let cells = velocities * heights;
        let solve_cell = |cell: usize| self.solve_state(LatticeIndex::new(time, cell / heights, cell % heights));
        if self.options.parallel {
            (0..cells).into_par_iter().map(solve_cell).collect()
        } else {
            (0..cells).map(solve_cell).collect()
        }
    }

    /// One pass over every time bucket, lowest burn time first.
    pub fn sweep(&mut self) -> Result<SweepStats> {
        let start = Instant::now();
        let (times, _, heights) = self.grid.shape();
        let mut max_change: f64 = 0.0;
        for time in 0..times {
            let slice = self.solve_slice(time)?;
            for (cell, (cost, action)) in slice.into_iter().enumerate() {
                let index = LatticeIndex::new(time, cell / heights, cell % heights);
                max_change = max_change.max(cost_change(self.costs.get(self.grid, index), cost));
                self.costs.set(self.grid, index, cost);
                self.policy.set(self.grid, index, action);
            }
            debug!(time = self.grid.times()[time], "Solved time bucket");
        }
        Ok(SweepStats {
            max_change,
            feasible: self.costs.feasible(),
            states: self.grid.len(),
            elapsed: start.elapsed(),
        })
    }

    pub fn solve(mut self) -> Result<Solution> {
        let (times, velocities, heights) = self.grid.shape();
        info!(
            times,
            velocities,
            heights,
            actions = self.grid.actions().len(),
            table_bytes = self.grid.len(),
            "Starting value iteration"
        );
        for sweep in 0..self.options.sweeps.max(1) {
            let stats = self.sweep()?;
            info!(
                sweep,
                elapsed_secs = stats.elapsed.as_secs_f64(),
                max_change = stats.max_change,
                "Sweep complete. Landing from {:.2}% of starting configurations",
                stats.feasible_percent()
            );
        }
        self.into_solution()
    }

    pub fn into_solution(self) -> Result<Solution> {
        Solution::new(self.grid.clone(), self.costs, self.policy)
    }
}

/// Solves `grid` from scratch.
pub fn solve<D, L>(grid: &Grid, dynamics: &D, loss: &L, options: SolverOptions) -> Result<Solution>
where
    D: Dynamics + ?Sized,
    L: LossFunction + ?Sized,
{
    ValueIterator::new(grid, dynamics, loss, options).solve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::LandingLoss;
    use crate::physics::{Integrator, MotorModel, RocketDynamics, DT};
    use crate::util::linspace;

    fn rocket() -> RocketDynamics {
        RocketDynamics::new(MotorModel::default(), Integrator::Euler).unwrap()
    }

    fn small_grid() -> Grid {
        let times = (0..6).map(|i| -DT + DT * i as f64).collect();
        Grid::new(times, linspace(-2.0, 18.0, 21), linspace(-2.0, 25.0, 28), linspace(50.0, 100.0, 6), DT).unwrap()
    }

    fn two_bucket_grid() -> Grid {
        Grid::new(vec![0.0, DT], vec![0.0, 5.0], vec![0.0, 10.0], vec![100.0], DT).unwrap()
    }

    #[test]
    fn test_two_bucket_scenario_matches_hand_computation() {
        let grid = two_bucket_grid();
        let dynamics = rocket();
        let loss = |state: &State, _: Throttle| if state.burn_time <= 0.0 { 0.0 } else { 1.0 };
        let solution = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();

        for &v in grid.velocities() {
            for &h in grid.heights() {
                assert_eq!(solution.cost_at(&State::new(0.0, v, h)).unwrap(), 0.0);
                let cost = solution.cost_at(&State::new(DT, v, h)).unwrap();
                assert_eq!(cost, 1.0, "cost at ({DT}, {v}, {h}) is {cost}");
            }
        }
    }

    #[test]
    fn test_two_bucket_scenario_interpolates_successor() {
        let grid = two_bucket_grid();
        let dynamics = rocket();
        // at burnout the loss is the height itself, so the successor cost is a bilinear read of it
        let loss = |state: &State, _: Throttle| {
            if state.burn_time <= 0.0 {
                state.height.0.max(0.0)
            } else {
                1.0
            }
        };
        let solution = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();

        let t = BurnTime(DT);
        let accel = -(dynamics.thrust(t)) / dynamics.mass(t) + 9.8;
        for &v in grid.velocities() {
            for &h in grid.heights() {
                let new_v = v + accel * DT;
                let new_h = h - (v + new_v) / 2.0 * DT;
                let expected = 1.0 + new_h.clamp(0.0, 10.0);
                let cost = solution.cost_at(&State::new(DT, v, h)).unwrap();
                assert!((cost - expected).abs() < 1e-9, "{cost} != {expected} at v={v} h={h}");
            }
        }
    }

    #[test]
    fn test_two_bucket_scenario_snaps_successor() {
        let grid = two_bucket_grid();
        let dynamics = rocket();
        let loss = |state: &State, _: Throttle| {
            if state.burn_time <= 0.0 {
                state.height.0.max(0.0)
            } else {
                1.0
            }
        };
        let options = SolverOptions {
            lookup: SuccessorLookup::Nearest,
            ..SolverOptions::default()
        };
        let solution = solve(&grid, &dynamics, &loss, options).unwrap();

        let t = BurnTime(DT);
        let accel = -(dynamics.thrust(t)) / dynamics.mass(t) + 9.8;
        for &v in grid.velocities() {
            for &h in grid.heights() {
                let new_v = v + accel * DT;
                let new_h = h - (v + new_v) / 2.0 * DT;
                // the successor reads the cost of the closest burnout height, 0 or 10
                let expected = 1.0 + crate::grid::nearest(grid.heights(), new_h);
                let cost = solution.cost_at(&State::new(DT, v, h)).unwrap();
                assert_eq!(cost, expected, "successor height {new_h} at v={v} h={h}");
            }
        }
    }

    #[test]
    fn test_second_sweep_is_a_fixed_point() {
        let grid = small_grid();
        let dynamics = rocket();
        let loss = LandingLoss::default();
        let solution = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();
        let (_, costs, policy) = solution.clone().into_parts();

        let mut iterator = ValueIterator::new(&grid, &dynamics, &loss, SolverOptions::default())
            .with_tables(costs, policy)
            .unwrap();
        let stats = iterator.sweep().unwrap();
        assert_eq!(stats.max_change, 0.0);
        assert_eq!(iterator.into_solution().unwrap(), solution);
    }

    #[test]
    fn test_sweep_repairs_tampered_tables() {
        let grid = small_grid();
        let dynamics = rocket();
        let loss = LandingLoss::default();
        let solution = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();
        let (_, mut costs, policy) = solution.clone().into_parts();
        let index = LatticeIndex::new(0, 3, 4);
        costs.set(&grid, index, 42.0);

        let mut iterator = ValueIterator::new(&grid, &dynamics, &loss, SolverOptions::default())
            .with_tables(costs, policy)
            .unwrap();
        let stats = iterator.sweep().unwrap();
        assert!(stats.max_change > 0.0);
        assert_eq!(iterator.costs(), solution.costs());
    }

    #[test]
    fn test_tables_must_match_the_grid() {
        let grid = small_grid();
        let dynamics = rocket();
        let loss = LandingLoss::default();
        let other = two_bucket_grid();
        let result = ValueIterator::new(&grid, &dynamics, &loss, SolverOptions::default())
            .with_tables(CostTable::zeros(&other), PolicyTable::empty(&other));
        assert!(matches!(result, Err(SolverError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_interpolated_cost_agrees_on_the_lattice() {
        let grid = small_grid();
        let dynamics = rocket();
        let loss = LandingLoss::default();
        let solution = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();
        for index in grid.indices() {
            let state = grid.state_at(index);
            let exact = solution.cost_at(&state).unwrap();
            let interpolated = solution.interpolate_cost(&state);
            assert!(exact == interpolated, "{exact} != {interpolated} at {state}");
        }
    }

    #[test]
    fn test_costs_are_never_negative_and_landings_are_free() {
        let grid = small_grid();
        let dynamics = rocket();
        let loss = LandingLoss::default();
        let solution = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();

        assert!(solution.costs().values().iter().all(|&c| c >= 0.0));
        let mut landed = 0;
        for index in grid.indices() {
            let state = grid.state_at(index);
            if loss.classify(&state) == crate::loss::Touchdown::Landed {
                landed += 1;
                assert_eq!(solution.costs().get(&grid, index), loss.landed_cost);
                assert_eq!(solution.policy().get(&grid, index), Some(0));
            }
        }
        assert!(landed > 0);
        let feasible = solution.costs().feasible();
        assert!(feasible > 0 && feasible < grid.len(), "{feasible} feasible states");
    }

    #[test]
    fn test_infeasibility_propagates() {
        let grid = two_bucket_grid();
        let dynamics = rocket();
        let loss = |state: &State, _: Throttle| if state.burn_time <= 0.0 { f64::INFINITY } else { 1.0 };
        let solution = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();
        assert!(solution.costs().values().iter().all(|c| c.is_infinite()));
        assert!(solution.policy().actions().iter().all(Option::is_none));
        assert_eq!(solution.action_at(&State::new(DT, 0.0, 0.0)).unwrap(), None);
    }

    #[test]
    fn test_ties_keep_the_first_action() {
        // single-point axes keep every successor read exact, so 60 and 80 tie
        let grid = Grid::new(vec![0.0, DT], vec![0.0], vec![0.0], vec![40.0, 60.0, 80.0], DT).unwrap();
        let dynamics = rocket();
        let loss = |_: &State, throttle: Throttle| if throttle.0 < 50.0 { 2.0 } else { 1.0 };
        let solution = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();
        for index in grid.indices() {
            assert_eq!(solution.policy().get(&grid, index), Some(1));
        }
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let grid = small_grid();
        let dynamics = rocket();
        let loss = LandingLoss::default();
        let parallel = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();
        let options = SolverOptions {
            parallel: false,
            ..SolverOptions::default()
        };
        let sequential = solve(&grid, &dynamics, &loss, options).unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_quadrature_solve_fills_the_cache() {
        let grid = small_grid();
        let dynamics = RocketDynamics::new(MotorModel::default(), Integrator::Quadrature { intervals: 16 }).unwrap();
        let loss = LandingLoss::default();
        let solution = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();
        assert!(solution.costs().feasible() > 0);
        // one entry per (time bucket, throttle) pair that was ever integrated
        assert!(dynamics.cache().len() <= grid.times().len() * grid.actions().len());
        assert!(!dynamics.cache().is_empty());
    }

    #[test]
    fn test_nearest_lookup_solves() {
        let grid = small_grid();
        let dynamics = rocket();
        let loss = LandingLoss::default();
        let options = SolverOptions {
            lookup: SuccessorLookup::Nearest,
            ..SolverOptions::default()
        };
        let solution = solve(&grid, &dynamics, &loss, options).unwrap();
        assert!(solution.costs().feasible() > 0);
    }

    #[test]
    fn test_negative_loss_aborts() {
        let grid = two_bucket_grid();
        let dynamics = rocket();
        let loss = |_: &State, _: Throttle| -1.0;
        let result = solve(&grid, &dynamics, &loss, SolverOptions::default());
        assert!(matches!(result, Err(SolverError::InvalidLoss { .. })));
    }

    #[test]
    fn test_dynamics_that_stall_time_are_rejected() {
        struct Hover;
        impl Dynamics for Hover {
            fn transition(&self, state: &State, _: Throttle, _: f64) -> State {
                *state
            }
        }
        let grid = two_bucket_grid();
        let loss = |_: &State, _: Throttle| 1.0;
        let result = solve(&grid, &Hover, &loss, SolverOptions::default());
        assert!(matches!(result, Err(SolverError::InvalidConfig { .. })));
    }

    #[test]
    fn test_off_lattice_queries_are_rejected() {
        let grid = two_bucket_grid();
        let dynamics = rocket();
        let loss = |_: &State, _: Throttle| 1.0;
        let solution = solve(&grid, &dynamics, &loss, SolverOptions::default()).unwrap();
        assert!(matches!(
            solution.cost_at(&State::new(0.5, 0.0, 0.0)),
            Err(SolverError::NotOnLattice { .. })
        ));
    }
}
