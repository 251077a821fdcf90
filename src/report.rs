//! ASCII views of one time bucket: top row is the highest height, left
//! column the slowest velocity.

use crate::solver::Solution;
use crate::types::LatticeIndex;

const NO_ACTION: char = 'x';
const INFEASIBLE: char = '#';
const RAMP: [char; 9] = [' ', '.', ':', '-', '=', '+', '*', '%', '@'];

fn render_slice(solution: &Solution, burn_time: f64, cell: impl Fn(LatticeIndex) -> char) -> String {
    let grid = solution.grid();
    let time = grid.nearest_time_index(burn_time);
    let (_, velocities, heights) = grid.shape();
    let mut out = format!(
        "t={:.3}s  v {:.1}..{:.1} m/s  h {:.1}..{:.1} m\n",
        grid.times()[time],
        grid.velocities()[0],
        grid.velocities()[velocities - 1],
        grid.heights()[0],
        grid.heights()[heights - 1],
    );
    for height in (0..heights).rev() {
        out.extend((0..velocities).map(|velocity| cell(LatticeIndex::new(time, velocity, height))));
        out.push('\n');
    }
    out
}

/// Throttle as a digit, 0 for the weakest setting and 9 for the strongest.
pub fn render_policy_slice(solution: &Solution, burn_time: f64) -> String {
    let grid = solution.grid();
    let top = grid.actions().len().saturating_sub(1).max(1);
    render_slice(solution, burn_time, |index| match solution.policy().get(grid, index) {
        None => NO_ACTION,
        Some(action) => char::from_digit((action * 9 / top) as u32, 10).unwrap_or(NO_ACTION),
    })
}

/// Cost-to-go scaled over the finite costs of the bucket.
pub fn render_cost_heatmap(solution: &Solution, burn_time: f64) -> String {
    let grid = solution.grid();
    let time = grid.nearest_time_index(burn_time);
    let (_, velocities, heights) = grid.shape();
    let finite = (0..velocities)
        .flat_map(|v| (0..heights).map(move |h| LatticeIndex::new(time, v, h)))
        .map(|index| solution.costs().get(grid, index))
        .filter(|c| c.is_finite());
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c), hi.max(c)));
    let span = (hi - lo).max(f64::EPSILON);
    render_slice(solution, burn_time, |index| {
        let cost = solution.costs().get(grid, index);
        if !cost.is_finite() {
            return INFEASIBLE;
        }
        let level = ((cost - lo) / span * (RAMP.len() - 1) as f64).round() as usize;
        RAMP[level.min(RAMP.len() - 1)]
    })
}
