//! Bilinear reconstruction of lattice fields at continuous states.
//!
//! The time axis is never interpolated: transitions move it in exact
//! multiples of `dt`, so the query is snapped to the nearest time bucket.
//! Velocity and height are bracketed by binary search and clamped at the
//! grid edges, so nothing is ever extrapolated.

use crate::grid::Grid;
use crate::types::{LatticeIndex, State};

/// One corner of the rectangle enclosing a query, with its weight.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Corner {
    pub index: LatticeIndex,
    pub weight: f64,
}

/// Bracketing breakpoints `(lo, hi)` around `x` and the weight of `hi`.
fn bracket(breakpoints: &[f64], x: f64) -> (usize, usize, f64) {
    let last = breakpoints.len() - 1;
    if last == 0 {
        return (0, 0, 1.0);
    }
    let hi = breakpoints.partition_point(|&b| b <= x).clamp(1, last);
    let lo = hi - 1;
    let (b_lo, b_hi) = (breakpoints[lo], breakpoints[hi]);
    if b_hi == b_lo {
        return (lo, hi, 1.0);
    }
    let x = x.clamp(b_lo, b_hi);
    (lo, hi, (x - b_lo) / (b_hi - b_lo))
}

/// The four corners of the (velocity, height) cell enclosing `query`.
pub fn corners(grid: &Grid, query: &State) -> [Corner; 4] {
    let time = grid.nearest_time_index(query.burn_time.0);
    let (v_lo, v_hi, wv) = bracket(grid.velocities(), query.velocity.0);
    let (h_lo, h_hi, wh) = bracket(grid.heights(), query.height.0);
    [
        Corner {
            index: LatticeIndex::new(time, v_lo, h_lo),
            weight: (1.0 - wv) * (1.0 - wh),
        },
        Corner {
            index: LatticeIndex::new(time, v_lo, h_hi),
            weight: (1.0 - wv) * wh,
        },
        Corner {
            index: LatticeIndex::new(time, v_hi, h_lo),
            weight: wv * (1.0 - wh),
        },
        Corner {
            index: LatticeIndex::new(time, v_hi, h_hi),
            weight: wv * wh,
        },
    ]
}

/// Value of `field` (row-major over `grid`) at a continuous state.
///
/// Zero-weight corners are skipped, so infinite neighbours never turn an
/// exact lattice hit into `NaN`. The result never leaves the range of the
/// contributing corners, rounding included.
pub fn interpolate(grid: &Grid, field: &[f64], query: &State) -> f64 {
    debug_assert_eq!(field.len(), grid.len());
    let mut sum = 0.0;
    let mut low = f64::INFINITY;
    let mut high = f64::NEG_INFINITY;
    for corner in corners(grid, query).iter().filter(|corner| corner.weight > 0.0) {
        let value = field[grid.flat_index(corner.index)];
        sum += corner.weight * value;
        low = low.min(value);
        high = high.max(value);
    }
    if sum.is_infinite() {
        return sum;
    }
    sum.clamp(low, high)
}
