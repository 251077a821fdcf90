//! Dense byte export of a policy for lookup tables in flight firmware.
//!
//! One byte per lattice point, row-major `[time][velocity][height]` like
//! the grid. A byte holds the throttle rounded to a whole percent;
//! [`NO_ACTION`] marks states without a feasible action.

use crate::error::{Result, SolverError};
use crate::grid::{nearest_index, Grid};
use crate::table::PolicyTable;
use std::fmt::Write;

pub const NO_ACTION: u8 = u8::MAX;

const VALUES_PER_LINE: usize = 24;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyExport {
    pub time_buckets: usize,
    pub velocity_buckets: usize,
    pub height_buckets: usize,
    pub codes: Vec<u8>,
}

impl PolicyExport {
    pub fn get(&self, time: usize, velocity: usize, height: usize) -> u8 {
        self.codes[(time * self.velocity_buckets + velocity) * self.height_buckets + height]
    }
}

pub fn export_policy(grid: &Grid, policy: &PolicyTable) -> Result<PolicyExport> {
    policy.check_grid(grid)?;
    let (time_buckets, velocity_buckets, height_buckets) = grid.shape();
    let codes = policy
        .actions()
        .iter()
        .map(|action| action.map_or(NO_ACTION, |a| grid.actions()[a].round() as u8))
        .collect();
    Ok(PolicyExport {
        time_buckets,
        velocity_buckets,
        height_buckets,
        codes,
    })
}

/// Reads codes back onto the grid's action set, snapping each to the
/// closest throttle setting.
pub fn import_policy(grid: &Grid, export: &PolicyExport) -> Result<PolicyTable> {
    let shape = (export.time_buckets, export.velocity_buckets, export.height_buckets);
    if shape != grid.shape() {
        return Err(SolverError::ShapeMismatch {
            expected: grid.shape(),
            got: shape,
        });
    }
    let actions = export
        .codes
        .iter()
        .map(|&code| (code != NO_ACTION).then(|| nearest_index(grid.actions(), code as f64)))
        .collect();
    PolicyTable::from_actions(shape, actions)
}

/// Renders the export as a C translation unit.
pub fn render_c_source(export: &PolicyExport) -> String {
    let mut out = String::new();
    out.push_str("#include <stdint.h>\n\n");
    let _ = writeln!(out, "#define TIME_BUCKETS {}", export.time_buckets);
    let _ = writeln!(out, "#define VEL_BUCKETS {}", export.velocity_buckets);
    let _ = writeln!(out, "#define HEIGHT_BUCKETS {}", export.height_buckets);
    let _ = writeln!(out, "#define NO_ACTION {NO_ACTION}\n");
    out.push_str("uint8_t policy[TIME_BUCKETS][VEL_BUCKETS][HEIGHT_BUCKETS] = {\n");
    for line in export.codes.chunks(VALUES_PER_LINE) {
        let values: Vec<String> = line.iter().map(u8::to_string).collect();
        let _ = writeln!(out, "    {},", values.join(", "));
    }
    out.push_str("};\n");
    out
}
