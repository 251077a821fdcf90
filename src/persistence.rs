use crate::error::{Result, SolverError};
use crate::grid::Grid;
use crate::loss::LossFunction;
use crate::physics::Dynamics;
use crate::solver::{solve, Solution, SolverOptions, ValueIterator};
use crate::table::{CostTable, PolicyTable};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

const SNAPSHOT_VERSION: u32 = 1;

/// JSON has no infinity; positive infinity travels as `null`.
pub(crate) mod infinite_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if *value == f64::INFINITY {
            serializer.serialize_none()
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    grid: Grid,
    costs: Vec<Option<f64>>,
    policy: Vec<Option<usize>>,
}

pub fn to_bytes(solution: &Solution) -> Result<Vec<u8>> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        grid: solution.grid().clone(),
        costs: solution
            .costs()
            .values()
            .iter()
            .map(|&c| (c != f64::INFINITY).then_some(c))
            .collect(),
        policy: solution.policy().actions().to_vec(),
    };
    Ok(serde_json::to_vec(&snapshot)?)
}

pub fn from_bytes(bytes: &[u8]) -> Result<Solution> {
    let snapshot: Snapshot = serde_json::from_slice(bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(SolverError::InvalidConfig {
            reason: format!(
                "snapshot version {} is not supported, expected {SNAPSHOT_VERSION}",
                snapshot.version
            ),
        });
    }
    let shape = snapshot.grid.shape();
    let costs = snapshot.costs.into_iter().map(|c| c.unwrap_or(f64::INFINITY)).collect();
    let costs = CostTable::from_values(shape, costs)?;
    let policy = PolicyTable::from_actions(shape, snapshot.policy)?;
    Solution::new(snapshot.grid, costs, policy)
}

pub fn save(path: impl AsRef<Path>, solution: &Solution) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_bytes(solution)?;
    std::fs::write(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "Saved solution snapshot");
    Ok(())
}

pub fn load(path: impl AsRef<Path>) -> Result<Solution> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let solution = from_bytes(&bytes)?;
    info!(path = %path.display(), states = solution.grid().len(), "Loaded solution snapshot");
    Ok(solution)
}

/// Reuses the snapshot at `path` when it was solved on `grid` with the same
/// dynamics and loss. Otherwise solves from scratch and overwrites it.
///
/// A snapshot is checked with one sweep over its own tables: a solution
/// for the current model is a fixed point, anything else changes.
pub fn load_or_solve<D, L>(
    path: impl AsRef<Path>,
    grid: &Grid,
    dynamics: &D,
    loss: &L,
    options: &SolverOptions,
) -> Result<Solution>
where
    D: Dynamics + ?Sized,
    L: LossFunction + ?Sized,
{
    let path = path.as_ref();
    if !path.exists() {
        let solution = solve(grid, dynamics, loss, options.clone())?;
        save(path, &solution)?;
        return Ok(solution);
    }
    let snapshot = load(path)?;
    if snapshot.grid() != grid {
        warn!(path = %path.display(), "Snapshot grid differs from the configured grid, solving again");
        let solution = solve(grid, dynamics, loss, options.clone())?;
        save(path, &solution)?;
        return Ok(solution);
    }
    let (_, costs, policy) = snapshot.into_parts();
    let mut iterator = ValueIterator::new(grid, dynamics, loss, options.clone()).with_tables(costs, policy)?;
    let stats = iterator.sweep()?;
    let solution = iterator.into_solution()?;
    if stats.max_change > 0.0 {
        warn!(
            path = %path.display(),
            max_change = stats.max_change,
            "Snapshot was solved for a different model, replacing it"
        );
        save(path, &solution)?;
    }
    Ok(solution)
}
