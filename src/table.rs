use crate::error::{Result, SolverError};
use crate::grid::Grid;
use crate::interpolate;
use crate::types::{LatticeIndex, State, Throttle};

fn check_len(shape: (usize, usize, usize), len: usize) -> Result<()> {
    let (t, v, h) = shape;
    if t * v * h != len {
        return Err(SolverError::InvalidConfig {
            reason: format!("table of {len} entries can't have shape {shape:?}"),
        });
    }
    Ok(())
}

fn check_grid(shape: (usize, usize, usize), grid: &Grid) -> Result<()> {
    if shape != grid.shape() {
        return Err(SolverError::ShapeMismatch {
            expected: grid.shape(),
            got: shape,
        });
    }
    Ok(())
}

/// Cost-to-go per lattice state; `+inf` marks states with no way down.
#[derive(Clone, Debug, PartialEq)]
pub struct CostTable {
    shape: (usize, usize, usize),
    values: Vec<f64>,
}

impl CostTable {
    pub fn zeros(grid: &Grid) -> Self {
        Self {
            shape: grid.shape(),
            values: vec![0.0; grid.len()],
        }
    }

    pub fn from_values(shape: (usize, usize, usize), values: Vec<f64>) -> Result<Self> {
        check_len(shape, values.len())?;
        Ok(Self { shape, values })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, grid: &Grid, index: LatticeIndex) -> f64 {
        self.values[grid.flat_index(index)]
    }

    pub(crate) fn set(&mut self, grid: &Grid, index: LatticeIndex, cost: f64) {
        self.values[grid.flat_index(index)] = cost;
    }

    pub fn check_grid(&self, grid: &Grid) -> Result<()> {
        check_grid(self.shape, grid)
    }

    pub fn interpolate(&self, grid: &Grid, query: &State) -> f64 {
        interpolate::interpolate(grid, &self.values, query)
    }

    /// Number of states with a finite cost.
    pub fn feasible(&self) -> usize {
        self.values.iter().filter(|c| c.is_finite()).count()
    }

    pub fn feasible_fraction(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.feasible() as f64 / self.values.len() as f64
    }
}

/// Chosen throttle per lattice state, stored as an index into the grid's
/// action set. `None` where every action costs `+inf`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyTable {
    shape: (usize, usize, usize),
    actions: Vec<Option<usize>>,
}

impl PolicyTable {
    pub fn empty(grid: &Grid) -> Self {
        Self {
            shape: grid.shape(),
            actions: vec![None; grid.len()],
        }
    }

    pub fn from_actions(shape: (usize, usize, usize), actions: Vec<Option<usize>>) -> Result<Self> {
        check_len(shape, actions.len())?;
        Ok(Self { shape, actions })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    pub fn actions(&self) -> &[Option<usize>] {
        &self.actions
    }

    pub fn get(&self, grid: &Grid, index: LatticeIndex) -> Option<usize> {
        self.actions[grid.flat_index(index)]
    }

    pub fn throttle(&self, grid: &Grid, index: LatticeIndex) -> Option<Throttle> {
        self.get(grid, index).map(|action| grid.throttle(action))
    }

    pub(crate) fn set(&mut self, grid: &Grid, index: LatticeIndex, action: Option<usize>) {
        self.actions[grid.flat_index(index)] = action;
    }

    pub fn check_grid(&self, grid: &Grid) -> Result<()> {
        check_grid(self.shape, grid)?;
        if let Some(action) = self.actions.iter().flatten().find(|&&a| a >= grid.actions().len()) {
            return Err(SolverError::InvalidConfig {
                reason: format!("policy refers to action {action} but the grid has {}", grid.actions().len()),
            });
        }
        Ok(())
    }

    /// Throttle percentages as a plain field for interpolation; states
    /// without an action read as `fallback`.
    pub fn throttle_field(&self, grid: &Grid, fallback: Throttle) -> Vec<f64> {
        self.actions
            .iter()
            .map(|action| action.map_or(fallback.0, |a| grid.actions()[a]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::DT;

    fn grid() -> Grid {
        Grid::new(vec![0.0, DT], vec![0.0, 5.0], vec![0.0, 10.0], vec![60.0, 100.0], DT).unwrap()
    }

    #[test]
    fn test_feasible_fraction() {
        let grid = grid();
        let mut costs = CostTable::zeros(&grid);
        costs.set(&grid, LatticeIndex::new(1, 1, 1), f64::INFINITY);
        costs.set(&grid, LatticeIndex::new(0, 1, 0), f64::INFINITY);
        assert_eq!(costs.feasible(), 6);
        assert!((costs.feasible_fraction() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_throttle_field_uses_fallback() {
        let grid = grid();
        let mut policy = PolicyTable::empty(&grid);
        policy.set(&grid, LatticeIndex::new(0, 0, 1), Some(0));
        let field = policy.throttle_field(&grid, Throttle(100.0));
        assert_eq!(field[1], 60.0);
        assert_eq!(field[0], 100.0);
        assert_eq!(policy.throttle(&grid, LatticeIndex::new(0, 0, 1)), Some(Throttle(60.0)));
    }

    #[test]
    fn test_shape_checks() {
        let grid = grid();
        assert!(CostTable::from_values((2, 2, 2), vec![0.0; 7]).is_err());
        let other = Grid::new(vec![0.0], vec![0.0, 5.0], vec![0.0, 10.0], vec![60.0], DT).unwrap();
        assert!(matches!(
            CostTable::zeros(&grid).check_grid(&other),
            Err(SolverError::ShapeMismatch { .. })
        ));
        let policy = PolicyTable::from_actions((1, 2, 2), vec![Some(1); 4]).unwrap();
        assert!(policy.check_grid(&other).is_err());
    }
}
