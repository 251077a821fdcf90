//! Error types for the solver and its collaborators.
//!
//! Only configuration bugs are errors. Infeasible states are data: they
//! show up as `+inf` costs and missing actions in the tables.

use thiserror::Error;

use crate::types::State;

#[derive(Debug, Error)]
pub enum SolverError {
    /// Breakpoints or action set can't form a lattice.
    #[error("Invalid grid: {reason}")]
    InvalidGrid { reason: String },

    /// A lattice lookup was made with a state that isn't a lattice point.
    #[error("State {state} is not a lattice point")]
    NotOnLattice { state: State },

    /// Throttle value that isn't part of the action set.
    #[error("Unknown action {action}")]
    UnknownAction { action: f64 },

    /// The loss function broke its contract (negative or NaN).
    #[error("Loss function returned {value} for state {state} and action {action}")]
    InvalidLoss { state: State, action: f64, value: f64 },

    /// Table shapes disagree with the grid they're used with.
    #[error("Table shape {got:?} does not match grid shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SolverError>;
