//! Offline optimal-control solver for a propulsive rocket landing.
//!
//! The vehicle burns a solid motor whose thrust can only be throttled
//! down. The solver works backwards from burnout over a lattice of
//! (remaining burn time, velocity, height) and stores the cheapest
//! throttle for every lattice point.

pub mod config;
pub mod error;
pub mod export;
pub mod grid;
pub mod interpolate;
pub mod loss;
pub mod persistence;
pub mod physics;
pub mod report;
pub mod sim;
pub mod solver;
pub mod table;
pub mod types;
pub(crate) mod util;

pub use config::SolverConfig;
pub use error::{Result, SolverError};
pub use grid::Grid;
pub use loss::{LandingLoss, LossFunction};
pub use physics::{Dynamics, RocketDynamics};
pub use solver::{solve, Solution, SolverOptions, ValueIterator};
pub use table::{CostTable, PolicyTable};
pub use types::{BurnTime, Height, LatticeIndex, State, Throttle, Velocity};
pub use util::linspace;
