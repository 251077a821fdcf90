use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Mul, Sub};

/// Seconds of propellant left before burnout.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct BurnTime(pub f64);

impl Display for BurnTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

impl From<f64> for BurnTime {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl Sub<f64> for BurnTime {
    type Output = Self;

    fn sub(self, rhs: f64) -> Self::Output {
        (self.0 - rhs).into()
    }
}

impl PartialOrd<f64> for BurnTime {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

impl PartialEq<f64> for BurnTime {
    fn eq(&self, other: &f64) -> bool {
        self.0.eq(other)
    }
}

/// Vertical speed in m/s, positive towards the ground.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Velocity(pub f64);

impl Display for Velocity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<f64> for Velocity {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl Add<f64> for Velocity {
    type Output = Self;

    fn add(self, rhs: f64) -> Self::Output {
        (self.0 + rhs).into()
    }
}

impl Add<Velocity> for Velocity {
    type Output = Self;

    fn add(self, rhs: Velocity) -> Self::Output {
        (self.0 + rhs.0).into()
    }
}

impl Mul<f64> for Velocity {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        (self.0 * rhs).into()
    }
}

impl PartialEq<f64> for Velocity {
    fn eq(&self, other: &f64) -> bool {
        self.0.eq(other)
    }
}

impl PartialOrd<f64> for Velocity {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

/// Height above the landing pad in metres.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Height(pub f64);

impl Display for Height {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<f64> for Height {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

/// Descending at `rhs` m/s for one unit of time lowers the height by `rhs`.
impl Sub<Velocity> for Height {
    type Output = Self;

    fn sub(self, rhs: Velocity) -> Self::Output {
        (self.0 - rhs.0).into()
    }
}

impl PartialEq<f64> for Height {
    fn eq(&self, other: &f64) -> bool {
        self.0.eq(other)
    }
}

impl PartialOrd<f64> for Height {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

/// Throttle setting as a percentage of rated thrust.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Throttle(pub f64);

impl Throttle {
    pub fn fraction(self) -> f64 {
        self.0 / 100.0
    }
}

impl Display for Throttle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

impl From<f64> for Throttle {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

/// A point of the continuous state space.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub burn_time: BurnTime,
    pub velocity: Velocity,
    pub height: Height,
}

impl State {
    pub fn new(burn_time: f64, velocity: f64, height: f64) -> Self {
        Self {
            burn_time: burn_time.into(),
            velocity: velocity.into(),
            height: height.into(),
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(t={}s, v={}m/s, h={}m)", self.burn_time, self.velocity, self.height)
    }
}

/// Position of a lattice state inside the three breakpoint arrays.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LatticeIndex {
    pub time: usize,
    pub velocity: usize,
    pub height: usize,
}

impl LatticeIndex {
    pub fn new(time: usize, velocity: usize, height: usize) -> Self {
        Self {
            time,
            velocity,
            height,
        }
    }
}
