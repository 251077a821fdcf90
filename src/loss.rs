use crate::error::{Result, SolverError};
use crate::types::{State, Throttle};
use serde::{Deserialize, Serialize};

/// Scores one control step. Values are `>= 0`, `+inf` for outcomes that
/// must never be chosen.
pub trait LossFunction: Sync {
    fn loss(&self, state: &State, throttle: Throttle) -> f64;

    /// Terminal states end the descent: their cost is the loss alone and
    /// nothing is looked up downstream.
    fn is_terminal(&self, _state: &State) -> bool {
        false
    }
}

impl<F> LossFunction for F
where
    F: Fn(&State, Throttle) -> f64 + Sync,
{
    fn loss(&self, state: &State, throttle: Throttle) -> f64 {
        self(state, throttle)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Touchdown {
    Flying,
    Landed,
    Crashed,
    /// Out of propellant and still airborne.
    Stranded,
}

/// Landing reward with a mild preference for mid-range throttle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandingLoss {
    pub tolerance: f64,
    pub ground_height: f64,
    pub landed_speed: f64,
    pub crash_speed: f64,
    pub landed_cost: f64,
    #[serde(with = "crate::persistence::infinite_as_null")]
    pub stranded_cost: f64,
    pub step_cost: f64,
    pub off_band_cost: f64,
    pub preferred_band: (f64, f64),
}

impl Default for LandingLoss {
    fn default() -> Self {
        Self {
            tolerance: 0.00001,
            ground_height: 0.0,
            landed_speed: 1.0,
            crash_speed: 2.0,
            landed_cost: 0.0,
            stranded_cost: f64::INFINITY,
            step_cost: 1.0,
            // Let's have a slight preference for keeping throttle around 80%
            off_band_cost: 1.1,
            preferred_band: (69.0, 91.0),
        }
    }
}

impl LandingLoss {
    pub fn validate(&self) -> Result<()> {
        let costs = [self.landed_cost, self.stranded_cost, self.step_cost, self.off_band_cost];
        if costs.iter().any(|c| c.is_nan() || *c < 0.0) {
            return Err(SolverError::InvalidConfig {
                reason: "loss costs must be non-negative".to_string(),
            });
        }
        if self.preferred_band.0 > self.preferred_band.1 || !(self.tolerance >= 0.0) {
            return Err(SolverError::InvalidConfig {
                reason: "preferred throttle band is inverted or tolerance negative".to_string(),
            });
        }
        Ok(())
    }

    fn on_ground(&self, state: &State) -> bool {
        state.height <= self.ground_height + self.tolerance
    }

    pub fn classify(&self, state: &State) -> Touchdown {
        let burnt_out = state.burn_time <= self.tolerance;
        if burnt_out && self.on_ground(state) && state.velocity <= self.landed_speed + self.tolerance {
            return Touchdown::Landed;
        }
        if self.on_ground(state) && state.velocity >= self.crash_speed {
            return Touchdown::Crashed;
        }
        if state.burn_time < -self.tolerance {
            return Touchdown::Stranded;
        }
        Touchdown::Flying
    }

    /// Outcome of a free-running trajectory touching the ground: anything
    /// short of a clean landing counts as a crash.
    pub fn touchdown(&self, state: &State) -> Option<Touchdown> {
        if !self.on_ground(state) {
            return None;
        }
        match self.classify(state) {
            Touchdown::Landed => Some(Touchdown::Landed),
            _ => Some(Touchdown::Crashed),
        }
    }

    fn in_band(&self, throttle: Throttle) -> bool {
        (self.preferred_band.0..=self.preferred_band.1).contains(&throttle.0)
    }
}

impl LossFunction for LandingLoss {
    fn loss(&self, state: &State, throttle: Throttle) -> f64 {
        match self.classify(state) {
            Touchdown::Landed => self.landed_cost,
            Touchdown::Crashed => f64::INFINITY,
            Touchdown::Stranded => self.stranded_cost,
            Touchdown::Flying if self.in_band(throttle) => self.step_cost,
            Touchdown::Flying => self.off_band_cost,
        }
    }

    fn is_terminal(&self, state: &State) -> bool {
        self.classify(state) != Touchdown::Flying
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let loss = LandingLoss::default();
        assert_eq!(loss.classify(&State::new(0.0, 0.5, 0.0)), Touchdown::Landed);
        assert_eq!(loss.classify(&State::new(0.0, 1.0, -0.5)), Touchdown::Landed);
        assert_eq!(loss.classify(&State::new(1.0, 3.0, 0.0)), Touchdown::Crashed);
        assert_eq!(loss.classify(&State::new(0.0, 2.0, 0.0)), Touchdown::Crashed);
        assert_eq!(loss.classify(&State::new(-0.3, 0.5, 4.0)), Touchdown::Stranded);
        assert_eq!(loss.classify(&State::new(0.0, 1.5, 0.0)), Touchdown::Flying);
        assert_eq!(loss.classify(&State::new(1.0, 0.5, 0.0)), Touchdown::Flying);
    }

    #[test]
    fn test_loss_values() {
        let loss = LandingLoss::default();
        let flying = State::new(2.0, 4.0, 10.0);
        assert_eq!(loss.loss(&flying, Throttle(80.0)), 1.0);
        assert_eq!(loss.loss(&flying, Throttle(69.0)), 1.0);
        assert_eq!(loss.loss(&flying, Throttle(95.0)), 1.1);
        assert_eq!(loss.loss(&flying, Throttle(50.0)), 1.1);
        assert_eq!(loss.loss(&State::new(0.0, 0.0, 0.0), Throttle(50.0)), 0.0);
        assert!(loss.loss(&State::new(2.0, 9.0, 0.0), Throttle(80.0)).is_infinite());
        assert!(loss.is_terminal(&State::new(0.0, 0.0, 0.0)));
        assert!(!loss.is_terminal(&flying));
    }

    #[test]
    fn test_touchdown() {
        let loss = LandingLoss::default();
        assert_eq!(loss.touchdown(&State::new(-1.0, 5.0, 3.0)), None);
        assert_eq!(loss.touchdown(&State::new(-1.0, 0.5, -0.1)), Some(Touchdown::Landed));
        assert_eq!(loss.touchdown(&State::new(-1.0, 1.5, -0.1)), Some(Touchdown::Crashed));
        assert_eq!(loss.touchdown(&State::new(1.0, 0.5, 0.0)), Some(Touchdown::Crashed));
    }

    #[test]
    fn test_closures_are_loss_functions() {
        let loss = |state: &State, _: Throttle| if state.burn_time <= 0.0 { 0.0 } else { 1.0 };
        assert_eq!(LossFunction::loss(&loss, &State::new(0.0, 1.0, 1.0), Throttle(100.0)), 0.0);
        assert!(!loss.is_terminal(&State::new(0.0, 1.0, 1.0)));
    }

    #[test]
    fn test_config_round_trip_keeps_infinity() {
        let loss = LandingLoss::default();
        let json = serde_json::to_string(&loss).unwrap();
        assert!(json.contains("\"stranded_cost\":null"));
        let back: LandingLoss = serde_json::from_str(&json).unwrap();
        assert_eq!(back, loss);
        let partial: LandingLoss = serde_json::from_str(r#"{"crash_speed": 3.0}"#).unwrap();
        assert_eq!(partial.crash_speed, 3.0);
        assert!(partial.stranded_cost.is_infinite());
    }
}
