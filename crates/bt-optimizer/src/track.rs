//! Per-parameter command and derivative history.

use bt_types::{TrackConfig, TrackError};
use serde::{Deserialize, Serialize};

/// Outcome of a momentum proposal on a single track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Proposal {
    /// The change was applied and `value` appended to the history.
    Applied {
        previous: i64,
        value: i64,
        raw_delta: f64,
        /// The unclipped candidate fell outside the bounds.
        clipped: bool,
    },
    /// `|raw_delta|` did not exceed the tolerance; history untouched.
    Gated { raw_delta: f64 },
}

impl Proposal {
    /// The newly committed value, or `None` when gated.
    pub fn new_value(&self) -> Option<i64> {
        match self {
            Self::Applied { value, .. } => Some(*value),
            Self::Gated { .. } => None,
        }
    }
}

/// Committed values and gradient samples for one actuator parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterTrack {
    name: String,
    initial_value: i64,
    lower_bound: f64,
    upper_bound: f64,
    learning_rate: f64,
    history: Vec<i64>,
    derivative_history: Vec<f64>,
}

impl ParameterTrack {
    /// Build an empty track. The config is expected to be validated already.
    pub fn new(config: &TrackConfig) -> Self {
        Self {
            name: config.name.clone(),
            initial_value: config.initial_value,
            lower_bound: config.lower(),
            upper_bound: config.upper(),
            learning_rate: config.learning_rate,
            history: Vec::new(),
            derivative_history: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_value(&self) -> i64 {
        self.initial_value
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.lower_bound, self.upper_bound)
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn history(&self) -> &[i64] {
        &self.history
    }

    pub fn derivative_history(&self) -> &[f64] {
        &self.derivative_history
    }

    /// Last committed value, `None` before bootstrap.
    pub fn current_value(&self) -> Option<i64> {
        self.history.last().copied()
    }

    pub fn latest_derivative(&self) -> Option<f64> {
        self.derivative_history.last().copied()
    }

    /// Commit `initial_value` as `history[0]`.
    pub fn bootstrap(&mut self, initial_value: i64) -> Result<(), TrackError> {
        if !self.history.is_empty() {
            return Err(TrackError::AlreadyBootstrapped {
                name: self.name.clone(),
            });
        }
        self.history.push(initial_value);
        Ok(())
    }

    /// The value [`probe`](Self::probe) would commit, without committing it.
    pub fn probe_value(&self) -> Result<i64, TrackError> {
        match self.history.as_slice() {
            [only] => Ok(only.saturating_add(1)),
            other => Err(TrackError::ProbeLength {
                name: self.name.clone(),
                len: other.len(),
            }),
        }
    }

    /// Commit a unit step above the bootstrap value, seeding the two-point
    /// difference the momentum term needs.
    pub fn probe(&mut self) -> Result<i64, TrackError> {
        let value = self.probe_value()?;
        self.history.push(value);
        Ok(value)
    }

    pub fn record_derivative(&mut self, value: f64) {
        self.derivative_history.push(value);
    }

    /// Momentum step with convergence gating, clipping and integer rounding.
    ///
    /// The momentum term always uses this track's own two most recent
    /// committed values, so tracks that were gated on earlier iterations keep
    /// working against the values they actually hold.
    pub fn propose_update(&mut self, momentum: f64, tolerance: f64) -> Result<Proposal, TrackError> {
        let (previous, before) = match self.history.as_slice() {
            [.., before, last] => (*last, *before),
            other => {
                return Err(TrackError::NotBootstrapped {
                    name: self.name.clone(),
                    len: other.len(),
                })
            }
        };
        let derivative = self.latest_derivative().ok_or_else(|| TrackError::NoDerivative {
            name: self.name.clone(),
        })?;

        let momentum_term = momentum * (previous as f64 - before as f64);
        let raw_delta = momentum_term - self.learning_rate * derivative;

        if raw_delta.abs() <= tolerance {
            return Ok(Proposal::Gated { raw_delta });
        }

        let candidate = previous as f64 + raw_delta;
        let clipped = candidate < self.lower_bound || candidate > self.upper_bound;
        let value = self.quantize(candidate.clamp(self.lower_bound, self.upper_bound));
        self.history.push(value);

        Ok(Proposal::Applied {
            previous,
            value,
            raw_delta,
            clipped,
        })
    }

    /// Round half to even, then pull back inside the bounds if rounding
    /// crossed a fractional bound.
    fn quantize(&self, value: f64) -> i64 {
        let mut rounded = value.round_ties_even();
        if rounded < self.lower_bound {
            rounded = self.lower_bound.ceil();
        }
        if rounded > self.upper_bound {
            rounded = self.upper_bound.floor();
        }
        rounded as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(initial: i64, lr: f64) -> ParameterTrack {
        let mut t = ParameterTrack::new(&TrackConfig::new("focus", initial, lr));
        t.bootstrap(initial).unwrap();
        t
    }

    #[test]
    fn bootstrap_then_probe() {
        let mut t = track(-240, 4.0);
        assert_eq!(t.history(), &[-240]);
        assert_eq!(t.probe().unwrap(), -239);
        assert_eq!(t.history(), &[-240, -239]);
    }

    #[test]
    fn bootstrap_twice_is_rejected() {
        let mut t = track(0, 1.0);
        assert!(matches!(
            t.bootstrap(0),
            Err(TrackError::AlreadyBootstrapped { .. })
        ));
    }

    #[test]
    fn probe_requires_single_value() {
        let mut empty = ParameterTrack::new(&TrackConfig::new("focus", 0, 1.0));
        assert!(matches!(
            empty.probe(),
            Err(TrackError::ProbeLength { len: 0, .. })
        ));

        let mut t = track(0, 1.0);
        t.probe().unwrap();
        assert!(matches!(t.probe(), Err(TrackError::ProbeLength { len: 2, .. })));
    }

    #[test]
    fn update_needs_two_values_and_a_derivative() {
        let mut t = track(0, 1.0);
        t.record_derivative(1.0);
        assert!(matches!(
            t.propose_update(0.5, 1.0),
            Err(TrackError::NotBootstrapped { len: 1, .. })
        ));

        let mut t = track(0, 1.0);
        t.probe().unwrap();
        assert!(matches!(
            t.propose_update(0.5, 1.0),
            Err(TrackError::NoDerivative { .. })
        ));
    }

    #[test]
    fn momentum_update_follows_rule() {
        // history [10, 11], derivative -2, lr 3, momentum 0.5:
        // raw = 0.5 * 1 - 3 * -2 = 6.5 -> 17.5 -> ties to even -> 18
        let mut t = track(10, 3.0);
        t.probe().unwrap();
        t.record_derivative(-2.0);

        let proposal = t.propose_update(0.5, 1.0).unwrap();
        assert_eq!(
            proposal,
            Proposal::Applied {
                previous: 11,
                value: 18,
                raw_delta: 6.5,
                clipped: false
            }
        );
        assert_eq!(t.history(), &[10, 11, 18]);
    }

    #[test]
    fn rounding_ties_go_to_even() {
        // raw = 0 - 1 * -1.5 = 1.5 -> 11 + 1.5 = 12.5 -> 12
        let mut t = track(10, 1.0);
        t.probe().unwrap();
        t.record_derivative(-1.5);
        assert_eq!(t.propose_update(0.0, 1.0).unwrap().new_value(), Some(12));

        // raw = 0 - 1 * -2.5 = 2.5 -> 12 + 2.5 = 14.5 -> 14
        t.record_derivative(-2.5);
        assert_eq!(t.propose_update(0.0, 1.0).unwrap().new_value(), Some(14));
    }

    #[test]
    fn small_delta_is_gated_without_mutation() {
        let mut t = track(0, 0.1);
        t.probe().unwrap();
        t.record_derivative(0.5);

        // raw = 0.5 * 1 - 0.1 * 0.5 = 0.45 <= 1.0
        let proposal = t.propose_update(0.5, 1.0).unwrap();
        assert!(matches!(proposal, Proposal::Gated { .. }));
        assert_eq!(proposal.new_value(), None);
        assert_eq!(t.history(), &[0, 1]);
    }

    #[test]
    fn delta_equal_to_tolerance_is_gated() {
        let mut t = track(0, 1.0);
        t.probe().unwrap();
        t.record_derivative(1.0);
        // raw = 0 * 1 - 1 * 1 = -1, |raw| == tolerance
        assert!(matches!(
            t.propose_update(0.0, 1.0).unwrap(),
            Proposal::Gated { raw_delta } if raw_delta == -1.0
        ));
    }

    #[test]
    fn clipping_holds_at_boundary() {
        let config = TrackConfig::new("focus", 0, 10.0).with_bounds(-1.0, 1.0);
        let mut t = ParameterTrack::new(&config);
        t.bootstrap(0).unwrap();
        t.probe().unwrap();

        for _ in 0..5 {
            t.record_derivative(-100.0);
            let proposal = t.propose_update(0.9, 1.0).unwrap();
            assert!(matches!(proposal, Proposal::Applied { value: 1, clipped: true, .. }));
        }
        assert_eq!(t.history(), &[0, 1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn fractional_bounds_stay_inside_after_rounding() {
        let config = TrackConfig::new("focus", 0, 1.0).with_bounds(-2.5, 1.5);
        let mut t = ParameterTrack::new(&config);
        t.bootstrap(0).unwrap();
        t.probe().unwrap();

        // candidate 1 + 5 -> clip 1.5 -> round 2 -> pulled back to 1
        t.record_derivative(-5.0);
        assert_eq!(t.propose_update(0.0, 0.5).unwrap().new_value(), Some(1));

        // candidate 1 - 10 -> clip -2.5 -> round -2 (ties even), inside
        t.record_derivative(10.0);
        assert_eq!(t.propose_update(0.0, 0.5).unwrap().new_value(), Some(-2));
    }
}
