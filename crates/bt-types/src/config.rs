//! Controller configuration: one entry per actuator track plus shared settings.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::errors::{BtResult, ConfigError};

/// Name of the deformable-mirror focus track in the reference workload.
pub const FOCUS: &str = "focus";
/// Name of the second-order dispersion track in the reference workload.
pub const DISPERSION: &str = "dispersion";

/// Settings for a single controlled parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub name: String,

    /// Integer command the run starts from.
    pub initial_value: i64,

    /// Lowest allowed command. `None` means unbounded.
    #[serde(default)]
    pub lower_bound: Option<f64>,

    /// Highest allowed command. `None` means unbounded.
    #[serde(default)]
    pub upper_bound: Option<f64>,

    /// Step-size multiplier applied to the derivative.
    pub learning_rate: f64,
}

impl TrackConfig {
    pub fn new(name: impl Into<String>, initial_value: i64, learning_rate: f64) -> Self {
        Self {
            name: name.into(),
            initial_value,
            lower_bound: None,
            upper_bound: None,
            learning_rate,
        }
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower_bound = Some(lower);
        self.upper_bound = Some(upper);
        self
    }

    pub fn with_initial_value(mut self, value: i64) -> Self {
        self.initial_value = value;
        self
    }

    /// Effective lower bound, `-inf` when unbounded.
    pub fn lower(&self) -> f64 {
        self.lower_bound.unwrap_or(f64::NEG_INFINITY)
    }

    /// Effective upper bound, `+inf` when unbounded.
    pub fn upper(&self) -> f64 {
        self.upper_bound.unwrap_or(f64::INFINITY)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        let (lower, upper) = (self.lower(), self.upper());
        if lower.is_nan() || upper.is_nan() {
            return Err(ConfigError::NanBound {
                name: self.name.clone(),
            });
        }
        if lower > upper {
            return Err(ConfigError::InvertedBounds {
                name: self.name.clone(),
                lower,
                upper,
            });
        }
        if lower.ceil() > upper.floor() {
            return Err(ConfigError::NoIntegerInBounds {
                name: self.name.clone(),
                lower,
                upper,
            });
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::LearningRate {
                name: self.name.clone(),
                value: self.learning_rate,
            });
        }

        let initial = self.initial_value as f64;
        if initial < lower || initial > upper {
            return Err(ConfigError::InitialOutOfBounds {
                name: self.name.clone(),
                value: self.initial_value,
            });
        }
        // The second bootstrap iteration commits initial + 1 unclipped.
        let probe = self.initial_value.saturating_add(1);
        if probe as f64 > upper {
            return Err(ConfigError::ProbeOutOfBounds {
                name: self.name.clone(),
                value: probe,
            });
        }
        Ok(())
    }
}

/// Top-level configuration for a controller run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub name: String,

    /// Controlled parameters, in the order they are reported.
    pub tracks: Vec<TrackConfig>,

    /// Fraction of the previous committed step carried into the next one.
    pub momentum: f64,

    /// Proposed changes at or below this magnitude are not applied.
    pub convergence_tolerance: f64,

    /// Number of iterations the driver runs.
    pub iteration_limit: usize,
}

impl ControllerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: Vec::new(),
            momentum: 0.999,
            convergence_tolerance: 1.0,
            iteration_limit: 100,
        }
    }

    /// The two-actuator setup of the betatron beamline: focus and second-order
    /// dispersion both starting at -240, unbounded, learning rate 4.
    pub fn reference() -> Self {
        Self::new("betatron")
            .with_track(TrackConfig::new(FOCUS, -240, 4.0))
            .with_track(TrackConfig::new(DISPERSION, -240, 4.0))
    }

    pub fn with_track(mut self, track: TrackConfig) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.convergence_tolerance = tolerance;
        self
    }

    pub fn with_iteration_limit(mut self, n: usize) -> Self {
        self.iteration_limit = n;
        self
    }

    pub fn track(&self, name: &str) -> Option<&TrackConfig> {
        self.tracks.iter().find(|t| t.name == name)
    }

    pub fn track_mut(&mut self, name: &str) -> Option<&mut TrackConfig> {
        self.tracks.iter_mut().find(|t| t.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracks.is_empty() {
            return Err(ConfigError::NoTracks);
        }
        let mut seen = HashSet::new();
        for track in &self.tracks {
            track.validate()?;
            if !seen.insert(track.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    name: track.name.clone(),
                });
            }
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(ConfigError::Momentum {
                value: self.momentum,
            });
        }
        if !(self.convergence_tolerance.is_finite() && self.convergence_tolerance > 0.0) {
            return Err(ConfigError::Tolerance {
                value: self.convergence_tolerance,
            });
        }
        if self.iteration_limit == 0 {
            return Err(ConfigError::IterationLimit);
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> BtResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> BtResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BtError;

    #[test]
    fn reference_config_is_valid() {
        let config = ControllerConfig::reference();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracks.len(), 2);
        assert_eq!(config.track(FOCUS).unwrap().initial_value, -240);
        assert_eq!(config.momentum, 0.999);
        assert_eq!(config.iteration_limit, 100);
    }

    #[test]
    fn rejects_empty_track_list() {
        let config = ControllerConfig::new("empty");
        assert_eq!(config.validate(), Err(ConfigError::NoTracks));
    }

    #[test]
    fn rejects_duplicate_names() {
        let config = ControllerConfig::new("dup")
            .with_track(TrackConfig::new("focus", 0, 1.0))
            .with_track(TrackConfig::new("focus", 3, 1.0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateName { .. })
        ));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let track = TrackConfig::new("focus", 0, 1.0).with_bounds(5.0, -5.0);
        assert!(matches!(
            track.validate(),
            Err(ConfigError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn rejects_nan_bounds() {
        for (lower, upper) in [(f64::NAN, 10.0), (-10.0, f64::NAN)] {
            let track = TrackConfig::new("focus", 0, 1.0).with_bounds(lower, upper);
            assert!(matches!(
                track.validate(),
                Err(ConfigError::NanBound { .. })
            ));
        }
    }

    #[test]
    fn rejects_bounds_without_integer() {
        let track = TrackConfig::new("focus", 0, 1.0).with_bounds(0.2, 0.8);
        assert!(matches!(
            track.validate(),
            Err(ConfigError::NoIntegerInBounds { .. })
        ));
    }

    #[test]
    fn rejects_bad_learning_rate() {
        for lr in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let track = TrackConfig::new("focus", 0, lr);
            assert!(matches!(
                track.validate(),
                Err(ConfigError::LearningRate { .. })
            ));
        }
    }

    #[test]
    fn rejects_momentum_outside_unit_interval() {
        for m in [-0.1, 1.0, 1.5, f64::NAN] {
            let config = ControllerConfig::reference().with_momentum(m);
            assert!(matches!(config.validate(), Err(ConfigError::Momentum { .. })));
        }
        let config = ControllerConfig::reference().with_momentum(0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_tolerance() {
        let config = ControllerConfig::reference().with_tolerance(0.0);
        assert!(matches!(config.validate(), Err(ConfigError::Tolerance { .. })));
    }

    #[test]
    fn rejects_zero_iteration_limit() {
        let config = ControllerConfig::reference().with_iteration_limit(0);
        assert_eq!(config.validate(), Err(ConfigError::IterationLimit));
    }

    #[test]
    fn rejects_initial_and_probe_outside_bounds() {
        let track = TrackConfig::new("focus", 5, 1.0).with_bounds(-1.0, 1.0);
        assert!(matches!(
            track.validate(),
            Err(ConfigError::InitialOutOfBounds { .. })
        ));

        let track = TrackConfig::new("focus", 1, 1.0).with_bounds(-1.0, 1.0);
        assert!(matches!(
            track.validate(),
            Err(ConfigError::ProbeOutOfBounds { value: 2, .. })
        ));
    }

    #[test]
    fn json_round_trip_with_missing_bounds() {
        let json = r#"{
            "name": "bench",
            "tracks": [
                {"name": "focus", "initial_value": -150, "learning_rate": 0.04},
                {"name": "dispersion", "initial_value": 36100, "lower_bound": 35600.0,
                 "upper_bound": 36600.0, "learning_rate": 0.04}
            ],
            "momentum": 0.9,
            "convergence_tolerance": 1.0,
            "iteration_limit": 25
        }"#;

        let config = ControllerConfig::from_json_str(json).unwrap();
        let focus = config.track("focus").unwrap();
        assert_eq!(focus.lower(), f64::NEG_INFINITY);
        assert_eq!(focus.upper(), f64::INFINITY);
        assert_eq!(config.track("dispersion").unwrap().upper(), 36600.0);
        assert_eq!(config.iteration_limit, 25);
    }

    #[test]
    fn json_validation_errors_surface() {
        let json = r#"{"name": "x", "tracks": [], "momentum": 0.5,
                       "convergence_tolerance": 1.0, "iteration_limit": 3}"#;
        match ControllerConfig::from_json_str(json) {
            Err(BtError::Config(ConfigError::NoTracks)) => (),
            other => panic!("expected NoTracks, got {other:?}"),
        }
    }
}
