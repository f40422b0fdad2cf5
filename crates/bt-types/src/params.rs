//! Named parameter vectors exchanged with evaluators and actuators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Real-valued parameter vector handed to an objective evaluator.
pub type ParameterPoint = BTreeMap<String, f64>;

/// Integer command vector handed to an actuator sink.
pub type CommandVector = BTreeMap<String, i64>;

/// Per-parameter partial derivatives returned by an evaluator.
pub type Gradient = BTreeMap<String, f64>;

/// One objective sample together with its partial derivatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub objective: f64,
    pub derivatives: Gradient,
}

impl Evaluation {
    pub fn new(objective: f64) -> Self {
        Self {
            objective,
            derivatives: Gradient::new(),
        }
    }

    pub fn with_derivative(mut self, name: impl Into<String>, value: f64) -> Self {
        self.derivatives.insert(name.into(), value);
        self
    }

    /// Sum of every partial, useful as a single diagnostic signal.
    pub fn total_gradient(&self) -> f64 {
        self.derivatives.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_builder_collects_partials() {
        let eval = Evaluation::new(3.5)
            .with_derivative("focus", 1.25)
            .with_derivative("dispersion", -0.25);

        assert_eq!(eval.derivatives.len(), 2);
        assert_eq!(eval.total_gradient(), 1.0);
    }
}
