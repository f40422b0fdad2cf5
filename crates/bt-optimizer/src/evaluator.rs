//! Objective evaluation: the measurement side of each iteration.

use bt_types::{Evaluation, EvaluationError, ParameterPoint};

/// Samples the objective at a parameter point.
///
/// A live instrument measures the beam after the actuators settle; the
/// synthetic proxy below computes it in closed form. Either way the controller
/// makes exactly one call per iteration and treats the result as opaque.
pub trait ObjectiveEvaluator {
    fn evaluate(&mut self, point: &ParameterPoint) -> Result<Evaluation, EvaluationError>;

    /// Human-readable evaluator name.
    fn name(&self) -> &str {
        "evaluator"
    }
}

impl<F> ObjectiveEvaluator for F
where
    F: FnMut(&ParameterPoint) -> Result<Evaluation, EvaluationError>,
{
    fn evaluate(&mut self, point: &ParameterPoint) -> Result<Evaluation, EvaluationError> {
        self(point)
    }
}

/// Synthetic stand-in for the measured count.
///
/// The objective depends only on `z`, the sum of every configured parameter:
///
/// ```text
/// f(z)  = (0.1 z)^2 * sin(0.01 z)
/// f'(z) = 0.2 (0.1 z) sin(0.01 z) + 0.01 cos(0.01 z) (0.1 z)^2
/// ```
///
/// so every partial derivative equals `f'(z)`. That equality belongs to this
/// proxy, not to the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct SumCoupledProxy {
    parameters: Vec<String>,
}

impl SumCoupledProxy {
    pub fn new<I, S>(parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parameters: parameters.into_iter().map(Into::into).collect(),
        }
    }

    pub fn objective_at(z: f64) -> f64 {
        (0.1 * z).powi(2) * (0.01 * z).sin()
    }

    pub fn derivative_at(z: f64) -> f64 {
        0.2 * (0.1 * z) * (0.01 * z).sin() + 0.01 * (0.01 * z).cos() * (0.1 * z).powi(2)
    }
}

impl ObjectiveEvaluator for SumCoupledProxy {
    fn evaluate(&mut self, point: &ParameterPoint) -> Result<Evaluation, EvaluationError> {
        let mut z = 0.0_f64;
        for name in &self.parameters {
            let value = point.get(name).ok_or_else(|| EvaluationError::Failed {
                message: format!("point has no value for {name}"),
            })?;
            z += *value;
        }

        let slope = Self::derivative_at(z);
        let mut evaluation = Evaluation::new(Self::objective_at(z));
        for name in &self.parameters {
            evaluation.derivatives.insert(name.clone(), slope);
        }
        Ok(evaluation)
    }

    fn name(&self) -> &str {
        "sum-coupled-proxy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(x: f64, y: f64) -> ParameterPoint {
        let mut p = ParameterPoint::new();
        p.insert("focus".into(), x);
        p.insert("dispersion".into(), y);
        p
    }

    #[test]
    fn proxy_matches_closed_form() {
        let mut proxy = SumCoupledProxy::new(["focus", "dispersion"]);
        let eval = proxy.evaluate(&point(-240.0, -240.0)).unwrap();

        let z: f64 = -480.0;
        assert_relative_eq!(eval.objective, (0.1 * z).powi(2) * (0.01 * z).sin());
        assert_relative_eq!(eval.derivatives["focus"], eval.derivatives["dispersion"]);
        assert_relative_eq!(
            eval.derivatives["focus"],
            0.2 * 0.1 * z * (0.01 * z).sin() + 0.01 * (0.01 * z).cos() * (0.1 * z).powi(2)
        );
    }

    #[test]
    fn derivative_agrees_with_finite_difference() {
        let h = 1e-4;
        for z in [-478.0, -100.0, 0.5, 250.0] {
            let numeric = (SumCoupledProxy::objective_at(z + h)
                - SumCoupledProxy::objective_at(z - h))
                / (2.0 * h);
            assert_relative_eq!(
                SumCoupledProxy::derivative_at(z),
                numeric,
                epsilon = 1e-5,
                max_relative = 1e-6
            );
        }
    }

    #[test]
    fn proxy_requires_every_parameter() {
        let mut proxy = SumCoupledProxy::new(["focus", "dispersion", "order3"]);
        let err = proxy.evaluate(&point(0.0, 0.0)).unwrap_err();
        assert!(matches!(err, EvaluationError::Failed { .. }));
    }

    #[test]
    fn closures_are_evaluators() {
        let mut calls = 0;
        let mut eval = |p: &ParameterPoint| {
            calls += 1;
            Ok::<_, EvaluationError>(
                Evaluation::new(p["focus"] * 2.0).with_derivative("focus", 2.0),
            )
        };
        let result = ObjectiveEvaluator::evaluate(&mut eval, &point(3.0, 0.0)).unwrap();
        assert_eq!(result.objective, 6.0);
        assert_eq!(calls, 1);
    }
}
