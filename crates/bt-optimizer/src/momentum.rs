//! Momentum gradient-descent controller.
//!
//! [`MomentumOptimizer::step`] runs one full iteration: pick the point to
//! measure, call the evaluator once, update every [`ParameterTrack`], then
//! hand the resulting command vector to the actuator sink in one call.
//!
//! The first two iterations are fixed bootstrap moves (the initial values,
//! then a unit probe above them); from the third iteration on each track takes
//! a momentum step of
//!
//! ```text
//! raw_delta = momentum * (history[-1] - history[-2]) - learning_rate * derivative
//! ```
//!
//! which is skipped when `|raw_delta| <= convergence_tolerance`.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use bt_types::{
    BtResult, CommandVector, CommitError, ConfigError, ControllerConfig, Evaluation,
    EvaluationError, ParameterPoint, TrackError,
};

use crate::evaluator::ObjectiveEvaluator;
use crate::sink::ActuatorSink;
use crate::track::{ParameterTrack, Proposal};

/// Where the controller is in its bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Nothing committed yet; the next step commits the initial values.
    Bootstrap0,
    /// Initial values committed; the next step commits the unit probe.
    Bootstrap1,
    /// Two or more values committed; momentum updates are active.
    Steady,
}

/// What happened to one track during an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrackStatus {
    Bootstrapped,
    Probed,
    Updated {
        previous: i64,
        raw_delta: f64,
        clipped: bool,
    },
    /// The proposed change was within tolerance; the value was held.
    Gated { raw_delta: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackOutcome {
    pub name: String,
    /// Derivative sample recorded this iteration.
    pub derivative: f64,
    /// Committed value after the iteration (unchanged when gated).
    pub value: i64,
    pub status: TrackStatus,
}

impl TrackOutcome {
    pub fn is_gated(&self) -> bool {
        matches!(self.status, TrackStatus::Gated { .. })
    }
}

/// Everything one call to [`MomentumOptimizer::step`] produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    /// 1-based iteration number.
    pub iteration: usize,
    /// Phase the iteration ran in.
    pub phase: Phase,
    pub objective: f64,
    pub tracks: Vec<TrackOutcome>,
    /// Sum of every track's derivative this iteration. Diagnostic only: each
    /// track is driven by its own derivative.
    pub total_gradient: f64,
    /// Vector handed to the actuator sink.
    pub command: CommandVector,
}

impl IterationResult {
    pub fn outcome(&self, name: &str) -> Option<&TrackOutcome> {
        self.tracks.iter().find(|t| t.name == name)
    }

    pub fn gated(&self) -> impl Iterator<Item = &TrackOutcome> {
        self.tracks.iter().filter(|t| t.is_gated())
    }
}

/// Lowest objective seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestObjective {
    pub iteration: usize,
    pub objective: f64,
    pub command: CommandVector,
}

/// Owns the tracks and runs the iteration state machine.
#[derive(Debug)]
pub struct MomentumOptimizer {
    tracks: Vec<ParameterTrack>,
    momentum: f64,
    convergence_tolerance: f64,
    phase: Phase,
    iteration_count: usize,
    objective_history: Vec<f64>,
    best: Option<BestObjective>,
    pending_commit: Option<CommandVector>,
    observer: Option<Sender<IterationResult>>,
}

impl MomentumOptimizer {
    pub fn new(config: &ControllerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "Creating momentum optimizer '{}' with {} tracks",
            config.name,
            config.tracks.len()
        );

        Ok(Self {
            tracks: config.tracks.iter().map(ParameterTrack::new).collect(),
            momentum: config.momentum,
            convergence_tolerance: config.convergence_tolerance,
            phase: Phase::Bootstrap0,
            iteration_count: 0,
            objective_history: Vec::new(),
            best: None,
            pending_commit: None,
            observer: None,
        })
    }

    /// Publish every iteration result on `tx` (plotting, recording).
    pub fn with_observer(mut self, tx: Sender<IterationResult>) -> Self {
        self.observer = Some(tx);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn convergence_tolerance(&self) -> f64 {
        self.convergence_tolerance
    }

    pub fn objective_history(&self) -> &[f64] {
        &self.objective_history
    }

    pub fn tracks(&self) -> &[ParameterTrack] {
        &self.tracks
    }

    pub fn track(&self, name: &str) -> Option<&ParameterTrack> {
        self.tracks.iter().find(|t| t.name() == name)
    }

    pub fn best_objective(&self) -> Option<&BestObjective> {
        self.best.as_ref()
    }

    /// Command vector whose commit failed and has not been retried yet.
    pub fn pending_commit(&self) -> Option<&CommandVector> {
        self.pending_commit.as_ref()
    }

    /// Last committed value of every bootstrapped track.
    pub fn current_command(&self) -> CommandVector {
        self.tracks
            .iter()
            .filter_map(|t| t.current_value().map(|v| (t.name().to_string(), v)))
            .collect()
    }

    /// Run one iteration.
    ///
    /// Evaluation failures leave the controller untouched. A commit failure
    /// is reported after the histories were updated; the vector is kept for
    /// [`retry_commit`](Self::retry_commit).
    pub fn step<E, S>(&mut self, evaluator: &mut E, sink: &mut S) -> BtResult<IterationResult>
    where
        E: ObjectiveEvaluator + ?Sized,
        S: ActuatorSink + ?Sized,
    {
        let phase = self.phase;
        let point = self.next_point()?;
        debug!(?phase, ?point, "Evaluating objective");

        let evaluation = evaluator.evaluate(&point)?;
        let derivatives = self.checked_derivatives(&evaluation)?;

        let mut outcomes = Vec::with_capacity(self.tracks.len());
        for (track, &derivative) in self.tracks.iter_mut().zip(&derivatives) {
            let status = match phase {
                Phase::Bootstrap0 => {
                    let initial = track.initial_value();
                    track.bootstrap(initial)?;
                    track.record_derivative(derivative);
                    TrackStatus::Bootstrapped
                }
                Phase::Bootstrap1 => {
                    track.probe()?;
                    track.record_derivative(derivative);
                    TrackStatus::Probed
                }
                Phase::Steady => {
                    track.record_derivative(derivative);
                    match track.propose_update(self.momentum, self.convergence_tolerance)? {
                        Proposal::Applied {
                            previous,
                            raw_delta,
                            clipped,
                            ..
                        } => TrackStatus::Updated {
                            previous,
                            raw_delta,
                            clipped,
                        },
                        Proposal::Gated { raw_delta } => {
                            debug!(track = track.name(), raw_delta, "Update gated");
                            TrackStatus::Gated { raw_delta }
                        }
                    }
                }
            };

            let value = track
                .current_value()
                .ok_or_else(|| TrackError::NotBootstrapped {
                    name: track.name().to_string(),
                    len: 0,
                })?;
            outcomes.push(TrackOutcome {
                name: track.name().to_string(),
                derivative,
                value,
                status,
            });
        }

        self.phase = match phase {
            Phase::Bootstrap0 => Phase::Bootstrap1,
            Phase::Bootstrap1 | Phase::Steady => Phase::Steady,
        };
        self.iteration_count += 1;
        self.objective_history.push(evaluation.objective);

        let command = self.current_command();
        let improved = self
            .best
            .as_ref()
            .map_or(true, |best| evaluation.objective < best.objective);
        if improved {
            self.best = Some(BestObjective {
                iteration: self.iteration_count,
                objective: evaluation.objective,
                command: command.clone(),
            });
        }

        let result = IterationResult {
            iteration: self.iteration_count,
            phase,
            objective: evaluation.objective,
            tracks: outcomes,
            total_gradient: evaluation.total_gradient(),
            command,
        };
        info!(
            iteration = result.iteration,
            objective = result.objective,
            command = ?result.command,
            "Iteration complete"
        );
        self.notify(&result);

        if let Err(err) = sink.commit(&result.command) {
            warn!("Commit to {} failed: {}", sink.name(), err);
            self.pending_commit = Some(result.command.clone());
            return Err(err.into());
        }
        self.pending_commit = None;

        Ok(result)
    }

    /// Resend the vector whose commit failed, without recomputing anything.
    /// A no-op when nothing is pending.
    pub fn retry_commit<S>(&mut self, sink: &mut S) -> Result<(), CommitError>
    where
        S: ActuatorSink + ?Sized,
    {
        if let Some(command) = &self.pending_commit {
            sink.commit(command)?;
            info!("Pending command committed to {}", sink.name());
            self.pending_commit = None;
        }
        Ok(())
    }

    /// The point the next step will evaluate, computed without mutation.
    fn next_point(&self) -> Result<ParameterPoint, TrackError> {
        self.tracks
            .iter()
            .map(|track| -> Result<(String, f64), TrackError> {
                let value = match self.phase {
                    Phase::Bootstrap0 => track.initial_value(),
                    Phase::Bootstrap1 => track.probe_value()?,
                    Phase::Steady => {
                        track
                            .current_value()
                            .ok_or_else(|| TrackError::NotBootstrapped {
                                name: track.name().to_string(),
                                len: 0,
                            })?
                    }
                };
                Ok((track.name().to_string(), value as f64))
            })
            .collect()
    }

    /// One finite derivative per track, in track order.
    fn checked_derivatives(&self, evaluation: &Evaluation) -> Result<Vec<f64>, EvaluationError> {
        if !evaluation.objective.is_finite() {
            return Err(EvaluationError::NonFiniteObjective {
                value: evaluation.objective,
            });
        }
        if let Some(name) = evaluation
            .derivatives
            .keys()
            .find(|name| self.track(name).is_none())
        {
            return Err(EvaluationError::UnknownParameter { name: name.clone() });
        }

        self.tracks
            .iter()
            .map(|track| -> Result<f64, EvaluationError> {
                let value = *evaluation.derivatives.get(track.name()).ok_or_else(|| {
                    EvaluationError::MissingDerivative {
                        name: track.name().to_string(),
                    }
                })?;
                if !value.is_finite() {
                    return Err(EvaluationError::NonFiniteDerivative {
                        name: track.name().to_string(),
                        value,
                    });
                }
                Ok(value)
            })
            .collect()
    }

    fn notify(&self, result: &IterationResult) {
        if let Some(tx) = &self.observer {
            // Best-effort; a dropped receiver only loses the plot feed.
            if tx.try_send(result.clone()).is_err() {
                debug!("Iteration observer disconnected");
            }
        }
    }
}
