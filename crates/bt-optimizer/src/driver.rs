//! Fixed-length run loop and its summary record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use bt_types::{BtError, CommandVector, ControllerConfig};

use crate::evaluator::ObjectiveEvaluator;
use crate::momentum::{BestObjective, IterationResult, MomentumOptimizer};
use crate::sink::ActuatorSink;

/// Unique run identifier.
pub type RunId = Uuid;

/// Lifecycle state for a controller run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate record of a controller run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub name: String,
    pub state: RunState,
    pub iteration_limit: usize,
    pub iterations_completed: usize,
    /// Number of gated (held) updates per track.
    pub gated_updates: BTreeMap<String, usize>,
    pub best: Option<BestObjective>,
    pub final_command: CommandVector,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn new(name: impl Into<String>, iteration_limit: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: RunState::Pending,
            iteration_limit,
            iterations_completed: 0,
            gated_updates: BTreeMap::new(),
            best: None,
            final_command: CommandVector::new(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Fold one iteration into the running totals.
    pub fn record(&mut self, result: &IterationResult) {
        self.iterations_completed = result.iteration;
        for outcome in &result.tracks {
            let held = self.gated_updates.entry(outcome.name.clone()).or_insert(0);
            if outcome.is_gated() {
                *held += 1;
            }
        }
        self.final_command = result.command.clone();
    }
}

/// A run that stopped early. Carries the failed summary alongside the cause.
#[derive(Debug, Error)]
#[error("run '{}' failed after {} iterations: {source}", .summary.name, .summary.iterations_completed)]
pub struct RunError {
    pub summary: Box<RunSummary>,
    pub source: BtError,
}

/// Calls [`MomentumOptimizer::step`] until the iteration limit is reached.
///
/// The first error ends the run; retrying belongs to whoever owns the
/// instrument, not to the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationDriver {
    name: String,
    iteration_limit: usize,
}

impl IterationDriver {
    pub fn new(name: impl Into<String>, iteration_limit: usize) -> Self {
        Self {
            name: name.into(),
            iteration_limit,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.name.clone(), config.iteration_limit)
    }

    pub fn iteration_limit(&self) -> usize {
        self.iteration_limit
    }

    /// Run until `iteration_limit` steps completed in total.
    ///
    /// Iterations already taken on `optimizer` count toward the limit, so a
    /// failed run can be resumed by calling `run` again.
    pub fn run<E, S>(
        &self,
        optimizer: &mut MomentumOptimizer,
        evaluator: &mut E,
        sink: &mut S,
    ) -> Result<RunSummary, RunError>
    where
        E: ObjectiveEvaluator + ?Sized,
        S: ActuatorSink + ?Sized,
    {
        let mut summary = RunSummary::new(self.name.clone(), self.iteration_limit);
        summary.mark_running();
        info!(
            "Starting run '{}' ({} iterations, evaluator {}, sink {})",
            self.name,
            self.iteration_limit,
            evaluator.name(),
            sink.name()
        );

        while optimizer.iteration_count() < self.iteration_limit {
            match optimizer.step(evaluator, sink) {
                Ok(result) => summary.record(&result),
                Err(e) => {
                    error!(
                        "Run '{}' failed after {} iterations: {}",
                        self.name,
                        optimizer.iteration_count(),
                        e
                    );
                    summary.iterations_completed = optimizer.iteration_count();
                    summary.best = optimizer.best_objective().cloned();
                    summary.final_command = optimizer.current_command();
                    summary.mark_failed(e.to_string());
                    return Err(RunError {
                        summary: Box::new(summary),
                        source: e,
                    });
                }
            }
        }

        summary.iterations_completed = optimizer.iteration_count();
        summary.best = optimizer.best_objective().cloned();
        summary.final_command = optimizer.current_command();
        summary.mark_completed();

        if let Some(best) = &summary.best {
            info!(
                "Run '{}' completed: best objective {} at iteration {}",
                self.name, best.objective, best.iteration
            );
        }
        Ok(summary)
    }
}
