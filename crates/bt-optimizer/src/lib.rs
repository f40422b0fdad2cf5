//! # bt-optimizer
//!
//! Momentum gradient-descent control of integer-commanded actuators.
//!
//! Provides the per-parameter [`ParameterTrack`], the [`MomentumOptimizer`]
//! state machine, the [`ObjectiveEvaluator`] and [`ActuatorSink`] seams, a
//! fixed-length [`IterationDriver`], and the closed-form proxy objective used
//! for bench runs.

mod driver;
mod evaluator;
mod momentum;
mod sink;
mod track;

pub use driver::{IterationDriver, RunError, RunId, RunState, RunSummary};
pub use evaluator::{ObjectiveEvaluator, SumCoupledProxy};
pub use momentum::{
    BestObjective, IterationResult, MomentumOptimizer, Phase, TrackOutcome, TrackStatus,
};
pub use sink::{ActuatorSink, RecordingSink};
pub use track::{ParameterTrack, Proposal};
