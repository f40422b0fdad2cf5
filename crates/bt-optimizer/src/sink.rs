//! Actuator sinks: where committed command vectors go.

use bt_types::{CommandVector, CommitError};

/// Durable or remote holder of the currently commanded actuator values.
///
/// The controller calls [`commit`](Self::commit) once per iteration with the
/// full vector and never reads it back mid-iteration.
pub trait ActuatorSink {
    fn commit(&mut self, command: &CommandVector) -> Result<(), CommitError>;

    /// Human-readable sink name.
    fn name(&self) -> &str {
        "sink"
    }
}

impl<S: ActuatorSink + ?Sized> ActuatorSink for Box<S> {
    fn commit(&mut self, command: &CommandVector) -> Result<(), CommitError> {
        (**self).commit(command)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// In-memory sink that keeps every committed vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingSink {
    commits: Vec<CommandVector>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> &[CommandVector] {
        &self.commits
    }

    pub fn last(&self) -> Option<&CommandVector> {
        self.commits.last()
    }
}

impl ActuatorSink for RecordingSink {
    fn commit(&mut self, command: &CommandVector) -> Result<(), CommitError> {
        self.commits.push(command.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
