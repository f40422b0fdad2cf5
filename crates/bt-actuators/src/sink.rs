//! Actuator sink that rewrites the instrument command files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bt_optimizer::ActuatorSink;
use bt_types::{CommandVector, CommitError, DISPERSION, FOCUS};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::format::{read, CommandTarget};

/// Routes each controlled parameter to a slot in a command file.
///
/// A commit reads every affected file and applies all edits in memory. Every
/// new file is then written to a hidden sibling, and only once all of them
/// exist are they renamed over the originals. A failed staging write leaves
/// every command file untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandFileSink {
    routes: BTreeMap<String, CommandTarget>,
}

impl CommandFileSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The beamline layout: focus in slot 0 of the mirror file, second-order
    /// dispersion on the `order2` line of the pulse-shaper file.
    pub fn reference(mirror: impl Into<PathBuf>, dispersion: impl Into<PathBuf>) -> Self {
        Self::new()
            .with_route(FOCUS, CommandTarget::mirror(mirror, 0))
            .with_route(DISPERSION, CommandTarget::dispersion(dispersion, "order2"))
    }

    pub fn with_route(mut self, name: impl Into<String>, target: CommandTarget) -> Self {
        self.routes.insert(name.into(), target);
        self
    }

    pub fn routes(&self) -> &BTreeMap<String, CommandTarget> {
        &self.routes
    }

    /// Current on-disk value of every routed parameter.
    pub fn read_current(&self) -> Result<CommandVector, CommitError> {
        self.routes
            .iter()
            .map(|(name, target)| -> Result<(String, i64), CommitError> {
                Ok((name.clone(), target.read_current()?))
            })
            .collect()
    }
}

impl ActuatorSink for CommandFileSink {
    fn commit(&mut self, command: &CommandVector) -> Result<(), CommitError> {
        if let Some(name) = command.keys().find(|name| !self.routes.contains_key(*name)) {
            return Err(CommitError::NoRoute { name: name.clone() });
        }

        let mut staged: BTreeMap<&Path, String> = BTreeMap::new();
        for (name, target) in &self.routes {
            let value = *command.get(name).ok_or_else(|| CommitError::MissingValue {
                name: name.clone(),
            })?;
            let path = target.path();
            let current = match staged.remove(path) {
                Some(content) => content,
                None => read(path)?,
            };
            staged.insert(path, target.apply(&current, value)?);
        }

        let mut ready: Vec<(&Path, PathBuf)> = Vec::with_capacity(staged.len());
        for (path, content) in &staged {
            match write_staging(path, content) {
                Ok(staging) => ready.push((*path, staging)),
                Err(e) => {
                    discard(&ready);
                    return Err(e);
                }
            }
        }
        for (i, (path, staging)) in ready.iter().enumerate() {
            if let Err(e) = std::fs::rename(staging, path) {
                discard(&ready[i..]);
                return Err(write_error(path, e));
            }
            debug!("Wrote command file {}", path.display());
        }
        info!("Committed {:?} to {} command files", command, staged.len());
        Ok(())
    }

    fn name(&self) -> &str {
        "command-files"
    }
}

fn write_error(path: &Path, e: std::io::Error) -> CommitError {
    CommitError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp"))
}

/// Write `content` to the hidden sibling of `path` and return its location.
fn write_staging(path: &Path, content: &str) -> Result<PathBuf, CommitError> {
    let staging = staging_path(path);
    std::fs::write(&staging, content).map_err(|e| write_error(path, e))?;
    Ok(staging)
}

fn discard(ready: &[(&Path, PathBuf)]) {
    for (_, staging) in ready {
        if let Err(e) = std::fs::remove_file(staging) {
            warn!("Could not remove staging file {}: {}", staging.display(), e);
        }
    }
}
