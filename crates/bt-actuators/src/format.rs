//! Text formats read by the instrument controllers.
//!
//! The deformable mirror reads a single line of whitespace-separated integer
//! actuator commands. The pulse shaper reads `key = value` lines, one per
//! dispersion order (`order2 = 36100`).

use std::path::{Path, PathBuf};

use bt_types::CommitError;
use serde::{Deserialize, Serialize};

/// Where a single parameter lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandTarget {
    /// Slot `index` of a whitespace-separated mirror command file.
    MirrorSlot { path: PathBuf, index: usize },
    /// The `key = value` line of a dispersion command file.
    DispersionKey { path: PathBuf, key: String },
}

impl CommandTarget {
    pub fn mirror(path: impl Into<PathBuf>, index: usize) -> Self {
        Self::MirrorSlot {
            path: path.into(),
            index,
        }
    }

    pub fn dispersion(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self::DispersionKey {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::MirrorSlot { path, .. } | Self::DispersionKey { path, .. } => path,
        }
    }

    /// Value currently stored in the file.
    pub fn read_current(&self) -> Result<i64, CommitError> {
        let content = read(self.path())?;
        self.extract(&content)
    }

    /// Value of this target inside `content`.
    pub fn extract(&self, content: &str) -> Result<i64, CommitError> {
        match self {
            Self::MirrorSlot { path, index } => {
                let slots = parse_mirror(path, content)?;
                slots.get(*index).copied().ok_or_else(|| CommitError::Malformed {
                    path: path.display().to_string(),
                    message: format!("no slot {index}, file has {}", slots.len()),
                })
            }
            Self::DispersionKey { path, key } => {
                for line in content.lines() {
                    if let Some((k, v)) = split_entry(line) {
                        if k == key {
                            return v.parse().map_err(|_| CommitError::Malformed {
                                path: path.display().to_string(),
                                message: format!("{key} is not an integer: {v}"),
                            });
                        }
                    }
                }
                Err(CommitError::Malformed {
                    path: path.display().to_string(),
                    message: format!("no {key} entry"),
                })
            }
        }
    }

    /// `content` with this target set to `value`; everything else preserved.
    pub fn apply(&self, content: &str, value: i64) -> Result<String, CommitError> {
        match self {
            Self::MirrorSlot { path, index } => {
                let mut slots = parse_mirror(path, content)?;
                let slot = slots.get_mut(*index).ok_or_else(|| CommitError::Malformed {
                    path: path.display().to_string(),
                    message: format!("no slot {index}"),
                })?;
                *slot = value;
                Ok(slots
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" "))
            }
            Self::DispersionKey { path, key } => {
                let mut found = false;
                let mut out = String::with_capacity(content.len());
                for line in content.lines() {
                    match split_entry(line) {
                        Some((k, _)) if k == key => {
                            out.push_str(&format!("{key} = {value}"));
                            found = true;
                        }
                        _ => out.push_str(line),
                    }
                    out.push('\n');
                }
                if !found {
                    return Err(CommitError::Malformed {
                        path: path.display().to_string(),
                        message: format!("no {key} entry"),
                    });
                }
                Ok(out)
            }
        }
    }
}

fn parse_mirror(path: &Path, content: &str) -> Result<Vec<i64>, CommitError> {
    content
        .split_whitespace()
        .map(|token| {
            token.parse::<i64>().map_err(|_| CommitError::Malformed {
                path: path.display().to_string(),
                message: format!("not an integer command: {token}"),
            })
        })
        .collect()
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

pub(crate) fn read(path: &Path) -> Result<String, CommitError> {
    std::fs::read_to_string(path).map_err(|e| CommitError::Malformed {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
