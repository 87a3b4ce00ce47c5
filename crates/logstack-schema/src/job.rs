use crate::types::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Block until the playbook run finishes.
    Foreground,
    /// Return a handle as soon as the run has started.
    Background,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Foreground => f.write_str("foreground"),
            ExecutionMode::Background => f.write_str("background"),
        }
    }
}

/// Reference to one automation run, persisted with the resource while the
/// run is still pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub stage: String,
    pub playbook: PathBuf,
    pub mode: ExecutionMode,
    /// Dereferenceable location of the run status.
    pub status_url: String,
}
