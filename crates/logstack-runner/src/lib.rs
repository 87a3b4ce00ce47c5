//! Automation execution for logstack.
//!
//! This crate implements the execution layer: the pluggable
//! `AutomationExecutor` trait, `VariableBundle` (the flat variable set handed
//! to a playbook, with secrets redacted in every printed form), the
//! `ansible-playbook` process executor with on-disk job artifacts, a mock
//! executor for tests and dry runs, and prerequisite checking.

pub mod ansible;
pub mod executor;
pub mod mock;
pub mod prereq;
pub mod vars;

pub use ansible::AnsibleExecutor;
pub use executor::{select_executor, AutomationExecutor, JobStatus, PlaybookInvocation};
pub use mock::MockExecutor;
pub use prereq::{check_ansible_prereqs, format_missing, MissingPrereq};
pub use vars::{BundleValue, VariableBundle, MASK};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("runner I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("executor '{0}' is not available on this system")]
    ExecutorUnavailable(String),
    #[error("playbook {playbook} failed with exit code {rc}: {detail}")]
    PlaybookFailed {
        playbook: String,
        rc: i32,
        detail: String,
    },
    #[error("failed to start playbook {playbook}: {detail}")]
    SpawnFailed { playbook: String, detail: String },
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("unreadable job artifact {path}: {detail}")]
    Artifact { path: String, detail: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
