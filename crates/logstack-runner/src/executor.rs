use crate::vars::VariableBundle;
use crate::RunnerError;
use logstack_schema::{ExecutionMode, ExecutorConfig, JobHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One playbook run against one host.
#[derive(Debug, Clone)]
pub struct PlaybookInvocation {
    pub stage: String,
    pub playbook: PathBuf,
    pub inventory: PathBuf,
    /// Passed as `--limit`.
    pub target_host: String,
    pub remote_user: String,
    pub vars: VariableBundle,
    pub mode: ExecutionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Successful,
    Failed { rc: i32 },
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => f.write_str("running"),
            JobStatus::Successful => f.write_str("successful"),
            JobStatus::Failed { rc } => write!(f, "failed (rc={rc})"),
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub trait AutomationExecutor: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Start a playbook run.
    ///
    /// In foreground mode this returns once the run has finished, and a
    /// non-zero exit is reported as [`RunnerError::PlaybookFailed`]. In
    /// background mode it returns as soon as the run has started.
    fn run(&self, invocation: &PlaybookInvocation) -> Result<JobHandle, RunnerError>;

    fn status(&self, job: &JobHandle) -> Result<JobStatus, RunnerError>;

    /// Output captured so far, for error reports.
    fn output_tail(&self, _job: &JobHandle, _lines: usize) -> String {
        String::new()
    }

    /// Block until `job` has finished.
    fn wait(&self, job: &JobHandle) -> Result<JobStatus, RunnerError> {
        loop {
            let status = self.status(job)?;
            if status.is_finished() {
                return Ok(status);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

pub fn select_executor(
    config: &ExecutorConfig,
    artifacts_dir: &Path,
) -> Result<Box<dyn AutomationExecutor>, RunnerError> {
    use logstack_schema::ExecutorBackend;
    match config.backend {
        ExecutorBackend::Ansible => {
            let mut executor = crate::ansible::AnsibleExecutor::new(artifacts_dir);
            if let Some(secs) = config.connect_timeout_secs {
                executor = executor.with_connect_timeout(secs);
            }
            Ok(Box::new(executor))
        }
        ExecutorBackend::Mock => Ok(Box::new(crate::mock::MockExecutor::persistent(
            artifacts_dir,
        ))),
    }
}
