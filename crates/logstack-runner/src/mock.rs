use crate::executor::{AutomationExecutor, JobStatus, PlaybookInvocation};
use crate::RunnerError;
use logstack_schema::{ExecutionMode, JobHandle, JobId};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Executor that records invocations instead of running anything.
///
/// Foreground runs succeed unless their stage was marked with
/// [`fail_stage`](Self::fail_stage). Background runs stay `Running` until
/// [`finish`](Self::finish) is called, except in persistent mode where they
/// complete immediately and their status is written to the artifact
/// directory so a later process can observe it.
#[derive(Default)]
pub struct MockExecutor {
    invocations: Mutex<Vec<PlaybookInvocation>>,
    failures: Mutex<HashMap<String, i32>>,
    jobs: Mutex<HashMap<String, JobStatus>>,
    artifacts_dir: Option<PathBuf>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> RunnerError {
    RunnerError::Artifact {
        path: "<mock>".to_owned(),
        detail: format!("mutex poisoned: {e}"),
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persistent(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: Some(artifacts_dir.into()),
            ..Self::default()
        }
    }

    /// Make every run of `stage` exit with `rc`.
    pub fn fail_stage(&self, stage: &str, rc: i32) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(stage.to_owned(), rc);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    /// Complete a pending background job.
    pub fn finish(&self, job_id: &str, status: JobStatus) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(job_id.to_owned(), status);
        }
    }

    pub fn invocations(&self) -> Vec<PlaybookInvocation> {
        self.invocations
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn stages_run(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .map(|i| i.stage)
            .collect()
    }

    fn outcome(&self, stage: &str) -> Result<JobStatus, RunnerError> {
        let failures = self.failures.lock().map_err(poisoned)?;
        Ok(match failures.get(stage) {
            Some(&rc) => JobStatus::Failed { rc },
            None => JobStatus::Successful,
        })
    }

    fn persist(&self, job_id: &str, status: JobStatus) -> Result<(), RunnerError> {
        let Some(dir) = &self.artifacts_dir else {
            return Ok(());
        };
        let job_dir = dir.join(job_id);
        fs::create_dir_all(&job_dir)?;
        let state = match status {
            JobStatus::Running => "running",
            JobStatus::Successful => "successful",
            JobStatus::Failed { .. } => "failed",
        };
        if let JobStatus::Failed { rc } = status {
            fs::write(job_dir.join("rc"), format!("{rc}\n"))?;
        } else if status.is_finished() {
            fs::write(job_dir.join("rc"), "0\n")?;
        }
        fs::write(job_dir.join("status"), format!("{state}\n"))?;
        Ok(())
    }

    fn read_persisted(&self, job_id: &str) -> Option<JobStatus> {
        let job_dir = self.artifacts_dir.as_ref()?.join(job_id);
        let state = fs::read_to_string(job_dir.join("status")).ok()?;
        Some(match state.trim() {
            "running" => JobStatus::Running,
            "successful" => JobStatus::Successful,
            _ => {
                let rc = fs::read_to_string(job_dir.join("rc"))
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(-1);
                JobStatus::Failed { rc }
            }
        })
    }
}

impl AutomationExecutor for MockExecutor {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn run(&self, invocation: &PlaybookInvocation) -> Result<JobHandle, RunnerError> {
        self.invocations
            .lock()
            .map_err(poisoned)?
            .push(invocation.clone());

        let job_id = uuid::Uuid::new_v4().simple().to_string();
        let outcome = self.outcome(&invocation.stage)?;
        let status = match invocation.mode {
            ExecutionMode::Background if self.artifacts_dir.is_none() => JobStatus::Running,
            _ => outcome,
        };
        self.jobs
            .lock()
            .map_err(poisoned)?
            .insert(job_id.clone(), status);
        self.persist(&job_id, status)?;

        let status_url = match &self.artifacts_dir {
            Some(dir) => format!("file://{}", dir.join(&job_id).join("status").display()),
            None => format!("mock://{job_id}"),
        };
        let handle = JobHandle {
            job_id: JobId::new(job_id),
            stage: invocation.stage.clone(),
            playbook: invocation.playbook.clone(),
            mode: invocation.mode,
            status_url,
        };

        match (invocation.mode, status) {
            (ExecutionMode::Foreground, JobStatus::Failed { rc }) => {
                Err(RunnerError::PlaybookFailed {
                    playbook: invocation.playbook.display().to_string(),
                    rc,
                    detail: format!("mock failure for stage {}", invocation.stage),
                })
            }
            _ => Ok(handle),
        }
    }

    fn status(&self, job: &JobHandle) -> Result<JobStatus, RunnerError> {
        if let Some(status) = self.jobs.lock().map_err(poisoned)?.get(job.job_id.as_str()) {
            return Ok(*status);
        }
        self.read_persisted(&job.job_id)
            .ok_or_else(|| RunnerError::JobNotFound(job.job_id.to_string()))
    }

    fn output_tail(&self, job: &JobHandle, _lines: usize) -> String {
        format!("mock output for stage {}", job.stage)
    }
}
