//! `ansible-playbook` process executor.
//!
//! Every run gets an artifact directory `<artifacts>/<job_id>/` holding
//! `invocation.json` (redacted), `stdout`, `status` and, once finished, `rc`.
//! The playbook is wrapped in a small `sh` script that records the outcome
//! itself, so a background run keeps reporting after the launching process
//! has exited.

use crate::executor::{AutomationExecutor, JobStatus, PlaybookInvocation};
use crate::RunnerError;
use logstack_schema::{ExecutionMode, JobHandle, JobId};
use serde_json::json;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

const JOB_SCRIPT: &str = r#""$@" >"$LOGSTACK_JOB_DIR/stdout" 2>&1
rc=$?
rm -f "$LOGSTACK_VARS_FILE"
if [ "$rc" -eq 0 ]; then state=successful; else state=failed; fi
printf '%s\n' "$rc" >"$LOGSTACK_JOB_DIR/rc.tmp" && mv "$LOGSTACK_JOB_DIR/rc.tmp" "$LOGSTACK_JOB_DIR/rc"
printf '%s\n' "$state" >"$LOGSTACK_JOB_DIR/status.tmp" && mv "$LOGSTACK_JOB_DIR/status.tmp" "$LOGSTACK_JOB_DIR/status"
exit "$rc"
"#;

pub struct AnsibleExecutor {
    artifacts_dir: PathBuf,
    program: OsString,
    program_args: Vec<OsString>,
    connect_timeout: Option<u64>,
}

impl AnsibleExecutor {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            program: OsString::from("ansible-playbook"),
            program_args: Vec::new(),
            connect_timeout: None,
        }
    }

    /// Run `program args...` in place of `ansible-playbook`.
    #[must_use]
    pub fn with_program<I, S>(mut self, program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.program = program.into();
        self.program_args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout = Some(secs);
        self
    }

    fn job_dir(&self, job_id: &str) -> PathBuf {
        self.artifacts_dir.join(job_id)
    }

    /// Arguments after the program name. Variables travel only through the
    /// extra-vars file.
    pub fn playbook_args(&self, invocation: &PlaybookInvocation, vars_file: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            invocation.playbook.clone().into(),
            "-i".into(),
            invocation.inventory.clone().into(),
            "--limit".into(),
            invocation.target_host.clone().into(),
            format!("--user={}", invocation.remote_user).into(),
        ];
        if let Some(secs) = self.connect_timeout {
            args.push(format!("--timeout={secs}").into());
        }
        let mut vars_arg = OsString::from("--extra-vars=@");
        vars_arg.push(vars_file);
        args.push(vars_arg);
        args
    }

    fn write_invocation(
        job_dir: &Path,
        job_id: &str,
        invocation: &PlaybookInvocation,
    ) -> Result<(), RunnerError> {
        let record = json!({
            "job_id": job_id,
            "stage": invocation.stage,
            "playbook": invocation.playbook,
            "inventory": invocation.inventory,
            "target_host": invocation.target_host,
            "remote_user": invocation.remote_user,
            "mode": invocation.mode,
            "schema_version": invocation.vars.schema_version(),
            "vars": invocation.vars.redacted(),
        });
        fs::write(
            job_dir.join("invocation.json"),
            serde_json::to_string_pretty(&record)?,
        )?;
        Ok(())
    }

    /// Write the plaintext variables to a 0600 file the job script removes.
    fn write_vars_file(job_dir: &Path, invocation: &PlaybookInvocation) -> Result<PathBuf, RunnerError> {
        let mut tmp = tempfile::Builder::new()
            .prefix("extra-vars-")
            .suffix(".json")
            .tempfile_in(job_dir)?;
        let content = serde_json::to_vec(&invocation.vars.to_extra_vars())?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.into_temp_path()
            .keep()
            .map_err(|e| RunnerError::Io(e.error))
    }

    fn read_artifact(path: &Path) -> Result<String, RunnerError> {
        fs::read_to_string(path)
            .map(|s| s.trim().to_owned())
            .map_err(|e| RunnerError::Artifact {
                path: path.display().to_string(),
                detail: e.to_string(),
            })
    }
}

impl AutomationExecutor for AnsibleExecutor {
    fn name(&self) -> &str {
        "ansible"
    }

    fn available(&self) -> bool {
        Command::new(&self.program)
            .args(&self.program_args)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn run(&self, invocation: &PlaybookInvocation) -> Result<JobHandle, RunnerError> {
        let job_id = uuid::Uuid::new_v4().simple().to_string();
        let job_dir = self.job_dir(&job_id);
        fs::create_dir_all(&job_dir)?;
        fs::write(job_dir.join("status"), "running\n")?;
        Self::write_invocation(&job_dir, &job_id, invocation)?;
        let vars_file = Self::write_vars_file(&job_dir, invocation)?;

        let playbook = invocation.playbook.display().to_string();
        info!(
            "running {} (stage {}) against {} [{}]",
            playbook, invocation.stage, invocation.target_host, invocation.mode
        );
        debug!("job {job_id} vars: {:?}", invocation.vars);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(JOB_SCRIPT)
            .arg("logstack-job")
            .arg(&self.program)
            .args(&self.program_args)
            .args(self.playbook_args(invocation, &vars_file))
            .env("LOGSTACK_JOB_DIR", &job_dir)
            .env("LOGSTACK_VARS_FILE", &vars_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = fs::remove_file(&vars_file);
                let _ = fs::write(job_dir.join("rc"), "127\n");
                let _ = fs::write(job_dir.join("status"), "failed\n");
                return Err(RunnerError::SpawnFailed {
                    playbook,
                    detail: e.to_string(),
                });
            }
        };

        let status_path = job_dir.join("status");
        let handle = JobHandle {
            job_id: JobId::new(job_id),
            stage: invocation.stage.clone(),
            playbook: invocation.playbook.clone(),
            mode: invocation.mode,
            status_url: format!("file://{}", status_path.display()),
        };

        match invocation.mode {
            ExecutionMode::Foreground => {
                let exit = child.wait()?;
                let status = match self.status(&handle)? {
                    JobStatus::Running => {
                        // The wrapper itself was killed before recording anything.
                        let rc = exit.code().unwrap_or(-1);
                        warn!("job {} ended without recording a status", handle.job_id);
                        let _ = fs::remove_file(&vars_file);
                        JobStatus::Failed { rc }
                    }
                    finished => finished,
                };
                match status {
                    JobStatus::Failed { rc } => Err(RunnerError::PlaybookFailed {
                        playbook,
                        rc,
                        detail: self.output_tail(&handle, 20),
                    }),
                    _ => Ok(handle),
                }
            }
            ExecutionMode::Background => {
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
                Ok(handle)
            }
        }
    }

    fn status(&self, job: &JobHandle) -> Result<JobStatus, RunnerError> {
        let job_dir = self.job_dir(&job.job_id);
        if !job_dir.is_dir() {
            return Err(RunnerError::JobNotFound(job.job_id.to_string()));
        }
        match Self::read_artifact(&job_dir.join("status"))?.as_str() {
            "running" => Ok(JobStatus::Running),
            "successful" => Ok(JobStatus::Successful),
            _ => {
                let rc = Self::read_artifact(&job_dir.join("rc"))
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(-1);
                Ok(JobStatus::Failed { rc })
            }
        }
    }

    fn output_tail(&self, job: &JobHandle, lines: usize) -> String {
        let Ok(out) = fs::read_to_string(self.job_dir(&job.job_id).join("stdout")) else {
            return String::new();
        };
        let all: Vec<&str> = out.lines().collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::VariableBundle;
    use logstack_schema::Secret;

    /// Stand-in for ansible-playbook: echoes its arguments, dumps the
    /// extra-vars file, then exits with `rc`.
    fn fake_playbook(dir: &Path, rc: i32, delay: &str) -> PathBuf {
        let script = dir.join(format!("fake-{rc}.sh"));
        fs::write(
            &script,
            format!(
                "echo \"args: $*\"\nfor a in \"$@\"; do case \"$a\" in --extra-vars=@*) cat \"${{a#--extra-vars=@}}\";; esac; done\nsleep {delay}\nexit {rc}\n"
            ),
        )
        .unwrap();
        script
    }

    fn invocation(mode: ExecutionMode) -> PlaybookInvocation {
        let mut vars = VariableBundle::new(1);
        vars.insert_text("S3_REGION", "eu-1");
        vars.insert_secret("SECRET_KEY", Secret::new("hunter2"));
        PlaybookInvocation {
            stage: "bootstrap".into(),
            playbook: PathBuf::from("playbooks/bootstrap.yml"),
            inventory: PathBuf::from("inventory.ini"),
            target_host: "10.0.0.2".into(),
            remote_user: "root".into(),
            vars,
            mode,
        }
    }

    #[test]
    fn args_carry_limit_user_and_vars_file() {
        let exec = AnsibleExecutor::new("/tmp/jobs").with_connect_timeout(15);
        let args = exec.playbook_args(
            &invocation(ExecutionMode::Foreground),
            Path::new("/tmp/jobs/x/vars.json"),
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "playbooks/bootstrap.yml");
        assert!(args.windows(2).any(|w| w == ["--limit", "10.0.0.2"]));
        assert!(args.contains(&"--user=root".to_owned()));
        assert!(args.contains(&"--timeout=15".to_owned()));
        assert!(args.contains(&"--extra-vars=@/tmp/jobs/x/vars.json".to_owned()));
        assert!(!args.iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn foreground_success_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_playbook(dir.path(), 0, "0");
        let jobs = dir.path().join("jobs");
        let exec = AnsibleExecutor::new(&jobs).with_program("sh", [&script]);

        let handle = exec.run(&invocation(ExecutionMode::Foreground)).unwrap();
        assert_eq!(exec.status(&handle).unwrap(), JobStatus::Successful);
        assert!(handle.status_url.starts_with("file://"));
        assert!(handle.status_url.ends_with("/status"));

        let job_dir = jobs.join(handle.job_id.as_str());
        let stdout = fs::read_to_string(job_dir.join("stdout")).unwrap();
        assert!(stdout.contains("--limit 10.0.0.2"));
        assert!(stdout.contains("\"SECRET_KEY\":\"hunter2\""));
        assert_eq!(fs::read_to_string(job_dir.join("rc")).unwrap().trim(), "0");

        let invocation = fs::read_to_string(job_dir.join("invocation.json")).unwrap();
        assert!(!invocation.contains("hunter2"));
        let leftovers: Vec<_> = fs::read_dir(&job_dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("extra-vars-"))
            .collect();
        assert!(leftovers.is_empty(), "vars file must be removed after the run");
    }

    #[test]
    fn foreground_failure_reports_rc_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_playbook(dir.path(), 2, "0");
        let exec = AnsibleExecutor::new(dir.path().join("jobs")).with_program("sh", [&script]);

        let err = exec.run(&invocation(ExecutionMode::Foreground)).unwrap_err();
        match err {
            RunnerError::PlaybookFailed { rc, detail, .. } => {
                assert_eq!(rc, 2);
                assert!(detail.contains("args:"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn background_run_returns_before_completion() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_playbook(dir.path(), 4, "0.3");
        let exec = AnsibleExecutor::new(dir.path().join("jobs")).with_program("sh", [&script]);

        let handle = exec.run(&invocation(ExecutionMode::Background)).unwrap();
        assert_eq!(handle.mode, ExecutionMode::Background);
        assert_eq!(exec.wait(&handle).unwrap(), JobStatus::Failed { rc: 4 });
    }

    #[test]
    fn missing_program_fails_to_report_success() {
        let dir = tempfile::tempdir().unwrap();
        let exec = AnsibleExecutor::new(dir.path().join("jobs"))
            .with_program("/nonexistent/ansible-playbook", Vec::<String>::new());
        assert!(!exec.available());
        let err = exec.run(&invocation(ExecutionMode::Foreground)).unwrap_err();
        assert!(matches!(err, RunnerError::PlaybookFailed { rc: 127, .. }));
    }

    #[test]
    fn unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let exec = AnsibleExecutor::new(dir.path());
        let handle = JobHandle {
            job_id: JobId::new("missing"),
            stage: "bootstrap".into(),
            playbook: PathBuf::from("x.yml"),
            mode: ExecutionMode::Background,
            status_url: String::new(),
        };
        assert!(matches!(
            exec.status(&handle),
            Err(RunnerError::JobNotFound(_))
        ));
    }
}
