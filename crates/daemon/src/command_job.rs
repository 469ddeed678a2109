// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job that runs a shell command for the duration of a leadership term

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tenure_engine::{Job, JobResult, JobScope};
use tokio::process::{Child, Command};

/// Environment variable carrying the fencing token of the current term
pub const FENCING_TOKEN_ENV: &str = "TENURE_FENCING_TOKEN";

/// Environment variable carrying the job name
pub const JOB_NAME_ENV: &str = "TENURE_JOB";

/// How long the command's process group gets between SIGTERM and SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Runs `sh -c <command>` in its own process group; cancellation signals
/// the whole group, so background children go down with the shell
pub struct CommandJob {
    name: String,
    command: String,
    cwd: Option<PathBuf>,
}

impl CommandJob {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl Job for CommandJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, scope: JobScope) -> JobResult {
        let token = scope.fencing_token();
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .env(FENCING_TOKEN_ENV, token.to_string())
            .env(JOB_NAME_ENV, &self.name)
            .stdin(Stdio::null())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(job = %self.name, error = %e, "failed to spawn command");
                return JobResult::Failed(format!("spawn failed: {}", e));
            }
        };
        tracing::info!(
            job = %self.name,
            token = token.value(),
            pid = child.id(),
            "command started"
        );

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => JobResult::Success,
                Ok(status) => JobResult::Failed(format!("command exited with {}", status)),
                Err(e) => JobResult::Failed(format!("wait failed: {}", e)),
            },
            _ = scope.cancelled() => {
                self.terminate(&mut child).await;
                JobResult::Cancelled
            }
        }
    }
}

impl CommandJob {
    /// SIGTERM the command's group, then SIGKILL whatever is left after
    /// the grace period
    async fn terminate(&self, child: &mut Child) {
        let Some(pid) = child.id() else {
            return;
        };
        let group = Pid::from_raw(pid as i32);

        if let Err(e) = killpg(group, Signal::SIGTERM) {
            tracing::warn!(job = %self.name, error = %e, "failed to signal command group");
        }
        let drained = tokio::time::timeout(KILL_GRACE, async {
            let _ = child.wait().await;
            // signal 0 checks for members; it fails once the group is empty
            while killpg(group, None::<Signal>).is_ok() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(job = %self.name, pgid = pid, "command group outlived SIGTERM, killing");
            if let Err(e) = killpg(group, Signal::SIGKILL) {
                tracing::warn!(job = %self.name, error = %e, "failed to kill command group");
            }
            let _ = child.wait().await;
        }
    }
}

#[cfg(test)]
#[path = "command_job_tests.rs"]
mod tests;
