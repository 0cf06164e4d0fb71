//! Launches one CLI process and supervises it to a single terminal outcome.
//!
//! State machine: not-started → running → succeeded | failed | timed-out,
//! or not-started → launch-error. The PID is reported the moment the process
//! exists, before any waiting happens.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::claudecode::RunInvocation;
use super::outcome::{RunOutcome, EXIT_LAUNCH_FAILED, EXIT_NOT_FOUND};

/// How long pipe readers may keep going after the process is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    kill_grace: Duration,
    drain_timeout: Duration,
}

impl ProcessSupervisor {
    pub fn new(kill_grace: Duration) -> Self {
        Self {
            kill_grace,
            drain_timeout: DRAIN_TIMEOUT,
        }
    }

    /// Run `invocation` to completion.
    ///
    /// `on_started` is called exactly once with the PID if, and only if, the
    /// process was created. The returned outcome is always terminal.
    pub async fn run<F>(&self, invocation: RunInvocation, on_started: F) -> RunOutcome
    where
        F: FnOnce(u32) + Send,
    {
        let started_at = Utc::now();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        info!(
            "Spawning CLI: program={}, directory={}, timeout={:?}",
            invocation.program,
            invocation.working_dir.display(),
            invocation.timeout
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to spawn CLI: {}", e);
                let (detail, code) = if e.kind() == std::io::ErrorKind::NotFound {
                    (
                        format!(
                            "Claude CLI not found at '{}' (or working directory '{}' is missing)",
                            invocation.program,
                            invocation.working_dir.display()
                        ),
                        EXIT_NOT_FOUND,
                    )
                } else {
                    (
                        format!("Failed to spawn '{}': {}", invocation.program, e),
                        EXIT_LAUNCH_FAILED,
                    )
                };
                return RunOutcome::launch_error(detail, code, started_at);
            }
        };

        let pid = match child.id() {
            Some(pid) => pid,
            None => {
                // Only possible if the child was already reaped, which we haven't done.
                return RunOutcome::launch_error(
                    "Process exited before its id could be read",
                    EXIT_LAUNCH_FAILED,
                    started_at,
                );
            }
        };

        on_started(pid);
        info!(pid, "CLI process started");

        let stdin_task = child.stdin.take().map(|mut stdin| {
            let prompt = invocation.prompt;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    warn!("Failed to write prompt to CLI stdin: {}", e);
                }
                // Dropping stdin closes it so the CLI sees EOF.
                let _ = stdin.shutdown().await;
            })
        });
        let stdout_task = spawn_reader(child.stdout.take());
        let stderr_task = spawn_reader(child.stderr.take());

        let waited = tokio::time::timeout(invocation.timeout, child.wait()).await;

        if let Some(task) = stdin_task {
            task.abort();
        }

        match waited {
            Ok(Ok(status)) => {
                let stdout = self.drain(stdout_task, pid).await;
                let stderr = self.drain(stderr_task, pid).await;
                let exit_code = exit_code(&status);
                info!(pid, exit_code, "CLI process exited");
                RunOutcome::exited(
                    pid,
                    exit_code,
                    String::from_utf8_lossy(&stdout).into_owned(),
                    describe_exit(&status, String::from_utf8_lossy(&stderr).into_owned()),
                    started_at,
                )
            }
            Ok(Err(e)) => {
                error!(pid, "Failed to wait for CLI process: {}", e);
                self.terminate(&mut child, pid).await;
                self.drain(stdout_task, pid).await;
                self.drain(stderr_task, pid).await;
                RunOutcome::supervision_failed(
                    Some(pid),
                    format!("Failed to wait for process: {}", e),
                    started_at,
                )
            }
            Err(_) => {
                warn!(pid, timeout = ?invocation.timeout, "CLI process timed out, terminating");
                self.terminate(&mut child, pid).await;
                self.drain(stdout_task, pid).await;
                self.drain(stderr_task, pid).await;
                RunOutcome::timed_out(pid, invocation.timeout, started_at)
            }
        }
    }

    /// Stop the process group: SIGTERM, then SIGKILL after the grace period.
    /// Returns once the leader has been reaped.
    async fn terminate(&self, child: &mut Child, pid: u32) {
        #[cfg(unix)]
        {
            if let Err(e) = super::process::signal_group(pid, libc::SIGTERM) {
                warn!(pid, "Failed to SIGTERM process group: {}", e);
            }
            match tokio::time::timeout(self.kill_grace, child.wait()).await {
                Ok(_) => debug!(pid, "CLI process exited after SIGTERM"),
                Err(_) => {
                    warn!(pid, grace = ?self.kill_grace, "CLI process ignored SIGTERM, killing");
                    if let Err(e) = child.kill().await {
                        error!(pid, "Failed to kill CLI process: {}", e);
                    }
                }
            }
            // Anything the CLI spawned that is still around.
            let _ = super::process::signal_group(pid, libc::SIGKILL);
        }

        #[cfg(not(unix))]
        {
            // No graceful terminate here; collapse to a single kill.
            if let Err(e) = child.kill().await {
                error!(pid, "Failed to kill CLI process: {}", e);
            }
        }
    }

    /// Collect a reader's bytes. If a descendant keeps the pipe open past the
    /// drain window, the group is killed and the reader abandoned.
    async fn drain(&self, task: JoinHandle<Vec<u8>>, pid: u32) -> Vec<u8> {
        let mut task = task;
        match tokio::time::timeout(self.drain_timeout, &mut task).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(pid, "Pipe reader failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!(pid, "Pipe still open after process exit, killing stragglers");
                #[cfg(unix)]
                let _ = super::process::signal_group(pid, libc::SIGKILL);
                match tokio::time::timeout(Duration::from_secs(1), &mut task).await {
                    Ok(Ok(bytes)) => bytes,
                    _ => {
                        task.abort();
                        Vec::new()
                    }
                }
            }
        }
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                debug!("Pipe read ended with error: {}", e);
            }
        }
        buf
    })
}

#[cfg(unix)]
fn exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(EXIT_LAUNCH_FAILED)
}

#[cfg(not(unix))]
fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(EXIT_LAUNCH_FAILED)
}

/// Mention a terminating signal in the error stream, where there is one.
fn describe_exit(status: &ExitStatus, stderr: String) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            let note = format!("Process terminated by signal {}", sig);
            return if stderr.trim().is_empty() {
                note
            } else {
                format!("{}\n{}", stderr.trim_end(), note)
            };
        }
    }
    #[cfg(not(unix))]
    let _ = status;
    stderr
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backend::outcome::{OutcomeKind, EXIT_TIMEOUT};
    use crate::backend::process::is_alive;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn stub(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("claude-stub");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn invocation(program: &Path, dir: &Path, prompt: &str, timeout: Duration) -> RunInvocation {
        RunInvocation {
            program: program.display().to_string(),
            args: vec!["--print".to_string()],
            prompt: prompt.to_string(),
            working_dir: dir.to_path_buf(),
            timeout,
        }
    }

    async fn run(
        supervisor: &ProcessSupervisor,
        invocation: RunInvocation,
    ) -> (Option<u32>, RunOutcome) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let outcome = supervisor
            .run(invocation, move |pid| sink.lock().unwrap().push(pid))
            .await;
        let seen = seen.lock().unwrap().clone();
        assert!(seen.len() <= 1, "PID reported more than once");
        (seen.first().copied(), outcome)
    }

    #[tokio::test]
    async fn test_echo_succeeds() {
        let tmp = TempDir::new().unwrap();
        let program = stub(tmp.path(), "cat");
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));

        let (pid, outcome) = run(
            &supervisor,
            invocation(&program, tmp.path(), "Task: hello", Duration::from_secs(10)),
        )
        .await;

        assert_eq!(outcome.kind, OutcomeKind::Succeeded);
        assert_eq!(outcome.output, "Task: hello");
        assert!(outcome.error.is_empty());
        assert_eq!(outcome.exit_code, 0);
        assert!(pid.is_some());
        assert_eq!(outcome.pid, pid);
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let tmp = TempDir::new().unwrap();
        let program = stub(tmp.path(), "pwd");
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));

        let (_, outcome) = run(
            &supervisor,
            invocation(&program, tmp.path(), "", Duration::from_secs(10)),
        )
        .await;

        let expected = std::fs::canonicalize(tmp.path()).unwrap();
        assert_eq!(PathBuf::from(outcome.output.trim()), expected);
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_with_stderr() {
        let tmp = TempDir::new().unwrap();
        let program = stub(tmp.path(), "echo partial\necho boom >&2\nexit 3");
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));

        let (pid, outcome) = run(
            &supervisor,
            invocation(&program, tmp.path(), "", Duration::from_secs(10)),
        )
        .await;

        assert!(pid.is_some());
        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.error, "boom\n");
        assert_eq!(outcome.output, "partial\n");
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error_without_pid() {
        let tmp = TempDir::new().unwrap();
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));

        let (pid, outcome) = run(
            &supervisor,
            invocation(
                &tmp.path().join("no-such-cli"),
                tmp.path(),
                "",
                Duration::from_secs(10),
            ),
        )
        .await;

        assert_eq!(pid, None);
        assert_eq!(outcome.kind, OutcomeKind::LaunchError);
        assert_eq!(outcome.exit_code, EXIT_NOT_FOUND);
        assert_eq!(outcome.pid, None);
        assert!(outcome.error.contains("not found"));
    }

    #[tokio::test]
    async fn test_timeout_terminates_process() {
        let tmp = TempDir::new().unwrap();
        let program = stub(tmp.path(), "exec sleep 5");
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));

        let started = std::time::Instant::now();
        let (pid, outcome) = run(
            &supervisor,
            invocation(&program, tmp.path(), "", Duration::from_secs(1)),
        )
        .await;

        assert_eq!(outcome.kind, OutcomeKind::TimedOut);
        assert_eq!(outcome.exit_code, EXIT_TIMEOUT);
        assert!(outcome.output.is_empty());
        assert!(outcome.error.contains("timed out"));
        assert_eq!(outcome.pid, pid);
        assert!(!is_alive(pid.unwrap()));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_timeout_escalates_to_kill_and_reaps_children() {
        let tmp = TempDir::new().unwrap();
        // The backgrounded sleep inherits stdout; if it survived, draining
        // would hang for the full drain window.
        let program = stub(
            tmp.path(),
            "trap '' TERM\nsleep 30 &\nwhile true; do sleep 0.1; done",
        );
        let supervisor = ProcessSupervisor::new(Duration::from_millis(300));

        let started = std::time::Instant::now();
        let (pid, outcome) = run(
            &supervisor,
            invocation(&program, tmp.path(), "", Duration::from_secs(1)),
        )
        .await;

        assert_eq!(outcome.kind, OutcomeKind::TimedOut);
        assert!(!is_alive(pid.unwrap()));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_large_prompt_is_fully_delivered() {
        let tmp = TempDir::new().unwrap();
        let program = stub(tmp.path(), "wc -c");
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));
        let prompt = "p".repeat(300_000);

        let (_, outcome) = run(
            &supervisor,
            invocation(&program, tmp.path(), &prompt, Duration::from_secs(10)),
        )
        .await;

        assert_eq!(outcome.kind, OutcomeKind::Succeeded);
        assert_eq!(outcome.output.trim(), "300000");
    }

    #[tokio::test]
    async fn test_signal_death_is_failure() {
        let tmp = TempDir::new().unwrap();
        let program = stub(tmp.path(), "kill -9 $$");
        let supervisor = ProcessSupervisor::new(Duration::from_secs(1));

        let (_, outcome) = run(
            &supervisor,
            invocation(&program, tmp.path(), "", Duration::from_secs(10)),
        )
        .await;

        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert_eq!(outcome.exit_code, 128 + 9);
        assert!(outcome.error.contains("signal 9"));
    }
}
