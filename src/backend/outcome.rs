//! Terminal result of a single run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code reported when a precondition (bundle, SKILL.md, task) failed.
pub const EXIT_PRECONDITION: i32 = -1;
/// Exit code reported when the deadline elapsed.
pub const EXIT_TIMEOUT: i32 = -2;
/// Exit code reported when the CLI executable doesn't exist.
pub const EXIT_NOT_FOUND: i32 = -3;
/// Exit code reported for any other launch or supervision failure.
pub const EXIT_LAUNCH_FAILED: i32 = -4;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    TimedOut,
    LaunchError,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
            Self::LaunchError => "launch-error",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one submission. Exactly one is produced per run.
///
/// # Invariants
/// - `kind == Succeeded` ⇒ `error` is empty and `exit_code == 0`
/// - any other kind ⇒ `error` is non-empty
/// - `LaunchError` ⇒ `pid` is `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub kind: OutcomeKind,
    /// Captured stdout (empty for timeouts and launch errors)
    pub output: String,
    /// Captured stderr or a description of what went wrong
    pub error: String,
    /// Process exit code, or one of the negative `EXIT_*` sentinels
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl RunOutcome {
    fn finish(
        kind: OutcomeKind,
        output: String,
        error: String,
        exit_code: i32,
        pid: Option<u32>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        let duration_seconds = (finished_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            kind,
            output,
            error,
            exit_code,
            pid,
            started_at,
            finished_at,
            duration_seconds,
        }
    }

    /// The run never got as far as launching (bad agent, empty task, ...).
    pub fn precondition(detail: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self::finish(
            OutcomeKind::LaunchError,
            String::new(),
            non_empty(detail.into(), "Precondition failed"),
            EXIT_PRECONDITION,
            None,
            started_at,
        )
    }

    /// Process creation failed; no PID exists.
    pub fn launch_error(detail: impl Into<String>, exit_code: i32, started_at: DateTime<Utc>) -> Self {
        Self::finish(
            OutcomeKind::LaunchError,
            String::new(),
            non_empty(detail.into(), "Failed to launch process"),
            exit_code,
            None,
            started_at,
        )
    }

    /// The deadline elapsed and the process was terminated.
    pub fn timed_out(pid: u32, timeout: Duration, started_at: DateTime<Utc>) -> Self {
        Self::finish(
            OutcomeKind::TimedOut,
            String::new(),
            format!("Execution timed out after {} seconds", format_secs(timeout)),
            EXIT_TIMEOUT,
            Some(pid),
            started_at,
        )
    }

    /// The process exited on its own.
    pub fn exited(
        pid: u32,
        exit_code: i32,
        stdout: String,
        stderr: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        if exit_code == 0 {
            return Self::finish(
                OutcomeKind::Succeeded,
                stdout,
                String::new(),
                exit_code,
                Some(pid),
                started_at,
            );
        }
        let error = non_empty(stderr, &format!("Process exited with status {}", exit_code));
        Self::finish(
            OutcomeKind::Failed,
            stdout,
            error,
            exit_code,
            Some(pid),
            started_at,
        )
    }

    /// Supervision broke down after the process was created.
    pub fn supervision_failed(
        pid: Option<u32>,
        detail: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::finish(
            OutcomeKind::Failed,
            String::new(),
            non_empty(detail.into(), "Run ended without reporting an outcome"),
            EXIT_LAUNCH_FAILED,
            pid,
            started_at,
        )
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Succeeded
    }
}

fn non_empty(detail: String, fallback: &str) -> String {
    if detail.trim().is_empty() {
        fallback.to_string()
    } else {
        detail
    }
}

fn format_secs(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        d.as_secs().to_string()
    } else {
        format!("{:.1}", d.as_secs_f64())
    }
}
