//! Claude CLI invocation.

pub mod command;

use std::time::Duration;

use crate::config::Config;

pub use command::{build_prompt, CommandBuilder, RunInvocation};

/// Configuration for launching the Claude CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCodeConfig {
    pub cli_path: String,
    /// Time a timed-out process gets between SIGTERM and SIGKILL
    pub kill_grace: Duration,
}

impl From<&Config> for ClaudeCodeConfig {
    fn from(config: &Config) -> Self {
        Self {
            cli_path: config.cli_path.clone(),
            kill_grace: config.kill_grace,
        }
    }
}
