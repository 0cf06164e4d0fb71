//! Configuration management for the agent orchestrator.
//!
//! Configuration can be set via environment variables:
//! - `AGENTS_ROOT` - Optional. Directory holding agent bundles. Defaults to `~/Workspaces/ClaudeAgents`.
//! - `CLAUDE_CLI_PATH` - Optional. The CLI executable to launch. Defaults to `claude`.
//! - `CLAUDE_TIMEOUT` - Optional. Per-run wall-clock timeout in seconds. Defaults to `600`.
//! - `CLAUDE_KILL_GRACE_SECS` - Optional. Seconds between terminate and kill on timeout. Defaults to `5`.
//! - `MCP_CONFIG_PATH` - Optional. Orchestrator-managed MCP server file. Defaults to `~/.orchestrator/mcp_servers.json`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::util::home_dir;

/// Default per-run timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Default grace period between terminate and kill, in seconds.
pub const DEFAULT_KILL_GRACE_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory containing one folder per agent bundle
    pub agents_root: PathBuf,

    /// Path (or bare name resolved via `PATH`) of the Claude CLI
    pub cli_path: String,

    /// Wall-clock timeout applied to runs that don't override it
    pub timeout: Duration,

    /// How long a timed-out process gets to exit after SIGTERM before SIGKILL
    pub kill_grace: Duration,

    /// Orchestrator-managed MCP server configuration file
    pub mcp_config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable doesn't parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = PathBuf::from(home_dir());

        let agents_root = std::env::var("AGENTS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join("Workspaces").join("ClaudeAgents"));

        let cli_path = std::env::var("CLAUDE_CLI_PATH").unwrap_or_else(|_| "claude".to_string());

        let timeout = parse_secs("CLAUDE_TIMEOUT", DEFAULT_TIMEOUT_SECS)?;
        if timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "CLAUDE_TIMEOUT".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let kill_grace = parse_secs("CLAUDE_KILL_GRACE_SECS", DEFAULT_KILL_GRACE_SECS)?;

        let mcp_config_path = std::env::var("MCP_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".orchestrator").join("mcp_servers.json"));

        Ok(Self {
            agents_root,
            cli_path,
            timeout,
            kill_grace,
            mcp_config_path,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(agents_root: PathBuf, cli_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            mcp_config_path: agents_root.join(".orchestrator").join("mcp_servers.json"),
            agents_root,
            cli_path: cli_path.into(),
            timeout,
            kill_grace: Duration::from_secs(DEFAULT_KILL_GRACE_SECS),
        }
    }
}

fn parse_secs(name: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}
