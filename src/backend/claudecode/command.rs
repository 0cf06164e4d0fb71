//! Builds the argument vector and prompt for a single run.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use super::ClaudeCodeConfig;
use crate::agents::AgentSpec;
use crate::mcp::McpPayload;

/// Everything needed to launch one run. Built per submission and discarded
/// once the process has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Written to the child's stdin
    pub prompt: String,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl RunInvocation {
    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

pub struct CommandBuilder<'a> {
    config: &'a ClaudeCodeConfig,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(config: &'a ClaudeCodeConfig) -> Self {
        Self { config }
    }

    /// Compose the invocation for `agent` running `task`.
    ///
    /// Runs are unattended, so the CLI is asked for plain-text, non-interactive
    /// output with permission prompts skipped.
    pub fn build(
        &self,
        agent: &AgentSpec,
        task: &str,
        mcp: Option<&McpPayload>,
        context_block: &str,
        timeout: Duration,
    ) -> serde_json::Result<RunInvocation> {
        let mut args: Vec<String> = [
            "--print",
            "--output-format",
            "text",
            "--dangerously-skip-permissions",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(payload) = mcp {
            args.push("--mcp-config".to_string());
            args.push(payload.to_json()?);
            debug!(
                servers = ?payload.server_names().collect::<Vec<_>>(),
                "Attaching MCP config"
            );
        }

        Ok(RunInvocation {
            program: self.config.cli_path.clone(),
            args,
            prompt: build_prompt(&agent.skill, context_block, task),
            working_dir: agent.bundle_dir.clone(),
            timeout,
        })
    }
}

/// Fixed prompt template: skill, optional context, task, closing instruction.
pub fn build_prompt(skill: &str, context_block: &str, task: &str) -> String {
    let context = if context_block.is_empty() {
        String::new()
    } else {
        format!("{}\n\n", context_block)
    };

    format!(
        "You are executing as the agent defined in SKILL.md below.\n\
         \n\
         <skill>\n\
         {skill}\n\
         </skill>\n\
         \n\
         {context}Task: {task}\n\
         \n\
         Execute this task according to your SKILL.md instructions."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentSummary, Trigger};
    use crate::mcp::{resolve, McpServerConfig, McpServerPool};

    fn agent() -> AgentSpec {
        AgentSpec {
            folder: "echo".to_string(),
            bundle_dir: PathBuf::from("/agents/echo"),
            skill: "Echo the task".to_string(),
            mcp_servers: vec!["gmail".to_string()],
            summary: AgentSummary {
                folder: "echo".to_string(),
                name: "Echo".to_string(),
                description: String::new(),
                trigger: Trigger::OnDemand,
                mcp_servers: vec!["gmail".to_string()],
                schedule: None,
            },
        }
    }

    fn config() -> ClaudeCodeConfig {
        ClaudeCodeConfig {
            cli_path: "/usr/local/bin/claude".to_string(),
            kill_grace: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_prompt_without_context() {
        let prompt = build_prompt("Echo the task", "", "hello");
        assert_eq!(
            prompt,
            "You are executing as the agent defined in SKILL.md below.\n\n\
             <skill>\nEcho the task\n</skill>\n\n\
             Task: hello\n\n\
             Execute this task according to your SKILL.md instructions."
        );
    }

    #[test]
    fn test_prompt_places_context_between_skill_and_task() {
        let prompt = build_prompt("S", "<context>\nC\n</context>", "T");
        assert!(prompt.contains("</skill>\n\n<context>\nC\n</context>\n\nTask: T\n\n"));
    }

    #[test]
    fn test_args_without_mcp() {
        let invocation = CommandBuilder::new(&config())
            .build(&agent(), "hello", None, "", Duration::from_secs(600))
            .unwrap();
        assert_eq!(
            invocation.argv(),
            vec![
                "/usr/local/bin/claude",
                "--print",
                "--output-format",
                "text",
                "--dangerously-skip-permissions"
            ]
        );
        assert_eq!(invocation.working_dir, PathBuf::from("/agents/echo"));
        assert_eq!(invocation.timeout, Duration::from_secs(600));
        assert!(invocation.prompt.contains("Task: hello"));
    }

    #[test]
    fn test_args_with_mcp_payload() {
        let pool: McpServerPool = vec![McpServerConfig::new("gmail", "gmail-mcp")]
            .into_iter()
            .collect();
        let payload = resolve(&agent().mcp_servers, &pool).unwrap();

        let invocation = CommandBuilder::new(&config())
            .build(&agent(), "hello", Some(&payload), "", Duration::from_secs(1))
            .unwrap();

        assert_eq!(invocation.args.len(), 6);
        assert_eq!(invocation.args[4], "--mcp-config");
        let value: serde_json::Value = serde_json::from_str(&invocation.args[5]).unwrap();
        assert_eq!(value["mcpServers"]["gmail"]["command"], "gmail-mcp");
    }
}
