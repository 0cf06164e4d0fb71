//! Non-blocking submission of agent runs.
//!
//! `submit` validates the agent, then hands the run to a background task and
//! returns a [`RunHandle`] straight away. The handle carries two single-fire
//! channels: the PID (only sent if a process was created) and the terminal
//! [`RunOutcome`] (always sent, exactly once, after the PID).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agents::AgentRegistry;
use crate::backend::outcome::EXIT_LAUNCH_FAILED;
use crate::backend::{ClaudeCodeConfig, CommandBuilder, ProcessSupervisor, RunOutcome};
use crate::config::Config;
use crate::context::{ContextAssembler, RunContext};
use crate::mcp::{resolve, McpConfigStore, McpPoolSource};

/// One task for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Agent folder name
    pub agent: String,
    pub task: String,
    #[serde(default)]
    pub context: Option<RunContext>,
    /// Overrides the configured timeout for this run only. Zero means the
    /// configured timeout.
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl RunRequest {
    pub fn new(agent: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            task: task.into(),
            context: None,
            timeout: None,
        }
    }

    pub fn with_context(mut self, context: RunContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Caller's side of a submitted run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    started: Option<oneshot::Receiver<u32>>,
    pid: Option<u32>,
    finished: oneshot::Receiver<RunOutcome>,
    submitted_at: DateTime<Utc>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait until the process exists. `None` means no process was (or will
    /// be) created for this run.
    pub async fn pid(&mut self) -> Option<u32> {
        if let Some(rx) = self.started.take() {
            self.pid = rx.await.ok();
        }
        self.pid
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> RunOutcome {
        match self.finished.await {
            Ok(outcome) => outcome,
            // The background task died without reporting (panic or runtime
            // shutdown). Still produce exactly one terminal outcome, carrying
            // the PID if one was sent.
            Err(_) => {
                let pid = match self.started {
                    Some(mut rx) => rx.try_recv().ok(),
                    None => self.pid,
                };
                RunOutcome::supervision_failed(
                    pid,
                    "Run task ended without reporting an outcome",
                    self.submitted_at,
                )
            }
        }
    }

    /// Split into the raw PID and outcome receivers.
    pub fn into_channels(self) -> (oneshot::Receiver<u32>, oneshot::Receiver<RunOutcome>) {
        let started = match self.started {
            Some(rx) => rx,
            None => {
                let (tx, rx) = oneshot::channel();
                if let Some(pid) = self.pid {
                    let _ = tx.send(pid);
                }
                rx
            }
        };
        (started, self.finished)
    }
}

/// Entry point for running agents.
pub struct ExecutionOrchestrator {
    registry: AgentRegistry,
    mcp: Arc<dyn McpPoolSource>,
    assembler: Arc<ContextAssembler>,
    cli: ClaudeCodeConfig,
    default_timeout: Duration,
}

impl ExecutionOrchestrator {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: AgentRegistry::new(config.agents_root.clone()),
            mcp: Arc::new(McpConfigStore::new(config.mcp_config_path.clone())),
            assembler: Arc::new(ContextAssembler::new()),
            cli: ClaudeCodeConfig::from(config),
            default_timeout: config.timeout,
        }
    }

    /// Replace where the MCP server pool comes from.
    pub fn with_pool_source(mut self, source: Arc<dyn McpPoolSource>) -> Self {
        self.mcp = source;
        self
    }

    pub fn with_context_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = Arc::new(assembler);
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Schedule a run and return immediately. Must be called from within a
    /// tokio runtime.
    ///
    /// Precondition failures (bad agent, missing SKILL.md, empty task) are
    /// reported through the handle's outcome like any other failure.
    pub fn submit(&self, request: RunRequest) -> RunHandle {
        let run_id = Uuid::new_v4();
        let submitted_at = Utc::now();
        let (started_tx, started_rx) = oneshot::channel::<u32>();
        let (finished_tx, finished_rx) = oneshot::channel::<RunOutcome>();

        let handle = RunHandle {
            run_id,
            started: Some(started_rx),
            pid: None,
            finished: finished_rx,
            submitted_at,
        };

        let precondition = if request.task.trim().is_empty() {
            Err("Task is required".to_string())
        } else {
            self.registry
                .check(&request.agent)
                .map(|_| ())
                .map_err(|e| e.to_string())
        };
        if let Err(detail) = precondition {
            warn!(%run_id, agent = %request.agent, "Rejected run: {}", detail);
            drop(started_tx);
            let _ = finished_tx.send(RunOutcome::precondition(detail, submitted_at));
            return handle;
        }

        let job = RunJob {
            registry: self.registry.clone(),
            mcp: Arc::clone(&self.mcp),
            assembler: Arc::clone(&self.assembler),
            cli: self.cli.clone(),
            timeout: request
                .timeout
                .filter(|t| !t.is_zero())
                .unwrap_or(self.default_timeout),
            request,
            submitted_at,
        };

        let span = info_span!("run", %run_id, agent = %job.request.agent);
        tokio::spawn(
            async move {
                let outcome = job.execute(started_tx).await;
                info!(
                    kind = %outcome.kind,
                    exit_code = outcome.exit_code,
                    duration_seconds = outcome.duration_seconds,
                    "Run finished"
                );
                let _ = finished_tx.send(outcome);
            }
            .instrument(span),
        );

        handle
    }
}

/// State moved onto the background task for a single run.
struct RunJob {
    registry: AgentRegistry,
    mcp: Arc<dyn McpPoolSource>,
    assembler: Arc<ContextAssembler>,
    cli: ClaudeCodeConfig,
    timeout: Duration,
    request: RunRequest,
    submitted_at: DateTime<Utc>,
}

impl RunJob {
    async fn execute(self, started_tx: oneshot::Sender<u32>) -> RunOutcome {
        let agent = match self.registry.load(&self.request.agent).await {
            Ok(agent) => agent,
            Err(e) => return RunOutcome::precondition(e.to_string(), self.submitted_at),
        };

        // Re-read per run: the user's settings may change between runs.
        let pool = self.mcp.load_pool().await;
        let payload = resolve(&agent.mcp_servers, &pool);
        let context_block = self.assembler.assemble(self.request.context.as_ref()).await;

        let invocation = match CommandBuilder::new(&self.cli).build(
            &agent,
            &self.request.task,
            payload.as_ref(),
            &context_block,
            self.timeout,
        ) {
            Ok(invocation) => invocation,
            Err(e) => {
                return RunOutcome::launch_error(
                    format!("Failed to serialize MCP config: {}", e),
                    EXIT_LAUNCH_FAILED,
                    self.submitted_at,
                )
            }
        };

        ProcessSupervisor::new(self.cli.kill_grace)
            .run(invocation, move |pid| {
                let _ = started_tx.send(pid);
            })
            .await
    }
}
