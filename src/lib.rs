//! # Agent Orchestrator
//!
//! Runs skill-defined agents through the Claude CLI as supervised
//! subprocesses.
//!
//! ## Run Flow
//! 1. Validate the agent bundle (`SKILL.md` under the agents root)
//! 2. Resolve the agent's declared MCP servers against the host pool
//! 3. Inline caller context (URLs, files, images) into a `<context>` block
//! 4. Launch the CLI with the prompt on stdin, under a deadline
//! 5. Report the PID once, then exactly one terminal outcome
//!
//! ```text
//!   RunRequest ──► ExecutionOrchestrator::submit ──► RunHandle
//!                          │                          ▲   ▲
//!                          ▼ (background task)        │   │
//!   AgentRegistry ─► resolve(MCP) ─► ContextAssembler │   │
//!                          │                          │   │
//!                          ▼                          │   │
//!                   CommandBuilder ─► ProcessSupervisor
//!                                       (pid)    (outcome)
//! ```
//!
//! ## Modules
//! - `agents`: agent bundles on disk
//! - `mcp`: MCP server pool and per-agent resolution
//! - `context`: caller context inlining
//! - `backend`: CLI invocation, process supervision, outcomes
//! - `orchestrator`: the non-blocking submission façade

pub mod agents;
pub mod backend;
pub mod config;
pub mod context;
pub mod mcp;
pub mod orchestrator;
pub mod util;

pub use backend::{OutcomeKind, RunOutcome};
pub use config::Config;
pub use context::{ContextAssembler, RunContext};
pub use orchestrator::{ExecutionOrchestrator, RunHandle, RunRequest};
