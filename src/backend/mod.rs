//! Execution backend: invocation building, process supervision and outcomes.

pub mod claudecode;
pub mod outcome;
pub mod process;
pub mod supervisor;

pub use claudecode::{ClaudeCodeConfig, CommandBuilder, RunInvocation};
pub use outcome::{OutcomeKind, RunOutcome};
pub use supervisor::ProcessSupervisor;
