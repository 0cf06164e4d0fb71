//! agent-orchestrator - command line entry point
//!
//! Runs a single agent task, or lists the agents and MCP servers the
//! orchestrator can see.

use std::path::PathBuf;
use std::time::Duration;

use agent_orchestrator::{
    config::Config,
    mcp::{McpConfigStore, McpPoolSource},
    ExecutionOrchestrator, RunContext, RunRequest,
};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agent-orchestrator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run skill-defined agents through the Claude CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task with an agent and print the outcome as JSON
    Run {
        /// Agent folder name under the agents root
        agent: String,

        /// Task text
        task: String,

        /// URL to fetch and inline (repeatable)
        #[arg(long = "url")]
        urls: Vec<String>,

        /// Local file to inline (repeatable)
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// Local image to inline as base64 (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,

        /// Timeout in seconds (overrides CLAUDE_TIMEOUT)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List discovered agents
    Agents,

    /// List the merged MCP server pool
    Servers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: agents_root={}, cli={}",
        config.agents_root.display(),
        config.cli_path
    );

    match cli.command {
        Commands::Run {
            agent,
            task,
            urls,
            files,
            images,
            timeout,
        } => {
            let context = RunContext {
                urls,
                file_paths: files,
                images,
            };
            let mut request = RunRequest::new(agent, task);
            if !context.is_empty() {
                request = request.with_context(context);
            }
            if let Some(secs) = timeout.filter(|s| *s > 0) {
                request = request.with_timeout(Duration::from_secs(secs));
            }

            let orchestrator = ExecutionOrchestrator::new(&config);
            let mut handle = orchestrator.submit(request);
            if let Some(pid) = handle.pid().await {
                info!(run_id = %handle.run_id(), pid, "Run started");
                eprintln!("pid: {}", pid);
            }
            let outcome = handle.outcome().await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Agents => {
            let orchestrator = ExecutionOrchestrator::new(&config);
            let agents = orchestrator.registry().discover().await?;
            println!("{}", serde_json::to_string_pretty(&agents)?);
        }
        Commands::Servers => {
            let pool = McpConfigStore::new(&config.mcp_config_path).load_pool().await;
            let servers: Vec<_> = pool.iter().collect();
            println!("{}", serde_json::to_string_pretty(&servers)?);
        }
    }

    Ok(())
}
