//! MCP (Model Context Protocol) server configuration.
//!
//! - `types`: typed server definitions and the merged pool
//! - `config`: loading the orchestrator and user config sources
//! - `resolver`: per-run filtering into a `--mcp-config` payload

pub mod config;
pub mod resolver;
pub mod types;

pub use config::{default_user_config_paths, McpConfigStore, McpPoolSource};
pub use resolver::{resolve, McpPayload};
pub use types::{McpServerConfig, McpServerPool, McpSource, PooledServer};
