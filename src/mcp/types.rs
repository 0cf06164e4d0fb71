//! MCP types and data structures.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Where a pool entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpSource {
    /// Managed by the orchestrator (editable)
    Orchestrator,
    /// Read from the user's Claude settings (read-only)
    User,
}

/// Launch definition of a single MCP server (stdio transport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique name; the key the CLI and agents refer to it by
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// One server as it appears under `mcpServers` in a config file. The name is
/// the map key, so it's not repeated here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerEntry {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpServerEntry {
    pub fn into_config(self, name: String) -> McpServerConfig {
        McpServerConfig {
            name,
            command: self.command,
            args: self.args,
            env: self.env,
        }
    }
}

impl From<&McpServerConfig> for McpServerEntry {
    fn from(config: &McpServerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
        }
    }
}

/// `{"mcpServers": {...}}` document. Shared by the orchestrator file, the
/// user's Claude settings (other keys ignored) and the payload handed to
/// the CLI via `--mcp-config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpConfigDocument {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, McpServerEntry>,
}

/// A pool entry tagged with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PooledServer {
    #[serde(flatten)]
    pub config: McpServerConfig,
    pub source: McpSource,
}

/// Every MCP server known to the host, keyed by unique name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpServerPool {
    servers: BTreeMap<String, PooledServer>,
}

impl McpServerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge user and orchestrator sources. Orchestrator entries win on name
    /// collision.
    pub fn merge(
        user: impl IntoIterator<Item = McpServerConfig>,
        orchestrator: impl IntoIterator<Item = McpServerConfig>,
    ) -> Self {
        let mut pool = Self::new();
        for config in user {
            pool.insert(config, McpSource::User);
        }
        for config in orchestrator {
            pool.insert(config, McpSource::Orchestrator);
        }
        pool
    }

    pub fn insert(&mut self, config: McpServerConfig, source: McpSource) {
        self.servers
            .insert(config.name.clone(), PooledServer { config, source });
    }

    pub fn get(&self, name: &str) -> Option<&PooledServer> {
        self.servers.get(name)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Servers in name order.
    pub fn iter(&self) -> impl Iterator<Item = &PooledServer> {
        self.servers.values()
    }
}

impl FromIterator<McpServerConfig> for McpServerPool {
    /// Collect as orchestrator-managed entries.
    fn from_iter<T: IntoIterator<Item = McpServerConfig>>(iter: T) -> Self {
        Self::merge(std::iter::empty(), iter)
    }
}
