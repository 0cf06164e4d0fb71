//! MCP configuration loading.
//!
//! Two sources feed the pool: the orchestrator-managed file and the user's
//! own Claude settings. Both are re-read on every call so edits made between
//! runs are picked up.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::types::{McpConfigDocument, McpServerConfig, McpServerPool};
use crate::util::home_dir;

/// Anything that can produce the current MCP server pool.
#[async_trait]
pub trait McpPoolSource: Send + Sync {
    async fn load_pool(&self) -> McpServerPool;
}

/// A fixed pool, for callers that resolve configuration themselves.
#[async_trait]
impl McpPoolSource for McpServerPool {
    async fn load_pool(&self) -> McpServerPool {
        self.clone()
    }
}

/// User-level Claude settings files, in lookup order.
pub fn default_user_config_paths() -> Vec<PathBuf> {
    let home = PathBuf::from(home_dir());
    vec![
        home.join(".claude.json"),
        home.join(".claude").join("settings.json"),
        home.join(".config").join("claude").join("settings.json"),
    ]
}

/// File-backed MCP configuration.
pub struct McpConfigStore {
    /// Orchestrator-managed config file
    config_path: PathBuf,
    /// User settings candidates; the first one that parses wins
    user_paths: Vec<PathBuf>,
}

impl McpConfigStore {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            user_paths: default_user_config_paths(),
        }
    }

    /// Override where user settings are looked up.
    pub fn with_user_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.user_paths = paths;
        self
    }

    /// Orchestrator-managed servers. Missing or malformed file yields none.
    pub async fn load_orchestrator(&self) -> Vec<McpServerConfig> {
        match read_document(&self.config_path).await {
            Some(doc) => into_configs(doc),
            None => Vec::new(),
        }
    }

    /// Servers from the first user settings file that exists and parses.
    pub async fn load_user(&self) -> Vec<McpServerConfig> {
        for path in &self.user_paths {
            if !path.exists() {
                continue;
            }
            if let Some(doc) = read_document(path).await {
                debug!("Using user MCP settings from {}", path.display());
                return into_configs(doc);
            }
        }
        Vec::new()
    }

    /// Persist the orchestrator-managed servers.
    pub async fn save(&self, servers: &[McpServerConfig]) -> anyhow::Result<()> {
        let doc = McpConfigDocument {
            mcp_servers: servers
                .iter()
                .map(|s| (s.name.clone(), s.into()))
                .collect(),
        };

        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(&doc)?;
        tokio::fs::write(&self.config_path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl McpPoolSource for McpConfigStore {
    async fn load_pool(&self) -> McpServerPool {
        let user = self.load_user().await;
        let orchestrator = self.load_orchestrator().await;
        McpServerPool::merge(user, orchestrator)
    }
}

async fn read_document(path: &Path) -> Option<McpConfigDocument> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            if path.exists() {
                warn!("Failed to read MCP config {}: {}", path.display(), e);
            }
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!("Ignoring malformed MCP config {}: {}", path.display(), e);
            None
        }
    }
}

fn into_configs(doc: McpConfigDocument) -> Vec<McpServerConfig> {
    doc.mcp_servers
        .into_iter()
        .map(|(name, entry)| entry.into_config(name))
        .collect()
}
