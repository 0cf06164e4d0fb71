//! Picks the MCP servers a single run needs out of the host pool.

use tracing::debug;

use super::types::{McpConfigDocument, McpServerEntry, McpServerPool};

/// Minimal `--mcp-config` payload: only the servers an agent asked for that
/// the host actually has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpPayload {
    document: McpConfigDocument,
}

impl McpPayload {
    /// Names included, in sorted order.
    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        self.document.mcp_servers.keys().map(String::as_str)
    }

    /// Compact JSON as passed on the command line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.document)
    }
}

/// Intersect `required` with `pool`. Unknown names are dropped; returns
/// `None` when nothing is left.
pub fn resolve(required: &[String], pool: &McpServerPool) -> Option<McpPayload> {
    if required.is_empty() {
        return None;
    }

    let mut document = McpConfigDocument::default();
    for name in required {
        match pool.get(name) {
            Some(server) => {
                document
                    .mcp_servers
                    .insert(name.clone(), McpServerEntry::from(&server.config));
            }
            None => debug!("Required MCP server '{}' is not configured, skipping", name),
        }
    }

    if document.mcp_servers.is_empty() {
        None
    } else {
        Some(McpPayload { document })
    }
}
