//! Core types for agent bundles.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Name of the instruction file inside every bundle.
pub const SKILL_FILE: &str = "SKILL.md";

/// Name of the optional declarative config inside a bundle.
pub const CONFIG_FILE: &str = "config.json";

/// Precondition failures when resolving an agent bundle.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid agent folder name '{0}'. Use only letters, numbers, spaces and hyphens.")]
    InvalidName(String),

    #[error("Agent folder '{0}' not found")]
    NotFound(String),

    #[error("SKILL.md not found in '{0}'")]
    SkillMissing(String),

    #[error("SKILL.md in '{0}' is empty")]
    SkillEmpty(String),

    #[error("Failed to read SKILL.md in '{folder}': {source}")]
    Io {
        folder: String,
        #[source]
        source: std::io::Error,
    },
}

/// How an agent is meant to be triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    #[default]
    OnDemand,
    Scheduled,
}

impl Trigger {
    /// Accepts `"scheduled"` as well as `{"type": "scheduled", ...}`.
    /// Anything unrecognised reads as `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let kind = match value {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("type")?.as_str()?,
            _ => return None,
        };
        match kind.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "on-demand" | "ondemand" | "manual" => Some(Self::OnDemand),
            "scheduled" | "schedule" | "cron" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

/// On-disk `config.json` of a bundle. Every field is optional, and a field
/// of the wrong shape is dropped on its own without affecting the others.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AgentConfigFile {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_trigger")]
    pub trigger: Option<Trigger>,
    #[serde(default, deserialize_with = "string_list")]
    pub mcp_servers: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub schedule: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_trigger<'de, D>(deserializer: D) -> Result<Option<Trigger>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Trigger::from_value(&value))
}

/// Keeps the string entries of an array; any other shape is empty.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Summary of a bundle, as listed by discovery.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub folder: String,
    pub name: String,
    pub description: String,
    pub trigger: Trigger,
    pub mcp_servers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// Everything a run needs to know about an agent.
///
/// # Invariants
/// - `skill` is non-empty
/// - `bundle_dir` existed when the spec was loaded
#[derive(Debug, Clone)]
pub struct AgentSpec {
    /// Folder name, which is the agent's identity
    pub folder: String,
    /// Absolute bundle directory; the run's working directory
    pub bundle_dir: PathBuf,
    /// Raw SKILL.md body
    pub skill: String,
    /// Capability server names the agent declares, trimmed and de-duplicated
    pub mcp_servers: Vec<String>,
    pub summary: AgentSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trigger_accepts_string_and_object_forms() {
        assert_eq!(Trigger::from_value(&json!("scheduled")), Some(Trigger::Scheduled));
        assert_eq!(Trigger::from_value(&json!("on-demand")), Some(Trigger::OnDemand));
        assert_eq!(
            Trigger::from_value(&json!({"type": "scheduled", "description": "daily"})),
            Some(Trigger::Scheduled)
        );
        assert_eq!(Trigger::from_value(&json!("whenever")), None);
        assert_eq!(Trigger::from_value(&json!(3)), None);
    }

    #[test]
    fn test_config_drops_only_the_odd_field() {
        let config: AgentConfigFile = serde_json::from_value(json!({
            "name": 42,
            "description": "Sends mail",
            "trigger": ["nope"],
            "mcp_servers": ["gmail", 7, "gdrive"],
        }))
        .unwrap();
        assert_eq!(config.name, None);
        assert_eq!(config.description.as_deref(), Some("Sends mail"));
        assert_eq!(config.trigger, None);
        assert_eq!(config.mcp_servers, vec!["gmail", "gdrive"]);
    }
}
