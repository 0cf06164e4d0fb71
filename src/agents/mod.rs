//! Read side of the agent registry.
//!
//! An agent bundle is a folder under the agents root holding a `SKILL.md`
//! (the instructions handed to the CLI) and an optional `config.json`
//! declaring display metadata and required MCP servers.

mod types;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio::fs;
use tracing::{debug, warn};

pub use types::{AgentError, AgentSpec, AgentSummary, Trigger, CONFIG_FILE, SKILL_FILE};
use types::AgentConfigFile;

use crate::util::sanitize_name_list;

/// Folders under the agents root that never hold agents.
const EXCLUDED_FOLDERS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    "venv",
    ".venv",
    "Orchestrator",
    "examples",
    "templates",
    "assets",
];

const MAX_DESCRIPTION_CHARS: usize = 200;

fn folder_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9\- ]+$").expect("static regex is valid"))
}

/// Check a folder name before it's joined onto the agents root.
pub fn is_valid_folder_name(name: &str) -> bool {
    folder_name_regex().is_match(name)
}

/// Filesystem-backed agent lookup.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    root: PathBuf,
}

impl AgentRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cheap synchronous precondition check: folder name valid, bundle
    /// directory present, `SKILL.md` present. Returns the bundle directory.
    pub fn check(&self, folder: &str) -> Result<PathBuf, AgentError> {
        if !is_valid_folder_name(folder) {
            return Err(AgentError::InvalidName(folder.to_string()));
        }
        let bundle_dir = self.root.join(folder);
        if !bundle_dir.is_dir() {
            return Err(AgentError::NotFound(folder.to_string()));
        }
        if !bundle_dir.join(SKILL_FILE).is_file() {
            return Err(AgentError::SkillMissing(folder.to_string()));
        }
        Ok(bundle_dir)
    }

    /// Load a full [`AgentSpec`], reading `SKILL.md` and `config.json`.
    pub async fn load(&self, folder: &str) -> Result<AgentSpec, AgentError> {
        let bundle_dir = self.check(folder)?;

        let skill = fs::read_to_string(bundle_dir.join(SKILL_FILE))
            .await
            .map_err(|source| AgentError::Io {
                folder: folder.to_string(),
                source,
            })?;
        if skill.trim().is_empty() {
            return Err(AgentError::SkillEmpty(folder.to_string()));
        }

        let config = read_config(&bundle_dir).await;
        let summary = build_summary(folder, &skill, config);
        let bundle_dir = fs::canonicalize(&bundle_dir).await.unwrap_or(bundle_dir);

        Ok(AgentSpec {
            folder: folder.to_string(),
            bundle_dir,
            skill,
            mcp_servers: summary.mcp_servers.clone(),
            summary,
        })
    }

    /// List every bundle under the root, sorted by display name.
    pub async fn discover(&self) -> anyhow::Result<Vec<AgentSummary>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut agents = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            if !entry_path.is_dir() {
                continue;
            }

            let folder = entry.file_name().to_string_lossy().to_string();
            if folder.starts_with('.') || EXCLUDED_FOLDERS.contains(&folder.as_str()) {
                continue;
            }

            let skill_md = entry_path.join(SKILL_FILE);
            if !skill_md.exists() {
                continue;
            }

            let skill = fs::read_to_string(&skill_md).await.unwrap_or_default();
            let config = read_config(&entry_path).await;
            agents.push(build_summary(&folder, &skill, config));
        }

        agents.sort_by_key(|a| a.name.to_lowercase());
        debug!(count = agents.len(), root = %self.root.display(), "Discovered agents");
        Ok(agents)
    }
}

/// A missing or malformed `config.json` yields defaults.
async fn read_config(bundle_dir: &Path) -> AgentConfigFile {
    let path = bundle_dir.join(CONFIG_FILE);
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(_) => return AgentConfigFile::default(),
    };
    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring malformed {}: {}", path.display(), e);
            AgentConfigFile::default()
        }
    }
}

fn build_summary(folder: &str, skill: &str, config: AgentConfigFile) -> AgentSummary {
    let name = config
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| title_from_folder(folder));

    let description = config
        .description
        .filter(|d| !d.trim().is_empty())
        .or_else(|| description_from_skill(skill))
        .map(|d| d.chars().take(MAX_DESCRIPTION_CHARS).collect())
        .unwrap_or_default();

    AgentSummary {
        folder: folder.to_string(),
        name,
        description,
        trigger: config.trigger.unwrap_or_default(),
        mcp_servers: sanitize_name_list(config.mcp_servers),
        schedule: config.schedule,
    }
}

/// `weekly-report` → `Weekly Report`.
fn title_from_folder(folder: &str) -> String {
    folder
        .replace('-', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// First non-heading paragraph line after the first heading.
fn description_from_skill(skill: &str) -> Option<String> {
    let mut lines = skill.lines();
    lines.by_ref().find(|line| line.starts_with('#'))?;
    lines
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_bundle(root: &Path, folder: &str, skill: &str, config: Option<&str>) {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SKILL_FILE), skill).unwrap();
        if let Some(config) = config {
            std::fs::write(dir.join(CONFIG_FILE), config).unwrap();
        }
    }

    #[test]
    fn test_folder_name_validation() {
        assert!(is_valid_folder_name("weekly-report"));
        assert!(is_valid_folder_name("Inbox Triage 2"));
        assert!(!is_valid_folder_name("../etc"));
        assert!(!is_valid_folder_name("a/b"));
        assert!(!is_valid_folder_name(""));
    }

    #[test]
    fn test_check_reports_missing_pieces() {
        let tmp = TempDir::new().unwrap();
        let registry = AgentRegistry::new(tmp.path());

        assert!(matches!(registry.check("ghost"), Err(AgentError::NotFound(_))));

        std::fs::create_dir(tmp.path().join("no-skill")).unwrap();
        assert!(matches!(
            registry.check("no-skill"),
            Err(AgentError::SkillMissing(_))
        ));

        assert!(matches!(
            registry.check("../escape"),
            Err(AgentError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_load_reads_skill_and_config() {
        let tmp = TempDir::new().unwrap();
        write_bundle(
            tmp.path(),
            "inbox-triage",
            "# Inbox\n\nSorts mail.\n",
            Some(r#"{"name":"Inbox Triage","mcp_servers":["gmail"," gmail ","gdrive"],"trigger":"scheduled","schedule":"0 9 * * *"}"#),
        );

        let spec = AgentRegistry::new(tmp.path())
            .load("inbox-triage")
            .await
            .unwrap();
        assert_eq!(spec.folder, "inbox-triage");
        assert_eq!(spec.mcp_servers, vec!["gmail", "gdrive"]);
        assert_eq!(spec.summary.name, "Inbox Triage");
        assert_eq!(spec.summary.description, "Sorts mail.");
        assert_eq!(spec.summary.trigger, Trigger::Scheduled);
        assert!(spec.bundle_dir.is_absolute());
    }

    #[tokio::test]
    async fn test_load_tolerates_malformed_config() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path(), "weekly-report", "Do the thing", Some("{not json"));

        let spec = AgentRegistry::new(tmp.path())
            .load("weekly-report")
            .await
            .unwrap();
        assert_eq!(spec.summary.name, "Weekly Report");
        assert!(spec.mcp_servers.is_empty());
        assert_eq!(spec.summary.trigger, Trigger::OnDemand);
    }

    #[tokio::test]
    async fn test_load_keeps_servers_when_trigger_is_unusual() {
        let tmp = TempDir::new().unwrap();
        write_bundle(
            tmp.path(),
            "mailer",
            "Send mail",
            Some(r#"{"name":"Mailer","trigger":{"type":"scheduled","description":"daily"},"mcp_servers":["gmail"]}"#),
        );
        write_bundle(
            tmp.path(),
            "manual-mailer",
            "Send mail",
            Some(r#"{"name":"Manual Mailer","trigger":"whenever","mcp_servers":["gmail"]}"#),
        );
        let registry = AgentRegistry::new(tmp.path());

        let spec = registry.load("mailer").await.unwrap();
        assert_eq!(spec.summary.name, "Mailer");
        assert_eq!(spec.mcp_servers, vec!["gmail"]);
        assert_eq!(spec.summary.trigger, Trigger::Scheduled);

        let spec = registry.load("manual-mailer").await.unwrap();
        assert_eq!(spec.summary.name, "Manual Mailer");
        assert_eq!(spec.mcp_servers, vec!["gmail"]);
        assert_eq!(spec.summary.trigger, Trigger::OnDemand);
    }

    #[tokio::test]
    async fn test_load_keeps_servers_when_one_field_has_wrong_type() {
        let tmp = TempDir::new().unwrap();
        write_bundle(
            tmp.path(),
            "reporter",
            "# Report\n\nWrites the report.\n",
            Some(r#"{"name":["not","a","string"],"schedule":5,"mcp_servers":["gdrive"]}"#),
        );

        let spec = AgentRegistry::new(tmp.path()).load("reporter").await.unwrap();
        assert_eq!(spec.summary.name, "Reporter");
        assert_eq!(spec.summary.schedule, None);
        assert_eq!(spec.mcp_servers, vec!["gdrive"]);
    }

    #[tokio::test]
    async fn test_load_rejects_empty_skill() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path(), "blank", "  \n", None);

        let err = AgentRegistry::new(tmp.path()).load("blank").await.unwrap_err();
        assert!(matches!(err, AgentError::SkillEmpty(_)));
    }

    #[tokio::test]
    async fn test_discover_skips_non_agents_and_sorts() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path(), "zeta", "# Z", None);
        write_bundle(tmp.path(), "alpha", "# A", None);
        write_bundle(tmp.path(), "templates", "# T", None);
        write_bundle(tmp.path(), ".hidden", "# H", None);
        std::fs::create_dir(tmp.path().join("empty-dir")).unwrap();

        let agents = AgentRegistry::new(tmp.path()).discover().await.unwrap();
        let folders: Vec<_> = agents.iter().map(|a| a.folder.as_str()).collect();
        assert_eq!(folders, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_title_from_folder() {
        assert_eq!(title_from_folder("weekly-report"), "Weekly Report");
        assert_eq!(title_from_folder("CRM sync"), "Crm Sync");
    }
}
