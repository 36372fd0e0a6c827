//! Configuration handling for Strata CLI
//!
//! Configuration is stored in `.strata/config.toml` (project) and
//! `~/.config/strata/config.toml` (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Model settings used when a project is initialized
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Name written to a fresh manifest
    pub name: String,

    /// Version written to a fresh manifest
    pub version: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "architecture".to_string(),
            version: "0.1.0".to_string(),
        }
    }
}

/// Changeset commit policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChangesetConfig {
    /// Validate the projected model before committing
    pub validate_on_commit: bool,

    /// Refuse to commit onto a model that drifted from the base snapshot
    pub require_clean_base: bool,
}

impl Default for ChangesetConfig {
    fn default() -> Self {
        Self {
            validate_on_commit: true,
            require_clean_base: true,
        }
    }
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProjectConfig {
    pub model: ModelConfig,

    pub changesets: ChangesetConfig,
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,

    /// Log line format
    pub log_format: LogFormat,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Log line format on stderr
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let project_root = Self::find_project_root();
        let project = match &project_root {
            Some(root) => Self::load_project_config(root)?,
            None => ProjectConfig::default(),
        };

        Ok(Self {
            project,
            global,
            project_root,
        })
    }

    /// Loads configuration for a specific project
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(project_root)?;

        Ok(Self {
            project,
            global,
            project_root: Some(project_root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "strata", "strata-cli")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(".strata").join("config.toml");

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project config")
    }

    /// Finds the project root by looking for a `.strata/` directory
    pub fn find_project_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_project_root_from(&current)
    }

    /// Walks up from `start` looking for a `.strata/` directory
    pub fn find_project_root_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(".strata").is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Returns the project root, or an error if not in a project
    pub fn require_project_root(&self) -> Result<&Path> {
        self.project_root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not in a strata project. Run 'strata init' first."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = ProjectConfig::default();
        assert!(config.changesets.validate_on_commit);
        assert!(config.changesets.require_clean_base);
        assert_eq!(config.model.name, "architecture");
        assert_eq!(GlobalConfig::default().default_format, OutputFormat::Text);
    }

    #[test]
    fn parse_project_config() {
        let toml = r#"
[model]
name = "shop"

[changesets]
validate_on_commit = false
"#;

        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.model.name, "shop");
        assert_eq!(config.model.version, "0.1.0");
        assert!(!config.changesets.validate_on_commit);
        assert!(config.changesets.require_clean_base);
    }

    #[test]
    fn parse_global_config() {
        let toml = r#"
default_format = "json"
log_format = "json"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.default_format, OutputFormat::Json);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn find_project_root_walks_up() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".strata")).unwrap();

        let sub_dir = dir.path().join("sub").join("dir");
        fs::create_dir_all(&sub_dir).unwrap();

        let root = Config::find_project_root_from(&sub_dir);
        assert_eq!(root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn project_config_from_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".strata")).unwrap();
        fs::write(
            dir.path().join(".strata").join("config.toml"),
            "[changesets]\nrequire_clean_base = false\n",
        )
        .unwrap();

        let config = Config::for_project(dir.path()).unwrap();
        assert!(!config.project.changesets.require_clean_base);
        assert!(config.require_project_root().is_ok());
    }

    #[test]
    fn config_not_in_project() {
        let config = Config {
            project: ProjectConfig::default(),
            global: GlobalConfig::default(),
            project_root: None,
        };

        assert!(config.require_project_root().is_err());
    }

    #[test]
    fn malformed_project_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".strata")).unwrap();
        fs::write(dir.path().join(".strata").join("config.toml"), "[changesets\n").unwrap();

        assert!(Config::for_project(dir.path()).is_err());
    }
}
