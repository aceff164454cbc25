//! Migration configuration
//!
//! Settings are layered, lowest precedence first:
//! 1. built-in defaults
//! 2. TOML file (`--config`, else `<config dir>/viewcopy/config.toml` when present)
//! 3. `VIEWCOPY_*` environment variables (a `.env` file is loaded first)
//! 4. command-line flags (applied by the CLI layer)

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::{DatasetRef, RetryConfig};

pub const DEFAULT_OUTPUT: &str = "create_views_ddl.sql";
pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Settings for one view migration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub source_project: String,
    pub source_dataset: String,
    /// Defaults to the source project
    pub destination_project: Option<String>,
    pub destination_dataset: String,
    /// Create-or-replace every view instead of skipping existing ones
    pub replace_existing: bool,
    /// Issue create calls; when false only the DDL script is produced
    pub execute: bool,
    /// DDL script path, overwritten on every run
    pub output: PathBuf,
    /// Also process views left over by a dependency cycle, after the ordered ones
    pub attempt_cyclic: bool,
    pub api: ApiConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_project: String::new(),
            source_dataset: String::new(),
            destination_project: None,
            destination_dataset: String::new(),
            replace_existing: false,
            execute: true,
            output: PathBuf::from(DEFAULT_OUTPUT),
            attempt_cyclic: false,
            api: ApiConfig::default(),
        }
    }
}

/// Connection settings for the warehouse API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// OAuth2 bearer token
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

/// Invalid or incomplete configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    InvalidIdentifier { key: &'static str, value: String },
    InvalidValue { key: String, value: String },
    SameLocation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing required setting '{}'", key),
            ConfigError::InvalidIdentifier { key, value } => {
                write!(f, "'{}' is not a valid identifier for '{}'", value, key)
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value '{}' for {}", value, key)
            }
            ConfigError::SameLocation(location) => {
                write!(f, "source and destination are both {}", location)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl MigrationConfig {
    /// Load defaults, the config file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Overlay `VIEWCOPY_*` variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VIEWCOPY_SOURCE_PROJECT") {
            self.source_project = v;
        }
        if let Some(v) = lookup("VIEWCOPY_SOURCE_DATASET") {
            self.source_dataset = v;
        }
        if let Some(v) = lookup("VIEWCOPY_DESTINATION_PROJECT") {
            self.destination_project = Some(v);
        }
        if let Some(v) = lookup("VIEWCOPY_DESTINATION_DATASET") {
            self.destination_dataset = v;
        }
        if let Some(v) = lookup("VIEWCOPY_REPLACE_EXISTING") {
            self.replace_existing = parse_bool("VIEWCOPY_REPLACE_EXISTING", &v)?;
        }
        if let Some(v) = lookup("VIEWCOPY_EXECUTE") {
            self.execute = parse_bool("VIEWCOPY_EXECUTE", &v)?;
        }
        if let Some(v) = lookup("VIEWCOPY_OUTPUT") {
            self.output = PathBuf::from(v);
        }
        if let Some(v) = lookup("VIEWCOPY_ATTEMPT_CYCLIC") {
            self.attempt_cyclic = parse_bool("VIEWCOPY_ATTEMPT_CYCLIC", &v)?;
        }
        if let Some(v) = lookup("VIEWCOPY_API_BASE_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = lookup("VIEWCOPY_ACCESS_TOKEN").or_else(|| lookup("GOOGLE_OAUTH_ACCESS_TOKEN")) {
            self.api.access_token = Some(v);
        }
        Ok(())
    }

    /// Check that a run can be attempted with these settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_source()?;
        if let Some(project) = &self.destination_project {
            check_project("destination_project", project)?;
        }
        check_identifier("destination_dataset", &self.destination_dataset)?;

        if self.source() == self.destination() {
            return Err(ConfigError::SameLocation(self.source().to_string()));
        }
        Ok(())
    }

    /// Only the source is needed to read and order views
    pub fn validate_source(&self) -> Result<(), ConfigError> {
        check_project("source_project", &self.source_project)?;
        check_identifier("source_dataset", &self.source_dataset)
    }

    pub fn source(&self) -> DatasetRef {
        DatasetRef::new(&self.source_project, &self.source_dataset)
    }

    pub fn destination(&self) -> DatasetRef {
        let project = self
            .destination_project
            .as_deref()
            .unwrap_or(&self.source_project);
        DatasetRef::new(project, &self.destination_dataset)
    }
}

/// `<config dir>/viewcopy/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("viewcopy").join("config.toml"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Project ids may be domain-scoped (`example.com:analytics`), so dots and
/// colons are allowed. They are escaped wherever they are spliced in.
fn check_project(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Missing(key));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidIdentifier {
            key,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Dataset ids are plain names; a dot would make `project.dataset.table`
/// ambiguous.
fn check_identifier(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Missing(key));
    }
    if value.contains('.') || value.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidIdentifier {
            key,
            value: value.to_string(),
        });
    }
    Ok(())
}
