use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{mlog_debug, Error, Result};

pub const DEFAULT_MAX_PARALLEL_TASKS: usize = 4;
pub const DEFAULT_DURATION_MINUTES: u32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Global ceiling on concurrently assigned or running tasks.
    #[serde(default = "default_max_parallel")]
    pub max_parallel_tasks: usize,
    /// Duration given to tasks whose line carries no duration marker.
    #[serde(default = "default_duration")]
    pub default_duration_minutes: u32,
    /// Chain non-parallel tasks to their section predecessor.
    #[serde(default)]
    pub implicit_sequencing: bool,
    /// Agent type -> keywords that agent type is good at.
    #[serde(default = "default_specialties")]
    pub specialties: BTreeMap<String, Vec<String>>,
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL_TASKS
}

fn default_duration() -> u32 {
    DEFAULT_DURATION_MINUTES
}

fn default_specialties() -> BTreeMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        ("coder", &["implement", "code", "build", "feature", "refactor", "api", "fix"]),
        ("tester", &["test", "tests", "qa", "verify", "validate", "coverage"]),
        ("reviewer", &["review", "audit", "inspect", "check"]),
        ("researcher", &["research", "investigate", "analyze", "explore", "spike"]),
        ("architect", &["design", "architecture", "schema", "model", "plan"]),
        ("documenter", &["docs", "document", "documentation", "readme", "guide"]),
        ("devops", &["deploy", "infra", "ci", "pipeline", "docker", "release"]),
    ];
    table
        .iter()
        .map(|(agent, words)| {
            (
                agent.to_string(),
                words.iter().map(|w| w.to_string()).collect(),
            )
        })
        .collect()
}

/// Case-insensitive lookup of an agent type in a specialty table.
pub fn specialty_keywords<'a>(
    specialties: &'a BTreeMap<String, Vec<String>>,
    agent_type: &str,
) -> &'a [String] {
    specialties
        .get(&agent_type.to_lowercase())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_parallel_tasks: DEFAULT_MAX_PARALLEL_TASKS,
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
            implicit_sequencing: false,
            specialties: default_specialties(),
        }
    }
}

impl Config {
    pub fn maestro_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".maestro"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::maestro_dir()?.join("maestro.toml"))
    }

    /// Specialty keywords for an agent type, empty when the type is unknown.
    pub fn specialty_keywords(&self, agent_type: &str) -> &[String] {
        specialty_keywords(&self.specialties, agent_type)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            mlog_debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        mlog_debug!("Config::from_path path={}", path.display());
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        if config.max_parallel_tasks == 0 {
            return Err(Error::Validation(
                "max_parallel_tasks must be at least 1".to_string(),
            ));
        }
        mlog_debug!(
            "Config loaded: max_parallel_tasks={}, default_duration_minutes={}, implicit_sequencing={}",
            config.max_parallel_tasks,
            config.default_duration_minutes,
            config.implicit_sequencing
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::maestro_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        mlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
