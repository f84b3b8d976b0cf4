//! Try configuration: graph locations, the error task and the project
//! registry.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::BTreeMap;
use std::path::Path;
use tcpush_core::{Error, Level, PushContext, Result, SlugCache, TemplateVariables};
use tcpush_template::Instantiator;

use crate::error_task::build_error_task;

const DEFAULT_CONFIG: &str = include_str!("../config/default.yml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryConfig {
    /// Template for the revision-pinned graph url. Variables: `url`,
    /// `revision`, `project`.
    pub tc_yaml_url: String,
    /// Graph url used when a repository has none.
    pub default_url: String,
    /// Version 0 graph template for the error task.
    pub error_task: String,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Repository url template. Variables: `host`.
    pub url: String,
    pub level: Level,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TryConfig {
    /// The built-in configuration, with no projects.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str("{}")
    }

    /// Overlay `text` on the built-in configuration.
    ///
    /// Top-level keys replace the built-in ones, except `projects`, which is
    /// merged by alias.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut merged = parse_mapping(DEFAULT_CONFIG, "built-in configuration")?;
        let overlay = parse_mapping(text, "configuration")?;

        for (key, value) in overlay {
            if key.as_str() == Some("projects")
                && let (Some(YamlValue::Mapping(base)), YamlValue::Mapping(extra)) =
                    (merged.get_mut(&key), &value)
            {
                base.extend(extra.clone());
                continue;
            }
            merged.insert(key, value);
        }

        serde_yaml::from_value(YamlValue::Mapping(merged))
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file overlaid on the built-in configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    pub fn project(&self, alias: &str) -> Result<&ProjectConfig> {
        self.projects
            .get(alias)
            .ok_or_else(|| Error::UnknownProject(alias.to_string()))
    }

    /// Check the configuration is usable.
    ///
    /// Templates must be non-empty, every project needs a url, and the error
    /// task must build for a sample push.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("tcYamlUrl", &self.tc_yaml_url),
            ("defaultUrl", &self.default_url),
            ("errorTask", &self.error_task),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
        }

        for (alias, project) in &self.projects {
            if project.url.trim().is_empty() {
                return Err(Error::Config(format!("project {} has no url", alias)));
            }
        }

        let mut slugs = SlugCache::new();
        build_error_task(
            &Instantiator::new(),
            &self.error_task,
            &sample_context()?,
            "sample error",
            &mut slugs,
            Utc::now(),
        )
        .map_err(|e| Error::Config(format!("errorTask: {}", e)))?;

        Ok(())
    }
}

fn parse_mapping(text: &str, what: &str) -> Result<Mapping> {
    match serde_yaml::from_str(text) {
        Ok(YamlValue::Mapping(map)) => Ok(map),
        Ok(YamlValue::Null) => Ok(Mapping::new()),
        Ok(_) => Err(Error::Config(format!("{} must be a mapping", what))),
        Err(e) => Err(Error::Config(format!("{}: {}", what, e))),
    }
}

fn sample_context() -> Result<PushContext> {
    let vars = TemplateVariables::new()
        .set("owner", "sample@example.com")
        .set("source", "https://example.com/raw-file/0/.taskcluster.yml")
        .set("revision", "0000000000000000000000000000000000000000")
        .set("project", "sample")
        .set("level", 1)
        .set("revision_hash", "0000000000000000000000000000000000000000")
        .set("pushlog_id", "1")
        .set("url", "https://example.com");
    PushContext::from_variables(&vars)
}
