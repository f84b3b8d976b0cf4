//! Push context: the validated set of values a graph template is rendered with.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

use crate::{Error, Result};

/// Domain appended to owners that are not already email addresses.
pub const NOREPLY_DOMAIN: &str = "noreply.mozilla.org";

const KNOWN_FIELDS: &[&str] = &[
    "owner",
    "source",
    "revision",
    "project",
    "level",
    "revision_hash",
    "comment",
    "pushlog_id",
    "url",
    "error",
    "pushdate",
];

/// Make sure an owner looks like an email address.
pub fn normalize_owner(owner: &str) -> String {
    if owner.contains('@') {
        owner.to_string()
    } else {
        format!("{}@{}", owner, NOREPLY_DOMAIN)
    }
}

/// Repository access level; configured either as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Level {
    Number(i64),
    Text(String),
}

impl Level {
    pub fn to_value(&self) -> Value {
        match self {
            Level::Number(n) => json!(n),
            Level::Text(s) => json!(s),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Number(n) => write!(f, "{}", n),
            Level::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Level {
    fn from(n: i64) -> Self {
        Level::Number(n)
    }
}

impl From<&str> for Level {
    fn from(s: &str) -> Self {
        Level::Text(s.to_string())
    }
}

/// Loosely typed template variables, as assembled by a caller.
///
/// Nothing is checked until [`PushContext::from_variables`] runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateVariables(Map<String, Value>);

impl TemplateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for TemplateVariables {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Validated, immutable context for one push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushContext {
    /// Owner email; bare user names get [`NOREPLY_DOMAIN`] appended.
    pub owner: String,
    /// File the graph was instantiated from.
    pub source: String,
    pub revision: String,
    pub project: String,
    pub level: Level,
    pub revision_hash: String,
    #[serde(default)]
    pub comment: String,
    pub pushlog_id: String,
    /// Repository url.
    pub url: String,
    /// Unix time of the push.
    #[serde(default)]
    pub pushdate: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PushContext {
    /// Validate loosely typed variables into a push context.
    ///
    /// Fails with [`Error::InvalidContext`] when a required field is missing,
    /// a field has the wrong type, or an unknown field is present.
    pub fn from_variables(vars: &TemplateVariables) -> Result<Self> {
        let map = vars.as_map();

        if let Some(unknown) = map.keys().find(|k| !KNOWN_FIELDS.contains(&k.as_str())) {
            return Err(Error::InvalidContext(format!(
                "\"{}\" is not allowed",
                unknown
            )));
        }

        let owner = required_string(map, "owner")?;

        Ok(Self {
            owner: normalize_owner(&owner),
            source: required_string(map, "source")?,
            revision: required_string(map, "revision")?,
            project: required_string(map, "project")?,
            level: required_level(map)?,
            revision_hash: required_string(map, "revision_hash")?,
            comment: optional_string(map, "comment")?.unwrap_or_default(),
            pushlog_id: required_string(map, "pushlog_id")?,
            url: required_string(map, "url")?,
            pushdate: optional_number(map, "pushdate")?,
            error: optional_string(map, "error")?,
        })
    }

    /// Copy of this context carrying an error message.
    pub fn with_error(&self, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..self.clone()
        }
    }

    /// Local part of the owner address.
    pub fn owner_local_part(&self) -> &str {
        self.owner.split('@').next().unwrap_or(&self.owner)
    }

    /// Scheduler id derived from the repository level.
    pub fn scheduler_id(&self) -> String {
        format!("gecko-level-{}", self.level)
    }
}

fn required_string(map: &Map<String, Value>, key: &str) -> Result<String> {
    match optional_string(map, key)? {
        None => Err(Error::InvalidContext(format!("\"{}\" is required", key))),
        Some(s) if s.is_empty() => Err(Error::InvalidContext(format!(
            "\"{}\" is not allowed to be empty",
            key
        ))),
        Some(s) => Ok(s),
    }
}

fn optional_string(map: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::InvalidContext(format!(
            "\"{}\" must be a string",
            key
        ))),
    }
}

fn optional_number(map: &Map<String, Value>, key: &str) -> Result<Option<i64>> {
    let invalid = || Error::InvalidContext(format!("\"{}\" must be a number", key));
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn required_level(map: &Map<String, Value>) -> Result<Level> {
    match map.get("level") {
        None => Err(Error::InvalidContext("\"level\" is required".to_string())),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Level::Number)
            .ok_or_else(|| Error::InvalidContext("\"level\" must be an integer".to_string())),
        Some(Value::String(s)) if s.is_empty() => Err(Error::InvalidContext(
            "\"level\" is not allowed to be empty".to_string(),
        )),
        Some(Value::String(s)) => Ok(Level::Text(s.clone())),
        Some(_) => Err(Error::InvalidContext(
            "\"level\" must be a number or a string".to_string(),
        )),
    }
}
