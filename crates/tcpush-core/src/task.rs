//! Task definitions submitted to the execution queue.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// A concrete task, serialized as the queue expects it.
///
/// Fields the scheduler does not interpret are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_type: Option<String>,
    pub created: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: TaskMetadata,
    #[serde(default)]
    pub payload: TaskPayload,
    #[serde(default)]
    pub routes: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

/// Human readable description of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Worker payload. Only the commonly used fields are typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, Value>>,
    /// Cache name to mount point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_run_time: Option<u64>,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

impl TaskDefinition {
    /// Build a definition from a structured value produced by a graph.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::InvalidTask(e.to_string()))
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Set an environment variable on the payload.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload
            .env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
    }

    /// Add scopes that are not already present, keeping order.
    pub fn merge_scopes<'a>(&mut self, scopes: impl IntoIterator<Item = &'a String>) {
        for scope in scopes {
            if !self.scopes.contains(scope) {
                self.scopes.push(scope.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "created": "2017-07-11T20:36:23.000Z",
            "deadline": "2017-07-12T20:36:23.000Z",
            "expires": "2018-07-11T20:36:23.000Z",
            "metadata": {"source": "https://example.com/.taskcluster.yml"},
            "payload": {
                "cache": {"level-7-checkouts": "/home/worker/checkouts"},
                "command": ["bash", "--help"],
                "env": {"GECKO_HEAD_REV": "abc"},
                "features": {"taskclusterProxy": true}
            },
            "routes": ["tc-treeherder.mine.abc"],
            "tags": {"createdForUser": "ffxbld@noreply.mozilla.org"},
            "priority": "lowest"
        })
    }

    #[test]
    fn test_from_value_keeps_unknown_fields() {
        let task = TaskDefinition::from_value(sample()).unwrap();
        assert_eq!(task.extra.get("priority"), Some(&json!("lowest")));
        assert_eq!(
            task.payload.extra.get("features"),
            Some(&json!({"taskclusterProxy": true}))
        );
        assert!(task.scopes.is_empty());

        let value = task.to_value().unwrap();
        assert_eq!(value["priority"], json!("lowest"));
        assert_eq!(value["metadata"], json!({"source": "https://example.com/.taskcluster.yml"}));
        assert!(value.get("taskGroupId").is_none());
    }

    #[test]
    fn test_missing_deadline_is_invalid() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("deadline");
        assert!(matches!(
            TaskDefinition::from_value(value),
            Err(Error::InvalidTask(_))
        ));
    }

    #[test]
    fn test_merge_scopes_dedupes() {
        let mut task = TaskDefinition::from_value(sample()).unwrap();
        task.scopes = vec!["a".into()];
        task.merge_scopes(&["a".to_string(), "b".to_string()]);
        assert_eq!(task.scopes, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_set_env() {
        let mut task = TaskDefinition::from_value(sample()).unwrap();
        task.set_env("ERROR_MSG", "boom");
        let env = task.payload.env.unwrap();
        assert_eq!(env["ERROR_MSG"], json!("boom"));
        assert_eq!(env["GECKO_HEAD_REV"], json!("abc"));
    }
}
