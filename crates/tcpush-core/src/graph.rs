//! Rendered task graphs.
//!
//! A graph declares its schema version. Version 0 lists fully substituted
//! tasks; version 1 carries an expression document that evaluates to the
//! task list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum RenderedGraph {
    V0(GraphV0),
    V1(GraphV1),
}

/// A version 0 graph: explicit `{taskId, task}` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphV0 {
    #[serde(default)]
    pub scopes: Vec<String>,
    pub tasks: Vec<GraphTaskEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphTaskEntry {
    #[serde(default)]
    pub task_id: Option<String>,
    pub task: Map<String, Value>,
}

/// A version 1 graph: `tasks` is evaluated against the push and repository.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphV1 {
    pub tasks: Value,
}

impl RenderedGraph {
    /// Interpret a parsed document as a graph, dispatching on `version`.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut doc = match value {
            Value::Object(map) => map,
            other => {
                return Err(Error::GraphParse(format!(
                    "graph must be a mapping, got {}",
                    kind_of(&other)
                )));
            }
        };

        match doc.get("version").and_then(Value::as_u64) {
            Some(0) => {
                if !doc.get("tasks").is_some_and(Value::is_array) {
                    return Err(Error::GraphParse(
                        "version 0 graph has no tasks list".to_string(),
                    ));
                }
                let graph: GraphV0 = serde_json::from_value(Value::Object(doc))
                    .map_err(|e| Error::GraphParse(e.to_string()))?;
                Ok(RenderedGraph::V0(graph))
            }
            Some(1) => {
                let tasks = doc.remove("tasks").ok_or_else(|| {
                    Error::GraphParse("version 1 graph has no tasks".to_string())
                })?;
                Ok(RenderedGraph::V1(GraphV1 { tasks }))
            }
            _ => Err(Error::UnsupportedVersion(
                doc.get("version")
                    .map(Value::to_string)
                    .unwrap_or_else(|| "missing".to_string()),
            )),
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            RenderedGraph::V0(_) => 0,
            RenderedGraph::V1(_) => 1,
        }
    }
}

/// Read the declared version of a document without interpreting the rest.
pub fn declared_version(value: &Value) -> Option<u64> {
    value.get("version").and_then(Value::as_u64)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
