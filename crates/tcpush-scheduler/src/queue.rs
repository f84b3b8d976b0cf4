//! In-memory queue client.
//!
//! Records every submission instead of talking to a remote queue. Used for
//! dry runs and tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tcpush_core::ports::QueueClient;
use tcpush_core::{Error, Result, SlugId, TaskDefinition};

/// A task accepted by a [`MemoryQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedTask {
    pub task_id: SlugId,
    pub definition: TaskDefinition,
}

#[derive(Default)]
pub struct MemoryQueue {
    created: Mutex<Vec<CreatedTask>>,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any later submission of `task_id`.
    pub fn reject(&self, task_id: &str) {
        self.rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id.to_string());
    }

    /// Submissions accepted so far, in the order they completed.
    pub fn created(&self) -> Vec<CreatedTask> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.created.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn create_task(&self, task_id: &SlugId, definition: &TaskDefinition) -> Result<()> {
        let rejected = self
            .rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(task_id.as_str());
        if rejected {
            return Err(Error::Queue {
                task_id: task_id.to_string(),
                message: "rejected by queue".to_string(),
            });
        }

        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(CreatedTask {
                task_id: task_id.clone(),
                definition: definition.clone(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition() -> TaskDefinition {
        TaskDefinition::from_value(json!({
            "created": "2017-07-11T20:36:23.000Z",
            "deadline": "2017-07-12T20:36:23.000Z"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_records_submissions() {
        let queue = MemoryQueue::new();
        let id = SlugId::nice();
        queue.create_task(&id, &definition()).await.unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.created()[0].task_id, id);
    }

    #[tokio::test]
    async fn test_rejected_task() {
        let queue = MemoryQueue::new();
        let id = SlugId::nice();
        queue.reject(id.as_str());

        let err = queue.create_task(&id, &definition()).await.unwrap_err();
        assert!(matches!(err, Error::Queue { task_id, .. } if task_id == id.as_str()));
        assert!(queue.is_empty());
    }
}
