//! Port traits for the collaborators of the scheduler.
//!
//! Transport is left to the implementations: the scheduler only sees these
//! traits.

use crate::events::Push;
use crate::ids::SlugId;
use crate::task::TaskDefinition;
use crate::Result;
use async_trait::async_trait;

/// Client for the execution queue.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Create a task. Each call is independent of the others.
    async fn create_task(&self, task_id: &SlugId, definition: &TaskDefinition) -> Result<()>;
}

/// Read access to a repository pushlog.
#[async_trait]
pub trait PushlogClient: Send + Sync {
    /// Fetch a single push by id.
    async fn get_one(&self, repo_url: &str, pushlog_id: u64) -> Result<Push>;
}

/// Retrieves graph template sources.
#[async_trait]
pub trait GraphFetcher: Send + Sync {
    /// Fetch the template text at `url`.
    ///
    /// Returns [`crate::Error::GraphNotFound`] when nothing exists at `url`.
    async fn fetch_graph(&self, url: &str) -> Result<String>;
}
