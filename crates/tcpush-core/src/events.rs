//! Push events and pushlog records.

use serde::{Deserialize, Serialize};

/// A push observed on a repository, as delivered to the push job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub revision_hash: String,
    pub pushref: PushRef,
    pub repo: RepoRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRef {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Project alias used to look up the project configuration.
    pub alias: String,
    pub url: String,
}

/// One entry of a repository's pushlog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Push {
    pub id: u64,
    /// User that pushed.
    pub user: String,
    /// Unix time of the push.
    #[serde(default)]
    pub date: Option<i64>,
    pub changesets: Vec<Changeset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    pub node: String,
    pub desc: String,
}

impl Push {
    /// The changeset at the tip of the push.
    pub fn tip(&self) -> Option<&Changeset> {
        self.changesets.last()
    }
}
