use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{Branch, Commit, NewCommit};
use crate::store::{Aggregation, AggregationQuery, Hits, KnnQuery, Query};

/// A document type kept in a revision store.
pub trait Doc: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Document type name, partitions the documents of a branch.
    const TYPE: &'static str;

    fn id(&self) -> &str;
}

/// Typed store failures that callers translate into domain errors.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Branch '{0}' does not exist.")]
    BranchNotFound(String),
    #[error("Branch '{0}' already exists.")]
    BranchExists(String),
    #[error("{0}")]
    BadQuery(String),
}

/// Point of a branch's history a read observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPoint {
    /// Consistent snapshot at a commit timestamp.
    At(i64),
    /// Latest committed state at the time of each call.
    Head,
}

impl ReadPoint {
    pub fn timestamp(&self) -> i64 {
        match self {
            ReadPoint::At(timestamp) => *timestamp,
            ReadPoint::Head => i64::MAX,
        }
    }
}

#[async_trait::async_trait]
pub trait BranchStore: Send + Sync {
    async fn create_branch(&self, parent_path: &str, name: &str) -> Result<Branch>;
    async fn get_branch(&self, path: &str) -> Result<Option<Branch>>;
    async fn list_branches(&self) -> Result<Vec<Branch>>;
    /// Soft delete: the branch is flagged and keeps its content.
    async fn delete_branch(&self, path: &str) -> Result<Branch>;
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, branch_path: &str, read: ReadPoint, doc_type: &str, id: &str) -> Result<Option<Value>>;
    async fn search(&self, branch_path: &str, read: ReadPoint, query: &Query) -> Result<Hits<Value>>;
    async fn knn(&self, branch_path: &str, read: ReadPoint, query: &KnnQuery) -> Result<Hits<Value>>;
    async fn aggregate(&self, branch_path: &str, read: ReadPoint, query: &AggregationQuery) -> Result<Aggregation>;
}

#[async_trait::async_trait]
pub trait CommitStore: Send + Sync {
    /// Applies the change set atomically under a fresh timestamp.
    async fn commit(&self, branch_path: &str, commit: NewCommit) -> Result<Commit>;
    async fn list_commits(&self, branch_path: &str) -> Result<Vec<Commit>>;
    /// Timestamp of the latest commit or branch operation across the store
    fn current_timestamp(&self) -> i64;
}

pub trait RevisionStore: BranchStore + DocumentStore + CommitStore + Send + Sync {}

impl<T: BranchStore + DocumentStore + CommitStore + Send + Sync> RevisionStore for T {}
