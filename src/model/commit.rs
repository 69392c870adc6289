use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Id, NO_COMMIT_TIMESTAMP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// A single document write staged for a commit. `value` is `None` for removals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub kind: ChangeKind,
    pub doc_type: String,
    pub id: Id,
    pub value: Option<Value>,
}

impl Change {
    pub fn added(doc_type: &str, id: &str, value: Value) -> Self {
        Self {
            kind: ChangeKind::Added,
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            value: Some(value),
        }
    }

    pub fn changed(doc_type: &str, id: &str, value: Value) -> Self {
        Self {
            kind: ChangeKind::Changed,
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            value: Some(value),
        }
    }

    pub fn removed(doc_type: &str, id: &str) -> Self {
        Self {
            kind: ChangeKind::Removed,
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            value: None,
        }
    }
}

/// Commit creation request handed to the revision store
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub author: String,
    pub message: String,
    pub changes: Vec<Change>,
}

/// An atomic, timestamped batch of writes applied to a branch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    /// SHA-256 hash of the commit content
    pub hash: String,
    pub branch_path: String,
    /// Previous commit on the same branch (None for the first one)
    pub parent_hash: Option<String>,
    /// Monotonic commit timestamp, unique across the store
    pub timestamp: i64,
    pub author: String,
    pub message: String,
    pub created_at: String, // ISO 8601 string

    /// Compressed change set
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Uncompressed size for monitoring
    pub data_size: usize,

    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

impl Commit {
    pub fn new(
        branch_path: &str,
        parent_hash: Option<String>,
        timestamp: i64,
        commit: &NewCommit,
    ) -> anyhow::Result<Self> {
        let serialized = serde_json::to_string(&commit.changes)?;
        let data = Self::compress_data(serialized.as_bytes())?;
        let hash = Self::calculate_hash(
            branch_path,
            parent_hash.as_deref(),
            timestamp,
            &serialized,
            &commit.author,
            &commit.message,
        );
        let count = |kind: ChangeKind| commit.changes.iter().filter(|change| change.kind == kind).count();

        Ok(Self {
            hash,
            branch_path: branch_path.to_string(),
            parent_hash,
            timestamp,
            author: commit.author.clone(),
            message: commit.message.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            data,
            data_size: serialized.len(),
            added: count(ChangeKind::Added),
            changed: count(ChangeKind::Changed),
            removed: count(ChangeKind::Removed),
        })
    }

    fn calculate_hash(
        branch_path: &str,
        parent_hash: Option<&str>,
        timestamp: i64,
        data: &str,
        author: &str,
        message: &str,
    ) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(format!("branch:{}\n", branch_path));
        if let Some(parent) = parent_hash {
            hasher.update(format!("parent:{}\n", parent));
        }
        hasher.update(format!("timestamp:{}\n", timestamp));
        hasher.update(format!("author:{}\n", author));
        hasher.update(format!("message:{}\n", message));
        hasher.update(format!("data:{}\n", data));

        hex::encode(hasher.finalize())
    }

    fn compress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }

    /// Decompress and deserialize the change set of this commit
    pub fn changes(&self) -> anyhow::Result<Vec<Change>> {
        let decompressed = Self::decompress_data(&self.data)?;
        Ok(serde_json::from_slice(&decompressed)?)
    }
}

/// Outcome of a transactional request: the commit timestamp and the wrapped result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult<R> {
    pub commit_timestamp: i64,
    pub result: R,
}

impl<R> CommitResult<R> {
    pub fn new(commit: Option<&Commit>, result: R) -> Self {
        Self {
            commit_timestamp: commit.map_or(NO_COMMIT_TIMESTAMP, |commit| commit.timestamp),
            result,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.commit_timestamp != NO_COMMIT_TIMESTAMP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_set_survives_compression() {
        let new_commit = NewCommit {
            author: "alice".to_string(),
            message: "Create resources".to_string(),
            changes: vec![
                Change::added("resource", "a", json!({"id": "a"})),
                Change::removed("resource", "b"),
            ],
        };
        let commit = Commit::new("MAIN", None, 42, &new_commit).unwrap();

        assert_eq!(commit.added, 1);
        assert_eq!(commit.removed, 1);
        assert_eq!(commit.hash.len(), 64);
        assert_eq!(commit.changes().unwrap(), new_commit.changes);
    }

    #[test]
    fn commit_result_without_commit() {
        let result = CommitResult::new(None, true);
        assert_eq!(result.commit_timestamp, NO_COMMIT_TIMESTAMP);
        assert!(!result.is_committed());
    }
}
