use serde::{Deserialize, Serialize};

use crate::model::{parent_path, MAIN_PATH};

/// A named line of revision history in a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub path: String,
    pub name: String,
    pub parent_path: Option<String>,
    /// Point of the parent's history this branch was forked from.
    pub base_timestamp: i64,
    /// Timestamp of the latest commit on this branch.
    pub head_timestamp: i64,
    pub created_at: String, // ISO 8601 timestamp
    pub deleted: bool,
}

impl Branch {
    pub fn new_main_branch(timestamp: i64) -> Self {
        Self {
            path: MAIN_PATH.to_string(),
            name: MAIN_PATH.to_string(),
            parent_path: None,
            base_timestamp: timestamp,
            head_timestamp: timestamp,
            created_at: chrono::Utc::now().to_rfc3339(),
            deleted: false,
        }
    }

    pub fn new_from_branch(parent: &Branch, name: &str, timestamp: i64) -> Self {
        Self {
            path: crate::model::branch_path(&parent.path, name),
            name: name.to_string(),
            parent_path: Some(parent.path.clone()),
            base_timestamp: timestamp,
            head_timestamp: timestamp,
            created_at: chrono::Utc::now().to_rfc3339(),
            deleted: false,
        }
    }

    pub fn is_main(&self) -> bool {
        self.parent_path.is_none()
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent_path.as_deref().or_else(|| parent_path(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_branch_paths() {
        let main = Branch::new_main_branch(1);
        assert!(main.is_main());
        assert_eq!(main.parent(), None);

        let child = Branch::new_from_branch(&main, "SNOMEDCT", 5);
        assert_eq!(child.path, "MAIN/SNOMEDCT");
        assert_eq!(child.parent(), Some("MAIN"));
        assert_eq!(child.base_timestamp, 5);
        assert!(!child.deleted);
    }
}
