use anyhow::{bail, Context, Result};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::model::{
    is_valid_branch_segment, now_millis, Branch, ChangeKind, Commit, NewCommit, MAIN_PATH,
};
use crate::store::query::{
    bucket_key, compare_sort_values, cosine_similarity, decode_search_after, encode_search_after,
    project, sort_values, values_at, vector_at,
};
use crate::store::{
    Aggregation, AggregationQuery, BranchStore, CommitStore, DocumentStore, Hit, Hits, IndexError,
    KnnQuery, Query, ReadPoint,
};

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

#[derive(Debug, Clone)]
struct Revision {
    timestamp: i64,
    /// `None` marks a removal.
    value: Option<Arc<Value>>,
}

#[derive(Debug)]
struct BranchState {
    branch: Branch,
    /// doc type -> id -> revisions in commit order
    documents: HashMap<String, HashMap<String, Vec<Revision>>>,
    commits: Vec<Commit>,
}

impl BranchState {
    fn new(branch: Branch) -> Self {
        Self {
            branch,
            documents: HashMap::new(),
            commits: Vec::new(),
        }
    }

    fn revision_at(&self, doc_type: &str, id: &str, timestamp: i64) -> Option<&Revision> {
        self.documents
            .get(doc_type)?
            .get(id)?
            .iter()
            .rev()
            .find(|revision| revision.timestamp <= timestamp)
    }
}

/// Revision store keeping every branch and document revision in memory.
///
/// Reads at a timestamp see the latest revision at or before it on the branch,
/// and fall back to the parent branch as it was when the branch was forked.
pub struct MemoryRevisionStore {
    branches: RwLock<HashMap<String, BranchState>>,
    clock: Mutex<i64>,
}

impl Default for MemoryRevisionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRevisionStore {
    pub fn new() -> Self {
        let timestamp = now_millis();
        let main = Branch::new_main_branch(timestamp);
        let mut branches = HashMap::new();
        branches.insert(main.path.clone(), BranchState::new(main));
        Self {
            branches: RwLock::new(branches),
            clock: Mutex::new(timestamp),
        }
    }

    /// Next store-wide timestamp, strictly greater than every previous one
    fn tick(&self) -> i64 {
        let mut last = self.clock.lock();
        let next = (*last + 1).max(now_millis());
        *last = next;
        next
    }

    fn read(
        branches: &HashMap<String, BranchState>,
        path: &str,
        timestamp: i64,
        doc_type: &str,
        id: &str,
    ) -> Option<Arc<Value>> {
        let mut current = branches.get(path)?;
        let mut timestamp = timestamp;
        loop {
            if let Some(revision) = current.revision_at(doc_type, id, timestamp) {
                return revision.value.clone();
            }
            let parent = current.branch.parent()?;
            timestamp = timestamp.min(current.branch.base_timestamp);
            current = branches.get(parent)?;
        }
    }

    /// Every live document of a type visible on the branch at the timestamp.
    fn visible(
        branches: &HashMap<String, BranchState>,
        path: &str,
        timestamp: i64,
        doc_type: &str,
    ) -> Result<Vec<(String, Arc<Value>)>> {
        let mut current = branches
            .get(path)
            .ok_or_else(|| IndexError::BranchNotFound(path.to_string()))?;
        let mut timestamp = timestamp;
        let mut seen = HashSet::new();
        let mut documents = Vec::new();

        loop {
            if let Some(by_id) = current.documents.get(doc_type) {
                for id in by_id.keys() {
                    if seen.contains(id) {
                        continue;
                    }
                    if let Some(revision) = current.revision_at(doc_type, id, timestamp) {
                        seen.insert(id.clone());
                        if let Some(value) = &revision.value {
                            documents.push((id.clone(), value.clone()));
                        }
                    }
                }
            }

            let Some(parent) = current.branch.parent() else {
                break;
            };
            timestamp = timestamp.min(current.branch.base_timestamp);
            match branches.get(parent) {
                Some(state) => current = state,
                None => break,
            }
        }

        Ok(documents)
    }

    fn ensure_branch<'a>(
        branches: &'a HashMap<String, BranchState>,
        path: &str,
    ) -> Result<&'a BranchState> {
        Ok(branches
            .get(path)
            .ok_or_else(|| IndexError::BranchNotFound(path.to_string()))?)
    }

    fn stamp(value: &mut Value, timestamp: i64) {
        if let Value::Object(map) = value {
            for field in [CREATED_AT, UPDATED_AT] {
                if map.get(field).map_or(true, Value::is_null) {
                    map.insert(field.to_string(), Value::from(timestamp));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl BranchStore for MemoryRevisionStore {
    async fn create_branch(&self, parent_path: &str, name: &str) -> Result<Branch> {
        if !is_valid_branch_segment(name) {
            return Err(IndexError::BadQuery(format!("Invalid branch name '{}'.", name)).into());
        }

        let mut branches = self.branches.write();
        let parent = match branches.get(parent_path) {
            Some(state) if !state.branch.deleted => state.branch.clone(),
            _ => return Err(IndexError::BranchNotFound(parent_path.to_string()).into()),
        };
        let path = crate::model::branch_path(parent_path, name);
        if branches.get(&path).map_or(false, |state| !state.branch.deleted) {
            return Err(IndexError::BranchExists(path).into());
        }

        // a deleted branch is reopened with fresh content
        let branch = Branch::new_from_branch(&parent, name, self.tick());
        branches.insert(path, BranchState::new(branch.clone()));
        log::info!("Created branch {}", branch.path);
        Ok(branch)
    }

    async fn get_branch(&self, path: &str) -> Result<Option<Branch>> {
        Ok(self.branches.read().get(path).map(|state| state.branch.clone()))
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        let mut branches: Vec<Branch> = self
            .branches
            .read()
            .values()
            .map(|state| state.branch.clone())
            .collect();
        branches.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(branches)
    }

    async fn delete_branch(&self, path: &str) -> Result<Branch> {
        if path == MAIN_PATH {
            bail!("Branch {} cannot be deleted", MAIN_PATH);
        }
        let mut branches = self.branches.write();
        let state = branches
            .get_mut(path)
            .ok_or_else(|| IndexError::BranchNotFound(path.to_string()))?;
        state.branch.deleted = true;
        log::info!("Deleted branch {}", path);
        Ok(state.branch.clone())
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryRevisionStore {
    async fn get(&self, branch_path: &str, read: ReadPoint, doc_type: &str, id: &str) -> Result<Option<Value>> {
        let branches = self.branches.read();
        Self::ensure_branch(&branches, branch_path)?;
        Ok(Self::read(&branches, branch_path, read.timestamp(), doc_type, id)
            .map(|value| value.as_ref().clone()))
    }

    async fn search(&self, branch_path: &str, read: ReadPoint, query: &Query) -> Result<Hits<Value>> {
        query.expression.validate()?;
        let after = query
            .search_after
            .as_deref()
            .map(decode_search_after)
            .transpose()?;

        let branches = self.branches.read();
        let documents = Self::visible(&branches, branch_path, read.timestamp(), &query.doc_type)?;

        let mut matches: Vec<(Vec<Value>, String, Arc<Value>, f32)> = documents
            .into_iter()
            .filter_map(|(id, value)| {
                let score = query.expression.evaluate(&value)?;
                let keys = sort_values(&query.sort, &value, &id, score);
                Some((keys, id, value, score))
            })
            .collect();
        drop(branches);

        matches.sort_by(|left, right| compare_sort_values(&query.sort, &left.0, &right.0));
        let total = matches.len();

        let start = match &after {
            Some(after) => matches
                .iter()
                .position(|(keys, ..)| compare_sort_values(&query.sort, keys, after).is_gt())
                .unwrap_or(total),
            None => 0,
        };

        let with_scores = query.track_scores || query.sort.iter().any(|sort| sort.is_score());
        let page: Vec<_> = matches.into_iter().skip(start).take(query.limit).collect();
        let search_after = page.last().map(|(keys, ..)| encode_search_after(keys));
        let hits = page
            .into_iter()
            .map(|(_, id, value, score)| Hit {
                value: project(&value, &query.fields),
                id,
                score: with_scores.then_some(score),
            })
            .collect();

        Ok(Hits {
            hits,
            total,
            limit: query.limit,
            search_after,
        })
    }

    async fn knn(&self, branch_path: &str, read: ReadPoint, query: &KnnQuery) -> Result<Hits<Value>> {
        query.filter.validate()?;
        let branches = self.branches.read();
        let documents = Self::visible(&branches, branch_path, read.timestamp(), &query.doc_type)?;
        drop(branches);

        let mut candidates = Vec::new();
        for (id, value) in documents {
            if query.filter.evaluate(&value).is_none() {
                continue;
            }
            let Some(vector) = vector_at(&value, &query.field) else {
                continue;
            };
            let similarity = cosine_similarity(&query.query_vector, &vector).ok_or_else(|| {
                IndexError::BadQuery(format!(
                    "Query vector has {} dimensions, field '{}' of '{}' has {}.",
                    query.query_vector.len(),
                    query.field,
                    id,
                    vector.len()
                ))
            })?;
            if query.similarity.map_or(true, |threshold| similarity >= threshold) {
                candidates.push((id, value, similarity));
            }
        }

        candidates.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(query.num_candidates.min(query.k));
        let total = candidates.len();

        let hits = candidates
            .into_iter()
            .map(|(id, value, similarity)| Hit {
                value: project(&value, &query.fields),
                id,
                score: Some(similarity),
            })
            .collect();

        Ok(Hits {
            hits,
            total,
            limit: query.k,
            search_after: None,
        })
    }

    async fn aggregate(&self, branch_path: &str, read: ReadPoint, query: &AggregationQuery) -> Result<Aggregation> {
        query.filter.validate()?;
        let branches = self.branches.read();
        let documents = Self::visible(&branches, branch_path, read.timestamp(), &query.doc_type)?;

        let mut aggregation = Aggregation::default();
        for (_, value) in documents {
            if query.filter.evaluate(&value).is_none() {
                continue;
            }
            for bucket in values_at(&value, &query.field) {
                *aggregation.buckets.entry(bucket_key(bucket)).or_insert(0) += 1;
            }
        }
        Ok(aggregation)
    }
}

#[async_trait::async_trait]
impl CommitStore for MemoryRevisionStore {
    async fn commit(&self, branch_path: &str, commit: NewCommit) -> Result<Commit> {
        let mut branches = self.branches.write();
        let state = branches
            .get_mut(branch_path)
            .ok_or_else(|| IndexError::BranchNotFound(branch_path.to_string()))?;
        if state.branch.deleted {
            return Err(IndexError::BranchNotFound(branch_path.to_string()).into());
        }

        let timestamp = self.tick();
        let parent_hash = state.commits.last().map(|commit| commit.hash.clone());
        let record = Commit::new(branch_path, parent_hash, timestamp, &commit)
            .with_context(|| format!("Failed to record commit on {}", branch_path))?;

        for change in commit.changes {
            let value = match change.kind {
                ChangeKind::Removed => None,
                ChangeKind::Added | ChangeKind::Changed => {
                    let mut value = change
                        .value
                        .with_context(|| format!("Change of '{}' carries no document", change.id))?;
                    Self::stamp(&mut value, timestamp);
                    Some(Arc::new(value))
                }
            };
            state
                .documents
                .entry(change.doc_type)
                .or_default()
                .entry(change.id)
                .or_default()
                .push(Revision { timestamp, value });
        }

        state.branch.head_timestamp = timestamp;
        state.commits.push(record.clone());
        log::info!(
            "Committed {} on {} at {} (+{} ~{} -{})",
            record.hash,
            branch_path,
            timestamp,
            record.added,
            record.changed,
            record.removed
        );
        Ok(record)
    }

    async fn list_commits(&self, branch_path: &str) -> Result<Vec<Commit>> {
        let branches = self.branches.read();
        Ok(Self::ensure_branch(&branches, branch_path)?.commits.clone())
    }

    fn current_timestamp(&self) -> i64 {
        *self.clock.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Change;
    use crate::store::{Expression, SortBy};
    use serde_json::json;

    fn change_set(changes: Vec<Change>) -> NewCommit {
        NewCommit {
            author: "test".to_string(),
            message: "test".to_string(),
            changes,
        }
    }

    #[tokio::test]
    async fn child_branch_reads_parent_as_of_fork() {
        let store = MemoryRevisionStore::new();
        store
            .commit("MAIN", change_set(vec![Change::added("doc", "a", json!({"id": "a", "v": 1}))]))
            .await
            .unwrap();
        let child = store.create_branch("MAIN", "child").await.unwrap();
        store
            .commit("MAIN", change_set(vec![Change::added("doc", "b", json!({"id": "b"}))]))
            .await
            .unwrap();

        let on_child = store.get(&child.path, ReadPoint::Head, "doc", "a").await.unwrap();
        assert_eq!(on_child.unwrap()["v"], json!(1));
        assert!(store.get(&child.path, ReadPoint::Head, "doc", "b").await.unwrap().is_none());
        assert!(store.get("MAIN", ReadPoint::Head, "doc", "b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn snapshot_reads_ignore_later_commits() {
        let store = MemoryRevisionStore::new();
        let first = store
            .commit("MAIN", change_set(vec![Change::added("doc", "a", json!({"id": "a", "v": 1}))]))
            .await
            .unwrap();
        let second = store
            .commit("MAIN", change_set(vec![Change::changed("doc", "a", json!({"id": "a", "v": 2}))]))
            .await
            .unwrap();
        assert!(second.timestamp > first.timestamp);
        assert_eq!(second.parent_hash.as_deref(), Some(first.hash.as_str()));

        let at_first = store.get("MAIN", ReadPoint::At(first.timestamp), "doc", "a").await.unwrap();
        assert_eq!(at_first.unwrap()["v"], json!(1));

        store
            .commit("MAIN", change_set(vec![Change::removed("doc", "a")]))
            .await
            .unwrap();
        assert!(store.get("MAIN", ReadPoint::Head, "doc", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_stamps_audit_fields() {
        let store = MemoryRevisionStore::new();
        let commit = store
            .commit("MAIN", change_set(vec![Change::added("doc", "a", json!({"id": "a", "updatedAt": null}))]))
            .await
            .unwrap();
        let stored = store.get("MAIN", ReadPoint::Head, "doc", "a").await.unwrap().unwrap();
        assert_eq!(stored["updatedAt"], json!(commit.timestamp));
        assert_eq!(stored["createdAt"], json!(commit.timestamp));
    }

    #[tokio::test]
    async fn paged_search_with_cursor() {
        let store = MemoryRevisionStore::new();
        let changes = (0..5)
            .map(|i| Change::added("doc", &format!("d{}", i), json!({"id": format!("d{}", i), "n": i})))
            .collect();
        store.commit("MAIN", change_set(changes)).await.unwrap();

        let query = Query::select_type("doc")
            .filter(Expression::range("n", Some(json!(1)), None))
            .sort_by(vec![SortBy::field("n", false)])
            .limit(3);
        let first = store.search("MAIN", ReadPoint::Head, &query).await.unwrap();
        assert_eq!(first.total, 4);
        let ids: Vec<_> = first.hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["d4", "d3", "d2"]);

        let second = store
            .search("MAIN", ReadPoint::Head, &query.clone().search_after(first.search_after))
            .await
            .unwrap();
        assert_eq!(second.total, 4);
        assert_eq!(second.hits.len(), 1);
        assert_eq!(second.hits[0].id, "d1");
    }

    #[tokio::test]
    async fn branch_lifecycle_errors() {
        let store = MemoryRevisionStore::new();
        store.create_branch("MAIN", "a").await.unwrap();

        let duplicate = store.create_branch("MAIN", "a").await.unwrap_err();
        assert!(matches!(duplicate.downcast_ref::<IndexError>(), Some(IndexError::BranchExists(_))));

        let orphan = store.create_branch("MAIN/missing", "b").await.unwrap_err();
        assert!(matches!(orphan.downcast_ref::<IndexError>(), Some(IndexError::BranchNotFound(_))));

        let deleted = store.delete_branch("MAIN/a").await.unwrap();
        assert!(deleted.deleted);
        assert!(store.create_branch("MAIN", "a").await.is_ok());
    }

    #[tokio::test]
    async fn knn_and_aggregation() {
        let store = MemoryRevisionStore::new();
        store
            .commit(
                "MAIN",
                change_set(vec![
                    Change::added("doc", "x", json!({"id": "x", "kind": "a", "embedding": [1.0, 0.0]})),
                    Change::added("doc", "y", json!({"id": "y", "kind": "a", "embedding": [0.7, 0.7]})),
                    Change::added("doc", "z", json!({"id": "z", "kind": "b", "embedding": [0.0, 1.0]})),
                ]),
            )
            .await
            .unwrap();

        let knn = KnnQuery {
            doc_type: "doc".to_string(),
            field: "embedding".to_string(),
            query_vector: vec![1.0, 0.1],
            k: 2,
            num_candidates: 10,
            filter: Expression::MatchAll,
            similarity: None,
            fields: Vec::new(),
        };
        let hits = store.knn("MAIN", ReadPoint::Head, &knn).await.unwrap();
        let ids: Vec<_> = hits.hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);

        let aggregation = store
            .aggregate(
                "MAIN",
                ReadPoint::Head,
                &AggregationQuery {
                    doc_type: "doc".to_string(),
                    filter: Expression::MatchAll,
                    field: "kind".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(aggregation.buckets.get("a"), Some(&2));
        assert_eq!(aggregation.buckets.get("b"), Some(&1));
    }
}
