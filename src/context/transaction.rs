use parking_lot::Mutex;
use std::collections::HashMap;

use crate::context::{BranchContext, BranchScope, RepositoryContext, RepositoryScope, ServiceContext, ServiceProvider, Searcher};
use crate::error::{ApiError, ApiResult};
use crate::model::{Branch, Change, ChangeKind, Commit, NewCommit};
use crate::store::Doc;

#[derive(Default)]
struct Staging {
    changes: Vec<Change>,
    /// (doc type, id) -> position in `changes`
    index: HashMap<(String, String), usize>,
}

impl Staging {
    fn stage(&mut self, change: Change) {
        let key = (change.doc_type.clone(), change.id.clone());
        match self.index.get(&key) {
            Some(&position) => {
                let previous = &self.changes[position];
                // a document added in this transaction stays an addition
                let kind = match (previous.kind, change.kind) {
                    (ChangeKind::Added, ChangeKind::Changed) => ChangeKind::Added,
                    (_, kind) => kind,
                };
                self.changes[position] = Change { kind, ..change };
            }
            None => {
                self.index.insert(key, self.changes.len());
                self.changes.push(change);
            }
        }
    }

    fn get(&self, doc_type: &str, id: &str) -> Option<&Change> {
        self.index
            .get(&(doc_type.to_string(), id.to_string()))
            .map(|&position| &self.changes[position])
    }
}

/// Branch context with staged, not yet committed writes.
///
/// Lookups see staged writes, searches only see committed content.
pub struct TransactionContext {
    branch: BranchContext,
    author: String,
    commit_comment: String,
    parent_lock_context: String,
    staging: Mutex<Staging>,
}

impl TransactionContext {
    pub fn new(branch: BranchContext, author: &str, commit_comment: &str, parent_lock_context: &str) -> Self {
        Self {
            branch,
            author: author.to_string(),
            commit_comment: commit_comment.to_string(),
            parent_lock_context: parent_lock_context.to_string(),
            staging: Mutex::new(Staging::default()),
        }
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn commit_comment(&self) -> &str {
        &self.commit_comment
    }

    pub fn parent_lock_context(&self) -> &str {
        &self.parent_lock_context
    }

    fn to_value<D: Doc>(document: &D) -> ApiResult<serde_json::Value> {
        serde_json::to_value(document).map_err(|e| ApiError::Internal(e.into()))
    }

    pub fn add<D: Doc>(&self, document: &D) -> ApiResult<()> {
        let value = Self::to_value(document)?;
        self.staging
            .lock()
            .stage(Change::added(D::TYPE, document.id(), value));
        Ok(())
    }

    pub fn update<D: Doc>(&self, document: &D) -> ApiResult<()> {
        let value = Self::to_value(document)?;
        self.staging
            .lock()
            .stage(Change::changed(D::TYPE, document.id(), value));
        Ok(())
    }

    pub fn delete<D: Doc>(&self, id: &str) {
        self.staging.lock().stage(Change::removed(D::TYPE, id));
    }

    /// Staged state of a document: `Some(None)` if it was removed in this transaction.
    pub fn staged<D: Doc>(&self, id: &str) -> ApiResult<Option<Option<D>>> {
        let staging = self.staging.lock();
        let Some(change) = staging.get(D::TYPE, id) else {
            return Ok(None);
        };
        match &change.value {
            Some(value) => serde_json::from_value(value.clone())
                .map(|document| Some(Some(document)))
                .map_err(|e| ApiError::Internal(e.into())),
            None => Ok(Some(None)),
        }
    }

    /// Reads through staged writes first, then the committed branch content.
    pub async fn lookup<D: Doc>(&self, id: &str) -> ApiResult<Option<D>> {
        if let Some(staged) = self.staged::<D>(id)? {
            return Ok(staged);
        }
        self.searcher().get::<D>(id).await
    }

    pub async fn lookup_required<D: Doc>(&self, id: &str, display_name: &str) -> ApiResult<D> {
        self.lookup(id)
            .await?
            .ok_or_else(|| ApiError::not_found(display_name, id))
    }

    pub fn is_dirty(&self) -> bool {
        !self.staging.lock().changes.is_empty()
    }

    pub fn staged_count(&self) -> usize {
        self.staging.lock().changes.len()
    }

    /// Writes the staged changes as one commit, `None` if nothing was staged.
    pub async fn commit(&self) -> ApiResult<Option<Commit>> {
        let changes = std::mem::take(&mut *self.staging.lock()).changes;
        if changes.is_empty() {
            log::debug!("Nothing to commit on {}", self.branch().path);
            return Ok(None);
        }

        let commit = self
            .repository()
            .store()
            .commit(
                &self.branch().path,
                NewCommit {
                    author: self.author.clone(),
                    message: self.commit_comment.clone(),
                    changes,
                },
            )
            .await
            .map_err(ApiError::from_store)?;
        log::debug!(
            "Transaction of {} in lock context {} committed at {}",
            self.author,
            self.parent_lock_context,
            commit.timestamp
        );
        Ok(Some(commit))
    }
}

impl ServiceProvider for TransactionContext {
    fn service_context(&self) -> &ServiceContext {
        self.branch.service_context()
    }
}

impl RepositoryScope for TransactionContext {
    fn repository_context(&self) -> &RepositoryContext {
        self.branch.repository_context()
    }
}

impl BranchScope for TransactionContext {
    fn branch_context(&self) -> &BranchContext {
        &self.branch
    }

    fn branch(&self) -> &Branch {
        self.branch.branch()
    }

    fn searcher(&self) -> &Searcher {
        self.branch.searcher()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::context::Services;
    use crate::model::{ResourceDocument, UserContext, MAIN_PATH, RESOURCES_REPOSITORY};

    async fn transaction() -> TransactionContext {
        let services = Services::builder(RepositoryConfig::default()).build();
        let service = ServiceContext::new(services.clone(), UserContext::default_user());
        let repository = RepositoryContext::new(
            service,
            services.repositories().get(RESOURCES_REPOSITORY).unwrap().clone(),
        );
        let branch = BranchContext::open(&repository, MAIN_PATH).await.unwrap();
        TransactionContext::new(branch, "tester", "test", "root")
    }

    fn document(id: &str, title: &str) -> ResourceDocument {
        ResourceDocument {
            id: id.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lookup_sees_staged_writes() {
        let tx = transaction().await;
        tx.add(&document("a", "first")).unwrap();
        tx.update(&document("a", "second")).unwrap();

        let staged = tx.lookup::<ResourceDocument>("a").await.unwrap().unwrap();
        assert_eq!(staged.title, "second");
        assert_eq!(tx.staged_count(), 1);

        tx.delete::<ResourceDocument>("a");
        assert!(tx.lookup::<ResourceDocument>("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_transaction_does_not_commit() {
        let tx = transaction().await;
        assert!(!tx.is_dirty());
        assert!(tx.commit().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_persists_in_staging_order() {
        let tx = transaction().await;
        tx.add(&document("a", "A")).unwrap();
        tx.add(&document("b", "B")).unwrap();

        let commit = tx.commit().await.unwrap().unwrap();
        assert_eq!(commit.added, 2);
        let changes = commit.changes().unwrap();
        assert_eq!(changes[0].id, "a");
        assert_eq!(changes[1].id, "b");
        assert!(!tx.is_dirty());

        let stored = tx
            .searcher()
            .realtime()
            .get::<ResourceDocument>("b")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.updated_at, Some(commit.timestamp));
    }
}
