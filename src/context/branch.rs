use std::sync::Arc;

use crate::context::{BranchScope, RepositoryContext, RepositoryScope, ServiceContext, ServiceProvider};
use crate::error::{ApiError, ApiResult};
use crate::model::{Branch, UserContext};
use crate::store::{
    Aggregation, AggregationQuery, Doc, Hits, KnnQuery, Query, ReadPoint, RevisionStore,
};

/// Typed reads against one branch of a store at a fixed read point.
#[derive(Clone)]
pub struct Searcher {
    store: Arc<dyn RevisionStore>,
    branch_path: String,
    read: ReadPoint,
}

impl Searcher {
    pub fn new(store: Arc<dyn RevisionStore>, branch_path: &str, read: ReadPoint) -> Self {
        Self {
            store,
            branch_path: branch_path.to_string(),
            read,
        }
    }

    pub fn branch_path(&self) -> &str {
        &self.branch_path
    }

    pub fn read_point(&self) -> ReadPoint {
        self.read
    }

    /// Same branch, always reading the latest committed state.
    pub fn realtime(&self) -> Self {
        Self {
            read: ReadPoint::Head,
            ..self.clone()
        }
    }

    pub async fn get<D: Doc>(&self, id: &str) -> ApiResult<Option<D>> {
        let value = self
            .store
            .get(&self.branch_path, self.read, D::TYPE, id)
            .await
            .map_err(ApiError::from_store)?;
        value
            .map(|value| serde_json::from_value(value).map_err(|e| ApiError::Internal(e.into())))
            .transpose()
    }

    pub async fn get_required<D: Doc>(&self, id: &str, display_name: &str) -> ApiResult<D> {
        self.get(id)
            .await?
            .ok_or_else(|| ApiError::not_found(display_name, id))
    }

    pub async fn search<D: Doc>(&self, query: &Query) -> ApiResult<Hits<D>> {
        self.store
            .search(&self.branch_path, self.read, query)
            .await
            .map_err(ApiError::from_store)?
            .try_map(|value| serde_json::from_value(value).map_err(|e| ApiError::Internal(e.into())))
    }

    pub async fn knn<D: Doc>(&self, query: &KnnQuery) -> ApiResult<Hits<D>> {
        self.store
            .knn(&self.branch_path, self.read, query)
            .await
            .map_err(ApiError::from_store)?
            .try_map(|value| serde_json::from_value(value).map_err(|e| ApiError::Internal(e.into())))
    }

    pub async fn aggregate(&self, query: &AggregationQuery) -> ApiResult<Aggregation> {
        self.store
            .aggregate(&self.branch_path, self.read, query)
            .await
            .map_err(ApiError::from_store)
    }

    /// Number of documents matching the query, without loading them.
    pub async fn count(&self, query: Query) -> ApiResult<usize> {
        Ok(self.store
            .search(&self.branch_path, self.read, &query.limit(0))
            .await
            .map_err(ApiError::from_store)?
            .total)
    }
}

/// Repository context narrowed to an open branch.
#[derive(Clone)]
pub struct BranchContext {
    repository: RepositoryContext,
    branch: Branch,
    searcher: Searcher,
}

impl BranchContext {
    pub fn new(repository: RepositoryContext, branch: Branch, read: ReadPoint) -> Self {
        let searcher = Searcher::new(Arc::clone(repository.repository().store()), &branch.path, read);
        Self {
            repository,
            branch,
            searcher,
        }
    }

    /// Opens `path` (optionally suffixed with `@timestamp`) at the repository snapshot.
    pub async fn open(repository: &RepositoryContext, path: &str) -> ApiResult<Self> {
        let (branch_path, timestamp) = match path.split_once('@') {
            Some((branch_path, timestamp)) => {
                let timestamp = timestamp.parse::<i64>().map_err(|_| {
                    ApiError::bad_request(format!("Invalid timestamp in branch path '{}'.", path))
                })?;
                (branch_path, Some(timestamp))
            }
            None => (path, None),
        };

        let branch = repository
            .repository()
            .store()
            .get_branch(branch_path)
            .await
            .map_err(ApiError::from_store)?
            .filter(|branch| !branch.deleted)
            .ok_or_else(|| ApiError::not_found("Branch", branch_path))?;

        let read = ReadPoint::At(timestamp.unwrap_or_else(|| repository.snapshot().timestamp()));
        log::debug!("Opened branch {}/{} at {:?}", repository.repository().id(), branch.path, read);
        Ok(Self::new(repository.clone(), branch, read))
    }

    /// Re-reads the branch and moves the read point to the latest commit.
    pub async fn refresh(&self) -> ApiResult<Self> {
        let store = self.repository().store();
        let branch = store
            .get_branch(&self.branch.path)
            .await
            .map_err(ApiError::from_store)?
            .filter(|branch| !branch.deleted)
            .ok_or_else(|| ApiError::not_found("Branch", self.branch.path.clone()))?;
        let read = ReadPoint::At(store.current_timestamp());
        Ok(Self::new(self.repository.clone(), branch, read))
    }

    pub fn with_searcher(&self, searcher: Searcher) -> Self {
        Self {
            searcher,
            ..self.clone()
        }
    }

    pub fn with_user(&self, user: UserContext) -> Self {
        Self {
            repository: self.repository.with_user(user),
            ..self.clone()
        }
    }

    /// Same branch as the system user, for checks that must see every document.
    pub fn as_system(&self) -> Self {
        self.with_user(UserContext::system())
    }
}

impl ServiceProvider for BranchContext {
    fn service_context(&self) -> &ServiceContext {
        self.repository.service_context()
    }
}

impl RepositoryScope for BranchContext {
    fn repository_context(&self) -> &RepositoryContext {
        &self.repository
    }
}

impl BranchScope for BranchContext {
    fn branch_context(&self) -> &BranchContext {
        self
    }

    fn branch(&self) -> &Branch {
        &self.branch
    }

    fn searcher(&self) -> &Searcher {
        &self.searcher
    }
}
