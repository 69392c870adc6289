use crate::context::{RepositoryContext, RepositoryScope};
use crate::error::{ApiError, ApiResult};
use crate::model::{branch_path, is_same_or_descendant_path, is_valid_branch_segment, Branch};
use crate::request::Request;

/// Creates `<parent>/<name>` in the current repository.
#[derive(Debug, Clone)]
pub struct BranchCreateRequest {
    parent: String,
    name: String,
}

impl BranchCreateRequest {
    pub fn new(parent: &str, name: &str) -> Self {
        Self {
            parent: parent.to_string(),
            name: name.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Request<RepositoryContext> for BranchCreateRequest {
    type Output = Branch;

    async fn execute(&self, context: &RepositoryContext) -> ApiResult<Branch> {
        if !is_valid_branch_segment(&self.name) {
            return Err(ApiError::bad_request(format!(
                "Branch name '{}' should match pattern '[a-zA-Z0-9_~-]{{1,50}}'.",
                self.name
            )));
        }

        let store = context.repository().store();
        match store.get_branch(&self.parent).await.map_err(ApiError::from_store)? {
            Some(parent) if !parent.deleted => {}
            _ => return Err(ApiError::not_found("Branch", self.parent.clone()).into_bad_request()),
        }

        let path = branch_path(&self.parent, &self.name);
        if let Some(existing) = store.get_branch(&path).await.map_err(ApiError::from_store)? {
            if !existing.deleted {
                return Err(ApiError::already_exists("Branch", "path", path));
            }
        }

        store
            .create_branch(&self.parent, &self.name)
            .await
            .map_err(ApiError::from_store)
    }
}

#[derive(Debug, Clone)]
pub struct BranchGetRequest {
    path: String,
}

impl BranchGetRequest {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Request<RepositoryContext> for BranchGetRequest {
    type Output = Branch;

    async fn execute(&self, context: &RepositoryContext) -> ApiResult<Branch> {
        context
            .repository()
            .store()
            .get_branch(&self.path)
            .await
            .map_err(ApiError::from_store)?
            .ok_or_else(|| ApiError::not_found("Branch", self.path.clone()))
    }
}

/// Lists branches, optionally only those below a parent path.
#[derive(Debug, Clone, Default)]
pub struct BranchSearchRequest {
    parent: Option<String>,
    include_deleted: bool,
}

impl BranchSearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_by_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn include_deleted(mut self, include_deleted: bool) -> Self {
        self.include_deleted = include_deleted;
        self
    }
}

#[async_trait::async_trait]
impl Request<RepositoryContext> for BranchSearchRequest {
    type Output = Vec<Branch>;

    async fn execute(&self, context: &RepositoryContext) -> ApiResult<Vec<Branch>> {
        let branches = context
            .repository()
            .store()
            .list_branches()
            .await
            .map_err(ApiError::from_store)?;
        Ok(branches
            .into_iter()
            .filter(|branch| self.include_deleted || !branch.deleted)
            .filter(|branch| {
                self.parent.as_deref().map_or(true, |parent| {
                    branch.path != parent && is_same_or_descendant_path(&branch.path, parent)
                })
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct BranchDeleteRequest {
    path: String,
}

impl BranchDeleteRequest {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Request<RepositoryContext> for BranchDeleteRequest {
    type Output = Branch;

    async fn execute(&self, context: &RepositoryContext) -> ApiResult<Branch> {
        if self.path == crate::model::MAIN_PATH {
            return Err(ApiError::bad_request("The MAIN branch cannot be deleted."));
        }
        context
            .repository()
            .store()
            .delete_branch(&self.path)
            .await
            .map_err(ApiError::from_store)
    }
}
