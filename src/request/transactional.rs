use crate::context::{BranchContext, BranchScope, RepositoryScope, ServiceProvider, TransactionContext};
use crate::error::{ApiError, ApiResult};
use crate::model::{Change, CommitResult, NewCommit};
use crate::request::{BranchRequest, RepositoryRequest, Request, RequestBuilder};
use crate::store::{Doc, LockContext, LockGuard, LockTarget, ROOT_LOCK_CONTEXT};

async fn acquire_branch_lock(
    context: &BranchContext,
    user: &str,
    description: &str,
    parent_lock_context: &str,
) -> ApiResult<LockGuard> {
    let target = LockTarget::new(context.repository().id(), &context.branch().path);
    context
        .services()
        .locks()
        .acquire(target, LockContext::new(user, description, parent_lock_context))
        .await
}

/// Locks the branch, runs the wrapped request in a transaction and commits its staged writes.
pub struct TransactionalRequest<R> {
    author: Option<String>,
    commit_comment: String,
    parent_lock_context: String,
    next: R,
}

impl<R> TransactionalRequest<R> {
    pub fn new(next: R) -> Self {
        Self {
            author: None,
            commit_comment: String::new(),
            parent_lock_context: ROOT_LOCK_CONTEXT.to_string(),
            next,
        }
    }
}

#[async_trait::async_trait]
impl<R> Request<BranchContext> for TransactionalRequest<R>
where
    R: Request<TransactionContext>,
{
    type Output = CommitResult<R::Output>;

    async fn execute(&self, context: &BranchContext) -> ApiResult<Self::Output> {
        let author = self
            .author
            .clone()
            .unwrap_or_else(|| context.user().user_id.clone());

        let _lock = acquire_branch_lock(context, &author, &self.commit_comment, &self.parent_lock_context).await?;

        // earlier writers may have committed while we waited for the lock
        let branch = context.refresh().await?;
        let transaction = TransactionContext::new(branch, &author, &self.commit_comment, &self.parent_lock_context);

        let result = self
            .next
            .execute(&transaction)
            .await
            .map_err(|e| e.wrap_internal(format!("Failed to execute {:?}", self.next.nested_requests())))?;
        let commit = transaction
            .commit()
            .await
            .map_err(|e| e.wrap_internal(format!("Failed to commit '{}'", self.commit_comment)))?;

        Ok(CommitResult::new(commit.as_ref(), result))
    }

    fn nested_requests(&self) -> Vec<&'static str> {
        let mut nested = vec!["TransactionalRequest"];
        nested.extend(self.next.nested_requests());
        nested
    }
}

/// Wraps a transaction-scoped request into a committing request chain.
pub struct CommitRequestBuilder<R> {
    request: R,
    author: Option<String>,
    commit_comment: String,
    parent_lock_context: String,
}

impl<R> CommitRequestBuilder<R>
where
    R: Request<TransactionContext>,
{
    pub fn new(request: R) -> Self {
        Self {
            request,
            author: None,
            commit_comment: String::new(),
            parent_lock_context: ROOT_LOCK_CONTEXT.to_string(),
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn commit_comment(mut self, commit_comment: impl Into<String>) -> Self {
        self.commit_comment = commit_comment.into();
        self
    }

    pub fn parent_lock_context(mut self, parent_lock_context: impl Into<String>) -> Self {
        self.parent_lock_context = parent_lock_context.into();
        self
    }

    /// Transactional request for an already opened branch.
    pub fn build_transactional(self) -> TransactionalRequest<R> {
        TransactionalRequest {
            author: self.author,
            commit_comment: self.commit_comment,
            parent_lock_context: self.parent_lock_context,
            next: self.request,
        }
    }

    pub fn build(
        self,
        repository_id: &str,
        branch_path: &str,
    ) -> RepositoryRequest<BranchRequest<TransactionalRequest<R>>> {
        RepositoryRequest::new(
            repository_id,
            BranchRequest::new(branch_path, self.build_transactional()),
        )
    }
}

/// Builders of requests that run inside a transaction.
pub trait TransactionalRequestBuilder: RequestBuilder + Sized
where
    Self::Request: Request<TransactionContext>,
{
    fn commit(self) -> CommitRequestBuilder<Self::Request> {
        CommitRequestBuilder::new(self.build())
    }
}

impl<B> TransactionalRequestBuilder for B
where
    B: RequestBuilder,
    B::Request: Request<TransactionContext>,
{
}

/// Holds the branch lock for the duration of the wrapped request, without a transaction.
pub struct LockRequest<R> {
    description: String,
    parent_lock_context: String,
    next: R,
}

impl<R> LockRequest<R> {
    pub fn new(description: &str, next: R) -> Self {
        Self {
            description: description.to_string(),
            parent_lock_context: ROOT_LOCK_CONTEXT.to_string(),
            next,
        }
    }

    pub fn parent_lock_context(mut self, parent_lock_context: &str) -> Self {
        self.parent_lock_context = parent_lock_context.to_string();
        self
    }
}

#[async_trait::async_trait]
impl<R> Request<BranchContext> for LockRequest<R>
where
    R: Request<BranchContext>,
{
    type Output = R::Output;

    async fn execute(&self, context: &BranchContext) -> ApiResult<Self::Output> {
        let _lock = acquire_branch_lock(
            context,
            &context.user().user_id,
            &self.description,
            &self.parent_lock_context,
        )
        .await?;
        let branch = context.refresh().await?;
        self.next
            .execute(&branch)
            .await
            .map_err(|e| e.wrap_internal(format!("Failed to execute '{}'", self.description)))
    }

    fn nested_requests(&self) -> Vec<&'static str> {
        let mut nested = vec!["LockRequest"];
        nested.extend(self.next.nested_requests());
        nested
    }
}

/// Writes a batch of documents to a locked branch as a single commit.
pub struct ImportRequest<D> {
    documents: Vec<D>,
    commit_comment: String,
    parent_lock_context: String,
}

impl<D: Doc> ImportRequest<D> {
    pub fn new(documents: Vec<D>, commit_comment: &str) -> Self {
        Self {
            documents,
            commit_comment: commit_comment.to_string(),
            parent_lock_context: ROOT_LOCK_CONTEXT.to_string(),
        }
    }

    pub fn parent_lock_context(mut self, parent_lock_context: &str) -> Self {
        self.parent_lock_context = parent_lock_context.to_string();
        self
    }
}

#[async_trait::async_trait]
impl<D: Doc> Request<BranchContext> for ImportRequest<D> {
    type Output = CommitResult<usize>;

    async fn execute(&self, context: &BranchContext) -> ApiResult<Self::Output> {
        let author = context.user().user_id.clone();
        let _lock = acquire_branch_lock(context, &author, &self.commit_comment, &self.parent_lock_context).await?;

        if self.documents.is_empty() {
            return Ok(CommitResult::new(None, 0));
        }

        let searcher = context.searcher().realtime();
        let mut changes = Vec::with_capacity(self.documents.len());
        for document in &self.documents {
            let value = serde_json::to_value(document).map_err(|e| ApiError::Internal(e.into()))?;
            let exists = searcher.get::<D>(document.id()).await?.is_some();
            changes.push(if exists {
                Change::changed(D::TYPE, document.id(), value)
            } else {
                Change::added(D::TYPE, document.id(), value)
            });
        }

        let commit = context
            .repository()
            .store()
            .commit(
                &context.branch().path,
                NewCommit {
                    author,
                    message: self.commit_comment.clone(),
                    changes,
                },
            )
            .await
            .map_err(ApiError::from_store)
            .map_err(|e| e.wrap_internal(format!("Failed to import into {}", context.branch().path)))?;
        log::info!(
            "Imported {} {} document(s) into {}",
            self.documents.len(),
            D::TYPE,
            context.branch().path
        );

        Ok(CommitResult::new(Some(&commit), self.documents.len()))
    }
}
