use crate::context::{
    BranchContext, BranchScope, RepositoryContext, ServiceContext, ServiceProvider,
};
use crate::error::{ApiError, ApiResult};
use crate::model::ResourceURI;
use crate::request::Request;

/// Opens a repository context with a read snapshot held for the nested call.
pub fn open_repository(context: &ServiceContext, repository_id: &str) -> ApiResult<RepositoryContext> {
    let repository = context
        .services()
        .repositories()
        .get(repository_id)
        .ok_or_else(|| ApiError::not_found("Repository", repository_id))?;
    Ok(RepositoryContext::new(context.clone(), repository.clone()))
}

/// Runs the wrapped request in a named repository.
pub struct RepositoryRequest<R> {
    repository_id: String,
    next: R,
}

impl<R> RepositoryRequest<R> {
    pub fn new(repository_id: &str, next: R) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            next,
        }
    }
}

#[async_trait::async_trait]
impl<R> Request<ServiceContext> for RepositoryRequest<R>
where
    R: Request<RepositoryContext>,
{
    type Output = R::Output;

    async fn execute(&self, context: &ServiceContext) -> ApiResult<Self::Output> {
        // the snapshot is released when the context goes out of scope, on any path
        let repository = open_repository(context, &self.repository_id)?;
        log::debug!("Executing {:?} in repository {}", self.next.nested_requests(), self.repository_id);
        self.next.execute(&repository).await
    }

    fn nested_requests(&self) -> Vec<&'static str> {
        let mut nested = vec!["RepositoryRequest"];
        nested.extend(self.next.nested_requests());
        nested
    }
}

/// Runs the wrapped request on a branch of the current repository.
pub struct BranchRequest<R> {
    branch_path: String,
    next: R,
}

impl<R> BranchRequest<R> {
    pub fn new(branch_path: &str, next: R) -> Self {
        Self {
            branch_path: branch_path.to_string(),
            next,
        }
    }
}

#[async_trait::async_trait]
impl<R> Request<RepositoryContext> for BranchRequest<R>
where
    R: Request<BranchContext>,
{
    type Output = R::Output;

    async fn execute(&self, context: &RepositoryContext) -> ApiResult<Self::Output> {
        let branch = BranchContext::open(context, &self.branch_path).await?;
        self.next.execute(&branch).await
    }

    fn nested_requests(&self) -> Vec<&'static str> {
        let mut nested = vec!["BranchRequest"];
        nested.extend(self.next.nested_requests());
        nested
    }
}

/// Runs the wrapped request on the branch a resource URI resolves to.
pub struct TerminologyResourceRequest<R> {
    resource_uri: ResourceURI,
    next: R,
}

impl<R> TerminologyResourceRequest<R> {
    pub fn new(resource_uri: ResourceURI, next: R) -> Self {
        Self { resource_uri, next }
    }
}

/// Opens the branch of a terminology resource within its tooling repository.
pub async fn open_resource_branch(context: &ServiceContext, resource_uri: &ResourceURI) -> ApiResult<BranchContext> {
    let resolved = context
        .services()
        .uri_resolver()
        .resolve(context, resource_uri)
        .await?;
    let repository = open_repository(context, &resolved.tooling_id)?;
    BranchContext::open(&repository, &resolved.branch_path).await
}

#[async_trait::async_trait]
impl<R> Request<ServiceContext> for TerminologyResourceRequest<R>
where
    R: Request<BranchContext>,
{
    type Output = R::Output;

    async fn execute(&self, context: &ServiceContext) -> ApiResult<Self::Output> {
        let branch = open_resource_branch(context, &self.resource_uri).await?;
        self.next.execute(&branch).await
    }

    fn nested_requests(&self) -> Vec<&'static str> {
        let mut nested = vec!["TerminologyResourceRequest"];
        nested.extend(self.next.nested_requests());
        nested
    }
}

/// Runs the wrapped branch request against the latest committed content instead of the snapshot.
pub struct BranchRealtimeContentRequest<R> {
    next: R,
}

impl<R> BranchRealtimeContentRequest<R> {
    pub fn new(next: R) -> Self {
        Self { next }
    }
}

#[async_trait::async_trait]
impl<R> Request<BranchContext> for BranchRealtimeContentRequest<R>
where
    R: Request<BranchContext>,
{
    type Output = R::Output;

    async fn execute(&self, context: &BranchContext) -> ApiResult<Self::Output> {
        let realtime = context.with_searcher(context.searcher().realtime());
        self.next.execute(&realtime).await
    }

    fn nested_requests(&self) -> Vec<&'static str> {
        let mut nested = vec!["BranchRealtimeContentRequest"];
        nested.extend(self.next.nested_requests());
        nested
    }
}
