use crate::context::{BranchContext, BranchScope, ServiceContext};
use crate::error::{ApiError, ApiResult};
use crate::model::{ResourceDocument, ResourceURI, VersionDocument, MAIN_PATH, RESOURCES_REPOSITORY};
use crate::request::{latest_version, open_repository};

/// Where the content addressed by a resource URI lives.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBranch {
    pub tooling_id: String,
    /// Branch path, suffixed with `@timestamp` for point-in-time URIs.
    pub branch_path: String,
    pub resource: ResourceDocument,
}

/// Translates resource URIs, including the `HEAD` and `LATEST` pointers, to branch paths.
#[async_trait::async_trait]
pub trait ResourceURIPathResolver: Send + Sync {
    async fn resolve(&self, context: &ServiceContext, uri: &ResourceURI) -> ApiResult<ResolvedBranch>;
}

#[derive(Debug, Default)]
pub struct DefaultResourceURIPathResolver;

#[async_trait::async_trait]
impl ResourceURIPathResolver for DefaultResourceURIPathResolver {
    async fn resolve(&self, context: &ServiceContext, uri: &ResourceURI) -> ApiResult<ResolvedBranch> {
        let repository = open_repository(context, RESOURCES_REPOSITORY)?;
        let resources = BranchContext::open(&repository, MAIN_PATH).await?;

        let resource = resources
            .searcher()
            .get::<ResourceDocument>(&uri.resource_id)
            .await?
            .filter(|resource| resource.resource_type == uri.resource_type)
            .ok_or_else(|| ApiError::not_found(uri.resource_type.display_name(), uri.resource_id.clone()))?;

        let (Some(resource_branch), Some(tooling_id)) = (resource.branch_path.clone(), resource.tooling_id.clone())
        else {
            return Err(ApiError::bad_request(format!(
                "Resource '{}' has no terminology content.",
                uri
            )));
        };

        let branch_path = if uri.is_head() {
            resource_branch
        } else if uri.is_latest() {
            latest_version(&resources, uri)
                .await?
                .map_or(resource_branch, |version| version.branch_path)
        } else {
            let version_uri = uri.without_path().with_path(uri.path.clone().unwrap_or_default());
            resources
                .searcher()
                .get::<VersionDocument>(&version_uri.to_string())
                .await?
                .ok_or_else(|| ApiError::not_found("Version", version_uri.to_string()))?
                .branch_path
        };

        let branch_path = match uri.timestamp {
            Some(timestamp) => format!("{}@{}", branch_path, timestamp),
            None => branch_path,
        };

        Ok(ResolvedBranch {
            tooling_id,
            branch_path,
            resource,
        })
    }
}
