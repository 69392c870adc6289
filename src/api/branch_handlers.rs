use crate::api::handlers::{ApiResponse, AppState};
use crate::context::ServiceContext;
use crate::model::{Branch, UserContext};
use crate::request::{
    BranchCreateRequest, BranchDeleteRequest, BranchGetRequest, BranchSearchRequest, RepositoryRequest, Request,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::Deserialize;

// Branch request/response structures
#[derive(Debug, Deserialize)]
pub struct CreateBranchRequest {
    pub parent: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchListQuery {
    pub parent: Option<String>,
    pub include_deleted: Option<bool>,
}

/// List branches of a repository
pub async fn list_branches(
    State(services): State<AppState>,
    user: UserContext,
    Path(repository_id): Path<String>,
    Query(query): Query<BranchListQuery>,
) -> ApiResponse<Json<Vec<Branch>>> {
    let context = ServiceContext::new(services, user);

    let mut request = BranchSearchRequest::new().include_deleted(query.include_deleted.unwrap_or(false));
    if let Some(parent) = &query.parent {
        request = request.filter_by_parent(parent);
    }

    let branches = RepositoryRequest::new(&repository_id, request).execute(&context).await?;
    Ok(Json(branches))
}

pub async fn create_branch(
    State(services): State<AppState>,
    user: UserContext,
    Path(repository_id): Path<String>,
    RequestJson(request): RequestJson<CreateBranchRequest>,
) -> ApiResponse<(StatusCode, Json<Branch>)> {
    let context = ServiceContext::new(services, user);

    let branch = RepositoryRequest::new(&repository_id, BranchCreateRequest::new(&request.parent, &request.name))
        .execute(&context)
        .await?;
    log::info!("Created branch {} in repository {}", branch.path, repository_id);
    Ok((StatusCode::CREATED, Json(branch)))
}

/// Get a branch by its full path, e.g. `MAIN/SNOMEDCT/2024-01-31`
pub async fn get_branch(
    State(services): State<AppState>,
    user: UserContext,
    Path((repository_id, path)): Path<(String, String)>,
) -> ApiResponse<Json<Branch>> {
    let context = ServiceContext::new(services, user);

    let branch = RepositoryRequest::new(&repository_id, BranchGetRequest::new(&path))
        .execute(&context)
        .await?;
    Ok(Json(branch))
}

/// Soft-delete a branch; its content stays readable at earlier timestamps
pub async fn delete_branch(
    State(services): State<AppState>,
    user: UserContext,
    Path((repository_id, path)): Path<(String, String)>,
) -> ApiResponse<Json<Branch>> {
    let context = ServiceContext::new(services, user);

    let branch = RepositoryRequest::new(&repository_id, BranchDeleteRequest::new(&path))
        .execute(&context)
        .await?;
    Ok(Json(branch))
}
