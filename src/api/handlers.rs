use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::{ServiceContext, Services};
use crate::error::ApiError;
use crate::model::{
    CommitResult, Id, PageableCollection, Resource, ResourceDocument, ResourceType, ResourceURI,
    Resources, Settings, SettingsUpdate, UserContext, Version, MAIN_PATH, RESOURCES_REPOSITORY, ROOT_ID,
};
use crate::request::{
    BranchRequest, CommitRequestBuilder, DeleteRequestBuilder, RepositoryRequest, Request,
    RequestBuilder, ResourceAggregateRequestBuilder, ResourceCreateRequest, ResourceGetRequest,
    ResourceSearchRequestBuilder, ResourceUpdateRequest, SearchResourceRequestBuilder,
    TransactionalRequestBuilder, VersionCreateRequestBuilder, VersionSearchRequestBuilder,
};
use crate::store::{Aggregation, SortBy};
use crate::validation::Violation;

pub type AppState = Arc<Services>;

/// Handler result carrying the categorized error as a JSON body.
pub type ApiResponse<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl ErrorResponse {
    pub fn new(kind: &str, error: &str) -> Self {
        Self {
            error: error.to_string(),
            kind: kind.to_string(),
            violations: Vec::new(),
        }
    }
}

pub fn status_code(error: &ApiError) -> StatusCode {
    match error {
        ApiError::AlreadyExists { .. } | ApiError::Conflict(_) | ApiError::Locked(_) => StatusCode::CONFLICT,
        ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
        ApiError::BadRequest(_)
        | ApiError::IllegalQueryParameter(_)
        | ApiError::CycleDetected(_)
        | ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
        ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ApiError> for (StatusCode, Json<ErrorResponse>) {
    fn from(error: ApiError) -> Self {
        let status = status_code(&error);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Request failed: {:#}", error);
        }
        let mut response = ErrorResponse::new(error.kind(), &error.to_string());
        if let ApiError::Validation { violations, .. } = error {
            response.violations = violations;
        }
        (status, Json(response))
    }
}

/// Splits a comma separated query value, dropping blank entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_sort(value: &str) -> Result<Vec<SortBy>, ApiError> {
    split_list(value)
        .iter()
        .map(|item| SortBy::parse(item).map_err(ApiError::IllegalQueryParameter))
        .collect()
}

pub fn parse_uri(value: &str) -> Result<ResourceURI, ApiError> {
    value.parse::<ResourceURI>().map_err(ApiError::BadRequest)
}

fn parse_resource_type(value: &str) -> Result<ResourceType, ApiError> {
    value.parse::<ResourceType>().map_err(ApiError::BadRequest)
}

/// Paging, projection and expansion parameters shared by search endpoints,
/// extracted next to the endpoint's own filter query.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub id: Option<String>,
    pub term: Option<String>,
    pub limit: Option<usize>,
    pub search_after: Option<String>,
    pub sort: Option<String>,
    pub fields: Option<String>,
    pub expand: Option<String>,
    pub locales: Option<String>,
}

impl PageQuery {
    pub fn apply<B: SearchResourceRequestBuilder>(&self, builder: B) -> Result<B, ApiError> {
        let mut builder = builder.set_search_after(self.search_after.clone());
        if let Some(id) = &self.id {
            builder = builder.filter_by_ids(split_list(id));
        }
        if let Some(term) = &self.term {
            builder = builder.filter_by_term(term.clone());
        }
        if let Some(limit) = self.limit {
            builder = builder.set_limit(limit);
        }
        if let Some(sort) = &self.sort {
            builder = builder.sort_by(parse_sort(sort)?);
        }
        if let Some(fields) = &self.fields {
            builder = builder.set_fields(split_list(fields));
        }
        if let Some(expand) = &self.expand {
            builder = builder.set_expand(expand.clone());
        }
        if let Some(locales) = &self.locales {
            builder = builder.set_locales(split_list(locales));
        }
        Ok(builder)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSearchQuery {
    pub resource_type: Option<String>,
    pub url: Option<String>,
    pub bundle_id: Option<String>,
    pub bundle_ancestor_id: Option<String>,
    pub status: Option<String>,
    pub oid: Option<String>,
    pub tooling_id: Option<String>,
    pub owner: Option<String>,
}

fn on_resources<R>(request: R) -> RepositoryRequest<BranchRequest<R>> {
    RepositoryRequest::new(RESOURCES_REPOSITORY, BranchRequest::new(MAIN_PATH, request))
}

pub async fn search_resources(
    State(services): State<AppState>,
    user: UserContext,
    Query(query): Query<ResourceSearchQuery>,
    Query(page): Query<PageQuery>,
) -> ApiResponse<Json<Resources>> {
    let context = ServiceContext::new(services, user);

    let mut builder = page.apply(ResourceSearchRequestBuilder::new())?;
    if let Some(resource_types) = &query.resource_type {
        let resource_types = split_list(resource_types)
            .iter()
            .map(|value| parse_resource_type(value))
            .collect::<Result<Vec<_>, _>>()?;
        builder = builder.filter_by_resource_types(resource_types);
    }
    if let Some(url) = &query.url {
        builder = builder.filter_by_urls(split_list(url));
    }
    if let Some(bundle_id) = &query.bundle_id {
        builder = builder.filter_by_bundle_id(bundle_id.clone());
    }
    if let Some(bundle_ancestor_id) = &query.bundle_ancestor_id {
        builder = builder.filter_by_bundle_ancestor_id(bundle_ancestor_id.clone());
    }
    if let Some(status) = &query.status {
        builder = builder.filter_by_status(status.clone());
    }
    if let Some(oid) = &query.oid {
        builder = builder.filter_by_oid(oid.clone());
    }
    if let Some(tooling_id) = &query.tooling_id {
        builder = builder.filter_by_tooling_id(tooling_id.clone());
    }
    if let Some(owner) = &query.owner {
        builder = builder.filter_by_owner(owner.clone());
    }

    let resources = on_resources(builder.build()).execute(&context).await?;
    Ok(Json(resources))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResourceGetQuery {
    pub expand: Option<String>,
    pub locales: Option<String>,
}

pub async fn get_resource(
    State(services): State<AppState>,
    user: UserContext,
    Path(id): Path<String>,
    Query(query): Query<ResourceGetQuery>,
) -> ApiResponse<Json<Resource>> {
    let context = ServiceContext::new(services, user);

    let mut request = ResourceGetRequest::new(id);
    if let Some(expand) = query.expand {
        request = request.set_expand(expand);
    }
    if let Some(locales) = query.locales {
        request = request.set_locales(split_list(&locales));
    }

    let resource = on_resources(request).execute(&context).await?;
    Ok(Json(resource))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateQuery {
    pub field: String,
    pub resource_type: Option<String>,
    pub bundle_id: Option<String>,
}

pub async fn aggregate_resources(
    State(services): State<AppState>,
    user: UserContext,
    Query(query): Query<AggregateQuery>,
) -> ApiResponse<Json<Aggregation>> {
    let context = ServiceContext::new(services, user);

    let mut builder = ResourceAggregateRequestBuilder::new(query.field);
    if let Some(resource_types) = &query.resource_type {
        for resource_type in split_list(resource_types) {
            builder = builder.filter_by_resource_type(parse_resource_type(&resource_type)?);
        }
    }
    if let Some(bundle_id) = query.bundle_id {
        builder = builder.filter_by_bundle_id(bundle_id);
    }

    let aggregation = on_resources(builder.build()).execute(&context).await?;
    Ok(Json(aggregation))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCreateBody {
    pub resource_type: ResourceType,
    pub id: Option<Id>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "root_bundle_id")]
    pub bundle_id: Id,
    pub status: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    pub owner: Option<String>,
    pub contact: Option<String>,
    pub usage: Option<String>,
    pub purpose: Option<String>,
    pub copyright: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub settings: Option<Settings>,
    pub oid: Option<String>,
    pub branch_path: Option<String>,
    pub tooling_id: Option<String>,
    pub extension_of: Option<ResourceURI>,
    pub upgrade_of: Option<ResourceURI>,
    pub commit_comment: Option<String>,
}

fn root_bundle_id() -> Id {
    ROOT_ID.to_string()
}

impl From<ResourceCreateBody> for ResourceCreateRequest {
    fn from(body: ResourceCreateBody) -> Self {
        Self {
            id: body.id,
            resource_type: body.resource_type,
            url: body.url,
            title: body.title,
            bundle_id: body.bundle_id,
            status: body.status,
            hidden: body.hidden,
            owner: body.owner,
            contact: body.contact,
            usage: body.usage,
            purpose: body.purpose,
            copyright: body.copyright,
            description: body.description,
            language: body.language,
            settings: body.settings,
            oid: body.oid,
            branch_path: body.branch_path,
            tooling_id: body.tooling_id,
            extension_of: body.extension_of,
            upgrade_of: body.upgrade_of,
        }
    }
}

pub async fn create_resource(
    State(services): State<AppState>,
    user: UserContext,
    RequestJson(mut body): RequestJson<ResourceCreateBody>,
) -> ApiResponse<(StatusCode, Json<CommitResult<Id>>)> {
    let author = user.user_id.clone();
    let context = ServiceContext::new(services, user);

    let commit_comment = body
        .commit_comment
        .take()
        .unwrap_or_else(|| format!("Create {} '{}'", body.resource_type.display_name(), body.title));

    let result = CommitRequestBuilder::new(ResourceCreateRequest::from(body))
        .author(author)
        .commit_comment(commit_comment)
        .build(RESOURCES_REPOSITORY, MAIN_PATH)
        .execute(&context)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdateBody {
    pub resource_type: Option<ResourceType>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub bundle_id: Option<Id>,
    pub status: Option<String>,
    pub hidden: Option<bool>,
    pub owner: Option<String>,
    pub contact: Option<String>,
    pub usage: Option<String>,
    pub purpose: Option<String>,
    pub copyright: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub settings: Option<SettingsUpdate>,
    pub oid: Option<String>,
    pub branch_path: Option<String>,
    pub extension_of: Option<ResourceURI>,
    pub upgrade_of: Option<ResourceURI>,
    pub commit_comment: Option<String>,
}

pub async fn update_resource(
    State(services): State<AppState>,
    user: UserContext,
    Path(id): Path<String>,
    RequestJson(body): RequestJson<ResourceUpdateBody>,
) -> ApiResponse<Json<CommitResult<bool>>> {
    let author = user.user_id.clone();
    let context = ServiceContext::new(services, user);

    let commit_comment = body
        .commit_comment
        .unwrap_or_else(|| format!("Update resource '{}'", id));
    let request = ResourceUpdateRequest {
        id,
        resource_type: body.resource_type,
        url: body.url,
        title: body.title,
        bundle_id: body.bundle_id,
        status: body.status,
        hidden: body.hidden,
        owner: body.owner,
        contact: body.contact,
        usage: body.usage,
        purpose: body.purpose,
        copyright: body.copyright,
        description: body.description,
        language: body.language,
        settings: body.settings,
        oid: body.oid,
        branch_path: body.branch_path,
        extension_of: body.extension_of,
        upgrade_of: body.upgrade_of,
    };

    let result = CommitRequestBuilder::new(request)
        .author(author)
        .commit_comment(commit_comment)
        .build(RESOURCES_REPOSITORY, MAIN_PATH)
        .execute(&context)
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    pub force: Option<bool>,
}

pub async fn delete_resource(
    State(services): State<AppState>,
    user: UserContext,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResponse<StatusCode> {
    let author = user.user_id.clone();
    let context = ServiceContext::new(services, user);

    DeleteRequestBuilder::<ResourceDocument>::new(id.clone())
        .force(query.force.unwrap_or(false))
        .commit()
        .author(author)
        .commit_comment(format!("Delete resource '{}'", id))
        .build(RESOURCES_REPOSITORY, MAIN_PATH)
        .execute(&context)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSearchQuery {
    pub resource: Option<String>,
    pub version: Option<String>,
    pub resource_type: Option<String>,
    pub effective_time_start: Option<NaiveDate>,
    pub effective_time_end: Option<NaiveDate>,
}

pub async fn search_versions(
    State(services): State<AppState>,
    user: UserContext,
    Query(query): Query<VersionSearchQuery>,
    Query(page): Query<PageQuery>,
) -> ApiResponse<Json<PageableCollection<Version>>> {
    let context = ServiceContext::new(services, user);

    let mut builder = page.apply(VersionSearchRequestBuilder::new())?;
    if let Some(resources) = &query.resource {
        let resources = split_list(resources)
            .iter()
            .map(|value| parse_uri(value))
            .collect::<Result<Vec<_>, _>>()?;
        builder = builder.filter_by_resources(&resources);
    }
    if let Some(version) = query.version {
        builder = builder.filter_by_version(version);
    }
    if let Some(resource_type) = &query.resource_type {
        builder = builder.filter_by_resource_type(parse_resource_type(resource_type)?);
    }
    if query.effective_time_start.is_some() || query.effective_time_end.is_some() {
        builder = builder.filter_by_effective_time(query.effective_time_start, query.effective_time_end);
    }

    let versions = on_resources(builder.build()).execute(&context).await?;
    Ok(Json(versions))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCreateBody {
    pub resource: ResourceURI,
    pub version: String,
    pub effective_time: NaiveDate,
    pub description: Option<String>,
    #[serde(default)]
    pub force: bool,
}

pub async fn create_version(
    State(services): State<AppState>,
    user: UserContext,
    RequestJson(body): RequestJson<VersionCreateBody>,
) -> ApiResponse<(StatusCode, Json<CommitResult<String>>)> {
    let author = user.user_id.clone();
    let context = ServiceContext::new(services, user);

    let commit_comment = format!("Version {} as '{}'", body.resource, body.version);
    let mut builder = VersionCreateRequestBuilder::new(body.resource, body.version, body.effective_time).force(body.force);
    if let Some(description) = body.description {
        builder = builder.set_description(description);
    }

    let result = builder
        .commit()
        .author(author)
        .commit_comment(commit_comment)
        .build(RESOURCES_REPOSITORY, MAIN_PATH)
        .execute(&context)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list(" ").is_empty());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code(&ApiError::already_exists("Bundle", "url", "x")), StatusCode::CONFLICT);
        assert_eq!(status_code(&ApiError::not_found("Bundle", "x")), StatusCode::NOT_FOUND);
        assert_eq!(status_code(&ApiError::cycle_detected("loop")), StatusCode::BAD_REQUEST);
        assert_eq!(status_code(&ApiError::Locked("busy".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_code(&ApiError::Internal(anyhow::anyhow!("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_parse_sort() {
        let sort = parse_sort("title:desc,id").unwrap();
        assert_eq!(sort.len(), 2);
        assert!(matches!(parse_sort("title:sideways"), Err(ApiError::IllegalQueryParameter(_))));
    }

    #[test]
    fn test_error_response_carries_violations() {
        let error = ApiError::Validation {
            message: "1 validation error".to_string(),
            violations: vec![Violation::blank("title", "")],
        };
        let (status, Json(body)) = <(StatusCode, Json<ErrorResponse>)>::from(error);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.kind, "Validation");
        assert_eq!(body.violations.len(), 1);
    }
}
