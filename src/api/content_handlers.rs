use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::Deserialize;

use crate::api::handlers::{parse_uri, split_list, ApiResponse, AppState, PageQuery};
use crate::context::ServiceContext;
use crate::model::{
    CommitResult, ConceptDocument, Concepts, ResourceType, ResourceURI, UserContext, ValueSetMemberDocument,
    ValueSetMembers,
};
use crate::request::{
    ConceptSearchFilters, ConceptSearchRequestBuilder, ImportRequest, Request, RequestBuilder,
    TerminologyResourceRequest, ValueSetMemberSearchRequestBuilder,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSearchQuery {
    pub code_system: Option<String>,
    pub active: Option<bool>,
    pub parent: Option<String>,
    pub ancestor: Option<String>,
}

fn parse_uris(value: &str) -> Result<Vec<ResourceURI>, crate::error::ApiError> {
    split_list(value).iter().map(|uri| parse_uri(uri)).collect()
}

pub async fn search_concepts(
    State(services): State<AppState>,
    user: UserContext,
    Query(query): Query<ConceptSearchQuery>,
    Query(page): Query<PageQuery>,
) -> ApiResponse<Json<Concepts>> {
    let context = ServiceContext::new(services, user);

    let mut builder = page.apply(ConceptSearchRequestBuilder::new())?;
    if let Some(code_systems) = &query.code_system {
        builder = builder.filter_by_code_systems(parse_uris(code_systems)?);
    }
    if let Some(active) = query.active {
        builder = builder.filter_by_active(active);
    }
    if let Some(parent) = &query.parent {
        builder = builder.filter_by_parents(split_list(parent));
    }
    if let Some(ancestor) = &query.ancestor {
        builder = builder.filter_by_ancestors(split_list(ancestor));
    }

    let concepts = builder.build().execute(&context).await?;
    Ok(Json(concepts))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSearchQuery {
    pub value_set: Option<String>,
    pub code: Option<String>,
    pub code_system: Option<String>,
    pub active: Option<bool>,
}

pub async fn search_members(
    State(services): State<AppState>,
    user: UserContext,
    Query(query): Query<MemberSearchQuery>,
    Query(page): Query<PageQuery>,
) -> ApiResponse<Json<ValueSetMembers>> {
    let context = ServiceContext::new(services, user);

    let mut builder = page.apply(ValueSetMemberSearchRequestBuilder::new())?;
    if let Some(value_sets) = &query.value_set {
        for value_set in parse_uris(value_sets)? {
            builder = builder.filter_by_value_set(value_set);
        }
    }
    if let Some(code) = query.code {
        builder = builder.filter_by_code(code);
    }
    if let Some(code_system) = &query.code_system {
        builder = builder.filter_by_code_system(&parse_uri(code_system)?);
    }
    if let Some(active) = query.active {
        builder = builder.filter_by_active(active);
    }

    let members = builder.build().execute(&context).await?;
    Ok(Json(members))
}

pub async fn import_concepts(
    State(services): State<AppState>,
    user: UserContext,
    Path(code_system_id): Path<String>,
    RequestJson(concepts): RequestJson<Vec<ConceptDocument>>,
) -> ApiResponse<(StatusCode, Json<CommitResult<usize>>)> {
    let context = ServiceContext::new(services, user);
    let code_system = ResourceURI::new(ResourceType::CodeSystem, code_system_id);

    let comment = format!("Import {} concept(s) into {}", concepts.len(), code_system);
    let result = TerminologyResourceRequest::new(code_system, ImportRequest::new(concepts, &comment))
        .execute(&context)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn import_members(
    State(services): State<AppState>,
    user: UserContext,
    Path(value_set_id): Path<String>,
    RequestJson(members): RequestJson<Vec<ValueSetMemberDocument>>,
) -> ApiResponse<(StatusCode, Json<CommitResult<usize>>)> {
    let context = ServiceContext::new(services, user);
    let value_set = ResourceURI::new(ResourceType::ValueSet, value_set_id);

    let comment = format!("Import {} member(s) into {}", members.len(), value_set);
    let result = TerminologyResourceRequest::new(value_set, ImportRequest::new(members, &comment))
        .execute(&context)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}
