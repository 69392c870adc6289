//! Concept and value set member searches.
//!
//! Each content branch is searched with a per-branch strategy; the requests
//! that span several code systems or value sets run that search once per
//! resource and merge the pages.

use std::cmp::Ordering;

use serde_json::Value;

use crate::context::{BranchContext, ServiceContext, ServiceProvider};
use crate::error::{ApiError, ApiResult};
use crate::model::concept::fields;
use crate::model::resource::fields as resource_fields;
use crate::model::{
    Concept, ConceptDocument, Concepts, PageableCollection, ResourceType, ResourceURI, ValueSetMember,
    ValueSetMemberDocument, ValueSetMembers, MAIN_PATH, RESOURCES_REPOSITORY,
};
use crate::request::expand::expand_items;
use crate::request::{
    open_repository, open_resource_branch, Request, RequestBuilder, ResourceSearchRequestBuilder, SearchIndexResource,
    SearchIndexResourceRequest, SearchParams, SearchResourceRequestBuilder, SearchResourceRequestIterator, OPTION_ID,
};
use crate::store::{Expression, Hits};

pub mod concept_options {
    pub const ACTIVE: &str = "active";
    pub const PARENT: &str = "parent";
    pub const ANCESTOR: &str = "ancestor";
    pub const CODE: &str = "code";
    pub const CODE_SYSTEM: &str = "codeSystem";
}

fn string_values(values: impl IntoIterator<Item = String>) -> Value {
    Value::Array(values.into_iter().map(Value::String).collect())
}

/// Filters shared by the concept search builders.
pub trait ConceptSearchFilters: SearchResourceRequestBuilder {
    fn filter_by_active(self, active: bool) -> Self {
        self.set_option(concept_options::ACTIVE, active)
    }

    fn filter_by_parent(self, parent: impl Into<String>) -> Self {
        self.filter_by_parents([parent.into()])
    }

    fn filter_by_parents(self, parents: impl IntoIterator<Item = String>) -> Self {
        self.set_option(concept_options::PARENT, string_values(parents))
    }

    /// Concepts below any of `ancestors`, at any depth.
    fn filter_by_ancestor(self, ancestor: impl Into<String>) -> Self {
        self.filter_by_ancestors([ancestor.into()])
    }

    fn filter_by_ancestors(self, ancestors: impl IntoIterator<Item = String>) -> Self {
        self.set_option(concept_options::ANCESTOR, string_values(ancestors))
    }
}

/// Search strategy over the concepts of one code system branch.
#[derive(Debug, Clone)]
pub struct ConceptSearch {
    code_system: ResourceURI,
}

impl ConceptSearch {
    pub fn new(code_system: ResourceURI) -> Self {
        Self { code_system }
    }
}

#[async_trait::async_trait]
impl SearchIndexResource for ConceptSearch {
    type Document = ConceptDocument;
    type Item = Concept;

    fn special_option_keys(&self) -> &'static [&'static str] {
        &[OPTION_ID, concept_options::PARENT, concept_options::ANCESTOR]
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            fields::ID,
            fields::ACTIVE,
            fields::TERM,
            "descriptions",
            fields::PARENTS,
            fields::ANCESTORS,
        ]
    }

    fn supports_knn(&self) -> bool {
        true
    }

    async fn prepare_query(&self, _context: &BranchContext, params: &SearchParams) -> ApiResult<Option<Expression>> {
        let mut query = Expression::bool();

        if params.options.contains_key(OPTION_ID) {
            let ids = params.ids();
            if ids.is_empty() {
                return Ok(None);
            }
            query = query.must(Expression::ids(ids));
        }

        if let Some(active) = params.options.get_bool(concept_options::ACTIVE) {
            query = query.must(Expression::exact(fields::ACTIVE, active));
        }

        if params.options.contains_key(concept_options::PARENT) {
            query = query.must(Expression::exact_any(
                fields::PARENTS,
                params.options.get_strings(concept_options::PARENT),
            ));
        }

        if params.options.contains_key(concept_options::ANCESTOR) {
            let ancestors = params.options.get_strings(concept_options::ANCESTOR);
            query = query.must(
                Expression::bool()
                    .should(Expression::exact_any(fields::PARENTS, ancestors.clone()))
                    .should(Expression::exact_any(fields::ANCESTORS, ancestors))
                    .build(),
            );
        }

        if let Some(term) = &params.term {
            query = query.must(
                Expression::bool()
                    .should(Expression::text(fields::TERM, term.clone()))
                    .should(Expression::text(fields::DESCRIPTION_TERM, term.clone()))
                    .should(Expression::exact(fields::ID, term.term()))
                    .build(),
            );
        }

        Ok(Some(query.build()))
    }

    async fn to_collection(
        &self,
        context: &BranchContext,
        hits: Hits<ConceptDocument>,
        params: &SearchParams,
    ) -> ApiResult<Concepts> {
        let mut items: Vec<Concept> = hits
            .hits
            .into_iter()
            .map(|hit| Concept::from_document(hit.value, self.code_system.clone(), &params.locales, hit.score))
            .collect();
        let expand = params.expand()?;
        expand_items(
            context,
            context.services().concept_expanders(),
            &mut items,
            &expand,
            &params.locales,
        )
        .await?;
        Ok(PageableCollection::new(items, hits.search_after, hits.limit, hits.total))
    }
}

/// Concept search on an already opened code system branch.
#[derive(Debug, Clone)]
pub struct ConceptBranchSearchRequestBuilder {
    code_system: ResourceURI,
    params: SearchParams,
}

impl ConceptBranchSearchRequestBuilder {
    pub fn new(code_system: ResourceURI) -> Self {
        Self {
            code_system,
            params: SearchParams::default(),
        }
    }
}

impl SearchResourceRequestBuilder for ConceptBranchSearchRequestBuilder {
    fn params_mut(&mut self) -> &mut SearchParams {
        &mut self.params
    }
}

impl ConceptSearchFilters for ConceptBranchSearchRequestBuilder {}

impl RequestBuilder for ConceptBranchSearchRequestBuilder {
    type Request = SearchIndexResourceRequest<ConceptSearch>;

    fn build(self) -> Self::Request {
        SearchIndexResourceRequest::new(ConceptSearch::new(self.code_system), self.params)
    }
}

/// Items of a merged multi-resource page.
pub trait MergedItem {
    fn score(&self) -> Option<f32>;

    /// Order of unscored items: owning resource, then id.
    fn merge_key(&self) -> (String, String);
}

impl MergedItem for Concept {
    fn score(&self) -> Option<f32> {
        self.score
    }

    fn merge_key(&self) -> (String, String) {
        (self.code_system.to_string(), self.id.clone())
    }
}

impl MergedItem for ValueSetMember {
    fn score(&self) -> Option<f32> {
        self.score
    }

    fn merge_key(&self) -> (String, String) {
        (self.value_set.to_string(), self.document.id.clone())
    }
}

/// Runs one search per resource and merges the pages.
///
/// Totals are summed. A cursor is only returned, and only accepted, when a
/// single resource takes part in the search.
async fn search_across<S, F>(
    context: &ServiceContext,
    resources: &[ResourceURI],
    params: &SearchParams,
    strategy: F,
) -> ApiResult<PageableCollection<S::Item>>
where
    S: SearchIndexResource,
    S::Item: MergedItem,
    F: Fn(&ResourceURI) -> S + Send + Sync,
{
    let limit = params
        .limit
        .unwrap_or(context.services().config().default_page_size);

    if resources.len() > 1 && params.search_after.is_some() {
        return Err(ApiError::bad_request(format!(
            "searchAfter is not supported when searching {} resources at once.",
            resources.len()
        )));
    }

    let mut params = params.clone();
    params.limit = Some(limit);

    let mut items = Vec::new();
    let mut total = 0;
    let mut search_after = None;
    for resource in resources {
        let branch = open_resource_branch(context, resource).await?;
        let page = SearchIndexResourceRequest::new(strategy(resource), params.clone())
            .execute(&branch)
            .await?;
        total += page.total;
        search_after = page.search_after;
        items.extend(page.items);
    }

    if resources.len() > 1 {
        let scored = items.iter().any(|item| item.score().is_some());
        items.sort_by(|left, right| {
            let by_score = if scored {
                right
                    .score()
                    .unwrap_or(0.0)
                    .total_cmp(&left.score().unwrap_or(0.0))
            } else {
                Ordering::Equal
            };
            by_score.then_with(|| left.merge_key().cmp(&right.merge_key()))
        });
        items.truncate(limit);
        search_after = None;
    }

    log::debug!(
        "Merged {} item(s) of {} total from {} resource(s)",
        items.len(),
        total,
        resources.len()
    );
    Ok(PageableCollection::new(items, search_after, limit, total))
}

/// URIs of every visible resource of a type, for searches without an explicit resource list.
async fn all_resources(context: &ServiceContext, resource_type: ResourceType) -> ApiResult<Vec<ResourceURI>> {
    let repository = open_repository(context, RESOURCES_REPOSITORY)?;
    let resources = BranchContext::open(&repository, MAIN_PATH).await?;
    let builder = ResourceSearchRequestBuilder::new()
        .filter_by_resource_type(resource_type)
        .set_fields([resource_fields::ID, resource_fields::RESOURCE_TYPE])
        .set_limit(context.services().config().descendant_batch_size);
    Ok(SearchResourceRequestIterator::new(builder, &resources)
        .collect_all()
        .await?
        .into_iter()
        .map(|resource| resource.resource_uri)
        .collect())
}

/// Concept search across one or more code systems, all visible ones by default.
pub struct ConceptSearchRequest {
    code_systems: Vec<ResourceURI>,
    params: SearchParams,
}

#[async_trait::async_trait]
impl Request<ServiceContext> for ConceptSearchRequest {
    type Output = Concepts;

    async fn execute(&self, context: &ServiceContext) -> ApiResult<Concepts> {
        let code_systems = if self.code_systems.is_empty() {
            all_resources(context, ResourceType::CodeSystem).await?
        } else {
            self.code_systems.clone()
        };
        if let Some(invalid) = code_systems
            .iter()
            .find(|uri| uri.resource_type != ResourceType::CodeSystem)
        {
            return Err(ApiError::bad_request(format!("'{}' is not a code system URI.", invalid)));
        }
        search_across(context, &code_systems, &self.params, |uri| ConceptSearch::new(uri.clone())).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConceptSearchRequestBuilder {
    code_systems: Vec<ResourceURI>,
    params: SearchParams,
}

impl ConceptSearchRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_by_code_system(mut self, code_system: ResourceURI) -> Self {
        self.code_systems.push(code_system);
        self
    }

    pub fn filter_by_code_systems(mut self, code_systems: impl IntoIterator<Item = ResourceURI>) -> Self {
        self.code_systems.extend(code_systems);
        self
    }
}

impl SearchResourceRequestBuilder for ConceptSearchRequestBuilder {
    fn params_mut(&mut self) -> &mut SearchParams {
        &mut self.params
    }
}

impl ConceptSearchFilters for ConceptSearchRequestBuilder {}

impl RequestBuilder for ConceptSearchRequestBuilder {
    type Request = ConceptSearchRequest;

    fn build(self) -> ConceptSearchRequest {
        ConceptSearchRequest {
            code_systems: self.code_systems,
            params: self.params,
        }
    }
}

/// Search strategy over the members of one value set branch.
#[derive(Debug, Clone)]
pub struct ValueSetMemberSearch {
    value_set: ResourceURI,
}

impl ValueSetMemberSearch {
    pub fn new(value_set: ResourceURI) -> Self {
        Self { value_set }
    }
}

#[async_trait::async_trait]
impl SearchIndexResource for ValueSetMemberSearch {
    type Document = ValueSetMemberDocument;
    type Item = ValueSetMember;

    fn special_option_keys(&self) -> &'static [&'static str] {
        &[OPTION_ID, concept_options::CODE]
    }

    async fn prepare_query(&self, _context: &BranchContext, params: &SearchParams) -> ApiResult<Option<Expression>> {
        let mut query = Expression::bool();
        for (option, field) in [
            (OPTION_ID, fields::ID),
            (concept_options::CODE, fields::CODE),
            (concept_options::CODE_SYSTEM, fields::CODE_SYSTEM),
        ] {
            if params.options.contains_key(option) {
                query = query.must(Expression::exact_any(field, params.options.get_strings(option)));
            }
        }
        if let Some(active) = params.options.get_bool(concept_options::ACTIVE) {
            query = query.must(Expression::exact(fields::ACTIVE, active));
        }
        if let Some(term) = &params.term {
            query = query.must(
                Expression::bool()
                    .should(Expression::text(fields::TERM, term.clone()))
                    .should(Expression::exact(fields::CODE, term.term()))
                    .build(),
            );
        }
        Ok(Some(query.build()))
    }

    async fn to_collection(
        &self,
        _context: &BranchContext,
        hits: Hits<ValueSetMemberDocument>,
        _params: &SearchParams,
    ) -> ApiResult<ValueSetMembers> {
        let items = hits
            .hits
            .into_iter()
            .map(|hit| ValueSetMember {
                document: hit.value,
                value_set: self.value_set.clone(),
                score: hit.score,
            })
            .collect();
        Ok(PageableCollection::new(items, hits.search_after, hits.limit, hits.total))
    }
}

/// Member search across one or more value sets, all visible ones by default.
pub struct ValueSetMemberSearchRequest {
    value_sets: Vec<ResourceURI>,
    params: SearchParams,
}

#[async_trait::async_trait]
impl Request<ServiceContext> for ValueSetMemberSearchRequest {
    type Output = ValueSetMembers;

    async fn execute(&self, context: &ServiceContext) -> ApiResult<ValueSetMembers> {
        let value_sets = if self.value_sets.is_empty() {
            all_resources(context, ResourceType::ValueSet).await?
        } else {
            self.value_sets.clone()
        };
        search_across(context, &value_sets, &self.params, |uri| ValueSetMemberSearch::new(uri.clone())).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValueSetMemberSearchRequestBuilder {
    value_sets: Vec<ResourceURI>,
    params: SearchParams,
}

impl ValueSetMemberSearchRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_by_value_set(mut self, value_set: ResourceURI) -> Self {
        self.value_sets.push(value_set);
        self
    }

    pub fn filter_by_code(self, code: impl Into<String>) -> Self {
        self.set_option(concept_options::CODE, string_values([code.into()]))
    }

    pub fn filter_by_code_system(self, code_system: &ResourceURI) -> Self {
        self.set_option(concept_options::CODE_SYSTEM, string_values([code_system.to_string()]))
    }

    pub fn filter_by_active(self, active: bool) -> Self {
        self.set_option(concept_options::ACTIVE, active)
    }
}

impl SearchResourceRequestBuilder for ValueSetMemberSearchRequestBuilder {
    fn params_mut(&mut self) -> &mut SearchParams {
        &mut self.params
    }
}

impl RequestBuilder for ValueSetMemberSearchRequestBuilder {
    type Request = ValueSetMemberSearchRequest;

    fn build(self) -> ValueSetMemberSearchRequest {
        ValueSetMemberSearchRequest {
            value_sets: self.value_sets,
            params: self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn concept(code_system: &str, id: &str, score: Option<f32>) -> Concept {
        Concept {
            id: id.to_string(),
            code_system: ResourceURI::new(ResourceType::CodeSystem, code_system),
            active: true,
            term: id.to_string(),
            parent_ids: Vec::new(),
            ancestor_ids: Vec::new(),
            score,
            descendants: None,
        }
    }

    #[test]
    fn merge_keys_order_by_code_system_then_id() {
        let mut items = vec![concept("b", "1", None), concept("a", "2", None), concept("a", "1", None)];
        items.sort_by_key(MergedItem::merge_key);
        let keys: Vec<_> = items.iter().map(|c| (c.code_system.resource_id.as_str(), c.id.as_str())).collect();
        assert_eq!(keys, vec![("a", "1"), ("a", "2"), ("b", "1")]);
    }

    #[test]
    fn concept_filters_build_expressions() {
        let builder = ConceptBranchSearchRequestBuilder::new(ResourceURI::new(ResourceType::CodeSystem, "SNOMEDCT"))
            .filter_by_active(true)
            .filter_by_ancestor("404684003");
        assert_eq!(builder.params.options.get("active"), Some(&json!(true)));
        assert_eq!(builder.params.options.get("ancestor"), Some(&json!(["404684003"])));
    }
}
