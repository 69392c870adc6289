use crate::context::{BranchContext, BranchScope, ServiceProvider};
use crate::error::{ApiError, ApiResult};
use crate::model::resource::fields;
use crate::model::{Options, PageableCollection, Resource, ResourceDocument, ResourceType, ResourceURI, UserContext};
use crate::request::expand::expand_items;
use crate::request::{
    rewrite_special_option_keys, Request, RequestBuilder, SearchIndexResource, SearchIndexResourceRequest,
    SearchParams, SearchResourceRequestBuilder, OPTION_ID,
};
use crate::store::{Aggregation, AggregationQuery, Expression, Hits, SortBy};

pub mod resource_options {
    pub const URL: &str = "url";
    pub const RESOURCE_TYPE: &str = "resourceType";
    pub const BUNDLE_ID: &str = "bundleId";
    pub const BUNDLE_ANCESTOR_ID: &str = "bundleAncestorId";
    pub const STATUS: &str = "status";
    pub const OID: &str = "oid";
    pub const TOOLING_ID: &str = "toolingId";
    pub const BRANCH_PATH: &str = "branchPath";
    pub const OWNER: &str = "owner";
}

/// Restricts resource documents to those the user may read.
///
/// Returns `None` when the user may read nothing at all.
pub fn resource_security_filter(user: &UserContext) -> Option<Option<Expression>> {
    let Some(permitted) = &user.permissions else {
        return Some(None);
    };
    if permitted.is_empty() {
        return None;
    }
    Some(Some(
        Expression::bool()
            .should(Expression::ids(permitted.iter().cloned()))
            .should(Expression::exact_any(fields::BUNDLE_ANCESTOR_IDS, permitted.iter().cloned()))
            .build(),
    ))
}

fn resource_filter(context: &BranchContext, params: &SearchParams) -> Option<Expression> {
    let mut query = Expression::bool();

    let option_filters = [
        (OPTION_ID, fields::ID),
        (resource_options::URL, fields::URL),
        (resource_options::RESOURCE_TYPE, fields::RESOURCE_TYPE),
        (resource_options::BUNDLE_ID, fields::BUNDLE_ID),
        (resource_options::BUNDLE_ANCESTOR_ID, fields::BUNDLE_ANCESTOR_IDS),
        (resource_options::STATUS, fields::STATUS),
        (resource_options::OID, fields::OID),
        (resource_options::TOOLING_ID, fields::TOOLING_ID),
        (resource_options::BRANCH_PATH, fields::BRANCH_PATH),
        (resource_options::OWNER, fields::OWNER),
    ];
    for (option, field) in option_filters {
        if params.options.contains_key(option) {
            query = query.must(Expression::exact_any(field, params.options.get_strings(option)));
        }
    }

    if let Some(term) = &params.term {
        query = query.must(
            Expression::bool()
                .should(Expression::text(fields::TITLE, term.clone()))
                .should(Expression::exact(fields::ID, term.term()))
                .should(Expression::exact(fields::URL, term.term()))
                .build(),
        );
    }

    if let Some(security) = resource_security_filter(context.user())? {
        query = query.must(security);
    }

    Some(query.build())
}

/// Search strategy over the resource documents of the resources repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSearch;

#[async_trait::async_trait]
impl SearchIndexResource for ResourceSearch {
    type Document = ResourceDocument;
    type Item = Resource;

    fn special_option_keys(&self) -> &'static [&'static str] {
        &[OPTION_ID, resource_options::URL, resource_options::OID, resource_options::BUNDLE_ID, resource_options::TOOLING_ID]
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            fields::ID,
            fields::RESOURCE_TYPE,
            fields::BUNDLE_ID,
            fields::BUNDLE_ANCESTOR_IDS,
            fields::TITLE,
        ]
    }

    fn default_sort(&self) -> Vec<SortBy> {
        vec![SortBy::field(fields::TITLE, true), SortBy::field(fields::ID, true)]
    }

    async fn prepare_query(&self, context: &BranchContext, params: &SearchParams) -> ApiResult<Option<Expression>> {
        Ok(resource_filter(context, params))
    }

    async fn to_collection(
        &self,
        context: &BranchContext,
        hits: Hits<ResourceDocument>,
        params: &SearchParams,
    ) -> ApiResult<PageableCollection<Resource>> {
        let mut items: Vec<Resource> = hits.hits.into_iter().map(|hit| Resource::from(hit.value)).collect();
        let expand = params.expand()?;
        expand_items(
            context,
            context.services().resource_expanders(),
            &mut items,
            &expand,
            &params.locales,
        )
        .await?;
        Ok(PageableCollection::new(items, hits.search_after, hits.limit, hits.total))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceSearchRequestBuilder {
    params: SearchParams,
}

impl ResourceSearchRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_by_url(self, url: impl Into<String>) -> Self {
        self.filter_by_urls([url.into()])
    }

    pub fn filter_by_urls(self, urls: impl IntoIterator<Item = String>) -> Self {
        self.set_option(resource_options::URL, urls.into_iter().collect::<Vec<_>>())
    }

    pub fn filter_by_resource_type(self, resource_type: ResourceType) -> Self {
        self.filter_by_resource_types([resource_type])
    }

    pub fn filter_by_resource_types(self, resource_types: impl IntoIterator<Item = ResourceType>) -> Self {
        let types: Vec<String> = resource_types.into_iter().map(|t| t.as_str().to_string()).collect();
        self.set_option(resource_options::RESOURCE_TYPE, types)
    }

    pub fn filter_by_bundle_id(self, bundle_id: impl Into<String>) -> Self {
        self.set_option(resource_options::BUNDLE_ID, vec![bundle_id.into()])
    }

    pub fn filter_by_bundle_ancestor_id(self, bundle_id: impl Into<String>) -> Self {
        self.set_option(resource_options::BUNDLE_ANCESTOR_ID, vec![bundle_id.into()])
    }

    pub fn filter_by_status(self, status: impl Into<String>) -> Self {
        self.set_option(resource_options::STATUS, vec![status.into()])
    }

    pub fn filter_by_oid(self, oid: impl Into<String>) -> Self {
        self.set_option(resource_options::OID, vec![oid.into()])
    }

    pub fn filter_by_tooling_id(self, tooling_id: impl Into<String>) -> Self {
        self.set_option(resource_options::TOOLING_ID, vec![tooling_id.into()])
    }

    pub fn filter_by_branch_path(self, branch_path: impl Into<String>) -> Self {
        self.set_option(resource_options::BRANCH_PATH, vec![branch_path.into()])
    }

    pub fn filter_by_owner(self, owner: impl Into<String>) -> Self {
        self.set_option(resource_options::OWNER, vec![owner.into()])
    }
}

impl SearchResourceRequestBuilder for ResourceSearchRequestBuilder {
    fn params_mut(&mut self) -> &mut SearchParams {
        &mut self.params
    }
}

impl RequestBuilder for ResourceSearchRequestBuilder {
    type Request = SearchIndexResourceRequest<ResourceSearch>;

    fn build(self) -> Self::Request {
        SearchIndexResourceRequest::new(ResourceSearch, self.params)
    }
}

/// Loads a single resource by id, honoring the caller's read permissions.
#[derive(Debug, Clone)]
pub struct ResourceGetRequest {
    id: String,
    resource_type: Option<ResourceType>,
    expand: Option<String>,
    locales: Vec<String>,
}

impl ResourceGetRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: None,
            expand: None,
            locales: Vec::new(),
        }
    }

    pub fn of_uri(uri: &ResourceURI) -> Self {
        Self {
            resource_type: Some(uri.resource_type),
            ..Self::new(uri.resource_id.clone())
        }
    }

    pub fn set_expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    pub fn set_locales(mut self, locales: Vec<String>) -> Self {
        self.locales = locales;
        self
    }
}

#[async_trait::async_trait]
impl<C: BranchScope> Request<C> for ResourceGetRequest {
    type Output = Resource;

    async fn execute(&self, context: &C) -> ApiResult<Resource> {
        let mut builder = ResourceSearchRequestBuilder::new()
            .filter_by_id(self.id.clone())
            .set_limit(1)
            .set_locales(self.locales.clone());
        if let Some(resource_type) = self.resource_type {
            builder = builder.filter_by_resource_type(resource_type);
        }
        if let Some(expand) = &self.expand {
            builder = builder.set_expand(expand.clone());
        }

        let display_name = self.resource_type.map_or("Resource", |t| t.display_name());
        builder
            .build()
            .execute(context)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found(display_name, self.id.clone()))
    }
}

/// Counts visible resources per value of one field.
#[derive(Debug, Clone)]
pub struct ResourceAggregateRequest {
    field: String,
    params: SearchParams,
}

#[async_trait::async_trait]
impl<C: BranchScope> Request<C> for ResourceAggregateRequest {
    type Output = Aggregation;

    async fn execute(&self, context: &C) -> ApiResult<Aggregation> {
        if self.field.trim().is_empty() {
            return Err(ApiError::bad_request("Aggregation field must be specified."));
        }
        let params = rewrite_special_option_keys(&self.params, ResourceSearch.special_option_keys())?;
        let context = context.branch_context();
        let Some(filter) = resource_filter(context, &params) else {
            return Ok(Aggregation::default());
        };
        context
            .searcher()
            .aggregate(&AggregationQuery {
                doc_type: <ResourceDocument as crate::store::Doc>::TYPE.to_string(),
                filter,
                field: self.field.clone(),
            })
            .await
    }
}

#[derive(Debug, Clone)]
pub struct ResourceAggregateRequestBuilder {
    field: String,
    params: SearchParams,
}

impl ResourceAggregateRequestBuilder {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            params: SearchParams::default(),
        }
    }

    pub fn filter_by_resource_type(self, resource_type: ResourceType) -> Self {
        self.set_option(resource_options::RESOURCE_TYPE, vec![resource_type.as_str()])
    }

    pub fn filter_by_bundle_id(self, bundle_id: impl Into<String>) -> Self {
        self.set_option(resource_options::BUNDLE_ID, vec![bundle_id.into()])
    }
}

impl SearchResourceRequestBuilder for ResourceAggregateRequestBuilder {
    fn params_mut(&mut self) -> &mut SearchParams {
        &mut self.params
    }
}

impl RequestBuilder for ResourceAggregateRequestBuilder {
    type Request = ResourceAggregateRequest;

    fn build(self) -> ResourceAggregateRequest {
        ResourceAggregateRequest {
            field: self.field,
            params: self.params,
        }
    }
}

/// Parses a `resourceType` option value.
pub fn parse_resource_types(values: &Options) -> ApiResult<Vec<ResourceType>> {
    values
        .get_strings(resource_options::RESOURCE_TYPE)
        .iter()
        .map(|value| value.parse::<ResourceType>().map_err(ApiError::bad_request))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrestricted_users_get_no_security_clause() {
        assert_eq!(resource_security_filter(&UserContext::default_user()), Some(None));
    }

    #[test]
    fn users_without_permissions_see_nothing() {
        let user = UserContext::new("u".to_string()).with_permissions(Vec::<String>::new());
        assert_eq!(resource_security_filter(&user), None);
    }

    #[test]
    fn permitted_bundles_cover_their_descendants() {
        let user = UserContext::new("u".to_string()).with_permissions(vec!["b1".to_string()]);
        let filter = resource_security_filter(&user).unwrap().unwrap();
        let inside = serde_json::json!({"id": "r1", "bundleAncestorIds": ["-1", "b1"]});
        let outside = serde_json::json!({"id": "r2", "bundleAncestorIds": ["-1", "b2"]});
        assert!(filter.evaluate(&inside).is_some());
        assert!(filter.evaluate(&outside).is_none());
    }

    #[test]
    fn resource_type_options() {
        let types = Options::new().with(resource_options::RESOURCE_TYPE, vec!["codesystems", "bundles"]);
        assert_eq!(
            parse_resource_types(&types).unwrap(),
            vec![ResourceType::CodeSystem, ResourceType::Bundle]
        );
        let invalid = Options::new().with(resource_options::RESOURCE_TYPE, "things");
        assert!(parse_resource_types(&invalid).is_err());
    }
}
