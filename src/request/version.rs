use chrono::NaiveDate;
use serde_json::Value;

use crate::context::{BranchContext, BranchScope, ServiceProvider, TransactionContext};
use crate::error::{ApiError, ApiResult};
use crate::model::version::fields;
use crate::model::{
    is_valid_branch_segment, PageableCollection, ResourceDocument, ResourceType, ResourceURI, Version,
    VersionDocument,
};
use crate::request::{
    BranchCreateRequest, RepositoryRequest, Request, RequestBuilder, SearchIndexResource, SearchIndexResourceRequest,
    SearchParams, SearchResourceRequestBuilder, OPTION_ID,
};
use crate::store::{Expression, Hits, Query, SortBy};
use crate::validation::{not_blank, Validate, Violation};

pub mod version_options {
    pub const RESOURCE: &str = "resource";
    pub const VERSION: &str = "version";
    pub const RESOURCE_TYPE: &str = "resourceType";
    pub const EFFECTIVE_TIME_START: &str = "effectiveTimeStart";
    pub const EFFECTIVE_TIME_END: &str = "effectiveTimeEnd";
}

/// Search strategy over version documents of the resources repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionSearch;

#[async_trait::async_trait]
impl SearchIndexResource for VersionSearch {
    type Document = VersionDocument;
    type Item = Version;

    fn special_option_keys(&self) -> &'static [&'static str] {
        &[OPTION_ID, version_options::RESOURCE, version_options::VERSION]
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[fields::ID, fields::RESOURCE, fields::VERSION]
    }

    fn default_sort(&self) -> Vec<SortBy> {
        vec![SortBy::field(fields::EFFECTIVE_TIME, true), SortBy::field(fields::ID, true)]
    }

    async fn prepare_query(&self, _context: &BranchContext, params: &SearchParams) -> ApiResult<Option<Expression>> {
        let mut query = Expression::bool();

        for (option, field) in [
            (OPTION_ID, fields::ID),
            (version_options::RESOURCE, fields::RESOURCE),
            (version_options::VERSION, fields::VERSION),
            (version_options::RESOURCE_TYPE, "resourceType"),
        ] {
            if params.options.contains_key(option) {
                query = query.must(Expression::exact_any(field, params.options.get_strings(option)));
            }
        }

        let start = params.options.get_string(version_options::EFFECTIVE_TIME_START);
        let end = params.options.get_string(version_options::EFFECTIVE_TIME_END);
        if start.is_some() || end.is_some() {
            for date in start.iter().chain(end.iter()) {
                if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                    return Err(ApiError::bad_request(format!(
                        "Effective time '{}' should be formatted as yyyy-MM-dd.",
                        date
                    )));
                }
            }
            query = query.must(Expression::range(
                fields::EFFECTIVE_TIME,
                start.map(Value::String),
                end.map(Value::String),
            ));
        }

        if let Some(term) = &params.term {
            query = query.must(Expression::text(fields::VERSION, term.clone()));
        }

        Ok(Some(query.build()))
    }

    async fn to_collection(
        &self,
        _context: &BranchContext,
        hits: Hits<VersionDocument>,
        _params: &SearchParams,
    ) -> ApiResult<PageableCollection<Version>> {
        let items = hits.hits.into_iter().map(|hit| Version::from(hit.value)).collect();
        Ok(PageableCollection::new(items, hits.search_after, hits.limit, hits.total))
    }
}

#[derive(Debug, Clone, Default)]
pub struct VersionSearchRequestBuilder {
    params: SearchParams,
}

impl VersionSearchRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_by_resource(self, resource: &ResourceURI) -> Self {
        self.filter_by_resources([resource])
    }

    pub fn filter_by_resources<'a>(self, resources: impl IntoIterator<Item = &'a ResourceURI>) -> Self {
        let uris: Vec<String> = resources
            .into_iter()
            .map(|uri| uri.without_path().to_string())
            .collect();
        self.set_option(version_options::RESOURCE, uris)
    }

    pub fn filter_by_version(self, version: impl Into<String>) -> Self {
        self.set_option(version_options::VERSION, vec![version.into()])
    }

    pub fn filter_by_resource_type(self, resource_type: ResourceType) -> Self {
        self.set_option(version_options::RESOURCE_TYPE, vec![resource_type.as_str()])
    }

    pub fn filter_by_effective_time(self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let format = |date: NaiveDate| date.format("%Y-%m-%d").to_string();
        let mut builder = self;
        if let Some(start) = start {
            builder = builder.set_option(version_options::EFFECTIVE_TIME_START, format(start));
        }
        if let Some(end) = end {
            builder = builder.set_option(version_options::EFFECTIVE_TIME_END, format(end));
        }
        builder
    }
}

impl SearchResourceRequestBuilder for VersionSearchRequestBuilder {
    fn params_mut(&mut self) -> &mut SearchParams {
        &mut self.params
    }
}

impl RequestBuilder for VersionSearchRequestBuilder {
    type Request = SearchIndexResourceRequest<VersionSearch>;

    fn build(self) -> Self::Request {
        SearchIndexResourceRequest::new(VersionSearch, self.params)
    }
}

/// Latest version of a resource by effective time, read from committed content.
pub async fn latest_version<C: BranchScope>(context: &C, resource: &ResourceURI) -> ApiResult<Option<VersionDocument>> {
    let query = Query::select::<VersionDocument>()
        .filter(Expression::exact(fields::RESOURCE, resource.without_path().to_string()))
        .sort_by(vec![SortBy::field(fields::EFFECTIVE_TIME, false)])
        .limit(1);
    Ok(context
        .searcher()
        .search::<VersionDocument>(&query)
        .await?
        .values()
        .into_iter()
        .next())
}

/// Versions a terminology resource by branching its content branch.
#[derive(Debug, Clone)]
pub struct VersionCreateRequest {
    pub resource: ResourceURI,
    pub version: String,
    pub description: Option<String>,
    pub effective_time: NaiveDate,
    pub force: bool,
}

impl Validate for VersionCreateRequest {
    fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        not_blank(&mut violations, "version", &self.version);
        not_blank(&mut violations, "resource", &self.resource.resource_id);
        violations
    }
}

#[async_trait::async_trait]
impl Request<TransactionContext> for VersionCreateRequest {
    type Output = String;

    async fn execute(&self, context: &TransactionContext) -> ApiResult<String> {
        context.services().validation().validate(self)?;

        let display_name = self.resource.resource_type.display_name();
        let resource = context
            .lookup::<ResourceDocument>(&self.resource.resource_id)
            .await?
            .filter(|resource| resource.resource_type == self.resource.resource_type)
            .ok_or_else(|| ApiError::not_found(display_name, self.resource.resource_id.clone()))?;

        let (Some(resource_branch), Some(tooling_id)) = (resource.branch_path.clone(), resource.tooling_id.clone())
        else {
            return Err(ApiError::bad_request(format!(
                "Only terminology resources can be versioned, '{}' has no content branch.",
                self.resource
            )));
        };

        if !is_valid_branch_segment(&self.version) {
            return Err(ApiError::bad_request(format!(
                "Version '{}' should match pattern '[a-zA-Z0-9_~-]{{1,50}}'.",
                self.version
            )));
        }

        let version_uri = self.resource.without_path().with_path(self.version.clone()).to_string();
        if context.lookup::<VersionDocument>(&version_uri).await?.is_some() {
            return Err(ApiError::already_exists("Version", fields::VERSION, self.version.clone()));
        }

        if !self.force {
            let latest_effective_time = latest_version(context, &self.resource)
                .await?
                .and_then(|latest| latest.effective_time);
            if let Some(latest) = latest_effective_time {
                if self.effective_time <= latest {
                    return Err(ApiError::bad_request(format!(
                        "The specified '{}' effective time is invalid. Date should be after '{}'.",
                        self.effective_time, latest
                    )));
                }
            }
        }

        let branch = RepositoryRequest::new(&tooling_id, BranchCreateRequest::new(&resource_branch, &self.version))
            .execute(context.service_context())
            .await?;
        log::info!("Created version {} on branch {}", version_uri, branch.path);

        context.add(&VersionDocument {
            id: version_uri.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            effective_time: Some(self.effective_time),
            resource: self.resource.without_path().to_string(),
            resource_type: resource.resource_type,
            branch_path: branch.path,
            tooling_id,
            author: Some(context.author().to_string()),
            created_at: None,
        })?;
        Ok(version_uri)
    }
}

#[derive(Debug, Clone)]
pub struct VersionCreateRequestBuilder {
    resource: ResourceURI,
    version: String,
    description: Option<String>,
    effective_time: NaiveDate,
    force: bool,
}

impl VersionCreateRequestBuilder {
    pub fn new(resource: ResourceURI, version: impl Into<String>, effective_time: NaiveDate) -> Self {
        Self {
            resource,
            version: version.into(),
            description: None,
            effective_time,
            force: false,
        }
    }

    pub fn set_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl RequestBuilder for VersionCreateRequestBuilder {
    type Request = VersionCreateRequest;

    fn build(self) -> VersionCreateRequest {
        VersionCreateRequest {
            resource: self.resource,
            version: self.version,
            description: self.description,
            effective_time: self.effective_time,
            force: self.force,
        }
    }
}
