use crate::context::{BranchScope, RepositoryScope, ServiceProvider, TransactionContext};
use crate::error::{ApiError, ApiResult};
use crate::model::resource::fields;
use crate::model::{
    branch_path, is_valid_branch_segment, Id, ResourceDocument, ResourceType, ResourceURI, Settings,
    VersionDocument, DEFAULT_STATUS, MAIN_PATH, ROOT_ID,
};
use crate::request::{BranchCreateRequest, RepositoryRequest, Request, RequestBuilder};
use crate::store::{Expression, Query};
use crate::validation::{not_blank, not_blank_opt, Validate, Violation};

/// Fails with `AlreadyExists` if another resource has `value` in `field`.
pub(crate) async fn ensure_unique(
    context: &TransactionContext,
    resource_type: ResourceType,
    field: &str,
    value: &str,
    exclude_id: Option<&str>,
) -> ApiResult<()> {
    let mut filter = Expression::bool().must(Expression::exact(field, value));
    if let Some(id) = exclude_id {
        filter = filter.must_not(Expression::exact(fields::ID, id));
    }
    let matches = context
        .searcher()
        .count(Query::select::<ResourceDocument>().filter(filter.build()))
        .await?;
    if matches > 0 {
        return Err(ApiError::already_exists(resource_type.display_name(), field, value));
    }
    Ok(())
}

/// Ancestor path of the children of `bundle_id`.
pub(crate) async fn resolve_bundle_ancestors(context: &TransactionContext, bundle_id: &str) -> ApiResult<Vec<Id>> {
    if bundle_id == ROOT_ID {
        return Ok(vec![ROOT_ID.to_string()]);
    }
    let parent = context
        .lookup_required::<ResourceDocument>(bundle_id, "Bundle")
        .await
        .map_err(ApiError::into_bad_request)?;
    if !parent.is_bundle() {
        return Err(ApiError::bad_request(format!(
            "Resource '{}' is not a bundle and cannot contain other resources.",
            bundle_id
        )));
    }
    Ok(parent.resource_path_segments())
}

/// Resolves an `extensionOf` URI to the version it names.
pub(crate) async fn resolve_extension_of(context: &TransactionContext, extension_of: &ResourceURI) -> ApiResult<VersionDocument> {
    if extension_of.path.is_none() || extension_of.is_special() {
        return Err(ApiError::bad_request(format!(
            "Base terminology resource version was not explicitly given (can not be empty, LATEST or HEAD) in extensionOf URI '{}'.",
            extension_of
        )));
    }
    let version_uri = ResourceURI {
        timestamp: None,
        ..extension_of.clone()
    };
    context
        .lookup_required::<VersionDocument>(&version_uri.to_string(), "Version")
        .await
        .map_err(ApiError::into_bad_request)
}

/// Creates a bundle or a terminology resource in the resources repository.
#[derive(Debug, Clone, Default)]
pub struct ResourceCreateRequest {
    pub id: Option<Id>,
    pub resource_type: ResourceType,
    pub url: String,
    pub title: String,
    pub bundle_id: Id,
    pub status: Option<String>,
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
}

impl Validate for ResourceCreateRequest {
    fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        not_blank(&mut violations, "url", &self.url);
        not_blank(&mut violations, "title", &self.title);
        not_blank(&mut violations, "bundleId", &self.bundle_id);
        if self.resource_type.is_terminology() {
            not_blank_opt(&mut violations, "toolingId", self.tooling_id.as_deref());
        }
        violations
    }
}

impl ResourceCreateRequest {
    /// Creates or reuses the content branch of a terminology resource in its tooling repository.
    async fn pre_execute(&self, context: &TransactionContext, document: &mut ResourceDocument) -> ApiResult<()> {
        if !self.resource_type.is_terminology() {
            return Ok(());
        }
        let display_name = self.resource_type.display_name();

        if let Some(oid) = &self.oid {
            ensure_unique(context, self.resource_type, fields::OID, oid, None).await?;
        }

        let mut parent_path = MAIN_PATH.to_string();
        if let Some(extension_of) = &self.extension_of {
            let version = resolve_extension_of(context, extension_of).await?;
            let implied = branch_path(&version.branch_path, &document.id);
            if let Some(explicit) = &self.branch_path {
                if *explicit != implied && self.upgrade_of.is_none() {
                    return Err(ApiError::bad_request(format!(
                        "Branch path '{}' is inconsistent with the path '{}' implied by extensionOf '{}'.",
                        explicit, implied, extension_of
                    )));
                }
            }
            parent_path = version.branch_path;
        }

        let tooling_id = self.tooling_id.clone().unwrap_or_default();
        let repository = context
            .services()
            .repositories()
            .get(&tooling_id)
            .ok_or_else(|| {
                ApiError::bad_request(format!("ToolingId '{}' is not supported by this server.", tooling_id))
            })?;
        let store = repository.store();

        if let Some(explicit) = &self.branch_path {
            let exists = store
                .get_branch(explicit)
                .await
                .map_err(ApiError::from_store)?
                .map_or(false, |branch| !branch.deleted);
            if !exists {
                return Err(ApiError::not_found("Branch", explicit.clone()).into_bad_request());
            }
            document.branch_path = Some(explicit.clone());
            return Ok(());
        }

        let new_path = branch_path(&parent_path, &document.id);
        let taken = store
            .get_branch(&new_path)
            .await
            .map_err(ApiError::from_store)?
            .map_or(false, |branch| !branch.deleted);
        if taken {
            return Err(ApiError::already_exists(
                format!("{} Branch", display_name),
                "path",
                new_path,
            ));
        }

        let branch = RepositoryRequest::new(&tooling_id, BranchCreateRequest::new(&parent_path, &document.id))
            .execute(context.service_context())
            .await?;
        log::info!("Created branch {} for {} '{}'", branch.path, display_name, document.id);
        document.branch_path = Some(branch.path);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Request<TransactionContext> for ResourceCreateRequest {
    type Output = Id;

    async fn execute(&self, context: &TransactionContext) -> ApiResult<Id> {
        let services = context.services();
        services.validation().validate(self)?;

        let id = self
            .id
            .clone()
            .unwrap_or_else(|| services.id_generator().generate());
        let display_name = self.resource_type.display_name();

        if id == ROOT_ID {
            return Err(ApiError::conflict(format!(
                "'{}' cannot be used as a resource id, it is reserved for the resource hierarchy root.",
                ROOT_ID
            )));
        }
        if !is_valid_branch_segment(&id) {
            return Err(ApiError::bad_request(format!(
                "Resource id '{}' should match pattern '[a-zA-Z0-9_~-]{{1,50}}'.",
                id
            )));
        }
        services.url_validator().validate(&self.url)?;

        if context.lookup::<ResourceDocument>(&id).await?.is_some() {
            return Err(ApiError::already_exists(display_name, fields::ID, id));
        }
        ensure_unique(context, self.resource_type, fields::URL, &self.url, None).await?;

        if let Some(settings) = &self.settings {
            if let Some((key, _)) = settings.iter().find(|(_, value)| value.is_null()) {
                return Err(ApiError::bad_request(format!(
                    "Setting '{}' has a null value, settings of a new resource must have values.",
                    key
                )));
            }
        }

        let bundle_ancestor_ids = resolve_bundle_ancestors(context, &self.bundle_id).await?;

        let mut document = ResourceDocument {
            id: id.clone(),
            resource_type: self.resource_type,
            url: self.url.clone(),
            title: self.title.clone(),
            bundle_id: self.bundle_id.clone(),
            bundle_ancestor_ids,
            status: self.status.clone().unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            hidden: self.hidden,
            owner: self.owner.clone(),
            contact: self.contact.clone(),
            usage: self.usage.clone(),
            purpose: self.purpose.clone(),
            copyright: self.copyright.clone(),
            description: self.description.clone(),
            language: self.language.clone(),
            settings: self.settings.clone().unwrap_or_default(),
            oid: self.oid.clone(),
            branch_path: None,
            tooling_id: self.tooling_id.clone().filter(|_| self.resource_type.is_terminology()),
            extension_of: self.extension_of.clone(),
            upgrade_of: self.upgrade_of.clone(),
            created_at: None,
            updated_at: None,
        };

        self.pre_execute(context, &mut document).await?;

        context.add(&document)?;
        log::debug!("Staged new {} '{}' in {}", display_name, id, context.repository().id());
        Ok(id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceCreateRequestBuilder {
    request: ResourceCreateRequest,
}

impl ResourceCreateRequestBuilder {
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            request: ResourceCreateRequest {
                resource_type,
                bundle_id: ROOT_ID.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn bundle() -> Self {
        Self::new(ResourceType::Bundle)
    }

    pub fn code_system() -> Self {
        Self::new(ResourceType::CodeSystem)
    }

    pub fn value_set() -> Self {
        Self::new(ResourceType::ValueSet)
    }

    pub fn concept_map() -> Self {
        Self::new(ResourceType::ConceptMap)
    }

    pub fn set_id(mut self, id: impl Into<Id>) -> Self {
        self.request.id = Some(id.into());
        self
    }

    pub fn set_url(mut self, url: impl Into<String>) -> Self {
        self.request.url = url.into();
        self
    }

    pub fn set_title(mut self, title: impl Into<String>) -> Self {
        self.request.title = title.into();
        self
    }

    pub fn set_bundle_id(mut self, bundle_id: impl Into<Id>) -> Self {
        self.request.bundle_id = bundle_id.into();
        self
    }

    pub fn set_status(mut self, status: impl Into<String>) -> Self {
        self.request.status = Some(status.into());
        self
    }

    pub fn set_hidden(mut self, hidden: bool) -> Self {
        self.request.hidden = hidden;
        self
    }

    pub fn set_owner(mut self, owner: impl Into<String>) -> Self {
        self.request.owner = Some(owner.into());
        self
    }

    pub fn set_contact(mut self, contact: impl Into<String>) -> Self {
        self.request.contact = Some(contact.into());
        self
    }

    pub fn set_usage(mut self, usage: impl Into<String>) -> Self {
        self.request.usage = Some(usage.into());
        self
    }

    pub fn set_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.request.purpose = Some(purpose.into());
        self
    }

    pub fn set_copyright(mut self, copyright: impl Into<String>) -> Self {
        self.request.copyright = Some(copyright.into());
        self
    }

    pub fn set_description(mut self, description: impl Into<String>) -> Self {
        self.request.description = Some(description.into());
        self
    }

    pub fn set_language(mut self, language: impl Into<String>) -> Self {
        self.request.language = Some(language.into());
        self
    }

    pub fn set_settings(mut self, settings: Settings) -> Self {
        self.request.settings = Some(settings);
        self
    }

    pub fn set_oid(mut self, oid: impl Into<String>) -> Self {
        self.request.oid = Some(oid.into());
        self
    }

    pub fn set_branch_path(mut self, branch_path: impl Into<String>) -> Self {
        self.request.branch_path = Some(branch_path.into());
        self
    }

    pub fn set_tooling_id(mut self, tooling_id: impl Into<String>) -> Self {
        self.request.tooling_id = Some(tooling_id.into());
        self
    }

    pub fn set_extension_of(mut self, extension_of: ResourceURI) -> Self {
        self.request.extension_of = Some(extension_of);
        self
    }

    pub fn set_upgrade_of(mut self, upgrade_of: ResourceURI) -> Self {
        self.request.upgrade_of = Some(upgrade_of);
        self
    }
}

impl RequestBuilder for ResourceCreateRequestBuilder {
    type Request = ResourceCreateRequest;

    fn build(self) -> ResourceCreateRequest {
        self.request
    }
}
