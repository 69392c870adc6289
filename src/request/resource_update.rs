use std::collections::{HashMap, VecDeque};

use itertools::Itertools;

use crate::context::{BranchScope, RepositoryScope, ServiceProvider, TransactionContext};
use crate::error::{ApiError, ApiResult};
use crate::model::resource::fields;
use crate::model::{
    branch_path, merge_settings, Id, ResourceDocument, ResourceType, ResourceURI, SettingsUpdate,
};
use crate::request::resource_create::{ensure_unique, resolve_bundle_ancestors, resolve_extension_of};
use crate::request::{
    Request, RequestBuilder, ResourceSearchRequestBuilder, SearchResourceRequestBuilder,
    SearchResourceRequestIterator,
};
use crate::store::SortBy;

/// Overwrites `current` if a different value was supplied. `None` leaves it unchanged.
fn update_property<T: PartialEq + Clone>(value: &Option<T>, current: &mut T) -> bool {
    match value {
        Some(value) if value != current => {
            *current = value.clone();
            true
        }
        _ => false,
    }
}

fn update_optional_property<T: PartialEq + Clone>(value: &Option<T>, current: &mut Option<T>) -> bool {
    match value {
        Some(value) if current.as_ref() != Some(value) => {
            *current = Some(value.clone());
            true
        }
        _ => false,
    }
}

/// Rewrites `bundleAncestorIds` below a reparented bundle.
///
/// Descendants are loaded once, grouped by parent, and walked breadth first so
/// that each level's ancestor path is computed once for all siblings. Only
/// descendants whose stored path differs are written.
async fn propagate_bundle_ancestors(context: &TransactionContext, bundle: &ResourceDocument) -> ApiResult<usize> {
    let batch_size = context.services().config().descendant_batch_size;
    let system = context.branch_context().as_system();
    let descendants = SearchResourceRequestIterator::new(
        ResourceSearchRequestBuilder::new()
            .filter_by_bundle_ancestor_id(bundle.id.clone())
            .sort_by(vec![SortBy::field(fields::ID, true)])
            .set_limit(batch_size),
        &system,
    )
    .collect_all()
    .await?;

    let mut current = Vec::with_capacity(descendants.len());
    for descendant in descendants {
        match context.staged::<ResourceDocument>(descendant.id())? {
            Some(Some(staged)) => current.push(staged),
            Some(None) => {}
            None => current.push(descendant.document),
        }
    }
    let mut children: HashMap<Id, Vec<ResourceDocument>> =
        current.into_iter().into_group_map_by(|document| document.bundle_id.clone());

    let mut updated = 0;
    let mut queue = VecDeque::from([(bundle.id.clone(), bundle.resource_path_segments())]);
    while let Some((parent_id, ancestors)) = queue.pop_front() {
        let Some(direct_children) = children.remove(&parent_id) else {
            continue;
        };
        for mut child in direct_children {
            if child.is_bundle() {
                let mut child_path = ancestors.clone();
                child_path.push(child.id.clone());
                queue.push_back((child.id.clone(), child_path));
            }
            if child.bundle_ancestor_ids != ancestors {
                child.bundle_ancestor_ids = ancestors.clone();
                child.updated_at = None;
                context.update(&child)?;
                updated += 1;
            }
        }
    }

    log::debug!(
        "Updated the ancestor path of {} descendant(s) of bundle '{}'",
        updated,
        bundle.id
    );
    Ok(updated)
}

/// Applies a partial update to a resource and reports whether anything changed.
#[derive(Debug, Clone, Default)]
pub struct ResourceUpdateRequest {
    pub id: Id,
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
}

impl ResourceUpdateRequest {
    async fn update_url(&self, context: &TransactionContext, resource: &mut ResourceDocument) -> ApiResult<bool> {
        let Some(url) = &self.url else {
            return Ok(false);
        };
        if url.trim().is_empty() {
            return Err(ApiError::bad_request("Resource URL should not be blank."));
        }
        if *url == resource.url {
            return Ok(false);
        }
        context.services().url_validator().validate(url)?;
        ensure_unique(context, resource.resource_type, fields::URL, url, Some(&resource.id)).await?;
        resource.url = url.clone();
        Ok(true)
    }

    async fn update_bundle(&self, context: &TransactionContext, resource: &mut ResourceDocument) -> ApiResult<bool> {
        let Some(bundle_id) = &self.bundle_id else {
            return Ok(false);
        };
        if *bundle_id == resource.bundle_id {
            return Ok(false);
        }
        if *bundle_id == resource.id {
            return Err(ApiError::cycle_detected(format!(
                "Resource '{}' cannot be its own bundle.",
                resource.id
            )));
        }

        let ancestors = resolve_bundle_ancestors(context, bundle_id).await?;
        if ancestors.contains(&resource.id) {
            return Err(ApiError::cycle_detected(format!(
                "Bundle '{}' cannot be moved under its own descendant '{}'.",
                resource.id, bundle_id
            )));
        }

        log::debug!(
            "Moving resource '{}' from bundle '{}' to '{}'",
            resource.id,
            resource.bundle_id,
            bundle_id
        );
        resource.bundle_id = bundle_id.clone();
        resource.bundle_ancestor_ids = ancestors;

        if resource.is_bundle() {
            propagate_bundle_ancestors(context, resource).await?;
        }
        Ok(true)
    }

    async fn ensure_branch_exists(context: &TransactionContext, resource: &ResourceDocument, path: &str) -> ApiResult<()> {
        let tooling_id = resource.tooling_id.clone().unwrap_or_default();
        let repository = context
            .services()
            .repositories()
            .get(&tooling_id)
            .ok_or_else(|| ApiError::bad_request(format!("ToolingId '{}' is not supported by this server.", tooling_id)))?;
        let exists = repository
            .store()
            .get_branch(path)
            .await
            .map_err(ApiError::from_store)?
            .map_or(false, |branch| !branch.deleted);
        if exists {
            Ok(())
        } else {
            Err(ApiError::not_found("Branch", path).into_bad_request())
        }
    }

    async fn update_specialized_properties(
        &self,
        context: &TransactionContext,
        resource: &mut ResourceDocument,
    ) -> ApiResult<bool> {
        if !resource.resource_type.is_terminology() {
            return Ok(false);
        }
        let mut changed = false;

        if let Some(oid) = &self.oid {
            if resource.oid.as_ref() != Some(oid) {
                ensure_unique(context, resource.resource_type, fields::OID, oid, Some(&resource.id)).await?;
                resource.oid = Some(oid.clone());
                changed = true;
            }
        }

        match &self.extension_of {
            Some(extension_of) if resource.extension_of.as_ref() != Some(extension_of) => {
                let version = resolve_extension_of(context, extension_of).await?;
                let implied = branch_path(&version.branch_path, &resource.id);
                let effective = self
                    .branch_path
                    .clone()
                    .or_else(|| resource.branch_path.clone())
                    .unwrap_or_default();
                if effective != implied {
                    return Err(ApiError::bad_request(format!(
                        "Branch path '{}' is inconsistent with the path '{}' implied by extensionOf '{}'.",
                        effective, implied, extension_of
                    )));
                }
                if resource.branch_path.as_deref() != Some(effective.as_str()) {
                    Self::ensure_branch_exists(context, resource, &effective).await?;
                }
                resource.extension_of = Some(extension_of.clone());
                resource.branch_path = Some(effective);
                changed = true;
            }
            _ => {
                if let Some(path) = &self.branch_path {
                    if resource.branch_path.as_ref() != Some(path) {
                        Self::ensure_branch_exists(context, resource, path).await?;
                        resource.branch_path = Some(path.clone());
                        changed = true;
                    }
                }
            }
        }

        changed |= update_optional_property(&self.upgrade_of, &mut resource.upgrade_of);
        Ok(changed)
    }
}

#[async_trait::async_trait]
impl Request<TransactionContext> for ResourceUpdateRequest {
    type Output = bool;

    async fn execute(&self, context: &TransactionContext) -> ApiResult<bool> {
        let display_name = self.resource_type.map_or("Resource", |t| t.display_name());
        let current = context
            .lookup::<ResourceDocument>(&self.id)
            .await?
            .filter(|resource| self.resource_type.map_or(true, |t| t == resource.resource_type))
            .ok_or_else(|| ApiError::not_found(display_name, self.id.clone()))?;

        let mut resource = current.clone();
        let mut changed = false;

        changed |= self.update_url(context, &mut resource).await?;
        changed |= update_property(&self.title, &mut resource.title);
        changed |= update_property(&self.status, &mut resource.status);
        changed |= update_property(&self.hidden, &mut resource.hidden);
        changed |= update_optional_property(&self.owner, &mut resource.owner);
        changed |= update_optional_property(&self.contact, &mut resource.contact);
        changed |= update_optional_property(&self.usage, &mut resource.usage);
        changed |= update_optional_property(&self.purpose, &mut resource.purpose);
        changed |= update_optional_property(&self.copyright, &mut resource.copyright);
        changed |= update_optional_property(&self.description, &mut resource.description);
        changed |= update_optional_property(&self.language, &mut resource.language);
        changed |= self.update_bundle(context, &mut resource).await?;
        if let Some(settings) = &self.settings {
            changed |= merge_settings(&mut resource.settings, settings);
        }
        changed |= self.update_specialized_properties(context, &mut resource).await?;

        if changed {
            resource.updated_at = None;
            context.update(&resource)?;
            log::debug!("Staged update of resource '{}' in {}", resource.id, context.repository().id());
        }
        Ok(changed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceUpdateRequestBuilder {
    request: ResourceUpdateRequest,
}

impl ResourceUpdateRequestBuilder {
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            request: ResourceUpdateRequest {
                id: id.into(),
                ..Default::default()
            },
        }
    }

    pub fn of_uri(uri: &ResourceURI) -> Self {
        let mut builder = Self::new(uri.resource_id.clone());
        builder.request.resource_type = Some(uri.resource_type);
        builder
    }

    pub fn set_url(mut self, url: impl Into<String>) -> Self {
        self.request.url = Some(url.into());
        self
    }

    pub fn set_title(mut self, title: impl Into<String>) -> Self {
        self.request.title = Some(title.into());
        self
    }

    pub fn set_bundle_id(mut self, bundle_id: impl Into<Id>) -> Self {
        self.request.bundle_id = Some(bundle_id.into());
        self
    }

    pub fn set_status(mut self, status: impl Into<String>) -> Self {
        self.request.status = Some(status.into());
        self
    }

    pub fn set_hidden(mut self, hidden: bool) -> Self {
        self.request.hidden = Some(hidden);
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

    pub fn set_settings(mut self, settings: SettingsUpdate) -> Self {
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

    pub fn set_extension_of(mut self, extension_of: ResourceURI) -> Self {
        self.request.extension_of = Some(extension_of);
        self
    }

    pub fn set_upgrade_of(mut self, upgrade_of: ResourceURI) -> Self {
        self.request.upgrade_of = Some(upgrade_of);
        self
    }
}

impl RequestBuilder for ResourceUpdateRequestBuilder {
    type Request = ResourceUpdateRequest;

    fn build(self) -> ResourceUpdateRequest {
        self.request
    }
}
