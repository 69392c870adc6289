use std::marker::PhantomData;

use crate::context::{BranchScope, TransactionContext};
use crate::error::{ApiError, ApiResult};
use crate::model::resource::fields;
use crate::model::version::fields as version_fields;
use crate::model::{ConceptDocument, ResourceDocument, ValueSetMemberDocument, VersionDocument};
use crate::request::{Request, RequestBuilder};
use crate::store::{Doc, Expression, Query};

/// Documents that can be removed with a `DeleteRequest`.
#[async_trait::async_trait]
pub trait Deletable: Doc {
    const DISPLAY_NAME: &'static str;

    /// Fails if the document must not be removed; `force` skips the release safety checks.
    async fn check_deletion(&self, _context: &TransactionContext, _force: bool) -> ApiResult<()> {
        Ok(())
    }

    /// Stages removals of documents owned by this one.
    async fn on_delete(&self, _context: &TransactionContext) -> ApiResult<()> {
        Ok(())
    }
}

async fn versions_of(context: &TransactionContext, resource: &ResourceDocument) -> ApiResult<Vec<VersionDocument>> {
    let query = Query::select::<VersionDocument>()
        .filter(Expression::exact(version_fields::RESOURCE, resource.resource_uri().to_string()))
        .fields(vec![version_fields::ID.to_string()]);
    Ok(context.searcher().search::<VersionDocument>(&query).await?.values())
}

#[async_trait::async_trait]
impl Deletable for ResourceDocument {
    const DISPLAY_NAME: &'static str = "Resource";

    async fn check_deletion(&self, context: &TransactionContext, force: bool) -> ApiResult<()> {
        if self.is_bundle() {
            let children = context
                .searcher()
                .count(Query::select::<ResourceDocument>().filter(Expression::exact(fields::BUNDLE_ID, self.id.clone())))
                .await?;
            if children > 0 {
                return Err(ApiError::conflict(format!(
                    "Bundle '{}' contains {} resource(s) and cannot be deleted.",
                    self.id, children
                )));
            }
        }

        if self.resource_type.is_terminology() && !force {
            let versions = versions_of(context, self).await?;
            if !versions.is_empty() {
                return Err(ApiError::conflict(format!(
                    "{} '{}' has {} version(s) and can only be deleted with force.",
                    self.resource_type.display_name(),
                    self.id,
                    versions.len()
                )));
            }
        }
        Ok(())
    }

    async fn on_delete(&self, context: &TransactionContext) -> ApiResult<()> {
        if self.resource_type.is_terminology() {
            for version in versions_of(context, self).await? {
                context.delete::<VersionDocument>(&version.id);
            }
        }
        Ok(())
    }
}

impl Deletable for VersionDocument {
    const DISPLAY_NAME: &'static str = "Version";
}

impl Deletable for ConceptDocument {
    const DISPLAY_NAME: &'static str = "Concept";
}

impl Deletable for ValueSetMemberDocument {
    const DISPLAY_NAME: &'static str = "Value Set Member";
}

/// Removes a document by id in the current transaction.
pub struct DeleteRequest<D> {
    id: String,
    force: bool,
    _document: PhantomData<fn() -> D>,
}

#[async_trait::async_trait]
impl<D: Deletable> Request<TransactionContext> for DeleteRequest<D> {
    type Output = ();

    async fn execute(&self, context: &TransactionContext) -> ApiResult<()> {
        let document = context.lookup_required::<D>(&self.id, D::DISPLAY_NAME).await?;
        document.check_deletion(context, self.force).await?;
        document.on_delete(context).await?;
        context.delete::<D>(&self.id);
        log::debug!("Staged deletion of {} '{}'", D::DISPLAY_NAME, self.id);
        Ok(())
    }
}

pub struct DeleteRequestBuilder<D> {
    id: String,
    force: bool,
    _document: PhantomData<fn() -> D>,
}

impl<D: Deletable> DeleteRequestBuilder<D> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            force: false,
            _document: PhantomData,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl<D: Deletable> RequestBuilder for DeleteRequestBuilder<D> {
    type Request = DeleteRequest<D>;

    fn build(self) -> DeleteRequest<D> {
        DeleteRequest {
            id: self.id,
            force: self.force,
            _document: PhantomData,
        }
    }
}
