use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{Id, ResourceType, ResourceURI};
use crate::store::Doc;

pub mod fields {
    pub const ID: &str = "id";
    pub const VERSION: &str = "version";
    pub const RESOURCE: &str = "resource";
    pub const EFFECTIVE_TIME: &str = "effectiveTime";
    pub const BRANCH_PATH: &str = "branchPath";
}

/// Immutable, named snapshot of a terminology resource's branch.
///
/// The document id is the version URI (`codesystems/SNOMEDCT/2024-01-31`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionDocument {
    pub id: Id,
    pub version: String,
    pub description: Option<String>,
    pub effective_time: Option<NaiveDate>,
    /// URI of the versioned resource, without path.
    pub resource: String,
    pub resource_type: ResourceType,
    pub branch_path: String,
    pub tooling_id: String,
    pub author: Option<String>,
    pub created_at: Option<i64>,
}

impl Doc for VersionDocument {
    const TYPE: &'static str = "version";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    #[serde(flatten)]
    pub document: VersionDocument,
    pub version_uri: String,
}

impl Version {
    pub fn resource_uri(&self) -> Option<ResourceURI> {
        self.document.resource.parse().ok()
    }
}

impl From<VersionDocument> for Version {
    fn from(document: VersionDocument) -> Self {
        Self {
            version_uri: document.id.clone(),
            document,
        }
    }
}
