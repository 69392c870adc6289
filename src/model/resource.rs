use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::{Id, PageableCollection, ResourceURI, Settings, Version, ROOT_ID};
use crate::store::Doc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    #[default]
    #[serde(rename = "bundles")]
    Bundle,
    #[serde(rename = "codesystems")]
    CodeSystem,
    #[serde(rename = "valuesets")]
    ValueSet,
    #[serde(rename = "conceptmaps")]
    ConceptMap,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Bundle => "bundles",
            ResourceType::CodeSystem => "codesystems",
            ResourceType::ValueSet => "valuesets",
            ResourceType::ConceptMap => "conceptmaps",
        }
    }

    /// Human readable name used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceType::Bundle => "Bundle",
            ResourceType::CodeSystem => "Code System",
            ResourceType::ValueSet => "Value Set",
            ResourceType::ConceptMap => "Concept Map",
        }
    }

    /// Terminology resources own content on a branch of a tooling repository.
    pub fn is_terminology(&self) -> bool {
        !matches!(self, ResourceType::Bundle)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "bundles" => Ok(ResourceType::Bundle),
            "codesystems" => Ok(ResourceType::CodeSystem),
            "valuesets" => Ok(ResourceType::ValueSet),
            "conceptmaps" => Ok(ResourceType::ConceptMap),
            other => Err(format!("Unknown resource type '{}'", other)),
        }
    }
}

pub mod fields {
    pub const ID: &str = "id";
    pub const RESOURCE_TYPE: &str = "resourceType";
    pub const URL: &str = "url";
    pub const TITLE: &str = "title";
    pub const BUNDLE_ID: &str = "bundleId";
    pub const BUNDLE_ANCESTOR_IDS: &str = "bundleAncestorIds";
    pub const STATUS: &str = "status";
    pub const HIDDEN: &str = "hidden";
    pub const OWNER: &str = "owner";
    pub const OID: &str = "oid";
    pub const BRANCH_PATH: &str = "branchPath";
    pub const TOOLING_ID: &str = "toolingId";
    pub const UPDATED_AT: &str = "updatedAt";
}

pub const DEFAULT_STATUS: &str = "draft";

/// Persisted shape of a resource in the resources repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceDocument {
    pub id: Id,
    pub resource_type: ResourceType,
    pub url: String,
    pub title: String,
    pub bundle_id: Id,
    /// Root-to-immediate-parent bundle ids, maintained on every reparenting.
    pub bundle_ancestor_ids: Vec<Id>,
    pub status: String,
    pub hidden: bool,
    pub owner: Option<String>,
    pub contact: Option<String>,
    pub usage: Option<String>,
    pub purpose: Option<String>,
    pub copyright: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub settings: Settings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooling_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_of: Option<ResourceURI>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_of: Option<ResourceURI>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl Doc for ResourceDocument {
    const TYPE: &'static str = "resource";

    fn id(&self) -> &str {
        &self.id
    }
}

impl ResourceDocument {
    pub fn resource_uri(&self) -> ResourceURI {
        ResourceURI::new(self.resource_type, self.id.clone())
    }

    /// Ancestor path handed down to the direct children of this resource.
    pub fn resource_path_segments(&self) -> Vec<Id> {
        let mut segments = self.bundle_ancestor_ids.clone();
        segments.push(self.id.clone());
        segments
    }

    pub fn is_bundle(&self) -> bool {
        self.resource_type == ResourceType::Bundle
    }

    pub fn is_root_level(&self) -> bool {
        self.bundle_id == ROOT_ID
    }
}

/// Label of an ancestor bundle, attached by the `bundleAncestors` expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLabel {
    pub id: Id,
    pub title: String,
}

/// Resource as returned by search and get requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(flatten)]
    pub document: ResourceDocument,
    pub resource_uri: ResourceURI,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_ancestors: Option<Vec<ResourceLabel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<PageableCollection<Version>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descendants: Option<PageableCollection<Resource>>,
}

impl Resource {
    pub fn id(&self) -> &str {
        &self.document.id
    }
}

impl From<ResourceDocument> for Resource {
    fn from(document: ResourceDocument) -> Self {
        Self {
            resource_uri: document.resource_uri(),
            document,
            bundle_ancestors: None,
            versions: None,
            descendants: None,
        }
    }
}

pub type Resources = PageableCollection<Resource>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn persisted_field_names() {
        let document = ResourceDocument {
            id: "res1".to_string(),
            resource_type: ResourceType::CodeSystem,
            url: "http://x/res1".to_string(),
            title: "Res 1".to_string(),
            bundle_id: ROOT_ID.to_string(),
            bundle_ancestor_ids: vec![ROOT_ID.to_string()],
            status: DEFAULT_STATUS.to_string(),
            tooling_id: Some("snomed".to_string()),
            ..Default::default()
        };

        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["resourceType"], json!("codesystems"));
        assert_eq!(value["bundleAncestorIds"], json!(["-1"]));
        assert_eq!(value["toolingId"], json!("snomed"));
        assert_eq!(value["updatedAt"], json!(null));
        assert!(value.get("oid").is_none());
    }

    #[test]
    fn partial_documents_deserialize() {
        let document: ResourceDocument =
            serde_json::from_value(json!({"id": "a", "bundleId": "-1"})).unwrap();
        assert_eq!(document.id, "a");
        assert!(document.is_root_level());
        assert_eq!(document.resource_path_segments(), vec!["a".to_string()]);
    }
}
