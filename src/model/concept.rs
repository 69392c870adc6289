use serde::{Deserialize, Serialize};

use crate::model::{Id, PageableCollection, ResourceURI};
use crate::store::Doc;

pub mod fields {
    pub const ID: &str = "id";
    pub const ACTIVE: &str = "active";
    pub const TERM: &str = "term";
    pub const DESCRIPTION_TERM: &str = "descriptions.term";
    pub const PARENTS: &str = "parents";
    pub const ANCESTORS: &str = "ancestors";
    pub const EMBEDDING: &str = "embedding";
    pub const CODE: &str = "code";
    pub const CODE_SYSTEM: &str = "codeSystem";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Description {
    pub term: String,
    pub language_code: String,
}

/// Concept content stored on a code system branch of a tooling repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConceptDocument {
    pub id: Id,
    pub active: bool,
    /// Fallback display term when no description matches the requested locales.
    pub term: String,
    pub descriptions: Vec<Description>,
    pub parents: Vec<Id>,
    /// Transitive ancestors, excluding the direct parents.
    pub ancestors: Vec<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl Doc for ConceptDocument {
    const TYPE: &'static str = "concept";

    fn id(&self) -> &str {
        &self.id
    }
}

impl ConceptDocument {
    /// First description whose language matches one of `locales` in order;
    /// `en` matches `en-US` and `en-GB`.
    pub fn preferred_term(&self, locales: &[String]) -> String {
        locales
            .iter()
            .find_map(|locale| {
                self.descriptions.iter().find(|description| {
                    let language = description.language_code.to_lowercase();
                    let locale = locale.to_lowercase();
                    language == locale || language.starts_with(&format!("{}-", locale))
                })
            })
            .map(|description| description.term.clone())
            .unwrap_or_else(|| self.term.clone())
    }

    pub fn all_ancestors(&self) -> impl Iterator<Item = &Id> {
        self.parents.iter().chain(self.ancestors.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: Id,
    pub code_system: ResourceURI,
    pub active: bool,
    pub term: String,
    pub parent_ids: Vec<Id>,
    pub ancestor_ids: Vec<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descendants: Option<PageableCollection<Concept>>,
}

impl Concept {
    pub fn from_document(
        document: ConceptDocument,
        code_system: ResourceURI,
        locales: &[String],
        score: Option<f32>,
    ) -> Self {
        Self {
            term: document.preferred_term(locales),
            id: document.id,
            code_system,
            active: document.active,
            parent_ids: document.parents,
            ancestor_ids: document.ancestors,
            score,
            descendants: None,
        }
    }
}

pub type Concepts = PageableCollection<Concept>;

/// Member of a value set, stored on the value set's branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValueSetMemberDocument {
    pub id: Id,
    pub code: Id,
    /// URI of the code system the member code comes from.
    pub code_system: String,
    pub term: String,
    pub active: bool,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl Doc for ValueSetMemberDocument {
    const TYPE: &'static str = "valueSetMember";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetMember {
    #[serde(flatten)]
    pub document: ValueSetMemberDocument,
    pub value_set: ResourceURI,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

pub type ValueSetMembers = PageableCollection<ValueSetMember>;
