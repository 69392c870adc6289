pub mod branch;
pub mod collection;
pub mod commit;
pub mod common;
pub mod concept;
pub mod filters;
pub mod options;
pub mod resource;
pub mod settings;
pub mod uri;
pub mod user_context;
pub mod version;

pub use branch::*;
pub use collection::*;
pub use commit::*;
pub use common::*;
pub use concept::{
    Concept, ConceptDocument, Concepts, Description, ValueSetMember, ValueSetMemberDocument,
    ValueSetMembers,
};
pub use filters::*;
pub use options::*;
pub use resource::{
    Resource, ResourceDocument, ResourceLabel, ResourceType, Resources, DEFAULT_STATUS,
};
pub use settings::*;
pub use uri::*;
pub use user_context::*;
pub use version::{Version, VersionDocument};
