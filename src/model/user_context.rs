use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::ResourceDocument;

/// User context extracted from request headers, used for authorship and visibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    /// Resource ids the user may read; `None` means unrestricted.
    pub permissions: Option<BTreeSet<String>>,
}

impl UserContext {
    /// Create a new unrestricted UserContext with just a user ID
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            user_email: None,
            user_name: None,
            permissions: None,
        }
    }

    pub fn with_details(user_id: String, email: Option<String>, name: Option<String>) -> Self {
        Self {
            user_id,
            user_email: email,
            user_name: name,
            permissions: None,
        }
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = String>) -> Self {
        self.permissions = Some(permissions.into_iter().collect());
        self
    }

    /// System user for internal checks that must see every resource
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            user_email: Some("system@termdb.internal".to_string()),
            user_name: Some("System".to_string()),
            permissions: None,
        }
    }

    pub fn default_user() -> Self {
        Self {
            user_id: "dev-user".to_string(),
            user_email: Some("dev@localhost".to_string()),
            user_name: Some("Development User".to_string()),
            permissions: None,
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.permissions.is_some()
    }

    /// A resource is visible if the user may read it or any bundle above it.
    pub fn can_read(&self, document: &ResourceDocument) -> bool {
        match &self.permissions {
            None => true,
            Some(permitted) => {
                permitted.contains(&document.id)
                    || document
                        .bundle_ancestor_ids
                        .iter()
                        .any(|ancestor| permitted.contains(ancestor))
            }
        }
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::default_user()
    }
}
