//! Categorized failures surfaced by requests.

use thiserror::Error;

use crate::store::IndexError;
use crate::validation::Violation;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{resource_type} already exists with {field} '{value}'.")]
    AlreadyExists {
        resource_type: String,
        field: String,
        value: String,
    },

    #[error("{resource_type} with identifier '{key}' could not be found.")]
    NotFound { resource_type: String, key: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    IllegalQueryParameter(String),

    #[error("{0}")]
    CycleDetected(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Locked(String),

    #[error("{message}")]
    Validation {
        message: String,
        violations: Vec<Violation>,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn already_exists(
        resource_type: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        ApiError::AlreadyExists {
            resource_type: resource_type.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>, key: impl Into<String>) -> Self {
        ApiError::NotFound {
            resource_type: resource_type.into(),
            key: key.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn cycle_detected(message: impl Into<String>) -> Self {
        ApiError::CycleDetected(message.into())
    }

    /// A missing entity referenced from caller input is an invalid request, not a missing address.
    pub fn into_bad_request(self) -> Self {
        match self {
            ApiError::NotFound { .. } => ApiError::BadRequest(self.to_string()),
            other => other,
        }
    }

    /// Categorized errors pass through every layer unchanged.
    pub fn is_categorized(&self) -> bool {
        !matches!(self, ApiError::Internal(_))
    }

    /// Translates a store failure, keeping typed index errors distinguishable.
    pub fn from_store(error: anyhow::Error) -> Self {
        match error.downcast_ref::<IndexError>() {
            Some(IndexError::BadQuery(message)) => {
                ApiError::IllegalQueryParameter(message.clone())
            }
            Some(IndexError::BranchNotFound(path)) => ApiError::not_found("Branch", path.clone()),
            Some(IndexError::BranchExists(path)) => ApiError::already_exists("Branch", "path", path.clone()),
            None => ApiError::Internal(error),
        }
    }

    /// Wraps an uncategorized failure with context, leaving categorized ones untouched.
    pub fn wrap_internal(self, context: impl std::fmt::Display + Send + Sync + 'static) -> Self {
        match self {
            ApiError::Internal(error) => ApiError::Internal(error.context(context)),
            other => other,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::AlreadyExists { .. } => "AlreadyExists",
            ApiError::NotFound { .. } => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::IllegalQueryParameter(_) => "IllegalQueryParameter",
            ApiError::CycleDetected(_) => "CycleDetected",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Locked(_) => "Locked",
            ApiError::Validation { .. } => "Validation",
            ApiError::Internal(_) => "Internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_downgrades_to_bad_request() {
        let error = ApiError::not_found("Bundle", "b1").into_bad_request();
        assert!(matches!(error, ApiError::BadRequest(ref message)
            if message == "Bundle with identifier 'b1' could not be found."));

        let conflict = ApiError::conflict("x").into_bad_request();
        assert!(matches!(conflict, ApiError::Conflict(_)));
    }

    #[test]
    fn store_errors_are_translated() {
        let bad_query = ApiError::from_store(anyhow::Error::new(IndexError::BadQuery(
            "Unbalanced quote".to_string(),
        )));
        assert!(matches!(bad_query, ApiError::IllegalQueryParameter(_)));

        let missing = ApiError::from_store(
            anyhow::Error::new(IndexError::BranchNotFound("MAIN/x".to_string())).context("reading"),
        );
        assert!(matches!(missing, ApiError::NotFound { .. }));

        let other = ApiError::from_store(anyhow::anyhow!("disk on fire"));
        assert!(!other.is_categorized());
    }

    #[test]
    fn messages_name_field_and_value() {
        let error = ApiError::already_exists("Resource", "url", "http://x/res1");
        assert_eq!(error.to_string(), "Resource already exists with url 'http://x/res1'.");
    }
}
