use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// A single failed constraint on a request property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub property_path: String,
    pub message: String,
    pub invalid_value: Option<Value>,
}

impl Violation {
    pub fn new(property_path: &str, message: &str, invalid_value: Option<Value>) -> Self {
        Self {
            property_path: property_path.to_string(),
            message: message.to_string(),
            invalid_value,
        }
    }

    pub fn blank(property_path: &str, value: &str) -> Self {
        Self::new(property_path, "may not be blank", Some(Value::from(value)))
    }
}

/// Constraint declarations of a request type.
pub trait Validate {
    fn validate(&self) -> Vec<Violation>;
}

pub fn not_blank(violations: &mut Vec<Violation>, property_path: &str, value: &str) {
    if value.trim().is_empty() {
        violations.push(Violation::blank(property_path, value));
    }
}

pub fn not_blank_opt(violations: &mut Vec<Violation>, property_path: &str, value: Option<&str>) {
    match value {
        Some(value) => not_blank(violations, property_path, value),
        None => violations.push(Violation::new(property_path, "may not be null", None)),
    }
}

/// Enforces the constraints declared by requests before they run.
pub trait ValidationService: Send + Sync {
    fn validate(&self, target: &dyn Validate) -> ApiResult<()>;
}

#[derive(Debug, Default, Clone)]
pub struct DefaultValidationService;

impl ValidationService for DefaultValidationService {
    fn validate(&self, target: &dyn Validate) -> ApiResult<()> {
        let violations = target.validate();
        if violations.is_empty() {
            return Ok(());
        }

        let details = violations
            .iter()
            .map(|violation| format!("'{}' {}", violation.property_path, violation.message))
            .collect::<Vec<_>>()
            .join(", ");
        Err(ApiError::Validation {
            message: format!("{} validation error(s): {}.", violations.len(), details),
            violations,
        })
    }
}
