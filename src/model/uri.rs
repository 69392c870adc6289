use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::ResourceType;

pub const HEAD: &str = "HEAD";
pub const LATEST: &str = "LATEST";

/// Logical address of a resource: `resourceType/resourceId[/path][@timestamp]`.
///
/// The optional path selects a version (or the `HEAD`/`LATEST` pointers), the
/// optional timestamp selects a point in time on the resolved branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceURI {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub path: Option<String>,
    pub timestamp: Option<i64>,
}

impl ResourceURI {
    pub fn new(resource_type: ResourceType, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
            path: None,
            timestamp: None,
        }
    }

    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..self.clone()
        }
    }

    pub fn at(&self, timestamp: i64) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..self.clone()
        }
    }

    pub fn without_path(&self) -> Self {
        Self {
            path: None,
            timestamp: None,
            ..self.clone()
        }
    }

    pub fn is_head(&self) -> bool {
        self.path.as_deref().map_or(true, |path| path == HEAD)
    }

    pub fn is_latest(&self) -> bool {
        self.path.as_deref() == Some(LATEST)
    }

    /// `HEAD` and `LATEST` are pointers, not concrete versions.
    pub fn is_special(&self) -> bool {
        matches!(self.path.as_deref(), Some(HEAD) | Some(LATEST))
    }
}

impl fmt::Display for ResourceURI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.resource_id)?;
        if let Some(path) = &self.path {
            write!(f, "/{}", path)?;
        }
        if let Some(timestamp) = self.timestamp {
            write!(f, "@{}", timestamp)?;
        }
        Ok(())
    }
}

impl FromStr for ResourceURI {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (address, timestamp) = match value.split_once('@') {
            Some((address, timestamp)) => {
                let timestamp = timestamp
                    .parse::<i64>()
                    .map_err(|_| format!("Invalid timestamp in resource URI '{}'", value))?;
                (address, Some(timestamp))
            }
            None => (value, None),
        };

        let mut segments = address.splitn(3, '/');
        let resource_type = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| format!("Missing resource type in resource URI '{}'", value))?
            .parse::<ResourceType>()?;
        let resource_id = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| format!("Missing resource id in resource URI '{}'", value))?
            .to_string();
        let path = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);

        Ok(Self {
            resource_type,
            resource_id,
            path,
            timestamp,
        })
    }
}

impl TryFrom<String> for ResourceURI {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceURI> for String {
    fn from(uri: ResourceURI) -> Self {
        uri.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format() {
        let uri: ResourceURI = "codesystems/SNOMEDCT/2024-01-31@1700".parse().unwrap();
        assert_eq!(uri.resource_type, ResourceType::CodeSystem);
        assert_eq!(uri.resource_id, "SNOMEDCT");
        assert_eq!(uri.path.as_deref(), Some("2024-01-31"));
        assert_eq!(uri.timestamp, Some(1700));
        assert_eq!(uri.to_string(), "codesystems/SNOMEDCT/2024-01-31@1700");
        assert_eq!(uri.without_path().to_string(), "codesystems/SNOMEDCT");
    }

    #[test]
    fn special_paths() {
        let head: ResourceURI = "codesystems/LOINC".parse().unwrap();
        assert!(head.is_head());
        assert!(!head.is_special());
        assert!(head.with_path(LATEST).is_latest());
        assert!(head.with_path(HEAD).is_special());
    }

    #[test]
    fn rejects_malformed() {
        assert!("codesystems".parse::<ResourceURI>().is_err());
        assert!("unknown/x".parse::<ResourceURI>().is_err());
        assert!("codesystems/x@abc".parse::<ResourceURI>().is_err());
    }
}
