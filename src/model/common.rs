use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

pub type Id = String;

/// Reserved bundle id of the resource hierarchy root.
pub const ROOT_ID: &str = "-1";

/// Path of the root branch in every repository.
pub const MAIN_PATH: &str = "MAIN";

/// Branch path separator.
pub const SEPARATOR: char = '/';

/// Repository holding resource and version documents.
pub const RESOURCES_REPOSITORY: &str = "resources";

/// Reported by a transaction that did not produce a commit.
pub const NO_COMMIT_TIMESTAMP: i64 = -1;

static BRANCH_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_~\-]{1,50}$").expect("valid branch segment pattern"));

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Returns true if the value can be used as a single branch path segment.
pub fn is_valid_branch_segment(value: &str) -> bool {
    BRANCH_SEGMENT.is_match(value)
}

/// Joins a parent branch path and a child segment.
pub fn branch_path(parent: &str, name: &str) -> String {
    format!("{}{}{}", parent, SEPARATOR, name)
}

/// Returns true if `path` equals `ancestor` or is nested below it.
pub fn is_same_or_descendant_path(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || (path.starts_with(ancestor)
            && path[ancestor.len()..].starts_with(SEPARATOR))
}

/// Parent path of a branch path, `None` for a top-level branch.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind(SEPARATOR).map(|idx| &path[..idx])
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_segments() {
        assert!(is_valid_branch_segment("SNOMEDCT-UK_2024~1"));
        assert!(!is_valid_branch_segment(""));
        assert!(!is_valid_branch_segment("a/b"));
        assert!(!is_valid_branch_segment("with space"));
        assert!(!is_valid_branch_segment(&"x".repeat(51)));
    }

    #[test]
    fn path_hierarchy() {
        assert!(is_same_or_descendant_path("MAIN/a/b", "MAIN/a"));
        assert!(is_same_or_descendant_path("MAIN", "MAIN"));
        assert!(!is_same_or_descendant_path("MAIN/ab", "MAIN/a"));
        assert_eq!(parent_path("MAIN/a/b"), Some("MAIN/a"));
        assert_eq!(parent_path("MAIN"), None);
        assert_eq!(branch_path("MAIN", "x"), "MAIN/x");
    }
}
