//! # Resource Policies
//!
//! Resource policy names that the engine itself guards. Catalog rows may name
//! any policy, but every protected engine operation checks one of these.

use serde::{Deserialize, Serialize};

/// Resources guarded by engine operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ResourcePolicy {
    /// Role registry administration.
    Roles,
    /// Rule catalog administration.
    Rules,
    /// User to role assignments.
    Users,
    /// Document categories.
    CategoryDocument,
    /// Document types.
    DocumentType,
    /// Document statuses.
    StatusDocument,
    /// Document controls and their versions.
    Document,
    /// Cross-cutting content management.
    AllContent,
}

impl ResourcePolicy {
    /// Get the string representation used in tuples.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourcePolicy::Roles => "roles",
            ResourcePolicy::Rules => "rules",
            ResourcePolicy::Users => "users",
            ResourcePolicy::CategoryDocument => "category-document",
            ResourcePolicy::DocumentType => "document-type",
            ResourcePolicy::StatusDocument => "status-document",
            ResourcePolicy::Document => "document",
            ResourcePolicy::AllContent => "all-content",
        }
    }

    /// Parse a resource policy, accepting `_` in place of `-`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "roles" => Some(ResourcePolicy::Roles),
            "rules" => Some(ResourcePolicy::Rules),
            "users" => Some(ResourcePolicy::Users),
            "category-document" => Some(ResourcePolicy::CategoryDocument),
            "document-type" => Some(ResourcePolicy::DocumentType),
            "status-document" => Some(ResourcePolicy::StatusDocument),
            "document" => Some(ResourcePolicy::Document),
            "all-content" => Some(ResourcePolicy::AllContent),
            _ => None,
        }
    }

    /// Get all guarded resources.
    pub fn all() -> Vec<Self> {
        vec![
            ResourcePolicy::Roles,
            ResourcePolicy::Rules,
            ResourcePolicy::Users,
            ResourcePolicy::CategoryDocument,
            ResourcePolicy::DocumentType,
            ResourcePolicy::StatusDocument,
            ResourcePolicy::Document,
            ResourcePolicy::AllContent,
        ]
    }
}

impl std::fmt::Display for ResourcePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a free-form catalog policy name.
///
/// Policies are trimmed and lowercased; names with whitespace or commas are
/// rejected because they cannot be stored as a single tuple position.
pub fn normalize_policy(s: &str) -> Option<String> {
    let policy = s.trim().to_lowercase();
    if policy.is_empty() || policy.contains(char::is_whitespace) || policy.contains(',') {
        return None;
    }
    Some(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_round_trip_names() {
        for resource in ResourcePolicy::all() {
            assert_eq!(ResourcePolicy::parse(resource.as_str()), Some(resource));
        }
        assert_eq!(
            ResourcePolicy::parse("STATUS_DOCUMENT"),
            Some(ResourcePolicy::StatusDocument)
        );
        assert_eq!(ResourcePolicy::parse("banner"), None);
    }

    #[test]
    fn test_normalize_policy() {
        assert_eq!(normalize_policy(" Document "), Some("document".to_string()));
        assert_eq!(normalize_policy("gallery"), Some("gallery".to_string()));
        assert_eq!(normalize_policy(""), None);
        assert_eq!(normalize_policy("two words"), None);
    }
}
