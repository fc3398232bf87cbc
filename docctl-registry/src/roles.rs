//! Role domain model
//!
//! Roles are named identities that grant tuples are attached to. A role is
//! identified by its `(name, guard_name)` pair; the name is what appears as the
//! subject of grant tuples and as the role of grouping tuples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named role.
///
/// # Examples
///
/// ```
/// use docctl_registry::Role;
///
/// let role = Role::new("finance-clerk", "api");
/// assert_eq!(role.name, "finance-clerk");
/// assert!(role.identifies("finance-clerk", "api"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Row id, assigned on insert
    pub id: i64,

    /// Stable external identifier
    pub uuid: Uuid,

    /// Role name, used as the tuple subject
    pub name: String,

    /// Guard the role belongs to
    pub guard_name: String,

    /// When the role was created
    pub created_at: DateTime<Utc>,

    /// When the role was last updated
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Creates a new, not yet persisted role.
    ///
    /// # Arguments
    ///
    /// * `name` - Role name
    /// * `guard_name` - Guard the role belongs to
    pub fn new(name: impl Into<String>, guard_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            uuid: Uuid::now_v7(),
            name: name.into(),
            guard_name: guard_name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this role has the given identity.
    pub fn identifies(&self, name: &str, guard_name: &str) -> bool {
        self.name == name && self.guard_name == guard_name
    }

    /// Case-insensitive substring match on the name.
    pub fn matches_search(&self, search: &str) -> bool {
        self.name.to_lowercase().contains(&search.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_creation() {
        let role = Role::new("editor", "api");
        assert_eq!(role.id, 0);
        assert_eq!(role.guard_name, "api");
        assert_eq!(role.created_at, role.updated_at);
    }

    #[test]
    fn test_role_identity() {
        let role = Role::new("editor", "api");
        assert!(role.identifies("editor", "api"));
        assert!(!role.identifies("editor", "web"));
        assert!(role.matches_search("EDIT"));
    }
}
