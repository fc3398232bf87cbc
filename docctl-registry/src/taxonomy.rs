//! Taxonomy domain models
//!
//! Categories and document types form a two-level hierarchy whose prefixes
//! double as the `category` and `type` scope keys of catalog rows and grant
//! tuples.

use chrono::{DateTime, Utc};
use docctl_rbac::TupleScope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A document category.
///
/// # Examples
///
/// ```
/// use docctl_registry::CategoryDocument;
///
/// let category = CategoryDocument::new("Finance", "FIN");
/// assert_eq!(category.scope().category.as_str(), "FIN");
/// assert!(!category.is_deleted());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDocument {
    /// Row id, assigned on insert
    pub id: i64,

    /// Stable external identifier
    pub uuid: Uuid,

    /// Display name
    pub name: String,

    /// Unique prefix, used as the category scope key
    pub prefix: String,

    /// When the category was created
    pub created_at: DateTime<Utc>,

    /// When the category was last updated
    pub updated_at: DateTime<Utc>,

    /// Soft delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CategoryDocument {
    /// Creates a new, not yet persisted category.
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            uuid: Uuid::now_v7(),
            name: name.into(),
            prefix: prefix.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Scope of rules attached directly to this category.
    pub fn scope(&self) -> TupleScope {
        TupleScope::category(self.prefix.as_str())
    }

    /// Whether the category has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Case-insensitive match on name or prefix.
    pub fn matches_search(&self, search: &str) -> bool {
        let needle = search.to_lowercase();
        self.name.to_lowercase().contains(&needle) || self.prefix.to_lowercase().contains(&needle)
    }
}

/// A document type beneath a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentType {
    /// Row id, assigned on insert
    pub id: i64,

    /// Stable external identifier
    pub uuid: Uuid,

    /// Display name
    pub name: String,

    /// Unique prefix, used as the type scope key
    pub prefix: String,

    /// Owning category
    pub document_category_id: i64,

    /// When the type was created
    pub created_at: DateTime<Utc>,

    /// When the type was last updated
    pub updated_at: DateTime<Utc>,

    /// Soft delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocumentType {
    /// Creates a new, not yet persisted document type.
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, document_category_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            uuid: Uuid::now_v7(),
            name: name.into(),
            prefix: prefix.into(),
            document_category_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Scope of rules attached to this type under its category's prefix.
    pub fn scope(&self, category_prefix: &str) -> TupleScope {
        TupleScope::document_type(category_prefix, self.prefix.as_str())
    }

    /// Whether the type has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Case-insensitive match on name or prefix.
    pub fn matches_search(&self, search: &str) -> bool {
        let needle = search.to_lowercase();
        self.name.to_lowercase().contains(&needle) || self.prefix.to_lowercase().contains(&needle)
    }
}
