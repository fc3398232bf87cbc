//! Document domain models
//!
//! This module provides the lifecycle entities: [`DocumentControl`] (the
//! logical document), [`DocumentVersion`] (an uploaded, append-only revision)
//! and [`StatusDocument`] (the descriptive status both of them reference).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A document status such as Draft or Published.
///
/// The lowercased status name is the action checked when a non-owner reads a
/// document in this status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDocument {
    /// Row id, assigned on insert
    pub id: i64,

    /// Stable external identifier
    pub uuid: Uuid,

    /// Status name
    pub name: String,

    /// When the status was created
    pub created_at: DateTime<Utc>,

    /// When the status was last updated
    pub updated_at: DateTime<Utc>,

    /// Soft delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StatusDocument {
    /// Creates a new, not yet persisted status.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            uuid: Uuid::now_v7(),
            name: name.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether the status has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

/// A logical document.
///
/// Owns zero or more [`DocumentVersion`] rows through `document_control_id`.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use docctl_registry::DocumentControl;
///
/// let publish = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// let control = DocumentControl::new("Invoice policy", "FIN-INV-001", publish, "alice")
///     .with_taxonomy(1, 2)
///     .with_status(1);
/// assert_eq!(control.document_category_id, Some(1));
/// assert!(control.is_owned_by("alice"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentControl {
    /// Row id, assigned on insert
    pub id: i64,

    /// Stable external identifier
    pub uuid: Uuid,

    /// Document title
    pub document_name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Document number
    pub document_number: String,

    /// Clause number
    #[serde(default)]
    pub clause_number: String,

    /// Caller-maintained revision number
    pub revision_number: i32,

    /// Publish date
    pub publish_date: NaiveDate,

    /// Page count
    #[serde(default)]
    pub page_count: i32,

    /// Document type
    pub document_type_id: Option<i64>,

    /// Document category
    pub document_category_id: Option<i64>,

    /// Ordering within the type
    pub sequence_number: Option<i32>,

    /// Current status
    pub status_document_id: Option<i64>,

    /// Subject that created the document
    pub created_by: String,

    /// When the document was created
    pub created_at: DateTime<Utc>,

    /// When the document was last updated
    pub updated_at: DateTime<Utc>,

    /// Soft delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocumentControl {
    /// Creates a new, not yet persisted document.
    ///
    /// # Arguments
    ///
    /// * `document_name` - Document title
    /// * `document_number` - Document number
    /// * `publish_date` - Publish date
    /// * `created_by` - Subject creating the document
    pub fn new(
        document_name: impl Into<String>,
        document_number: impl Into<String>,
        publish_date: NaiveDate,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            uuid: Uuid::now_v7(),
            document_name: document_name.into(),
            description: String::new(),
            document_number: document_number.into(),
            clause_number: String::new(),
            revision_number: 0,
            publish_date,
            page_count: 0,
            document_type_id: None,
            document_category_id: None,
            sequence_number: None,
            status_document_id: None,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Set category and type.
    pub fn with_taxonomy(mut self, category_id: i64, type_id: i64) -> Self {
        self.document_category_id = Some(category_id);
        self.document_type_id = Some(type_id);
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status_id: i64) -> Self {
        self.status_document_id = Some(status_id);
        self
    }

    /// Whether `subject` created this document.
    pub fn is_owned_by(&self, subject: &str) -> bool {
        self.created_by == subject
    }

    /// Whether the document has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// An uploaded revision of a document. Never overwritten once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
    /// Row id, assigned on insert
    pub id: i64,

    /// Stable external identifier
    pub uuid: Uuid,

    /// Public URL of the stored object
    pub file: String,

    /// Object store key of the stored object
    pub object_key: String,

    /// Owning document
    pub document_control_id: i64,

    /// Version number, increasing per document
    pub version: i32,

    /// Status at the time of upload
    pub status_document_id: Option<i64>,

    /// Version note
    pub note: String,

    /// When the version was created
    pub created_at: DateTime<Utc>,

    /// When the version was last updated
    pub updated_at: DateTime<Utc>,

    /// Soft delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocumentVersion {
    /// Creates a new, not yet persisted version.
    pub fn new(
        document_control_id: i64,
        version: i32,
        file: impl Into<String>,
        object_key: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            uuid: Uuid::now_v7(),
            file: file.into(),
            object_key: object_key.into(),
            document_control_id,
            version,
            status_document_id: None,
            note: note.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Set the status.
    pub fn with_status(mut self, status_id: Option<i64>) -> Self {
        self.status_document_id = status_id;
        self
    }

    /// Whether the version has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Filter for document listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFilter {
    /// Category
    pub category_id: Option<i64>,
    /// Type
    pub type_id: Option<i64>,
    /// Status
    pub status_id: Option<i64>,
    /// Case-insensitive match on name or number
    pub search: Option<String>,
}

impl ControlFilter {
    /// Whether a live document passes the filter.
    pub fn matches(&self, control: &DocumentControl) -> bool {
        if control.is_deleted() {
            return false;
        }
        let search_ok = self.search.as_ref().map_or(true, |s| {
            let needle = s.to_lowercase();
            control.document_name.to_lowercase().contains(&needle)
                || control.document_number.to_lowercase().contains(&needle)
        });
        search_ok
            && self.category_id.map_or(true, |id| control.document_category_id == Some(id))
            && self.type_id.map_or(true, |id| control.document_type_id == Some(id))
            && self.status_id.map_or(true, |id| control.status_document_id == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> DocumentControl {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        DocumentControl::new("Invoice handling", "FIN-001", date, "alice")
            .with_taxonomy(1, 2)
            .with_status(3)
    }

    #[test]
    fn test_status_name_comparison() {
        let status = StatusDocument::new("Published");
        assert!(status.is_named(" published "));
        assert!(!status.is_named("draft"));
    }

    #[test]
    fn test_control_filter() {
        let control = control();
        assert!(ControlFilter::default().matches(&control));
        assert!(ControlFilter {
            search: Some("fin-0".into()),
            category_id: Some(1),
            ..Default::default()
        }
        .matches(&control));
        assert!(!ControlFilter {
            status_id: Some(9),
            ..Default::default()
        }
        .matches(&control));
    }

    #[test]
    fn test_filter_skips_deleted() {
        let mut control = control();
        control.deleted_at = Some(Utc::now());
        assert!(!ControlFilter::default().matches(&control));
    }
}
