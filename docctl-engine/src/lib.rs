//! # Document Control Engine
//!
//! Authorization-gated rule catalog, taxonomy and document lifecycle.
//!
//! ## Overview
//!
//! The docctl-engine crate handles:
//! - **Engine**: the single service instance built once at startup
//! - **Roles**: the role registry and user-to-role assignments
//! - **Catalog**: human-editable rules kept in lock-step with grant tuples
//! - **Taxonomy**: categories and document types whose prefixes scope rules
//! - **Lifecycle**: documents with append-only, object-store backed versions
//! - **Statuses**: the statuses documents move between
//!
//! Every protected operation takes the acting subject, checks it against the
//! compiled tuple set and denies with [`EngineError::Forbidden`] when no grant
//! matches or the check itself fails.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docctl_engine::{Engine, EngineConfig, NewCategory, NewDocumentType, ScopedRule};
//! use docctl_objects::HttpObjectStore;
//! use docctl_rbac::Action;
//! use docctl_registry::MemoryDatabase;
//!
//! async fn setup() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::from_env();
//!     let objects = Arc::new(HttpObjectStore::new(config.objects.clone())?);
//!     let engine = Engine::start(config, Arc::new(MemoryDatabase::new()), objects).await?;
//!     engine.bootstrap_admin("admin", &["root"]).await?;
//!
//!     let finance = engine
//!         .taxonomy()
//!         .create_category(
//!             "root",
//!             NewCategory {
//!                 name: "Finance".into(),
//!                 prefix: "FIN".into(),
//!                 rules: Vec::new(),
//!             },
//!         )
//!         .await?;
//!     engine
//!         .taxonomy()
//!         .create_type(
//!             "root",
//!             NewDocumentType {
//!                 name: "Invoice".into(),
//!                 prefix: "INV".into(),
//!                 category_uuid: finance.uuid,
//!                 rules: vec![ScopedRule::document("finance-clerk", Action::read())],
//!             },
//!         )
//!         .await?;
//!     engine.assignments().assign("root", "alice", "finance-clerk").await?;
//!
//!     let principal = engine.authenticate("alice").await?;
//!     assert_eq!(principal.roles(), ["finance-clerk".to_string()]);
//!     Ok(())
//! }
//! ```

pub mod assignments;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod roles;
pub mod statuses;
pub mod taxonomy;

#[cfg(test)]
mod testing;

// Re-export main types
pub use assignments::RoleAssignments;
pub use catalog::{
    ActivationReport, PermissionMatrix, PolicyCatalog, RuleStatus, RuleUpdate, ScopedRule, ScopedRuleSync,
};
pub use config::{EngineConfig, DEFAULT_MAX_UPLOAD_BYTES};
pub use engine::{Engine, Principal};
pub use error::{EngineError, EngineResult};
pub use lifecycle::{
    parse_publish_date, CreatedDocument, DocumentDetail, DocumentFields, DocumentFilter, DocumentLifecycle,
    DocumentUpdate,
};
pub use roles::{RoleDetail, RoleRegistry};
pub use statuses::StatusRegistry;
pub use taxonomy::{
    CategoryDetail, CategoryUpdate, DocumentTaxonomy, DocumentTypeDetail, DocumentTypeUpdate, NewCategory,
    NewDocumentType,
};
