//! # Docctl Registry
//!
//! This crate provides the persistence layer of the document control engine:
//! roles, the rule catalog, the document taxonomy, document records, and the
//! policy tuple table, all behind one transactional store.
//!
//! ## Overview
//!
//! The docctl-registry crate handles:
//! - **Roles**: Named roles unique by `(name, guard_name)`
//! - **Rule catalog**: `RoleHasRule` rows mirroring grant tuples
//! - **Taxonomy**: Categories and document types whose prefixes are scope keys
//! - **Documents**: Document controls, append-only versions, and statuses
//! - **Store**: `MemoryDatabase` transactions and the tuple table
//!
//! ## Architecture
//!
//! ```text
//! Role ── name ──┬─ RoleHasRule (role, policy, action, category, type)
//!                └─ grouping tuple (user, role)
//!
//! CategoryDocument (prefix)
//!   └─ DocumentType (prefix)
//!        └─ DocumentControl ── StatusDocument
//!             └─ DocumentVersion (append-only)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docctl_registry::{CategoryDocument, DocumentType, MemoryDatabase};
//!
//! # async fn example() -> docctl_registry::StoreResult<()> {
//! let db = MemoryDatabase::new();
//!
//! let mut tx = db.begin().await;
//! let finance = tx.insert_category(CategoryDocument::new("Finance", "FIN"))?;
//! tx.insert_doc_type(DocumentType::new("Invoice", "INV", finance.id))?;
//! tx.commit().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Integration with docctl-rbac
//!
//! `MemoryDatabase` is the `TupleSource` the policy tuple store reloads from,
//! and every `Transaction` is a `TupleWriter`, so catalog rows and their grant
//! tuples change inside the same transaction.

pub mod catalog;
pub mod documents;
pub mod error;
pub mod roles;
pub mod store;
pub mod taxonomy;

// Re-export main types for convenience
pub use catalog::{RoleHasRule, RuleFilter};
pub use documents::{ControlFilter, DocumentControl, DocumentVersion, StatusDocument};
pub use error::{StoreError, StoreResult};
pub use roles::Role;
pub use store::{MemoryDatabase, Tables, Transaction};
pub use taxonomy::{CategoryDocument, DocumentType};
