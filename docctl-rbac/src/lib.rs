//! # Docctl RBAC (Scoped Role-Based Access Control)
//!
//! This crate provides the enforcement layer of the document control engine:
//! the tuple vocabulary, the policy tuple store, and fail-closed access
//! decisions.
//!
//! ## Overview
//!
//! The docctl-rbac crate handles:
//! - **Actions**: Open, lowercase-normalized action names
//! - **Scopes**: `(category, type)` pairs with an explicit unscoped state
//! - **Tuples**: Grant (`p`) and grouping (`g`) tuples and their row shape
//! - **Rule payloads**: Typed `{policy, actions}` payloads validated at the boundary
//! - **Policy tuple store**: The compiled enforcer and its reload/save cycle
//! - **Access decisions**: Fail-closed `check()`
//!
//! ## Architecture
//!
//! ```text
//! Grant tuple    = (p, role, policy, action, category, type, none)
//! Grouping tuple = (g, user, role)
//!
//! Examples:
//!   p, finance-clerk, document, read, FIN, INV, none
//!   p, admin, rules, create, none, none, none
//!   g, alice, finance-clerk
//! ```
//!
//! Unused positions hold the literal `"none"`, and matching is exact on every
//! position: an unscoped grant never satisfies a scoped request and vice versa.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docctl_rbac::{AccessDecisionService, Action, PolicyTupleStore, TupleScope, TupleSource};
//! use std::sync::Arc;
//!
//! # async fn example(source: Arc<dyn TupleSource>) -> docctl_rbac::PolicyResult<()> {
//! let store = Arc::new(PolicyTupleStore::new(source));
//! store.reload().await?;
//!
//! let decisions = AccessDecisionService::new(store.clone());
//! let scope = TupleScope::document_type("FIN", "INV");
//! if decisions.check("alice", "document", &Action::read(), &scope).await {
//!     // proceed
//! }
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod decision;
pub mod error;
pub mod model;
pub mod permissions;
pub mod resources;
pub mod scope;
pub mod store;
pub mod tuples;

// Re-export main types for convenience
pub use actions::Action;
pub use decision::{AccessDecisionService, AccessRequest, Decision, PolicyEnforcer};
pub use error::{PolicyError, PolicyResult};
pub use model::MODEL_CONF;
pub use permissions::{PermissionSummary, PermissionToggle, RuleGrant};
pub use resources::{normalize_policy, ResourcePolicy};
pub use scope::{Scope, TupleScope, NONE_SENTINEL};
pub use store::{CompiledPolicy, PolicyTupleStore, TupleSnapshot, TupleSource, TupleWriter};
pub use tuples::{GrantTuple, GroupingTuple, PolicyRow, PolicyTuple};
