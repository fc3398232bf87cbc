//! # Memory Database
//!
//! Transactional in-process storage for every registry table plus the policy
//! tuple table.
//!
//! ## Architecture
//!
//! ```text
//!  MemoryDatabase
//!    ├─ committed: Arc<RwLock<Tables>>   (readers)
//!    └─ writer:    Arc<Mutex<()>>        (one open transaction at a time)
//!
//!  begin()  -> Transaction { working copy of Tables, owned writer guard }
//!  commit() -> working copy replaces committed tables, revision += 1
//!  drop     -> working copy discarded (rollback)
//! ```
//!
//! Readers never observe a half-applied transaction. Transactions are
//! serialized by the writer lock; there is no row-level versioning, so two
//! sequential updates to the same row are last-writer-wins.

use async_trait::async_trait;
use chrono::Utc;
use docctl_rbac::{Action, PolicyError, PolicyResult, PolicyTuple, TupleScope, TupleSnapshot, TupleSource, TupleWriter};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::catalog::{RoleHasRule, RuleFilter};
use crate::documents::{ControlFilter, DocumentControl, DocumentVersion, StatusDocument};
use crate::error::{StoreError, StoreResult};
use crate::roles::Role;
use crate::taxonomy::{CategoryDocument, DocumentType};

#[derive(Debug, Clone, Default)]
struct Sequences {
    role: i64,
    rule: i64,
    category: i64,
    doc_type: i64,
    status: i64,
    control: i64,
    version: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// All registry tables.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    revision: u64,
    seq: Sequences,
    roles: BTreeMap<i64, Role>,
    rules: BTreeMap<i64, RoleHasRule>,
    categories: BTreeMap<i64, CategoryDocument>,
    doc_types: BTreeMap<i64, DocumentType>,
    statuses: BTreeMap<i64, StatusDocument>,
    controls: BTreeMap<i64, DocumentControl>,
    versions: BTreeMap<i64, DocumentVersion>,
    tuples: BTreeSet<PolicyTuple>,
}

impl Tables {
    /// Revision of the last commit these tables reflect.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // Roles

    /// Insert a role. `(name, guard_name)` must be unique.
    pub fn insert_role(&mut self, mut role: Role) -> StoreResult<Role> {
        if self.find_role(&role.name, &role.guard_name).is_some() {
            return Err(StoreError::Conflict(format!(
                "role {} ({}) already exists",
                role.name, role.guard_name
            )));
        }
        role.id = next_id(&mut self.seq.role);
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    /// Role with the given identity.
    pub fn find_role(&self, name: &str, guard_name: &str) -> Option<&Role> {
        self.roles.values().find(|r| r.identifies(name, guard_name))
    }

    /// Roles with the given name under any guard.
    pub fn roles_named(&self, name: &str) -> Vec<&Role> {
        self.roles.values().filter(|r| r.name == name).collect()
    }

    /// Role by uuid.
    pub fn role_by_uuid(&self, uuid: Uuid) -> StoreResult<&Role> {
        self.roles
            .values()
            .find(|r| r.uuid == uuid)
            .ok_or_else(|| StoreError::NotFound(format!("role {}", uuid)))
    }

    /// Replace a role row, keeping `(name, guard_name)` unique.
    pub fn update_role(&mut self, mut role: Role) -> StoreResult<Role> {
        if !self.roles.contains_key(&role.id) {
            return Err(StoreError::NotFound(format!("role {}", role.uuid)));
        }
        if let Some(other) = self.find_role(&role.name, &role.guard_name) {
            if other.id != role.id {
                return Err(StoreError::Conflict(format!(
                    "role {} ({}) already exists",
                    role.name, role.guard_name
                )));
            }
        }
        role.updated_at = Utc::now();
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    /// Remove a role row.
    pub fn delete_role(&mut self, id: i64) -> StoreResult<Role> {
        self.roles
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("role #{}", id)))
    }

    /// Roles ordered by id, optionally filtered by name.
    pub fn list_roles(&self, search: Option<&str>) -> Vec<Role> {
        self.roles
            .values()
            .filter(|r| search.map_or(true, |s| r.matches_search(s)))
            .cloned()
            .collect()
    }

    // Rule catalog

    /// Insert a catalog row. The full `(role, policy, action, scope)` must be unique.
    pub fn insert_rule(&mut self, mut rule: RoleHasRule) -> StoreResult<RoleHasRule> {
        if self
            .find_rule(&rule.role_guard_name, &rule.rule_policy, &rule.action, &rule.scope())
            .is_some()
        {
            return Err(StoreError::Conflict(format!(
                "rule {} {} {} {} already exists",
                rule.role_guard_name,
                rule.rule_policy,
                rule.action,
                rule.scope()
            )));
        }
        rule.id = next_id(&mut self.seq.rule);
        self.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    /// Catalog row with the given full identity.
    pub fn find_rule(&self, role: &str, policy: &str, action: &Action, scope: &TupleScope) -> Option<&RoleHasRule> {
        self.rules
            .values()
            .find(|r| r.identifies(role, policy, action, scope))
    }

    /// Catalog row by uuid.
    pub fn rule_by_uuid(&self, uuid: Uuid) -> StoreResult<&RoleHasRule> {
        self.rules
            .values()
            .find(|r| r.uuid == uuid)
            .ok_or_else(|| StoreError::NotFound(format!("rule {}", uuid)))
    }

    /// Replace a catalog row, keeping its identity unique.
    pub fn update_rule(&mut self, mut rule: RoleHasRule) -> StoreResult<RoleHasRule> {
        if !self.rules.contains_key(&rule.id) {
            return Err(StoreError::NotFound(format!("rule {}", rule.uuid)));
        }
        if let Some(other) =
            self.find_rule(&rule.role_guard_name, &rule.rule_policy, &rule.action, &rule.scope())
        {
            if other.id != rule.id {
                return Err(StoreError::Conflict(format!(
                    "rule {} {} {} {} already exists",
                    rule.role_guard_name,
                    rule.rule_policy,
                    rule.action,
                    rule.scope()
                )));
            }
        }
        rule.updated_at = Utc::now();
        self.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    /// Remove a catalog row.
    pub fn delete_rule(&mut self, id: i64) -> StoreResult<RoleHasRule> {
        self.rules
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("rule #{}", id)))
    }

    /// Catalog rows passing a filter, ordered by id.
    pub fn rules(&self, filter: &RuleFilter) -> Vec<RoleHasRule> {
        self.rules.values().filter(|r| filter.matches(r)).cloned().collect()
    }

    /// Distinct policy names in the catalog.
    pub fn distinct_policies(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.rules.values().map(|r| &r.rule_policy).collect();
        set.into_iter().cloned().collect()
    }

    /// Distinct action names in the catalog.
    pub fn distinct_actions(&self) -> Vec<Action> {
        let set: BTreeSet<&Action> = self.rules.values().map(|r| &r.action).collect();
        set.into_iter().cloned().collect()
    }

    // Categories

    /// Insert a category. Prefixes are unique across live and soft-deleted rows.
    pub fn insert_category(&mut self, mut category: CategoryDocument) -> StoreResult<CategoryDocument> {
        if self.categories.values().any(|c| c.prefix == category.prefix) {
            return Err(StoreError::Conflict(format!(
                "category prefix {} already exists",
                category.prefix
            )));
        }
        category.id = next_id(&mut self.seq.category);
        self.categories.insert(category.id, category.clone());
        Ok(category)
    }

    /// Category by id, including soft-deleted rows.
    pub fn category(&self, id: i64) -> Option<&CategoryDocument> {
        self.categories.get(&id)
    }

    /// Live category by uuid.
    pub fn category_by_uuid(&self, uuid: Uuid) -> StoreResult<&CategoryDocument> {
        self.categories
            .values()
            .find(|c| c.uuid == uuid && !c.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("category {}", uuid)))
    }

    /// Replace a category row, keeping its prefix unique.
    pub fn update_category(&mut self, mut category: CategoryDocument) -> StoreResult<CategoryDocument> {
        if !self.categories.contains_key(&category.id) {
            return Err(StoreError::NotFound(format!("category {}", category.uuid)));
        }
        if self
            .categories
            .values()
            .any(|c| c.prefix == category.prefix && c.id != category.id)
        {
            return Err(StoreError::Conflict(format!(
                "category prefix {} already exists",
                category.prefix
            )));
        }
        category.updated_at = Utc::now();
        self.categories.insert(category.id, category.clone());
        Ok(category)
    }

    /// Soft-delete a category.
    pub fn soft_delete_category(&mut self, id: i64) -> StoreResult<CategoryDocument> {
        let category = self
            .categories
            .get_mut(&id)
            .filter(|c| !c.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("category #{}", id)))?;
        category.deleted_at = Some(Utc::now());
        Ok(category.clone())
    }

    /// Live categories, optionally filtered by name or prefix.
    pub fn list_categories(&self, search: Option<&str>) -> Vec<CategoryDocument> {
        self.categories
            .values()
            .filter(|c| !c.is_deleted() && search.map_or(true, |s| c.matches_search(s)))
            .cloned()
            .collect()
    }

    // Document types

    /// Insert a document type. Prefixes are unique across live and soft-deleted rows.
    pub fn insert_doc_type(&mut self, mut doc_type: DocumentType) -> StoreResult<DocumentType> {
        if self.doc_types.values().any(|t| t.prefix == doc_type.prefix) {
            return Err(StoreError::Conflict(format!(
                "document type prefix {} already exists",
                doc_type.prefix
            )));
        }
        doc_type.id = next_id(&mut self.seq.doc_type);
        self.doc_types.insert(doc_type.id, doc_type.clone());
        Ok(doc_type)
    }

    /// Document type by id, including soft-deleted rows.
    pub fn doc_type(&self, id: i64) -> Option<&DocumentType> {
        self.doc_types.get(&id)
    }

    /// Live document type by uuid.
    pub fn doc_type_by_uuid(&self, uuid: Uuid) -> StoreResult<&DocumentType> {
        self.doc_types
            .values()
            .find(|t| t.uuid == uuid && !t.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("document type {}", uuid)))
    }

    /// Replace a document type row, keeping its prefix unique.
    pub fn update_doc_type(&mut self, mut doc_type: DocumentType) -> StoreResult<DocumentType> {
        if !self.doc_types.contains_key(&doc_type.id) {
            return Err(StoreError::NotFound(format!("document type {}", doc_type.uuid)));
        }
        if self
            .doc_types
            .values()
            .any(|t| t.prefix == doc_type.prefix && t.id != doc_type.id)
        {
            return Err(StoreError::Conflict(format!(
                "document type prefix {} already exists",
                doc_type.prefix
            )));
        }
        doc_type.updated_at = Utc::now();
        self.doc_types.insert(doc_type.id, doc_type.clone());
        Ok(doc_type)
    }

    /// Soft-delete a document type.
    pub fn soft_delete_doc_type(&mut self, id: i64) -> StoreResult<DocumentType> {
        let doc_type = self
            .doc_types
            .get_mut(&id)
            .filter(|t| !t.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("document type #{}", id)))?;
        doc_type.deleted_at = Some(Utc::now());
        Ok(doc_type.clone())
    }

    /// Live document types, optionally filtered by category and search.
    pub fn list_doc_types(&self, category_id: Option<i64>, search: Option<&str>) -> Vec<DocumentType> {
        self.doc_types
            .values()
            .filter(|t| {
                !t.is_deleted()
                    && category_id.map_or(true, |id| t.document_category_id == id)
                    && search.map_or(true, |s| t.matches_search(s))
            })
            .cloned()
            .collect()
    }

    /// Every document type of a category, including soft-deleted rows.
    pub fn doc_types_in_category(&self, category_id: i64) -> Vec<DocumentType> {
        self.doc_types
            .values()
            .filter(|t| t.document_category_id == category_id)
            .cloned()
            .collect()
    }

    // Statuses

    /// Insert a status. Live names are unique, ignoring case.
    pub fn insert_status(&mut self, mut status: StatusDocument) -> StoreResult<StatusDocument> {
        if self.status_by_name(&status.name).is_some() {
            return Err(StoreError::Conflict(format!("status {} already exists", status.name)));
        }
        status.id = next_id(&mut self.seq.status);
        self.statuses.insert(status.id, status.clone());
        Ok(status)
    }

    /// Status by id, including soft-deleted rows.
    pub fn status(&self, id: i64) -> Option<&StatusDocument> {
        self.statuses.get(&id)
    }

    /// Live status by uuid.
    pub fn status_by_uuid(&self, uuid: Uuid) -> StoreResult<&StatusDocument> {
        self.statuses
            .values()
            .find(|s| s.uuid == uuid && !s.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("status {}", uuid)))
    }

    /// Live status by name, ignoring case.
    pub fn status_by_name(&self, name: &str) -> Option<&StatusDocument> {
        self.statuses
            .values()
            .find(|s| !s.is_deleted() && s.is_named(name))
    }

    /// Replace a status row, keeping live names unique.
    pub fn update_status(&mut self, mut status: StatusDocument) -> StoreResult<StatusDocument> {
        if !self.statuses.contains_key(&status.id) {
            return Err(StoreError::NotFound(format!("status {}", status.uuid)));
        }
        if let Some(other) = self.status_by_name(&status.name) {
            if other.id != status.id {
                return Err(StoreError::Conflict(format!("status {} already exists", status.name)));
            }
        }
        status.updated_at = Utc::now();
        self.statuses.insert(status.id, status.clone());
        Ok(status)
    }

    /// Soft-delete a status.
    pub fn soft_delete_status(&mut self, id: i64) -> StoreResult<StatusDocument> {
        let status = self
            .statuses
            .get_mut(&id)
            .filter(|s| !s.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("status #{}", id)))?;
        status.deleted_at = Some(Utc::now());
        Ok(status.clone())
    }

    /// Live statuses ordered by id.
    pub fn list_statuses(&self) -> Vec<StatusDocument> {
        self.statuses.values().filter(|s| !s.is_deleted()).cloned().collect()
    }

    // Document controls

    /// Insert a document.
    pub fn insert_control(&mut self, mut control: DocumentControl) -> DocumentControl {
        control.id = next_id(&mut self.seq.control);
        self.controls.insert(control.id, control.clone());
        control
    }

    /// Document by id, including soft-deleted rows.
    pub fn control(&self, id: i64) -> Option<&DocumentControl> {
        self.controls.get(&id)
    }

    /// Live document by uuid.
    pub fn control_by_uuid(&self, uuid: Uuid) -> StoreResult<&DocumentControl> {
        self.controls
            .values()
            .find(|c| c.uuid == uuid && !c.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("document {}", uuid)))
    }

    /// Replace a document row.
    pub fn update_control(&mut self, mut control: DocumentControl) -> StoreResult<DocumentControl> {
        if !self.controls.contains_key(&control.id) {
            return Err(StoreError::NotFound(format!("document {}", control.uuid)));
        }
        control.updated_at = Utc::now();
        self.controls.insert(control.id, control.clone());
        Ok(control)
    }

    /// Soft-delete a document.
    pub fn soft_delete_control(&mut self, id: i64) -> StoreResult<DocumentControl> {
        let control = self
            .controls
            .get_mut(&id)
            .filter(|c| !c.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("document #{}", id)))?;
        control.deleted_at = Some(Utc::now());
        Ok(control.clone())
    }

    /// Live documents passing a filter, ordered by id.
    pub fn controls(&self, filter: &ControlFilter) -> Vec<DocumentControl> {
        self.controls.values().filter(|c| filter.matches(c)).cloned().collect()
    }

    /// Number of live documents in a status.
    pub fn count_controls_with_status(&self, status_id: i64) -> usize {
        self.controls
            .values()
            .filter(|c| !c.is_deleted() && c.status_document_id == Some(status_id))
            .count()
    }

    // Document versions

    /// Insert a version.
    pub fn insert_version(&mut self, mut version: DocumentVersion) -> StoreResult<DocumentVersion> {
        if !self.controls.contains_key(&version.document_control_id) {
            return Err(StoreError::NotFound(format!(
                "document #{}",
                version.document_control_id
            )));
        }
        version.id = next_id(&mut self.seq.version);
        self.versions.insert(version.id, version.clone());
        Ok(version)
    }

    /// Live versions of a document, ordered by version number.
    pub fn versions_of(&self, control_id: i64) -> Vec<DocumentVersion> {
        let mut versions: Vec<DocumentVersion> = self
            .versions
            .values()
            .filter(|v| v.document_control_id == control_id && !v.is_deleted())
            .cloned()
            .collect();
        versions.sort_by_key(|v| (v.version, v.id));
        versions
    }

    /// Next version number of a document, counting soft-deleted versions.
    pub fn next_version_number(&self, control_id: i64) -> i32 {
        self.versions
            .values()
            .filter(|v| v.document_control_id == control_id)
            .map(|v| v.version)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Soft-delete a version.
    pub fn soft_delete_version(&mut self, id: i64) -> StoreResult<DocumentVersion> {
        let version = self
            .versions
            .get_mut(&id)
            .filter(|v| !v.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("document version #{}", id)))?;
        version.deleted_at = Some(Utc::now());
        Ok(version.clone())
    }

    // Tuples

    /// Every stored tuple.
    pub fn tuples(&self) -> impl Iterator<Item = &PolicyTuple> {
        self.tuples.iter()
    }

    /// Grant tuples held by `subject`.
    pub fn grants_of<'a>(&'a self, subject: &'a str) -> impl Iterator<Item = &'a PolicyTuple> + 'a {
        self.tuples
            .iter()
            .filter(move |t| t.as_grant().map_or(false, |g| g.subject == subject))
    }

    /// Grouping tuples binding users to `role`.
    pub fn members_of<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tuples
            .iter()
            .filter_map(|t| t.as_grouping())
            .filter(move |g| g.role == role)
            .map(|g| g.user.as_str())
    }
}

impl TupleWriter for Tables {
    fn insert_tuple(&mut self, tuple: PolicyTuple) -> bool {
        self.tuples.insert(tuple)
    }

    fn delete_tuple(&mut self, tuple: &PolicyTuple) -> bool {
        self.tuples.remove(tuple)
    }

    fn contains_tuple(&self, tuple: &PolicyTuple) -> bool {
        self.tuples.contains(tuple)
    }

    fn staged_tuples(&self) -> Vec<PolicyTuple> {
        self.tuples.iter().cloned().collect()
    }
}

/// An open write transaction.
///
/// Dereferences to the working copy of [`Tables`]. Dropping the transaction
/// without calling [`commit`](Self::commit) discards every staged change.
pub struct Transaction {
    id: Uuid,
    working: Tables,
    committed: Arc<RwLock<Tables>>,
    _writer: OwnedMutexGuard<()>,
}

impl Transaction {
    /// Transaction id, for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Revision the tables will have once this transaction commits.
    pub fn pending_revision(&self) -> u64 {
        self.working.revision + 1
    }

    /// Publish the working copy.
    ///
    /// # Returns
    ///
    /// The new revision.
    pub async fn commit(self) -> u64 {
        let Transaction {
            id,
            mut working,
            committed,
            _writer,
        } = self;
        working.revision += 1;
        let revision = working.revision;
        *committed.write().await = working;
        debug!(transaction = %id, revision, "Committed transaction");
        revision
    }

    /// Discard the working copy.
    pub fn rollback(self) {
        debug!(transaction = %self.id, "Rolled back transaction");
    }
}

impl Deref for Transaction {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.working
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut Tables {
        &mut self.working
    }
}

impl TupleWriter for Transaction {
    fn insert_tuple(&mut self, tuple: PolicyTuple) -> bool {
        self.working.insert_tuple(tuple)
    }

    fn delete_tuple(&mut self, tuple: &PolicyTuple) -> bool {
        self.working.delete_tuple(tuple)
    }

    fn contains_tuple(&self, tuple: &PolicyTuple) -> bool {
        self.working.contains_tuple(tuple)
    }

    fn staged_tuples(&self) -> Vec<PolicyTuple> {
        self.working.staged_tuples()
    }
}

/// In-process relational store.
pub struct MemoryDatabase {
    committed: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
    fail_tuple_loads: AtomicBool,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self {
            committed: Arc::new(RwLock::new(Tables::default())),
            writer: Arc::new(Mutex::new(())),
            fail_tuple_loads: AtomicBool::new(false),
        }
    }

    /// Open a write transaction, waiting for any open one to finish.
    #[instrument(skip(self))]
    pub async fn begin(&self) -> Transaction {
        let writer = self.writer.clone().lock_owned().await;
        let working = self.committed.read().await.clone();
        let id = Uuid::now_v7();
        debug!(transaction = %id, base_revision = working.revision, "Began transaction");
        Transaction {
            id,
            working,
            committed: self.committed.clone(),
            _writer: writer,
        }
    }

    /// Read the committed tables.
    pub async fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.committed.read().await
    }

    /// Revision of the committed tables.
    pub async fn revision(&self) -> u64 {
        self.committed.read().await.revision
    }

    /// Make tuple loads fail, simulating an unreachable tuple table.
    pub fn set_tuple_load_failure(&self, fail: bool) {
        self.fail_tuple_loads.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TupleSource for MemoryDatabase {
    async fn load(&self) -> PolicyResult<TupleSnapshot> {
        if self.fail_tuple_loads.load(Ordering::SeqCst) {
            return Err(PolicyError::SourceUnavailable(
                "tuple table unavailable".to_string(),
            ));
        }
        let tables = self.committed.read().await;
        Ok(TupleSnapshot {
            revision: tables.revision,
            tuples: tables.tuples.iter().cloned().collect(),
        })
    }
}
