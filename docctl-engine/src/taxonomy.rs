//! # Document Taxonomy
//!
//! Categories and document types. Their prefixes are the scope keys of
//! catalog rows and grant tuples, so every prefix change carries the rules
//! along in the same transaction.
//!
//! ```text
//! CategoryDocument FIN ── rules scoped (FIN, none)
//!   └─ DocumentType INV ── rules scoped (FIN, INV)
//!
//! rename INV -> INVX   : (FIN, INV)  rows/tuples -> (FIN, INVX)
//! rename FIN -> FINX   : (FIN, none) rows/tuples -> (FINX, none)
//!                        (FIN, T)    rows/tuples -> (FINX, T) for every type T
//! ```
//!
//! Deletes are soft and leave rules in place; rules scoped to a deleted
//! category or type stay enforceable.

use docctl_rbac::{Action, ResourcePolicy};
use docctl_registry::{CategoryDocument, DocumentType, RoleHasRule, RuleFilter, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::catalog::{stage_entries, stage_scope_move, stage_scoped_rules, ScopedRule};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// Payload for a new category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    /// Display name
    pub name: String,
    /// Unique prefix, the `category` scope key
    pub prefix: String,
    /// Rules created under the new prefix
    #[serde(default, alias = "role_has_rules")]
    pub rules: Vec<ScopedRule>,
}

/// Payload for a category update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUpdate {
    /// Display name
    pub name: String,
    /// Prefix, possibly changed
    pub prefix: String,
    /// Desired rules of the category; `None` moves the current rules as they are
    #[serde(default, alias = "role_has_rules")]
    pub rules: Option<Vec<ScopedRule>>,
}

/// Payload for a new document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocumentType {
    /// Display name
    pub name: String,
    /// Unique prefix, the `type` scope key
    pub prefix: String,
    /// Owning category
    pub category_uuid: Uuid,
    /// Rules created under `(category prefix, prefix)`
    #[serde(default, alias = "role_has_rules")]
    pub rules: Vec<ScopedRule>,
}

/// Payload for a document type update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTypeUpdate {
    /// Display name
    pub name: String,
    /// Prefix, possibly changed
    pub prefix: String,
    /// New owning category; `None` keeps the current one
    #[serde(default)]
    pub category_uuid: Option<Uuid>,
    /// Desired rules of the type; `None` moves the current rules as they are
    #[serde(default, alias = "role_has_rules")]
    pub rules: Option<Vec<ScopedRule>>,
}

/// A category with the rules scoped to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDetail {
    /// The category
    pub category: CategoryDocument,
    /// Rows scoped `(prefix, none)`
    pub rules: Vec<RoleHasRule>,
}

/// A document type with its category and the rules scoped to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTypeDetail {
    /// The type
    pub doc_type: DocumentType,
    /// Owning category
    pub category: CategoryDocument,
    /// Rows scoped `(category prefix, prefix)`
    pub rules: Vec<RoleHasRule>,
}

/// Category and document type operations.
pub struct DocumentTaxonomy<'a> {
    engine: &'a Engine,
}

impl<'a> DocumentTaxonomy<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Create a category and its rules.
    ///
    /// # Errors
    ///
    /// [`EngineError::Conflict`] if the prefix is taken; nothing is created.
    #[instrument(skip(self, payload), fields(prefix = %payload.prefix))]
    pub async fn create_category(&self, actor: &str, payload: NewCategory) -> EngineResult<CategoryDocument> {
        self.engine
            .authorize(actor, ResourcePolicy::CategoryDocument, Action::create())
            .await?;
        let name = required("name", &payload.name)?;
        let prefix = validate_prefix(&payload.prefix)?;

        let mut tx = self.engine.database().begin().await;
        let category = tx.insert_category(CategoryDocument::new(name, prefix))?;
        let created = stage_entries(self.engine, &mut tx, &payload.rules, &category.scope())?;
        self.engine.commit(tx).await?;

        info!(prefix = %category.prefix, rules = created.len(), "Created category");
        Ok(category)
    }

    /// Update a category, moving its rules on a prefix change.
    #[instrument(skip(self, payload), fields(prefix = %payload.prefix))]
    pub async fn update_category(
        &self,
        actor: &str,
        uuid: Uuid,
        payload: CategoryUpdate,
    ) -> EngineResult<CategoryDocument> {
        self.engine
            .authorize(actor, ResourcePolicy::CategoryDocument, Action::update())
            .await?;
        let name = required("name", &payload.name)?;
        let prefix = validate_prefix(&payload.prefix)?;

        let mut tx = self.engine.database().begin().await;
        let mut category = tx.category_by_uuid(uuid)?.clone();
        let old_prefix = category.prefix.clone();
        let old_scope = category.scope();

        category.name = name.to_string();
        category.prefix = prefix.to_string();
        let category = tx.update_category(category)?;
        let new_scope = category.scope();

        match payload.rules {
            Some(desired) => {
                stage_scoped_rules(self.engine, &mut tx, &old_scope, &new_scope, &desired)?;
            }
            None => {
                stage_scope_move(self.engine, &mut tx, &old_scope, &new_scope)?;
            }
        }

        let mut cascaded = 0;
        if old_prefix != category.prefix {
            for doc_type in tx.doc_types_in_category(category.id) {
                cascaded += stage_scope_move(
                    self.engine,
                    &mut tx,
                    &doc_type.scope(&old_prefix),
                    &doc_type.scope(&category.prefix),
                )?;
            }
        }
        self.engine.commit(tx).await?;

        info!(
            from = %old_prefix,
            to = %category.prefix,
            type_rules_moved = cascaded,
            "Updated category"
        );
        Ok(category)
    }

    /// Soft-delete a category. Its rules are left untouched.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, actor: &str, uuid: Uuid) -> EngineResult<CategoryDocument> {
        self.engine
            .authorize(actor, ResourcePolicy::CategoryDocument, Action::delete())
            .await?;

        let mut tx = self.engine.database().begin().await;
        let id = tx.category_by_uuid(uuid)?.id;
        let category = tx.soft_delete_category(id)?;
        self.engine.commit(tx).await?;
        info!(prefix = %category.prefix, "Deleted category");
        Ok(category)
    }

    /// Category with its rules.
    pub async fn get_category(&self, actor: &str, uuid: Uuid) -> EngineResult<CategoryDetail> {
        self.engine
            .authorize(actor, ResourcePolicy::CategoryDocument, Action::read())
            .await?;
        let tables = self.engine.database().read().await;
        let category = tables.category_by_uuid(uuid)?.clone();
        let rules = tables.rules(&RuleFilter::in_scope(category.scope()));
        Ok(CategoryDetail { category, rules })
    }

    /// Live categories, optionally filtered by name or prefix.
    pub async fn list_categories(&self, actor: &str, search: Option<&str>) -> EngineResult<Vec<CategoryDocument>> {
        self.engine
            .authorize(actor, ResourcePolicy::CategoryDocument, Action::read())
            .await?;
        Ok(self.engine.database().read().await.list_categories(search))
    }

    /// Create a document type under a live category, with its rules.
    #[instrument(skip(self, payload), fields(prefix = %payload.prefix))]
    pub async fn create_type(&self, actor: &str, payload: NewDocumentType) -> EngineResult<DocumentType> {
        self.engine
            .authorize(actor, ResourcePolicy::DocumentType, Action::create())
            .await?;
        let name = required("name", &payload.name)?;
        let prefix = validate_prefix(&payload.prefix)?;

        let mut tx = self.engine.database().begin().await;
        let category = tx.category_by_uuid(payload.category_uuid)?.clone();
        let doc_type = tx.insert_doc_type(DocumentType::new(name, prefix, category.id))?;
        let created = stage_entries(
            self.engine,
            &mut tx,
            &payload.rules,
            &doc_type.scope(&category.prefix),
        )?;
        self.engine.commit(tx).await?;

        info!(
            category = %category.prefix,
            prefix = %doc_type.prefix,
            rules = created.len(),
            "Created document type"
        );
        Ok(doc_type)
    }

    /// Update a document type, moving its rules when its scope changes.
    #[instrument(skip(self, payload), fields(prefix = %payload.prefix))]
    pub async fn update_type(
        &self,
        actor: &str,
        uuid: Uuid,
        payload: DocumentTypeUpdate,
    ) -> EngineResult<DocumentType> {
        self.engine
            .authorize(actor, ResourcePolicy::DocumentType, Action::update())
            .await?;
        let name = required("name", &payload.name)?;
        let prefix = validate_prefix(&payload.prefix)?;

        let mut tx = self.engine.database().begin().await;
        let mut doc_type = tx.doc_type_by_uuid(uuid)?.clone();
        let old_category = owning_category(&tx, &doc_type)?;
        let old_scope = doc_type.scope(&old_category.prefix);

        let new_category = match payload.category_uuid {
            Some(category_uuid) => tx.category_by_uuid(category_uuid)?.clone(),
            None => old_category,
        };
        doc_type.name = name.to_string();
        doc_type.prefix = prefix.to_string();
        doc_type.document_category_id = new_category.id;
        let doc_type = tx.update_doc_type(doc_type)?;
        let new_scope = doc_type.scope(&new_category.prefix);

        match payload.rules {
            Some(desired) => {
                stage_scoped_rules(self.engine, &mut tx, &old_scope, &new_scope, &desired)?;
            }
            None => {
                stage_scope_move(self.engine, &mut tx, &old_scope, &new_scope)?;
            }
        }
        self.engine.commit(tx).await?;

        info!(from = %old_scope, to = %new_scope, "Updated document type");
        Ok(doc_type)
    }

    /// Soft-delete a document type. Its rules are left untouched.
    #[instrument(skip(self))]
    pub async fn delete_type(&self, actor: &str, uuid: Uuid) -> EngineResult<DocumentType> {
        self.engine
            .authorize(actor, ResourcePolicy::DocumentType, Action::delete())
            .await?;

        let mut tx = self.engine.database().begin().await;
        let id = tx.doc_type_by_uuid(uuid)?.id;
        let doc_type = tx.soft_delete_doc_type(id)?;
        self.engine.commit(tx).await?;
        info!(prefix = %doc_type.prefix, "Deleted document type");
        Ok(doc_type)
    }

    /// Document type with its category and rules.
    pub async fn get_type(&self, actor: &str, uuid: Uuid) -> EngineResult<DocumentTypeDetail> {
        self.engine
            .authorize(actor, ResourcePolicy::DocumentType, Action::read())
            .await?;
        let tables = self.engine.database().read().await;
        let doc_type = tables.doc_type_by_uuid(uuid)?.clone();
        let category = tables
            .category(doc_type.document_category_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("category of document type {}", uuid)))?;
        let rules = tables.rules(&RuleFilter::in_scope(doc_type.scope(&category.prefix)));
        Ok(DocumentTypeDetail {
            doc_type,
            category,
            rules,
        })
    }

    /// Live document types, optionally narrowed to a category and a search.
    pub async fn list_types(
        &self,
        actor: &str,
        category_uuid: Option<Uuid>,
        search: Option<&str>,
    ) -> EngineResult<Vec<DocumentType>> {
        self.engine
            .authorize(actor, ResourcePolicy::DocumentType, Action::read())
            .await?;
        let tables = self.engine.database().read().await;
        let category_id = category_uuid
            .map(|uuid| tables.category_by_uuid(uuid).map(|c| c.id))
            .transpose()?;
        Ok(tables.list_doc_types(category_id, search))
    }
}

fn owning_category(tx: &Transaction, doc_type: &DocumentType) -> EngineResult<CategoryDocument> {
    tx.category(doc_type.document_category_id)
        .cloned()
        .ok_or_else(|| EngineError::NotFound(format!("category of document type {}", doc_type.uuid)))
}

fn required<'s>(field: &str, value: &'s str) -> EngineResult<&'s str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::validation(format!("{} is required", field)));
    }
    Ok(value)
}

/// A prefix must be usable as a single tuple position and must not collide
/// with the unscoped sentinel.
fn validate_prefix(prefix: &str) -> EngineResult<&str> {
    let prefix = required("prefix", prefix)?;
    if prefix.contains(char::is_whitespace) || prefix.contains(',') {
        return Err(EngineError::validation(format!(
            "prefix {:?} may not contain whitespace or commas",
            prefix
        )));
    }
    if prefix.eq_ignore_ascii_case(docctl_rbac::NONE_SENTINEL) {
        return Err(EngineError::validation("prefix may not be \"none\""));
    }
    Ok(prefix)
}
