//! # Document Lifecycle
//!
//! Documents and their append-only version history.
//!
//! ## Create
//!
//! ```text
//! validate payload + upload ─▶ begin tx ─▶ insert control
//!                                 │
//!                                 ▼
//!                   put object, make public ──✗──▶ drop tx (rollback)
//!                                 │
//!                                 ▼
//!                   insert version 1, commit ──✗──▶ remove object, rollback
//! ```
//!
//! ## Read gate
//!
//! The creator of a document always reads it. Anyone else needs a grant on
//! `document` for the action named by the document's status, scoped to the
//! document's `(category prefix, type prefix)`. A document whose category,
//! type or status cannot be resolved is never readable by a non-owner.
//!
//! Update and delete require an unscoped grant on `document`.

use chrono::NaiveDate;
use docctl_objects::{object_key, public_url, Upload};
use docctl_rbac::{Action, ResourcePolicy, TupleScope};
use docctl_registry::{
    CategoryDocument, ControlFilter, DocumentControl, DocumentType, DocumentVersion, StatusDocument,
    Tables, Transaction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// Accepted publish date format.
pub const PUBLISH_DATE_FORMAT: &str = "%Y-%m-%d";

const INITIAL_VERSION_NOTE: &str = "Initial version";
const UPDATED_VERSION_NOTE: &str = "Updated version";

/// Document fields supplied on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFields {
    /// Display name
    pub document_name: String,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Document number shown on the control
    pub document_number: String,
    /// Clause reference
    #[serde(default)]
    pub clause_number: String,
    /// Revision counter kept by the author
    #[serde(default)]
    pub revision_number: i32,
    /// Publish date, `YYYY-MM-DD`
    pub publish_date: String,
    /// Number of pages
    #[serde(default)]
    pub page_count: i32,
    /// Owning category
    pub category_uuid: Uuid,
    /// Document type; must belong to the category
    pub type_uuid: Uuid,
    /// Optional ordering hint
    #[serde(default)]
    pub sequence_number: Option<i32>,
}

/// Update payload: the document fields plus an optional status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(flatten)]
    pub fields: DocumentFields,
    /// New status; `None` keeps the current one
    #[serde(default)]
    pub status_uuid: Option<Uuid>,
}

/// Listing filter over uuids. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    /// Only documents in this category
    pub category_uuid: Option<Uuid>,
    /// Only documents of this type
    pub type_uuid: Option<Uuid>,
    /// Only documents in this status
    pub status_uuid: Option<Uuid>,
    /// Case-insensitive match on name or number
    pub search: Option<String>,
}

/// A newly created document and its first version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedDocument {
    /// The document row
    pub control: DocumentControl,
    /// Version 1
    pub version: DocumentVersion,
}

/// A document with its live versions, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDetail {
    /// The document row
    pub control: DocumentControl,
    /// Live versions, oldest first
    pub versions: Vec<DocumentVersion>,
}

/// Fields after validation and taxonomy resolution.
struct ResolvedFields {
    fields: DocumentFields,
    publish_date: NaiveDate,
    category: CategoryDocument,
    doc_type: DocumentType,
}

/// Document and version operations.
pub struct DocumentLifecycle<'a> {
    engine: &'a Engine,
}

impl<'a> DocumentLifecycle<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Create a document and its first version from `file`.
    ///
    /// The document starts in the configured initial status and is owned by
    /// `actor`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for a bad date, missing field or rejected
    ///   upload; nothing is stored
    /// - [`EngineError::DependencyFailure`] if the upload fails; no document
    ///   or version row remains
    #[instrument(skip(self, payload, file), fields(number = %payload.document_number, file = %file.filename))]
    pub async fn create(&self, actor: &str, payload: DocumentFields, file: Upload) -> EngineResult<CreatedDocument> {
        self.engine
            .authorize(actor, ResourcePolicy::Document, Action::create())
            .await?;
        let publish_date = validate_fields(&payload)?;
        self.validate_upload(&file)?;

        let mut tx = self.engine.database().begin().await;
        let resolved = resolve_fields(&tx, payload, publish_date)?;
        let status = tx
            .status_by_name(&self.engine.config().initial_status)
            .cloned()
            .ok_or_else(|| {
                EngineError::NotFound(format!("status {}", self.engine.config().initial_status))
            })?;

        let control = tx.insert_control(build_control(resolved, actor, status.id));
        let key = self.store_object(&file).await?;
        let version = DocumentVersion::new(control.id, 1, self.file_url(&key), key.clone(), INITIAL_VERSION_NOTE)
            .with_status(control.status_document_id);
        let version = self.record_version(tx, version).await?;

        info!(
            document = %control.uuid,
            number = %control.document_number,
            key = %version.object_key,
            "Created document"
        );
        Ok(CreatedDocument { control, version })
    }

    /// Update a document's fields, optionally appending a version from `file`.
    ///
    /// Existing versions are never modified.
    #[instrument(skip(self, update, file), fields(document = %uuid))]
    pub async fn update(
        &self,
        actor: &str,
        uuid: Uuid,
        update: DocumentUpdate,
        file: Option<Upload>,
    ) -> EngineResult<DocumentControl> {
        self.engine
            .authorize(actor, ResourcePolicy::Document, Action::update())
            .await?;
        let publish_date = validate_fields(&update.fields)?;
        if let Some(file) = &file {
            self.validate_upload(file)?;
        }

        let mut tx = self.engine.database().begin().await;
        let current = tx.control_by_uuid(uuid)?.clone();
        let status_id = match update.status_uuid {
            Some(status_uuid) => Some(tx.status_by_uuid(status_uuid)?.id),
            None => current.status_document_id,
        };
        let resolved = resolve_fields(&tx, update.fields, publish_date)?;

        let mut control = current;
        apply_fields(&mut control, resolved);
        control.status_document_id = status_id;
        let control = tx.update_control(control)?;

        let Some(file) = file else {
            self.engine.commit(tx).await?;
            info!(document = %control.uuid, "Updated document");
            return Ok(control);
        };

        let number = tx.next_version_number(control.id);
        let key = self.store_object(&file).await?;
        let version = DocumentVersion::new(control.id, number, self.file_url(&key), key.clone(), UPDATED_VERSION_NOTE)
            .with_status(control.status_document_id);
        let version = self.record_version(tx, version).await?;

        info!(
            document = %control.uuid,
            version = version.version,
            key = %version.object_key,
            "Updated document with new version"
        );
        Ok(control)
    }

    /// Remove every stored object of a document, then soft-delete the
    /// document and its versions.
    ///
    /// # Errors
    ///
    /// [`EngineError::DependencyFailure`] if any object cannot be removed; no
    /// row is deleted.
    #[instrument(skip(self))]
    pub async fn delete(&self, actor: &str, uuid: Uuid) -> EngineResult<DocumentControl> {
        self.engine
            .authorize(actor, ResourcePolicy::Document, Action::delete())
            .await?;

        let mut tx = self.engine.database().begin().await;
        let control = tx.control_by_uuid(uuid)?.clone();
        let versions = tx.versions_of(control.id);

        let bucket = &self.engine.config().objects.bucket;
        for version in &versions {
            if let Err(e) = self.engine.objects().remove(bucket, &version.object_key).await {
                error!(
                    document = %control.uuid,
                    version = version.version,
                    key = %version.object_key,
                    error = %e,
                    "Failed to remove stored version, aborting delete"
                );
                return Err(e.into());
            }
        }

        for version in &versions {
            tx.soft_delete_version(version.id)?;
        }
        let control = tx.soft_delete_control(control.id)?;
        self.engine.commit(tx).await?;

        info!(document = %control.uuid, versions = versions.len(), "Deleted document");
        Ok(control)
    }

    /// Document with its version history, if `actor` may read it.
    pub async fn get(&self, actor: &str, uuid: Uuid) -> EngineResult<DocumentDetail> {
        let (detail, requirement) = {
            let tables = self.engine.database().read().await;
            let control = tables.control_by_uuid(uuid)?.clone();
            let requirement = read_requirement(&tables, &control);
            let versions = tables.versions_of(control.id);
            (DocumentDetail { control, versions }, requirement)
        };

        if self.may_read(actor, &detail.control, requirement.as_ref()).await {
            return Ok(detail);
        }
        Err(EngineError::Forbidden {
            subject: actor.to_string(),
            resource: ResourcePolicy::Document.as_str().to_string(),
            action: requirement
                .map(|(action, _)| action.to_string())
                .unwrap_or_else(|| Action::READ.to_string()),
        })
    }

    /// Live documents matching `filter` that `actor` owns or may read.
    pub async fn list(&self, actor: &str, filter: &DocumentFilter) -> EngineResult<Vec<DocumentControl>> {
        let candidates: Vec<(DocumentControl, Option<(Action, TupleScope)>)> = {
            let tables = self.engine.database().read().await;
            let filter = resolve_filter(&tables, filter)?;
            tables
                .controls(&filter)
                .into_iter()
                .map(|control| {
                    let requirement = read_requirement(&tables, &control);
                    (control, requirement)
                })
                .collect()
        };

        let total = candidates.len();
        let mut visible = Vec::with_capacity(total);
        for (control, requirement) in candidates {
            if self.may_read(actor, &control, requirement.as_ref()).await {
                visible.push(control);
            }
        }
        debug!(actor, total, visible = visible.len(), "Listed documents");
        Ok(visible)
    }

    async fn may_read(&self, actor: &str, control: &DocumentControl, requirement: Option<&(Action, TupleScope)>) -> bool {
        if control.is_owned_by(actor) {
            return true;
        }
        match requirement {
            Some((action, scope)) => {
                self.engine
                    .decisions()
                    .check(actor, ResourcePolicy::Document.as_str(), action, scope)
                    .await
            }
            None => {
                warn!(
                    document = %control.uuid,
                    actor,
                    "Document taxonomy or status could not be resolved, denying access"
                );
                false
            }
        }
    }

    fn validate_upload(&self, file: &Upload) -> EngineResult<()> {
        let config = self.engine.config();
        if file.size() == 0 {
            return Err(EngineError::validation("file is empty"));
        }
        if file.size() > config.max_upload_bytes {
            return Err(EngineError::validation(format!(
                "file is {} bytes, the limit is {}",
                file.size(),
                config.max_upload_bytes
            )));
        }
        let mime = file.mime_essence();
        if !config.accepts_mime(&mime) {
            return Err(EngineError::validation(format!("file type {:?} is not accepted", mime)));
        }
        Ok(())
    }

    /// Upload `file` under a fresh key and make it public.
    async fn store_object(&self, file: &Upload) -> EngineResult<String> {
        let config = self.engine.config();
        let bucket = &config.objects.bucket;
        let key = object_key(&config.version_directory, &file.filename);

        self.engine
            .objects()
            .put(bucket, &key, file.body.clone(), &file.mime_essence())
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Upload failed");
                e
            })?;
        if let Err(e) = self.engine.objects().make_public(bucket, &key).await {
            warn!(key = %key, error = %e, "Failed to make upload public");
            self.discard_object(&key).await;
            return Err(e.into());
        }
        debug!(key = %key, size = file.size(), "Stored document version");
        Ok(key)
    }

    /// Insert `version` and commit; on failure remove its stored object.
    async fn record_version(&self, mut tx: Transaction, version: DocumentVersion) -> EngineResult<DocumentVersion> {
        let key = version.object_key.clone();
        let version = match tx.insert_version(version) {
            Ok(version) => version,
            Err(e) => {
                drop(tx);
                self.discard_object(&key).await;
                return Err(e.into());
            }
        };
        if let Err(e) = self.engine.commit(tx).await {
            self.discard_object(&key).await;
            return Err(e);
        }
        Ok(version)
    }

    async fn discard_object(&self, key: &str) {
        let bucket = &self.engine.config().objects.bucket;
        match self.engine.objects().remove(bucket, key).await {
            Ok(()) => debug!(key, "Removed stored object after failed write"),
            Err(e) => warn!(key, error = %e, "Failed to remove stored object, it is now orphaned"),
        }
    }

    fn file_url(&self, key: &str) -> String {
        let objects = &self.engine.config().objects;
        public_url(objects.scheme(), &objects.endpoint, &objects.bucket, key)
    }
}

fn validate_fields(fields: &DocumentFields) -> EngineResult<NaiveDate> {
    if fields.document_name.trim().is_empty() {
        return Err(EngineError::validation("document_name is required"));
    }
    if fields.document_number.trim().is_empty() {
        return Err(EngineError::validation("document_number is required"));
    }
    parse_publish_date(&fields.publish_date)
}

/// Parse a `YYYY-MM-DD` publish date.
pub fn parse_publish_date(value: &str) -> EngineResult<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::validation("publish_date is required"));
    }
    NaiveDate::parse_from_str(value, PUBLISH_DATE_FORMAT)
        .map_err(|e| EngineError::validation(format!("invalid publish_date {:?}: {}", value, e)))
}

/// Resolve the live category and type, which must belong together.
fn resolve_fields(tx: &Transaction, fields: DocumentFields, publish_date: NaiveDate) -> EngineResult<ResolvedFields> {
    let category = tx.category_by_uuid(fields.category_uuid)?.clone();
    let doc_type = tx.doc_type_by_uuid(fields.type_uuid)?.clone();
    if doc_type.document_category_id != category.id {
        return Err(EngineError::validation(format!(
            "document type {} does not belong to category {}",
            doc_type.prefix, category.prefix
        )));
    }
    Ok(ResolvedFields {
        fields,
        publish_date,
        category,
        doc_type,
    })
}

fn build_control(resolved: ResolvedFields, created_by: &str, status_id: i64) -> DocumentControl {
    let mut control = DocumentControl::new(
        resolved.fields.document_name.trim(),
        resolved.fields.document_number.trim(),
        resolved.publish_date,
        created_by,
    )
    .with_status(status_id);
    apply_fields(&mut control, resolved);
    control
}

fn apply_fields(control: &mut DocumentControl, resolved: ResolvedFields) {
    let ResolvedFields {
        fields,
        publish_date,
        category,
        doc_type,
    } = resolved;
    control.document_name = fields.document_name.trim().to_string();
    control.description = fields.description;
    control.document_number = fields.document_number.trim().to_string();
    control.clause_number = fields.clause_number;
    control.revision_number = fields.revision_number;
    control.publish_date = publish_date;
    control.page_count = fields.page_count;
    control.sequence_number = fields.sequence_number;
    control.document_category_id = Some(category.id);
    control.document_type_id = Some(doc_type.id);
}

/// Action and scope a non-owner needs to read `control`.
///
/// Soft-deleted taxonomy rows still resolve; a missing reference does not.
fn read_requirement(tables: &Tables, control: &DocumentControl) -> Option<(Action, TupleScope)> {
    let category: &CategoryDocument = tables.category(control.document_category_id?)?;
    let doc_type: &DocumentType = tables.doc_type(control.document_type_id?)?;
    let status: &StatusDocument = tables.status(control.status_document_id?)?;
    let action = Action::from_status(&status.name)?;
    Some((action, doc_type.scope(&category.prefix)))
}

fn resolve_filter(tables: &Tables, filter: &DocumentFilter) -> EngineResult<ControlFilter> {
    Ok(ControlFilter {
        category_id: filter
            .category_uuid
            .map(|uuid| tables.category_by_uuid(uuid).map(|c| c.id))
            .transpose()?,
        type_id: filter
            .type_uuid
            .map(|uuid| tables.doc_type_by_uuid(uuid).map(|t| t.id))
            .transpose()?,
        status_id: filter
            .status_uuid
            .map(|uuid| tables.status_by_uuid(uuid).map(|s| s.id))
            .transpose()?,
        search: filter.search.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ScopedRule;
    use crate::taxonomy::{NewCategory, NewDocumentType};
    use crate::testing::admin_engine_with_objects;

    struct Fixture {
        engine: Engine,
        objects: docctl_objects::MemoryObjectStore,
        category: CategoryDocument,
        doc_type: DocumentType,
    }

    async fn fixture() -> Fixture {
        let (engine, objects) = admin_engine_with_objects().await;
        let category = engine
            .taxonomy()
            .create_category(
                "root",
                NewCategory {
                    name: "Finance".into(),
                    prefix: "FIN".into(),
                    rules: Vec::new(),
                },
            )
            .await
            .unwrap();
        let doc_type = engine
            .taxonomy()
            .create_type(
                "root",
                NewDocumentType {
                    name: "Invoice".into(),
                    prefix: "INV".into(),
                    category_uuid: category.uuid,
                    rules: vec![ScopedRule::document("finance-clerk", Action::parse("draft").unwrap())],
                },
            )
            .await
            .unwrap();
        Fixture {
            engine,
            objects,
            category,
            doc_type,
        }
    }

    fn fields(fx: &Fixture) -> DocumentFields {
        DocumentFields {
            document_name: "Invoice handling".into(),
            description: "How invoices are approved".into(),
            document_number: "FIN-INV-001".into(),
            clause_number: "4.2".into(),
            revision_number: 0,
            publish_date: "2024-03-01".into(),
            page_count: 3,
            category_uuid: fx.category.uuid,
            type_uuid: fx.doc_type.uuid,
            sequence_number: Some(1),
        }
    }

    fn pdf(name: &str) -> Upload {
        Upload::new(name, "application/pdf", b"%PDF-1.7 test".to_vec())
    }

    #[tokio::test]
    async fn test_create_stores_initial_version() {
        let fx = fixture().await;
        let created = fx
            .engine
            .documents()
            .create("root", fields(&fx), pdf("handling.PDF"))
            .await
            .unwrap();

        assert_eq!(created.version.version, 1);
        assert_eq!(created.version.note, "Initial version");
        assert!(created.version.object_key.starts_with("document-versions/"));
        assert!(created.version.object_key.ends_with(".pdf"));
        assert_eq!(
            created.version.file,
            format!("https://localhost:9000/documents/{}", created.version.object_key)
        );
        assert_eq!(created.control.created_by, "root");
        assert_eq!(
            created.control.publish_date,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );

        let stored = fx
            .objects
            .object("documents", &created.version.object_key)
            .await
            .unwrap();
        assert!(stored.public);
        assert_eq!(stored.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_create_validation_happens_before_upload() {
        let fx = fixture().await;
        let documents = fx.engine.documents();

        let mut bad_date = fields(&fx);
        bad_date.publish_date = "01/03/2024".into();
        assert!(matches!(
            documents.create("root", bad_date, pdf("a.pdf")).await,
            Err(EngineError::Validation(_))
        ));

        let mut no_date = fields(&fx);
        no_date.publish_date = String::new();
        assert!(matches!(
            documents.create("root", no_date, pdf("a.pdf")).await,
            Err(EngineError::Validation(_))
        ));

        assert!(matches!(
            documents
                .create("root", fields(&fx), Upload::new("a.html", "text/html", b"<p>".to_vec()))
                .await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            documents
                .create("root", fields(&fx), Upload::new("a.pdf", "application/pdf", Vec::new()))
                .await,
            Err(EngineError::Validation(_))
        ));

        assert_eq!(fx.objects.put_attempts(), 0);
        let tables = fx.engine.database().read().await;
        assert!(tables.controls(&ControlFilter::default()).is_empty());
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let fx = fixture().await;
        let limit = fx.engine.config().max_upload_bytes;
        let file = Upload::new("big.pdf", "application/pdf", vec![0u8; limit + 1]);
        assert!(matches!(
            fx.engine.documents().create("root", fields(&fx), file).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_type_must_belong_to_category() {
        let fx = fixture().await;
        let other = fx
            .engine
            .taxonomy()
            .create_category(
                "root",
                NewCategory {
                    name: "Human Resources".into(),
                    prefix: "HR".into(),
                    rules: Vec::new(),
                },
            )
            .await
            .unwrap();
        let mut payload = fields(&fx);
        payload.category_uuid = other.uuid;
        assert!(matches!(
            fx.engine.documents().create("root", payload, pdf("a.pdf")).await,
            Err(EngineError::Validation(_))
        ));
        assert_eq!(fx.objects.put_attempts(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_no_rows() {
        let fx = fixture().await;
        fx.objects.fail_puts(true);

        let result = fx.engine.documents().create("root", fields(&fx), pdf("a.pdf")).await;
        assert!(matches!(result, Err(EngineError::DependencyFailure(_))));

        let tables = fx.engine.database().read().await;
        assert!(tables.controls(&ControlFilter::default()).is_empty());
        assert_eq!(fx.objects.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_update_appends_versions() {
        let fx = fixture().await;
        let documents = fx.engine.documents();
        let created = documents.create("root", fields(&fx), pdf("v1.pdf")).await.unwrap();

        for name in ["v2.pdf", "v3.pdf"] {
            let update = DocumentUpdate {
                fields: fields(&fx),
                status_uuid: None,
            };
            documents
                .update("root", created.control.uuid, update, Some(pdf(name)))
                .await
                .unwrap();
        }

        let detail = documents.get("root", created.control.uuid).await.unwrap();
        let numbers: Vec<i32> = detail.versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(detail.versions[0].file, created.version.file);
        assert_eq!(detail.versions[0].note, "Initial version");
        assert_eq!(detail.versions[2].note, "Updated version");
        assert_ne!(detail.versions[1].object_key, detail.versions[2].object_key);
        assert_eq!(fx.objects.object_count().await, 3);
    }

    #[tokio::test]
    async fn test_update_without_file_changes_fields_and_status() {
        let fx = fixture().await;
        let documents = fx.engine.documents();
        let created = documents.create("root", fields(&fx), pdf("v1.pdf")).await.unwrap();
        let published = fx.engine.statuses().create("root", "Published").await.unwrap();

        let mut changed = fields(&fx);
        changed.document_name = "Invoice approval".into();
        changed.revision_number = 2;
        let control = documents
            .update(
                "root",
                created.control.uuid,
                DocumentUpdate {
                    fields: changed,
                    status_uuid: Some(published.uuid),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(control.document_name, "Invoice approval");
        assert_eq!(control.revision_number, 2);
        assert_eq!(control.status_document_id, Some(published.id));
        let detail = documents.get("root", created.control.uuid).await.unwrap();
        assert_eq!(detail.versions.len(), 1);
    }

    #[tokio::test]
    async fn test_update_rejects_deleted_status() {
        let fx = fixture().await;
        let documents = fx.engine.documents();
        let created = documents.create("root", fields(&fx), pdf("v1.pdf")).await.unwrap();
        let retired = fx.engine.statuses().create("root", "Retired").await.unwrap();
        fx.engine.statuses().delete("root", retired.uuid).await.unwrap();

        let result = documents
            .update(
                "root",
                created.control.uuid,
                DocumentUpdate {
                    fields: fields(&fx),
                    status_uuid: Some(retired.uuid),
                },
                None,
            )
            .await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_objects_then_rows() {
        let fx = fixture().await;
        let documents = fx.engine.documents();
        let created = documents.create("root", fields(&fx), pdf("v1.pdf")).await.unwrap();

        documents.delete("root", created.control.uuid).await.unwrap();
        assert_eq!(fx.objects.object_count().await, 0);
        assert!(matches!(
            documents.get("root", created.control.uuid).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_aborts_when_removal_fails() {
        let fx = fixture().await;
        let documents = fx.engine.documents();
        let created = documents.create("root", fields(&fx), pdf("v1.pdf")).await.unwrap();
        fx.objects.fail_removes(true);

        assert!(matches!(
            documents.delete("root", created.control.uuid).await,
            Err(EngineError::DependencyFailure(_))
        ));
        let detail = documents.get("root", created.control.uuid).await.unwrap();
        assert_eq!(detail.versions.len(), 1);
        assert!(!detail.control.is_deleted());
    }

    #[tokio::test]
    async fn test_delete_aborts_when_object_is_missing() {
        let fx = fixture().await;
        let documents = fx.engine.documents();
        let created = documents.create("root", fields(&fx), pdf("v1.pdf")).await.unwrap();
        docctl_objects::ObjectStore::remove(
            &fx.objects,
            &fx.engine.config().objects.bucket,
            &created.version.object_key,
        )
        .await
        .unwrap();

        assert!(matches!(
            documents.delete("root", created.control.uuid).await,
            Err(EngineError::DependencyFailure(_))
        ));
        let detail = documents.get("root", created.control.uuid).await.unwrap();
        assert!(!detail.control.is_deleted());
        assert_eq!(detail.versions.len(), 1);
    }

    #[tokio::test]
    async fn test_read_gate() {
        let fx = fixture().await;
        let created = fx
            .engine
            .documents()
            .create("root", fields(&fx), pdf("v1.pdf"))
            .await
            .unwrap();
        let documents = fx.engine.documents();

        assert!(matches!(
            documents.get("alice", created.control.uuid).await,
            Err(EngineError::Forbidden { ref action, .. }) if action == "draft"
        ));
        assert!(documents
            .list("alice", &DocumentFilter::default())
            .await
            .unwrap()
            .is_empty());

        fx.engine
            .assignments()
            .assign("root", "alice", "finance-clerk")
            .await
            .unwrap();
        assert!(documents.get("alice", created.control.uuid).await.is_ok());
        assert_eq!(
            documents
                .list("alice", &DocumentFilter::default())
                .await
                .unwrap()
                .len(),
            1
        );

        let published = fx.engine.statuses().create("root", "Published").await.unwrap();
        documents
            .update(
                "root",
                created.control.uuid,
                DocumentUpdate {
                    fields: fields(&fx),
                    status_uuid: Some(published.uuid),
                },
                None,
            )
            .await
            .unwrap();
        assert!(documents.get("alice", created.control.uuid).await.is_err());
    }

    #[tokio::test]
    async fn test_owner_reads_without_grant() {
        let fx = fixture().await;
        fx.engine
            .catalog()
            .create_entries(
                "root",
                "author",
                &[docctl_rbac::RuleGrant::parse("document", &["create"]).unwrap()],
            )
            .await
            .unwrap();
        fx.engine.assignments().assign("root", "bob", "author").await.unwrap();

        let created = fx
            .engine
            .documents()
            .create("bob", fields(&fx), pdf("v1.pdf"))
            .await
            .unwrap();
        let documents = fx.engine.documents();
        assert!(documents.get("bob", created.control.uuid).await.is_ok());
        assert!(matches!(
            documents
                .update(
                    "bob",
                    created.control.uuid,
                    DocumentUpdate {
                        fields: fields(&fx),
                        status_uuid: None,
                    },
                    None,
                )
                .await,
            Err(EngineError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_dangling_reference_denies_non_owner() {
        let fx = fixture().await;
        let created = fx
            .engine
            .documents()
            .create("root", fields(&fx), pdf("v1.pdf"))
            .await
            .unwrap();
        fx.engine
            .assignments()
            .assign("root", "alice", "finance-clerk")
            .await
            .unwrap();

        let mut tx = fx.engine.database().begin().await;
        let mut control = tx.control_by_uuid(created.control.uuid).unwrap().clone();
        control.document_type_id = Some(9999);
        tx.update_control(control).unwrap();
        tx.commit().await;

        assert!(matches!(
            fx.engine.documents().get("alice", created.control.uuid).await,
            Err(EngineError::Forbidden { .. })
        ));
        assert!(fx.engine.documents().get("root", created.control.uuid).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let fx = fixture().await;
        let documents = fx.engine.documents();
        documents.create("root", fields(&fx), pdf("a.pdf")).await.unwrap();
        let mut second = fields(&fx);
        second.document_name = "Expense claims".into();
        second.document_number = "FIN-INV-002".into();
        documents.create("root", second, pdf("b.pdf")).await.unwrap();

        let filter = DocumentFilter {
            search: Some("expense".into()),
            ..Default::default()
        };
        let found = documents.list("root", &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].document_number, "FIN-INV-002");

        let filter = DocumentFilter {
            type_uuid: Some(fx.doc_type.uuid),
            ..Default::default()
        };
        assert_eq!(documents.list("root", &filter).await.unwrap().len(), 2);
    }

    #[test]
    fn test_parse_publish_date() {
        assert_eq!(
            parse_publish_date(" 2024-02-29 ").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_publish_date("2023-02-29").is_err());
        assert!(parse_publish_date("").is_err());
    }

    #[test]
    fn test_update_payload_flattens_fields() {
        let json = serde_json::json!({
            "document_name": "Invoice handling",
            "document_number": "FIN-INV-001",
            "publish_date": "2024-03-01",
            "category_uuid": Uuid::nil(),
            "type_uuid": Uuid::nil(),
            "status_uuid": null
        });
        let update: DocumentUpdate = serde_json::from_value(json).unwrap();
        assert_eq!(update.fields.document_number, "FIN-INV-001");
        assert_eq!(update.fields.page_count, 0);
        assert!(update.status_uuid.is_none());
    }
}
