//! End-to-end scenarios across the engine, tuple store, registry and object
//! store.
//!
//! Scenarios:
//! 1. Scoped grant on a type: check flips once the user joins the role
//! 2. Type prefix rename moves the rule and its tuple
//! 3. Catalog creation is idempotent
//! 4. Scoped rule sync leaves nothing behind in the old scope
//! 5. Unscoped and scoped grants never satisfy each other
//! 6. Tuple load failures deny instead of permitting
//! 7. Upload failure leaves no document rows
//! 8. Versions are append-only
//! 9. Documents round-trip through an HTTP object store gateway

use docctl_engine::{
    CategoryUpdate, DocumentFields, DocumentTypeUpdate, DocumentUpdate, Engine, EngineConfig, EngineError,
    NewCategory, NewDocumentType, ScopedRule,
};
use docctl_objects::{HttpObjectStore, MemoryObjectStore, ObjectStore, ObjectStoreConfig, Upload};
use docctl_rbac::{Action, PolicyTuple, RuleGrant, TupleScope};
use docctl_registry::{CategoryDocument, ControlFilter, DocumentType, MemoryDatabase, RuleFilter};
use std::sync::Arc;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Engine with `root` as administrator and a FIN category holding an INV type.
struct TestFixture {
    engine: Engine,
    objects: MemoryObjectStore,
    database: Arc<MemoryDatabase>,
    category: CategoryDocument,
    doc_type: DocumentType,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_type_rules(Vec::new()).await
    }

    async fn with_type_rules(rules: Vec<ScopedRule>) -> Self {
        let objects = MemoryObjectStore::new();
        let database = Arc::new(MemoryDatabase::new());
        let engine = Engine::start(EngineConfig::default(), database.clone(), Arc::new(objects.clone()))
            .await
            .expect("engine starts");
        engine.bootstrap_admin("admin", &["root"]).await.expect("bootstrap");
        let (category, doc_type) = create_taxonomy(&engine, rules).await;

        Self {
            engine,
            objects,
            database,
            category,
            doc_type,
        }
    }

    fn fields(&self) -> DocumentFields {
        document_fields(&self.category, &self.doc_type)
    }

    async fn grant_tuples_in(&self, scope: &TupleScope) -> usize {
        self.database
            .read()
            .await
            .tuples()
            .filter_map(PolicyTuple::as_grant)
            .filter(|g| &g.scope == scope)
            .count()
    }

    async fn check(&self, subject: &str, action: &str, scope: &TupleScope) -> bool {
        let action = Action::parse(action).expect("valid action");
        self.engine
            .decisions()
            .check(subject, "document", &action, scope)
            .await
    }
}

async fn create_taxonomy(engine: &Engine, rules: Vec<ScopedRule>) -> (CategoryDocument, DocumentType) {
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
        .expect("category");
    let doc_type = engine
        .taxonomy()
        .create_type(
            "root",
            NewDocumentType {
                name: "Invoice".into(),
                prefix: "INV".into(),
                category_uuid: category.uuid,
                rules,
            },
        )
        .await
        .expect("type");
    (category, doc_type)
}

fn document_fields(category: &CategoryDocument, doc_type: &DocumentType) -> DocumentFields {
    DocumentFields {
        document_name: "Invoice approval".into(),
        description: String::new(),
        document_number: "FIN-INV-001".into(),
        clause_number: String::new(),
        revision_number: 1,
        publish_date: "2024-06-30".into(),
        page_count: 2,
        category_uuid: category.uuid,
        type_uuid: doc_type.uuid,
        sequence_number: None,
    }
}

fn pdf(name: &str) -> Upload {
    Upload::new(name, "application/pdf", b"%PDF-1.7 scenario".to_vec())
}

fn clerk_read() -> Vec<ScopedRule> {
    let payload = serde_json::json!([{ "role_guard_name": "finance-clerk", "action": "read" }]);
    serde_json::from_value(payload).expect("rule payload")
}

#[tokio::test]
async fn test_type_scoped_grant_requires_grouping() {
    let fx = TestFixture::with_type_rules(clerk_read()).await;
    let scope = TupleScope::document_type("FIN", "INV");

    let rows = fx
        .engine
        .catalog()
        .list_entries("root", &RuleFilter::for_role("finance-clerk"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].rule_policy, "document");
    assert_eq!(rows[0].action, Action::read());
    assert_eq!(rows[0].scope(), scope);

    assert!(!fx.check("alice", "read", &scope).await);
    fx.engine
        .assignments()
        .assign("root", "alice", "finance-clerk")
        .await
        .unwrap();
    assert!(fx.check("alice", "read", &scope).await);

    let principal = fx.engine.authenticate("alice").await.unwrap();
    assert_eq!(principal.roles(), ["finance-clerk".to_string()]);
    assert!(principal.has_grant("document", &Action::read(), &scope));
}

#[tokio::test]
async fn test_type_rename_moves_rule_and_tuple() {
    let fx = TestFixture::with_type_rules(clerk_read()).await;
    fx.engine
        .assignments()
        .assign("root", "alice", "finance-clerk")
        .await
        .unwrap();

    fx.engine
        .taxonomy()
        .update_type(
            "root",
            fx.doc_type.uuid,
            DocumentTypeUpdate {
                name: "Invoice".into(),
                prefix: "INVX".into(),
                category_uuid: None,
                rules: Some(clerk_read()),
            },
        )
        .await
        .unwrap();

    let old = TupleScope::document_type("FIN", "INV");
    let new = TupleScope::document_type("FIN", "INVX");
    let tables = fx.database.read().await;
    assert!(tables.rules(&RuleFilter::in_scope(old.clone())).is_empty());
    assert_eq!(tables.rules(&RuleFilter::in_scope(new.clone())).len(), 1);
    drop(tables);
    assert_eq!(fx.grant_tuples_in(&old).await, 0);
    assert_eq!(fx.grant_tuples_in(&new).await, 1);

    assert!(!fx.check("alice", "read", &old).await);
    assert!(fx.check("alice", "read", &new).await);
}

#[tokio::test]
async fn test_category_rename_carries_type_rules() {
    let fx = TestFixture::with_type_rules(clerk_read()).await;
    fx.engine
        .assignments()
        .assign("root", "alice", "finance-clerk")
        .await
        .unwrap();

    fx.engine
        .taxonomy()
        .update_category(
            "root",
            fx.category.uuid,
            CategoryUpdate {
                name: "Finance".into(),
                prefix: "FINX".into(),
                rules: None,
            },
        )
        .await
        .unwrap();

    assert!(!fx.check("alice", "read", &TupleScope::document_type("FIN", "INV")).await);
    assert!(fx.check("alice", "read", &TupleScope::document_type("FINX", "INV")).await);
}

#[tokio::test]
async fn test_catalog_creation_is_idempotent() {
    let fx = TestFixture::new().await;
    let grants = vec![RuleGrant::parse("invoice", &["read", "update"]).unwrap()];

    let first = fx
        .engine
        .catalog()
        .create_entries("root", "auditor", &grants)
        .await
        .unwrap();
    let second = fx
        .engine
        .catalog()
        .create_entries("root", "auditor", &grants)
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    assert!(second.is_empty());

    let tables = fx.database.read().await;
    assert_eq!(tables.rules(&RuleFilter::for_role("auditor")).len(), 2);
    assert_eq!(tables.grants_of("auditor").count(), 2);
}

#[tokio::test]
async fn test_scoped_sync_clears_old_scope() {
    let fx = TestFixture::new().await;
    let catalog = fx.engine.catalog();
    let old = TupleScope::category("FIN");
    let new = TupleScope::category("FINANCE");

    catalog
        .update_scoped_rules(
            "root",
            &old,
            &old,
            &[
                ScopedRule::document("clerk", Action::read()),
                ScopedRule::document("clerk", Action::update()),
                ScopedRule::document("lead", Action::delete()),
            ],
        )
        .await
        .unwrap();

    let desired = [
        ScopedRule::document("clerk", Action::read()),
        ScopedRule::document("auditor", Action::read()),
    ];
    let sync = catalog.update_scoped_rules("root", &old, &new, &desired).await.unwrap();
    assert_eq!(sync.moved, 1);
    assert_eq!(sync.created, 1);
    assert_eq!(sync.removed, 2);

    let tables = fx.database.read().await;
    assert!(tables.rules(&RuleFilter::in_scope(old.clone())).is_empty());
    assert_eq!(tables.rules(&RuleFilter::in_scope(new.clone())).len(), desired.len());
    drop(tables);
    assert_eq!(fx.grant_tuples_in(&old).await, 0);
    assert_eq!(fx.grant_tuples_in(&new).await, desired.len());
}

#[tokio::test]
async fn test_scope_matching_is_exact() {
    let fx = TestFixture::new().await;
    fx.engine
        .catalog()
        .create_entries(
            "root",
            "reader",
            &[RuleGrant::parse("document", &["read"]).unwrap()],
        )
        .await
        .unwrap();
    fx.engine
        .catalog()
        .create_entry("root", "fin-reader", "document", Action::read(), TupleScope::category("FIN"))
        .await
        .unwrap();
    fx.engine.assignments().assign("root", "ursula", "reader").await.unwrap();
    fx.engine.assignments().assign("root", "fiona", "fin-reader").await.unwrap();

    assert!(fx.check("ursula", "read", &TupleScope::unscoped()).await);
    assert!(!fx.check("ursula", "read", &TupleScope::category("FIN")).await);
    assert!(fx.check("fiona", "read", &TupleScope::category("FIN")).await);
    assert!(!fx.check("fiona", "read", &TupleScope::unscoped()).await);
    assert!(!fx.check("fiona", "read", &TupleScope::document_type("FIN", "INV")).await);
}

#[tokio::test]
async fn test_tuple_load_failure_fails_closed() {
    let fx = TestFixture::new().await;
    fx.database.set_tuple_load_failure(true);

    assert!(matches!(
        fx.engine.authenticate("root").await,
        Err(EngineError::DependencyFailure(_))
    ));

    let database = Arc::new(MemoryDatabase::new());
    database.set_tuple_load_failure(true);
    let started = Engine::start(EngineConfig::default(), database, Arc::new(MemoryObjectStore::new())).await;
    assert!(matches!(started, Err(EngineError::DependencyFailure(_))));
}

#[tokio::test]
async fn test_upload_failure_rolls_back_create() {
    let fx = TestFixture::new().await;
    fx.objects.fail_puts(true);

    let result = fx.engine.documents().create("root", fx.fields(), pdf("a.pdf")).await;
    assert!(matches!(result, Err(EngineError::DependencyFailure(_))));
    assert_eq!(fx.objects.put_attempts(), 1);

    let tables = fx.database.read().await;
    assert!(tables.controls(&ControlFilter::default()).is_empty());
    assert!(tables.versions_of(1).is_empty());
}

#[tokio::test]
async fn test_versions_are_append_only() {
    let fx = TestFixture::new().await;
    let documents = fx.engine.documents();
    let created = documents.create("root", fx.fields(), pdf("v1.pdf")).await.unwrap();
    let first_file = created.version.file.clone();

    for name in ["v2.pdf", "v3.pdf"] {
        documents
            .update(
                "root",
                created.control.uuid,
                DocumentUpdate {
                    fields: fx.fields(),
                    status_uuid: None,
                },
                Some(pdf(name)),
            )
            .await
            .unwrap();
    }

    let detail = documents.get("root", created.control.uuid).await.unwrap();
    assert_eq!(detail.versions.len(), 3);
    assert_eq!(detail.versions[0].file, first_file);
    assert!(fx
        .objects
        .object("documents", &detail.versions[0].object_key)
        .await
        .is_some());
}

#[tokio::test]
async fn test_document_through_http_gateway() {
    let server = MockServer::start().await;
    let config = EngineConfig {
        objects: ObjectStoreConfig {
            endpoint: server.uri().trim_start_matches("http://").to_string(),
            bucket: "documents".to_string(),
            use_ssl: false,
            max_retries: 1,
            ..Default::default()
        },
        ..Default::default()
    };

    Mock::given(method("HEAD"))
        .and(path("/documents"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/documents/document-versions/[0-9a-f-]+\.pdf$"))
        .and(query_param("acl", ""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/documents/document-versions/[0-9a-f-]+\.pdf$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/documents/document-versions/[0-9a-f-]+\.pdf$"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(config.objects.clone()).unwrap());
    let engine = Engine::start(config, Arc::new(MemoryDatabase::new()), store)
        .await
        .unwrap();
    engine.bootstrap_admin("admin", &["root"]).await.unwrap();
    let (category, doc_type) = create_taxonomy(&engine, Vec::new()).await;

    let created = engine
        .documents()
        .create("root", document_fields(&category, &doc_type), pdf("policy.pdf"))
        .await
        .unwrap();
    assert!(created.version.file.starts_with(&format!("{}/documents/document-versions/", server.uri())));

    engine.documents().delete("root", created.control.uuid).await.unwrap();
    assert!(engine
        .documents()
        .list("root", &Default::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_gateway_error_aborts_create() {
    let server = MockServer::start().await;
    let config = EngineConfig {
        objects: ObjectStoreConfig {
            endpoint: server.uri().trim_start_matches("http://").to_string(),
            bucket: "documents".to_string(),
            use_ssl: false,
            max_retries: 1,
            ..Default::default()
        },
        ..Default::default()
    };

    Mock::given(method("HEAD"))
        .and(path("/documents"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("slow down"))
        .mount(&server)
        .await;

    let database = Arc::new(MemoryDatabase::new());
    let store = Arc::new(HttpObjectStore::new(config.objects.clone()).unwrap());
    let engine = Engine::start(config, database.clone(), store).await.unwrap();
    engine.bootstrap_admin("admin", &["root"]).await.unwrap();
    let (category, doc_type) = create_taxonomy(&engine, Vec::new()).await;

    let result = engine
        .documents()
        .create("root", document_fields(&category, &doc_type), pdf("policy.pdf"))
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, EngineError::DependencyFailure(_)));
    assert_eq!(err.status_code(), 502);
    assert!(database.read().await.controls(&ControlFilter::default()).is_empty());
}
