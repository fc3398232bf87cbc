//! # Engine
//!
//! The explicit service instance every protected operation runs through.
//!
//! ## Architecture
//!
//! ```text
//!             ┌──────────────────── Engine ────────────────────┐
//! subject ──▶ │ authenticate ─▶ reload tuples ─▶ Principal      │
//!             │                                                 │
//!             │ roles / catalog / taxonomy / documents / ...    │
//!             │   1. check(actor, resource, action, scope)      │
//!             │   2. begin transaction, mutate rows + tuples    │
//!             │   3. prepare enforcer from staged tuples (save) │
//!             │   4. commit, install enforcer                   │
//!             └─────────────────────────────────────────────────┘
//! ```
//!
//! The enforcer is compiled from the staged tuple set before the transaction
//! commits, so a tuple set that cannot be compiled never becomes visible.
//! Installs are ordered by store revision.

use docctl_objects::retry::RetryConfig;
use docctl_objects::{ensure_bucket, ObjectStore};
use docctl_rbac::{
    AccessDecisionService, Action, GrantTuple, PermissionSummary, PolicyTupleStore, ResourcePolicy,
    TupleScope, TupleWriter,
};
use docctl_registry::{MemoryDatabase, Role, StatusDocument, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::assignments::RoleAssignments;
use crate::catalog::PolicyCatalog;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::DocumentLifecycle;
use crate::roles::RoleRegistry;
use crate::statuses::StatusRegistry;
use crate::taxonomy::DocumentTaxonomy;

/// An authenticated subject with its login-time permission summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Verified subject identifier
    pub subject: String,

    /// Roles, direct and inherited grants
    pub permissions: PermissionSummary,

    /// Tuple revision the summary was computed at
    pub revision: u64,
}

impl Principal {
    /// Roles bound to the subject.
    pub fn roles(&self) -> &[String] {
        &self.permissions.roles
    }

    /// Whether the summary lists a matching grant.
    pub fn has_grant(&self, resource: &str, action: &Action, scope: &TupleScope) -> bool {
        self.permissions.allows(resource, action, scope)
    }
}

/// Scoped authorization and document lifecycle engine.
pub struct Engine {
    config: EngineConfig,
    database: Arc<MemoryDatabase>,
    objects: Arc<dyn ObjectStore>,
    tuples: Arc<PolicyTupleStore>,
    decisions: AccessDecisionService,
}

impl Engine {
    /// Construct the engine.
    ///
    /// Validates the configuration, loads the tuple set, makes sure the
    /// version bucket exists and seeds the initial document status.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for invalid settings and
    /// [`EngineError::DependencyFailure`] if the tuple set cannot be loaded or
    /// the bucket cannot be created.
    #[instrument(skip_all)]
    pub async fn start(
        config: EngineConfig,
        database: Arc<MemoryDatabase>,
        objects: Arc<dyn ObjectStore>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let tuples = Arc::new(PolicyTupleStore::new(database.clone()));
        let revision = tuples.reload().await?;
        let decisions = AccessDecisionService::new(tuples.clone());

        let retry = RetryConfig::with_attempts(config.objects.max_retries);
        ensure_bucket(objects.as_ref(), &config.objects.bucket, &config.objects.region, &retry).await?;

        let engine = Self {
            config,
            database,
            objects,
            tuples,
            decisions,
        };
        engine.seed_initial_status().await?;

        info!(
            revision,
            bucket = %engine.config.objects.bucket,
            guard = %engine.config.guard_name,
            "Document control engine started"
        );
        Ok(engine)
    }

    async fn seed_initial_status(&self) -> EngineResult<()> {
        let mut tx = self.database.begin().await;
        if tx.status_by_name(&self.config.initial_status).is_some() {
            return Ok(());
        }
        let status = tx.insert_status(StatusDocument::new(self.config.initial_status.clone()))?;
        self.commit(tx).await?;
        info!(status = %status.name, "Seeded initial document status");
        Ok(())
    }

    /// Resolve a verified subject into a [`Principal`].
    ///
    /// Reloads the tuple set first, which bounds how stale any decision made
    /// for this request can be.
    #[instrument(skip(self))]
    pub async fn authenticate(&self, subject: &str) -> EngineResult<Principal> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(EngineError::validation("subject must not be empty"));
        }
        let revision = self.tuples.reload().await?;
        let permissions = self.tuples.summary(subject).await?;
        debug!(
            subject,
            revision,
            roles = permissions.roles.len(),
            "Authenticated subject"
        );
        Ok(Principal {
            subject: subject.to_string(),
            permissions,
            revision,
        })
    }

    /// Grant `role` every action on every engine-guarded resource and bind
    /// `users` to it, without an access check.
    ///
    /// Intended for seeding the first administrator at deployment time.
    #[instrument(skip(self, users))]
    pub async fn bootstrap_admin(&self, role: &str, users: &[&str]) -> EngineResult<Role> {
        let mut tx = self.database.begin().await;
        let role = self.ensure_role(&mut tx, role)?;
        let mut actions = Action::crud();
        actions.push(Action::manage());
        for resource in ResourcePolicy::all() {
            for action in &actions {
                self.tuples.add_grant(
                    &mut tx,
                    GrantTuple::new(role.name.clone(), resource.as_str(), action.clone(), TupleScope::unscoped()),
                );
            }
        }
        for user in users {
            self.tuples.add_grouping(&mut tx, user, &role.name);
        }
        self.commit(tx).await?;
        warn!(role = %role.name, users = users.len(), "Bootstrapped administrator role");
        Ok(role)
    }

    /// Role registry operations.
    pub fn roles(&self) -> RoleRegistry<'_> {
        RoleRegistry::new(self)
    }

    /// User-to-role assignments.
    pub fn assignments(&self) -> RoleAssignments<'_> {
        RoleAssignments::new(self)
    }

    /// Rule catalog operations.
    pub fn catalog(&self) -> PolicyCatalog<'_> {
        PolicyCatalog::new(self)
    }

    /// Category and document type operations.
    pub fn taxonomy(&self) -> DocumentTaxonomy<'_> {
        DocumentTaxonomy::new(self)
    }

    /// Document and version operations.
    pub fn documents(&self) -> DocumentLifecycle<'_> {
        DocumentLifecycle::new(self)
    }

    /// Document status operations.
    pub fn statuses(&self) -> StatusRegistry<'_> {
        StatusRegistry::new(self)
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Backing database.
    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }

    /// Compiled policy tuple store.
    pub fn tuples(&self) -> &Arc<PolicyTupleStore> {
        &self.tuples
    }

    /// Fail-closed access decisions.
    pub fn decisions(&self) -> &AccessDecisionService {
        &self.decisions
    }

    pub(crate) fn objects(&self) -> &dyn ObjectStore {
        self.objects.as_ref()
    }

    /// Deny unless `actor` holds an unscoped grant for `action` on `resource`.
    pub(crate) async fn authorize(&self, actor: &str, resource: ResourcePolicy, action: Action) -> EngineResult<()> {
        self.authorize_scoped(actor, resource.as_str(), action, &TupleScope::unscoped())
            .await
    }

    pub(crate) async fn authorize_scoped(
        &self,
        actor: &str,
        resource: &str,
        action: Action,
        scope: &TupleScope,
    ) -> EngineResult<()> {
        if self.decisions.check(actor, resource, &action, scope).await {
            return Ok(());
        }
        Err(EngineError::Forbidden {
            subject: actor.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
        })
    }

    /// Role row for `name` under the configured guard, created if missing.
    pub(crate) fn ensure_role(&self, tx: &mut Transaction, name: &str) -> EngineResult<Role> {
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) || name.contains(',') {
            return Err(EngineError::validation(format!("invalid role name: {:?}", name)));
        }
        if let Some(role) = tx.find_role(name, &self.config.guard_name) {
            return Ok(role.clone());
        }
        let role = tx.insert_role(Role::new(name, self.config.guard_name.clone()))?;
        info!(role = %role.name, guard = %role.guard_name, "Created role");
        Ok(role)
    }

    /// Save step: compile the staged tuples, commit, then install.
    ///
    /// # Returns
    ///
    /// The committed revision.
    pub(crate) async fn commit(&self, tx: Transaction) -> EngineResult<u64> {
        let tx_id = tx.id();
        let compiled = self
            .tuples
            .prepare(tx.pending_revision(), tx.staged_tuples())
            .await
            .map_err(|e| {
                warn!(transaction = %tx_id, error = %e, "Failed to compile staged tuples");
                e
            })?;
        let revision = tx.commit().await;
        self.tuples.install(compiled).await;
        debug!(transaction = %tx_id, revision, "Saved policy tuples");
        Ok(revision)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docctl_objects::MemoryObjectStore;

    async fn engine() -> (Engine, Arc<MemoryObjectStore>) {
        let objects = Arc::new(MemoryObjectStore::new());
        let engine = Engine::start(
            EngineConfig::default(),
            Arc::new(MemoryDatabase::new()),
            objects.clone(),
        )
        .await
        .unwrap();
        (engine, objects)
    }

    #[tokio::test]
    async fn test_start_creates_bucket_and_initial_status() {
        let (engine, objects) = engine().await;
        assert!(objects.bucket_exists("documents").await.unwrap());
        let tables = engine.database().read().await;
        assert!(tables.status_by_name("draft").is_some());
        drop(tables);
        assert!(engine.tuples().is_loaded().await);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = EngineConfig {
            guard_name: String::new(),
            ..Default::default()
        };
        let result = Engine::start(
            config,
            Arc::new(MemoryDatabase::new()),
            Arc::new(MemoryObjectStore::new()),
        )
        .await;
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_authenticate_reports_roles() {
        let (engine, _) = engine().await;
        engine.bootstrap_admin("admin", &["root"]).await.unwrap();

        let principal = engine.authenticate("root").await.unwrap();
        assert_eq!(principal.roles(), ["admin".to_string()]);
        assert!(principal.has_grant("roles", &Action::create(), &TupleScope::unscoped()));

        let nobody = engine.authenticate("nobody").await.unwrap();
        assert!(nobody.roles().is_empty());
        assert!(engine.authenticate("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_authenticate_fails_when_tuples_unavailable() {
        let (engine, _) = engine().await;
        engine.database().set_tuple_load_failure(true);
        assert!(matches!(
            engine.authenticate("root").await,
            Err(EngineError::DependencyFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_authorize_denies_without_grant() {
        let (engine, _) = engine().await;
        engine.bootstrap_admin("admin", &["root"]).await.unwrap();

        assert!(engine.authorize("root", ResourcePolicy::Rules, Action::delete()).await.is_ok());
        assert!(matches!(
            engine.authorize("mallory", ResourcePolicy::Rules, Action::delete()).await,
            Err(EngineError::Forbidden { .. })
        ));
    }
}
