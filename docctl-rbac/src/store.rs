//! # Policy Tuple Store
//!
//! The enforcement structure consulted on every protected request.
//!
//! ## Architecture
//!
//! ```text
//!   TupleSource (relational store)          TupleWriter (open transaction)
//!          |                                        |
//!        load()                         add_grant / remove_grant / ...
//!          |                                        |
//!          v                                        v
//!   compile(snapshot) ----> CompiledPolicy <---- prepare(revision, staged)
//!                                |
//!                           install()   (newer revision wins)
//!                                |
//!                                v
//!                  RwLock<Option<LoadedPolicy>>  --->  enforce()
//! ```
//!
//! Mutations are staged against a [`TupleWriter`] belonging to a store
//! transaction. The "save" step compiles the staged tuple set before the
//! transaction commits and installs it afterwards, so a tuple set that cannot
//! be compiled never reaches the backing store. [`PolicyTupleStore::reload`]
//! re-reads the backing store and is called once per authenticated request to
//! pick up out-of-process writes.

use async_trait::async_trait;
use casbin::{CoreApi, Enforcer, MemoryAdapter, MgmtApi};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::actions::Action;
use crate::error::{PolicyError, PolicyResult};
use crate::model::load_model;
use crate::permissions::PermissionSummary;
use crate::scope::{TupleScope, NONE_SENTINEL};
use crate::tuples::{GrantTuple, GroupingTuple, PolicyTuple};

/// Tuple set read from the backing store at a given revision.
#[derive(Debug, Clone, Default)]
pub struct TupleSnapshot {
    /// Store revision the tuples were read at.
    pub revision: u64,
    /// Every stored tuple.
    pub tuples: Vec<PolicyTuple>,
}

/// Backing store the enforcer is (re)loaded from.
#[async_trait]
pub trait TupleSource: Send + Sync {
    /// Read all tuples together with the store revision.
    async fn load(&self) -> PolicyResult<TupleSnapshot>;
}

/// Tuple table of an open transaction.
pub trait TupleWriter {
    /// Stage an insert. Returns `false` if the tuple already exists.
    fn insert_tuple(&mut self, tuple: PolicyTuple) -> bool;

    /// Stage a delete. Returns `false` if the tuple does not exist.
    fn delete_tuple(&mut self, tuple: &PolicyTuple) -> bool;

    /// Whether the tuple exists in the transaction's view.
    fn contains_tuple(&self, tuple: &PolicyTuple) -> bool;

    /// Every tuple in the transaction's view.
    fn staged_tuples(&self) -> Vec<PolicyTuple>;
}

/// Lookup tables derived from a tuple set.
#[derive(Debug, Clone, Default)]
struct TupleIndex {
    grants: BTreeMap<String, Vec<GrantTuple>>,
    groupings: BTreeMap<String, BTreeSet<String>>,
}

impl TupleIndex {
    fn build(tuples: &[PolicyTuple]) -> Self {
        let mut index = TupleIndex::default();
        for tuple in tuples {
            match tuple {
                PolicyTuple::Grant(grant) => index
                    .grants
                    .entry(grant.subject.clone())
                    .or_default()
                    .push(grant.clone()),
                PolicyTuple::Grouping(grouping) => {
                    index
                        .groupings
                        .entry(grouping.user.clone())
                        .or_default()
                        .insert(grouping.role.clone());
                }
            }
        }
        index
    }

    /// Roles reachable from `user` through grouping tuples, breadth-first.
    fn roles_of(&self, user: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([user]);
        while let Some(current) = queue.pop_front() {
            if let Some(roles) = self.groupings.get(current) {
                for role in roles {
                    if role != user && seen.insert(role.clone()) {
                        ordered.push(role.clone());
                        queue.push_back(role);
                    }
                }
            }
        }
        ordered
    }

    fn direct_tuples(&self, subject: &str) -> Vec<PolicyTuple> {
        let grants = self
            .grants
            .get(subject)
            .into_iter()
            .flatten()
            .cloned()
            .map(PolicyTuple::Grant);
        let groupings = self
            .groupings
            .get(subject)
            .into_iter()
            .flatten()
            .map(|role| PolicyTuple::Grouping(GroupingTuple::new(subject, role.clone())));
        grants.chain(groupings).collect()
    }
}

/// A tuple set compiled into an enforcer, ready to be installed.
pub struct CompiledPolicy {
    revision: u64,
    tuple_count: usize,
    enforcer: Enforcer,
    index: TupleIndex,
}

impl CompiledPolicy {
    /// Store revision this policy was compiled from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of tuples compiled.
    pub fn tuple_count(&self) -> usize {
        self.tuple_count
    }
}

impl std::fmt::Debug for CompiledPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPolicy")
            .field("revision", &self.revision)
            .field("tuple_count", &self.tuple_count)
            .finish()
    }
}

/// Durable permission and grouping tuples plus the live enforcer.
///
/// # Example
///
/// ```rust,no_run
/// use docctl_rbac::{Action, PolicyTupleStore, TupleScope, TupleSource};
/// use std::sync::Arc;
///
/// # async fn example(source: Arc<dyn TupleSource>) -> docctl_rbac::PolicyResult<()> {
/// let store = PolicyTupleStore::new(source);
/// store.reload().await?;
///
/// let allowed = store
///     .enforce("alice", "document", &Action::read(), &TupleScope::document_type("FIN", "INV"))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct PolicyTupleStore {
    source: Arc<dyn TupleSource>,
    loaded: RwLock<Option<CompiledPolicy>>,
}

impl PolicyTupleStore {
    /// Create a store over a backing tuple source. Nothing is loaded until
    /// [`reload`](Self::reload) or [`install`](Self::install) is called.
    pub fn new(source: Arc<dyn TupleSource>) -> Self {
        Self {
            source,
            loaded: RwLock::new(None),
        }
    }

    /// Stage a grant tuple.
    pub fn add_grant<W: TupleWriter + ?Sized>(&self, writer: &mut W, grant: GrantTuple) -> bool {
        debug!(
            subject = %grant.subject,
            resource = %grant.resource,
            action = %grant.action,
            scope = %grant.scope,
            "Staging grant tuple"
        );
        writer.insert_tuple(PolicyTuple::Grant(grant))
    }

    /// Stage removal of a grant tuple.
    pub fn remove_grant<W: TupleWriter + ?Sized>(&self, writer: &mut W, grant: &GrantTuple) -> bool {
        debug!(
            subject = %grant.subject,
            resource = %grant.resource,
            action = %grant.action,
            scope = %grant.scope,
            "Staging grant tuple removal"
        );
        writer.delete_tuple(&PolicyTuple::Grant(grant.clone()))
    }

    /// Stage a grouping tuple.
    pub fn add_grouping<W: TupleWriter + ?Sized>(&self, writer: &mut W, user: &str, role: &str) -> bool {
        debug!(user, role, "Staging grouping tuple");
        writer.insert_tuple(PolicyTuple::Grouping(GroupingTuple::new(user, role)))
    }

    /// Stage removal of a grouping tuple.
    pub fn remove_grouping<W: TupleWriter + ?Sized>(
        &self,
        writer: &mut W,
        user: &str,
        role: &str,
    ) -> bool {
        debug!(user, role, "Staging grouping tuple removal");
        writer.delete_tuple(&PolicyTuple::Grouping(GroupingTuple::new(user, role)))
    }

    /// Roles bound to `user`, resolved transitively.
    pub async fn roles_of(&self, user: &str) -> PolicyResult<Vec<String>> {
        let guard = self.loaded.read().await;
        let policy = guard.as_ref().ok_or(PolicyError::NotLoaded)?;
        Ok(policy.index.roles_of(user))
    }

    /// Tuples whose first position is `subject`.
    pub async fn tuples_of(&self, subject: &str) -> PolicyResult<Vec<PolicyTuple>> {
        let guard = self.loaded.read().await;
        let policy = guard.as_ref().ok_or(PolicyError::NotLoaded)?;
        Ok(policy.index.direct_tuples(subject))
    }

    /// Grants reachable from `user` through its roles.
    pub async fn implicit_grants_of(&self, user: &str) -> PolicyResult<Vec<GrantTuple>> {
        let guard = self.loaded.read().await;
        let policy = guard.as_ref().ok_or(PolicyError::NotLoaded)?;
        Ok(policy
            .index
            .roles_of(user)
            .iter()
            .flat_map(|role| policy.index.grants.get(role).into_iter().flatten().cloned())
            .collect())
    }

    /// Roles, direct grants and inherited grants of `user`.
    pub async fn summary(&self, user: &str) -> PolicyResult<PermissionSummary> {
        let guard = self.loaded.read().await;
        let policy = guard.as_ref().ok_or(PolicyError::NotLoaded)?;
        let roles = policy.index.roles_of(user);
        let inherited = roles
            .iter()
            .flat_map(|role| policy.index.grants.get(role).into_iter().flatten().cloned())
            .collect();
        Ok(PermissionSummary {
            direct: policy.index.grants.get(user).cloned().unwrap_or_default(),
            inherited,
            roles,
        })
    }

    /// Evaluate `(subject, resource, action, category, type, "none")`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::NotLoaded`] before the first successful load and
    /// propagates enforcer failures. Callers must treat errors as denial.
    pub async fn enforce(
        &self,
        subject: &str,
        resource: &str,
        action: &Action,
        scope: &TupleScope,
    ) -> PolicyResult<bool> {
        let guard = self.loaded.read().await;
        let policy = guard.as_ref().ok_or(PolicyError::NotLoaded)?;
        let allowed = policy.enforcer.enforce((
            subject,
            resource,
            action.as_str(),
            scope.category.as_str(),
            scope.doc_type.as_str(),
            NONE_SENTINEL,
        ))?;
        Ok(allowed)
    }

    /// Re-read the backing store and install the result.
    ///
    /// # Returns
    ///
    /// The revision now in effect.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> PolicyResult<u64> {
        let snapshot = self.source.load().await.map_err(|e| {
            warn!(error = %e, "Failed to load policy tuples");
            e
        })?;
        let compiled = self.prepare(snapshot.revision, snapshot.tuples).await?;
        self.install(compiled).await;
        Ok(self.revision().await.unwrap_or_default())
    }

    /// Compile a tuple set without installing it.
    ///
    /// This is the save step of a mutating transaction: it runs against the
    /// staged tuples before the transaction commits.
    pub async fn prepare(&self, revision: u64, tuples: Vec<PolicyTuple>) -> PolicyResult<CompiledPolicy> {
        let model = load_model().await?;
        let mut enforcer = Enforcer::new(model, MemoryAdapter::default()).await?;

        for tuple in &tuples {
            match tuple {
                PolicyTuple::Grant(grant) => {
                    enforcer.add_policy(grant.to_rule()).await?;
                }
                PolicyTuple::Grouping(grouping) => {
                    enforcer.add_grouping_policy(grouping.to_rule()).await?;
                }
            }
        }
        enforcer.build_role_links()?;

        Ok(CompiledPolicy {
            revision,
            tuple_count: tuples.len(),
            index: TupleIndex::build(&tuples),
            enforcer,
        })
    }

    /// Swap in a compiled policy unless a newer revision is already installed.
    ///
    /// # Returns
    ///
    /// `true` if the policy was installed.
    pub async fn install(&self, compiled: CompiledPolicy) -> bool {
        let mut guard = self.loaded.write().await;
        if let Some(current) = guard.as_ref() {
            if current.revision > compiled.revision {
                debug!(
                    current = current.revision,
                    offered = compiled.revision,
                    "Skipping stale policy install"
                );
                return false;
            }
        }
        info!(
            revision = compiled.revision,
            tuples = compiled.tuple_count,
            "Installed policy tuples"
        );
        *guard = Some(compiled);
        true
    }

    /// Revision of the installed policy, if any.
    pub async fn revision(&self) -> Option<u64> {
        self.loaded.read().await.as_ref().map(|p| p.revision)
    }

    /// Whether a policy has been installed.
    pub async fn is_loaded(&self) -> bool {
        self.loaded.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Tuple table used as both source and writer.
    #[derive(Default)]
    struct TestTuples {
        tuples: BTreeSet<PolicyTuple>,
    }

    impl TupleWriter for TestTuples {
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

    struct TestSource {
        tuples: Mutex<Vec<PolicyTuple>>,
        revision: Mutex<u64>,
        fail: AtomicBool,
    }

    impl TestSource {
        fn new(tuples: Vec<PolicyTuple>) -> Arc<Self> {
            Arc::new(Self {
                tuples: Mutex::new(tuples),
                revision: Mutex::new(1),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl TupleSource for TestSource {
        async fn load(&self) -> PolicyResult<TupleSnapshot> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PolicyError::SourceUnavailable("test source offline".into()));
            }
            Ok(TupleSnapshot {
                revision: *self.revision.lock().unwrap(),
                tuples: self.tuples.lock().unwrap().clone(),
            })
        }
    }

    fn grant(subject: &str, action: Action, scope: TupleScope) -> GrantTuple {
        GrantTuple::new(subject, "document", action, scope)
    }

    fn clerk_tuples() -> Vec<PolicyTuple> {
        vec![
            grant("finance-clerk", Action::read(), TupleScope::document_type("FIN", "INV")).into(),
            grant("editor", Action::update(), TupleScope::unscoped()).into(),
            GroupingTuple::new("alice", "finance-clerk").into(),
        ]
    }

    #[tokio::test]
    async fn test_enforce_before_load_errors() {
        let store = PolicyTupleStore::new(TestSource::new(vec![]));
        let result = store
            .enforce("alice", "document", &Action::read(), &TupleScope::unscoped())
            .await;
        assert!(matches!(result, Err(PolicyError::NotLoaded)));
    }

    #[tokio::test]
    async fn test_enforce_resolves_roles() {
        let store = PolicyTupleStore::new(TestSource::new(clerk_tuples()));
        store.reload().await.unwrap();

        let scope = TupleScope::document_type("FIN", "INV");
        assert!(store.enforce("alice", "document", &Action::read(), &scope).await.unwrap());
        assert!(!store.enforce("bob", "document", &Action::read(), &scope).await.unwrap());
        assert!(!store.enforce("alice", "document", &Action::update(), &scope).await.unwrap());
    }

    #[tokio::test]
    async fn test_none_is_not_a_wildcard() {
        let store = PolicyTupleStore::new(TestSource::new(vec![
            grant("reader", Action::read(), TupleScope::unscoped()).into(),
            grant("scoped", Action::read(), TupleScope::category("finance")).into(),
            GroupingTuple::new("u1", "reader").into(),
            GroupingTuple::new("u2", "scoped").into(),
        ]));
        store.reload().await.unwrap();

        let finance = TupleScope::category("finance");
        let unscoped = TupleScope::unscoped();
        assert!(!store.enforce("u1", "document", &Action::read(), &finance).await.unwrap());
        assert!(store.enforce("u1", "document", &Action::read(), &unscoped).await.unwrap());
        assert!(!store.enforce("u2", "document", &Action::read(), &unscoped).await.unwrap());
        assert!(store.enforce("u2", "document", &Action::read(), &finance).await.unwrap());
    }

    #[tokio::test]
    async fn test_roles_are_transitive() {
        let store = PolicyTupleStore::new(TestSource::new(vec![
            GroupingTuple::new("alice", "junior").into(),
            GroupingTuple::new("junior", "staff").into(),
            GroupingTuple::new("staff", "junior").into(),
            grant("staff", Action::read(), TupleScope::unscoped()).into(),
        ]));
        store.reload().await.unwrap();

        assert_eq!(store.roles_of("alice").await.unwrap(), vec!["junior", "staff"]);
        assert!(store
            .enforce("alice", "document", &Action::read(), &TupleScope::unscoped())
            .await
            .unwrap());
        assert_eq!(store.implicit_grants_of("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_staged_mutations_report_changes() {
        let store = PolicyTupleStore::new(TestSource::new(vec![]));
        let mut writer = TestTuples::default();
        let g = grant("editor", Action::update(), TupleScope::unscoped());

        assert!(store.add_grant(&mut writer, g.clone()));
        assert!(!store.add_grant(&mut writer, g.clone()));
        assert!(store.add_grouping(&mut writer, "bob", "editor"));
        assert!(store.remove_grant(&mut writer, &g));
        assert!(!store.remove_grant(&mut writer, &g));
        assert!(store.remove_grouping(&mut writer, "bob", "editor"));
        assert!(writer.staged_tuples().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_and_install_orders_by_revision() {
        let store = PolicyTupleStore::new(TestSource::new(vec![]));
        let newer = store.prepare(5, clerk_tuples()).await.unwrap();
        let older = store.prepare(3, vec![]).await.unwrap();

        assert!(store.install(newer).await);
        assert!(!store.install(older).await);
        assert_eq!(store.revision().await, Some(5));
        assert_eq!(store.tuples_of("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_previous_policy() {
        let source = TestSource::new(clerk_tuples());
        let store = PolicyTupleStore::new(source.clone());
        store.reload().await.unwrap();

        source.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            store.reload().await,
            Err(PolicyError::SourceUnavailable(_))
        ));
        assert!(store.is_loaded().await);
    }

    #[tokio::test]
    async fn test_summary_splits_direct_and_inherited() {
        let mut tuples = clerk_tuples();
        tuples.push(grant("alice", Action::delete(), TupleScope::unscoped()).into());
        let store = PolicyTupleStore::new(TestSource::new(tuples));
        store.reload().await.unwrap();

        let summary = store.summary("alice").await.unwrap();
        assert_eq!(summary.roles, vec!["finance-clerk"]);
        assert_eq!(summary.direct.len(), 1);
        assert_eq!(summary.inherited.len(), 1);
    }
}
