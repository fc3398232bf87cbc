//! # Policy Catalog
//!
//! Human-manageable "role has rule" rows kept in lock-step with grant tuples.
//!
//! ## Overview
//!
//! Every catalog mutation stages its tuple changes in the same transaction as
//! the row changes; the engine's save step then compiles the staged tuples and
//! commits both together.
//!
//! ```text
//! create_entries      row created      ─▶ grant added
//! bulk_activate true  row ensured      ─▶ grant added
//! bulk_activate false row kept         ─▶ grant removed   (inactive-but-cataloged)
//! update_scoped_rules row moved/added  ─▶ grant moved/added
//!                     row not desired  ─▶ row and grant removed
//! ```
//!
//! The in-transaction helpers at the bottom of this module are shared with the
//! taxonomy, which runs them as the second half of category and type writes.

use docctl_rbac::{
    normalize_policy, Action, GrantTuple, PermissionToggle, PolicyError, PolicyResult, PolicyTuple, ResourcePolicy,
    RuleGrant, TupleScope, TupleWriter,
};
use docctl_registry::{RoleHasRule, RuleFilter, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

fn default_policy() -> String {
    ResourcePolicy::Document.as_str().to_string()
}

/// One `(role, policy, action)` entry of a scoped rule set.
///
/// Taxonomy payloads carry these; the scope comes from the owning category or
/// document type. Deserialization trims the role and normalizes the policy
/// the same way [`RuleGrant`] does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScopedRulePayload")]
pub struct ScopedRule {
    /// Role holding the rule
    pub role_guard_name: String,

    /// Resource policy, `document` when omitted
    pub rule_policy: String,

    /// Granted action
    pub action: Action,
}

#[derive(Debug, Deserialize)]
struct ScopedRulePayload {
    role_guard_name: String,
    #[serde(default = "default_policy")]
    rule_policy: String,
    action: Action,
}

impl TryFrom<ScopedRulePayload> for ScopedRule {
    type Error = PolicyError;

    fn try_from(payload: ScopedRulePayload) -> Result<Self, Self::Error> {
        ScopedRule::new(&payload.role_guard_name, &payload.rule_policy, payload.action)
    }
}

impl ScopedRule {
    /// Create an entry, trimming the role and normalizing the policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] for a blank or malformed role or
    /// policy name.
    pub fn new(role: &str, policy: &str, action: Action) -> PolicyResult<Self> {
        let role = role.trim();
        if role.is_empty() || role.contains(char::is_whitespace) || role.contains(',') {
            return Err(PolicyError::InvalidRule(format!("invalid role name: {:?}", role)));
        }
        let rule_policy = normalize_policy(policy)
            .ok_or_else(|| PolicyError::InvalidRule(format!("invalid policy name: {:?}", policy)))?;
        Ok(Self {
            role_guard_name: role.to_string(),
            rule_policy,
            action,
        })
    }

    /// Entry on the `document` policy.
    pub fn document(role: impl Into<String>, action: Action) -> Self {
        Self {
            role_guard_name: role.into(),
            rule_policy: default_policy(),
            action,
        }
    }

    /// One entry per action of a rule grant.
    pub fn expand(role: &str, grant: &RuleGrant) -> Vec<Self> {
        grant
            .actions
            .iter()
            .map(|action| Self {
                role_guard_name: role.to_string(),
                rule_policy: grant.policy.clone(),
                action: action.clone(),
            })
            .collect()
    }

    /// Re-run boundary validation on an entry built from its public fields.
    fn normalized(&self) -> EngineResult<Self> {
        Ok(Self::new(&self.role_guard_name, &self.rule_policy, self.action.clone())?)
    }

    fn matches(&self, rule: &RoleHasRule) -> bool {
        rule.role_guard_name == self.role_guard_name
            && rule.rule_policy == self.rule_policy
            && rule.action == self.action
    }
}

/// Changes for a single catalog row. Unset fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleUpdate {
    /// New resource policy
    pub rule_policy: Option<String>,
    /// New action
    pub action: Option<Action>,
    /// New scope
    pub scope: Option<TupleScope>,
}

/// A catalog row and whether its grant tuple is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStatus {
    /// Catalog row
    pub rule: RoleHasRule,
    /// Whether the grant tuple exists
    pub active: bool,
}

/// Outcome of a bulk activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationReport {
    /// Grants added
    pub activated: Vec<GrantTuple>,
    /// Grants removed
    pub deactivated: Vec<GrantTuple>,
    /// Catalog rows created to back new grants
    pub created_rows: usize,
}

/// Outcome of a scoped rule synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedRuleSync {
    /// Rows moved from the old scope
    pub moved: usize,
    /// Rows created under the new scope
    pub created: usize,
    /// Rows removed from the old scope
    pub removed: usize,
}

/// Policy matrix of a role: policy -> action -> active.
pub type PermissionMatrix = BTreeMap<String, BTreeMap<Action, bool>>;

/// Rule catalog operations.
pub struct PolicyCatalog<'a> {
    engine: &'a Engine,
}

impl<'a> PolicyCatalog<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Create unscoped catalog rows and grants for `role`.
    ///
    /// Existing `(role, policy, action)` rows are skipped silently. The role
    /// row is created if missing.
    ///
    /// # Returns
    ///
    /// The rows created by this call.
    #[instrument(skip(self, grants), fields(grants = grants.len()))]
    pub async fn create_entries(&self, actor: &str, role: &str, grants: &[RuleGrant]) -> EngineResult<Vec<RoleHasRule>> {
        self.engine
            .authorize(actor, ResourcePolicy::Rules, Action::create())
            .await?;

        let mut tx = self.engine.database().begin().await;
        self.engine.ensure_role(&mut tx, role)?;
        let entries: Vec<ScopedRule> = grants.iter().flat_map(|g| ScopedRule::expand(role, g)).collect();
        let created = stage_entries(self.engine, &mut tx, &entries, &TupleScope::unscoped())?;
        self.engine.commit(tx).await?;

        info!(role, created = created.len(), "Created catalog entries");
        Ok(created)
    }

    /// Switch unscoped grants of `role` on and off.
    ///
    /// A true flag ensures the catalog row and adds the grant. A false flag
    /// removes only the grant; the catalog row stays.
    #[instrument(skip(self, toggles), fields(toggles = toggles.len()))]
    pub async fn bulk_activate(
        &self,
        actor: &str,
        role: &str,
        toggles: &[PermissionToggle],
    ) -> EngineResult<ActivationReport> {
        self.engine
            .authorize(actor, ResourcePolicy::Rules, Action::update())
            .await?;

        let tuples = self.engine.tuples();
        let scope = TupleScope::unscoped();
        let mut report = ActivationReport::default();

        let mut tx = self.engine.database().begin().await;
        self.engine.ensure_role(&mut tx, role)?;
        for toggle in toggles {
            for action in toggle.allowed() {
                if tx.find_rule(role, &toggle.policy, action, &scope).is_none() {
                    tx.insert_rule(RoleHasRule::new(role, toggle.policy.clone(), action.clone(), scope.clone()))?;
                    report.created_rows += 1;
                }
                let grant = GrantTuple::new(role, toggle.policy.clone(), action.clone(), scope.clone());
                if tuples.add_grant(&mut tx, grant.clone()) {
                    report.activated.push(grant);
                }
            }
            for action in toggle.denied() {
                let grant = GrantTuple::new(role, toggle.policy.clone(), action.clone(), scope.clone());
                if tuples.remove_grant(&mut tx, &grant) {
                    report.deactivated.push(grant);
                }
            }
        }
        self.engine.commit(tx).await?;

        info!(
            role,
            activated = report.activated.len(),
            deactivated = report.deactivated.len(),
            created_rows = report.created_rows,
            "Applied bulk activation"
        );
        Ok(report)
    }

    /// Move the rules of one scope to another and reconcile them with
    /// `desired`.
    ///
    /// After this call no row or grant references `old` (unless `old == new`),
    /// and every desired entry has a row and a grant under `new`.
    #[instrument(skip(self, desired), fields(old = %old, new = %new, desired = desired.len()))]
    pub async fn update_scoped_rules(
        &self,
        actor: &str,
        old: &TupleScope,
        new: &TupleScope,
        desired: &[ScopedRule],
    ) -> EngineResult<ScopedRuleSync> {
        self.engine
            .authorize(actor, ResourcePolicy::Rules, Action::update())
            .await?;

        let mut tx = self.engine.database().begin().await;
        let sync = stage_scoped_rules(self.engine, &mut tx, old, new, desired)?;
        self.engine.commit(tx).await?;
        Ok(sync)
    }

    /// Create a single catalog row and its grant.
    ///
    /// # Errors
    ///
    /// [`EngineError::Conflict`] if the exact row already exists.
    #[instrument(skip(self))]
    pub async fn create_entry(
        &self,
        actor: &str,
        role: &str,
        policy: &str,
        action: Action,
        scope: TupleScope,
    ) -> EngineResult<RoleHasRule> {
        self.engine
            .authorize(actor, ResourcePolicy::Rules, Action::create())
            .await?;
        let grant = RuleGrant::new(policy, [action])?;

        let mut tx = self.engine.database().begin().await;
        self.engine.ensure_role(&mut tx, role)?;
        let mut created = None;
        for tuple in grant.grants_for(role, &scope) {
            let rule = tx.insert_rule(RoleHasRule::from_grant(&tuple))?;
            self.engine.tuples().add_grant(&mut tx, tuple);
            created = Some(rule);
        }
        let rule = created.ok_or_else(|| EngineError::validation("an action is required"))?;
        self.engine.commit(tx).await?;
        Ok(rule)
    }

    /// Change a catalog row, moving its grant with it.
    ///
    /// The grant is re-created under the new identity only if it was live.
    #[instrument(skip(self, update))]
    pub async fn update_entry(&self, actor: &str, uuid: Uuid, update: RuleUpdate) -> EngineResult<RoleHasRule> {
        self.engine
            .authorize(actor, ResourcePolicy::Rules, Action::update())
            .await?;

        let tuples = self.engine.tuples();
        let mut tx = self.engine.database().begin().await;
        let mut rule = tx.rule_by_uuid(uuid)?.clone();
        let was_active = tuples.remove_grant(&mut tx, &rule.grant());

        if let Some(policy) = update.rule_policy {
            rule.rule_policy = normalize_policy(&policy)
                .ok_or_else(|| EngineError::validation(format!("invalid policy name: {:?}", policy)))?;
        }
        if let Some(action) = update.action {
            rule.action = action;
        }
        if let Some(scope) = update.scope {
            rule.set_scope(scope);
        }
        let rule = tx.update_rule(rule)?;
        if was_active {
            tuples.add_grant(&mut tx, rule.grant());
        }
        self.engine.commit(tx).await?;
        Ok(rule)
    }

    /// Delete a catalog row and its grant.
    #[instrument(skip(self))]
    pub async fn delete_entry(&self, actor: &str, uuid: Uuid) -> EngineResult<RoleHasRule> {
        self.engine
            .authorize(actor, ResourcePolicy::Rules, Action::delete())
            .await?;

        let mut tx = self.engine.database().begin().await;
        let id = tx.rule_by_uuid(uuid)?.id;
        let rule = tx.delete_rule(id)?;
        self.engine.tuples().remove_grant(&mut tx, &rule.grant());
        self.engine.commit(tx).await?;
        Ok(rule)
    }

    /// Catalog row by uuid.
    pub async fn get_entry(&self, actor: &str, uuid: Uuid) -> EngineResult<RuleStatus> {
        self.authorize_read(actor).await?;
        let tables = self.engine.database().read().await;
        let rule = tables.rule_by_uuid(uuid)?.clone();
        let active = tables.contains_tuple(&PolicyTuple::Grant(rule.grant()));
        Ok(RuleStatus { rule, active })
    }

    /// Catalog rows passing `filter`.
    pub async fn list_entries(&self, actor: &str, filter: &RuleFilter) -> EngineResult<Vec<RoleHasRule>> {
        self.authorize_read(actor).await?;
        Ok(self.engine.database().read().await.rules(filter))
    }

    /// Catalog rows of `role` with their activation state.
    pub async fn role_rule_summary(&self, actor: &str, role: &str) -> EngineResult<Vec<RuleStatus>> {
        self.authorize_read(actor).await?;
        let tables = self.engine.database().read().await;
        Ok(tables
            .rules(&RuleFilter::for_role(role))
            .into_iter()
            .map(|rule| {
                let active = tables.contains_tuple(&PolicyTuple::Grant(rule.grant()));
                RuleStatus { rule, active }
            })
            .collect())
    }

    /// Unscoped activation matrix of `role` over every cataloged policy and
    /// action.
    pub async fn permission_matrix(&self, actor: &str, role: &str) -> EngineResult<PermissionMatrix> {
        self.authorize_read(actor).await?;
        let tables = self.engine.database().read().await;
        let actions = tables.distinct_actions();
        let scope = TupleScope::unscoped();

        Ok(tables
            .distinct_policies()
            .into_iter()
            .map(|policy| {
                let row = actions
                    .iter()
                    .map(|action| {
                        let grant = GrantTuple::new(role, policy.clone(), action.clone(), scope.clone());
                        (action.clone(), tables.contains_tuple(&PolicyTuple::Grant(grant)))
                    })
                    .collect();
                (policy, row)
            })
            .collect())
    }

    /// Distinct policy names in the catalog.
    pub async fn distinct_policies(&self, actor: &str) -> EngineResult<Vec<String>> {
        self.authorize_read(actor).await?;
        Ok(self.engine.database().read().await.distinct_policies())
    }

    /// Distinct action names in the catalog.
    pub async fn distinct_actions(&self, actor: &str) -> EngineResult<Vec<Action>> {
        self.authorize_read(actor).await?;
        Ok(self.engine.database().read().await.distinct_actions())
    }

    async fn authorize_read(&self, actor: &str) -> EngineResult<()> {
        self.engine
            .authorize(actor, ResourcePolicy::Rules, Action::read())
            .await
    }
}

/// Create a row and grant for every entry not yet cataloged under `scope`.
pub(crate) fn stage_entries(
    engine: &Engine,
    tx: &mut Transaction,
    entries: &[ScopedRule],
    scope: &TupleScope,
) -> EngineResult<Vec<RoleHasRule>> {
    let entries = entries.iter().map(ScopedRule::normalized).collect::<EngineResult<Vec<_>>>()?;
    let mut created = Vec::new();
    for entry in &entries {
        engine.ensure_role(tx, &entry.role_guard_name)?;
        if tx
            .find_rule(&entry.role_guard_name, &entry.rule_policy, &entry.action, scope)
            .is_some()
        {
            debug!(
                role = %entry.role_guard_name,
                policy = %entry.rule_policy,
                action = %entry.action,
                scope = %scope,
                "Skipping existing catalog entry"
            );
            continue;
        }
        let rule = tx.insert_rule(RoleHasRule::new(
            entry.role_guard_name.clone(),
            entry.rule_policy.clone(),
            entry.action.clone(),
            scope.clone(),
        ))?;
        engine.tuples().add_grant(tx, rule.grant());
        created.push(rule);
    }
    Ok(created)
}

/// Reconcile the rows of `old` with `desired`, moving them to `new`.
pub(crate) fn stage_scoped_rules(
    engine: &Engine,
    tx: &mut Transaction,
    old: &TupleScope,
    new: &TupleScope,
    desired: &[ScopedRule],
) -> EngineResult<ScopedRuleSync> {
    let desired = desired.iter().map(ScopedRule::normalized).collect::<EngineResult<Vec<_>>>()?;
    let tuples = engine.tuples();
    let mut remaining = tx.rules(&RuleFilter::in_scope(old.clone()));
    let mut sync = ScopedRuleSync::default();

    for entry in &desired {
        if let Some(idx) = remaining.iter().position(|rule| entry.matches(rule)) {
            let mut rule = remaining.swap_remove(idx);
            tuples.remove_grant(tx, &rule.grant());
            rule.set_scope(new.clone());
            let rule = tx.update_rule(rule)?;
            tuples.add_grant(tx, rule.grant());
            sync.moved += 1;
            continue;
        }

        engine.ensure_role(tx, &entry.role_guard_name)?;
        let existing = tx
            .find_rule(&entry.role_guard_name, &entry.rule_policy, &entry.action, new)
            .cloned();
        let rule = match existing {
            Some(existing) => existing,
            None => {
                sync.created += 1;
                tx.insert_rule(RoleHasRule::new(
                    entry.role_guard_name.clone(),
                    entry.rule_policy.clone(),
                    entry.action.clone(),
                    new.clone(),
                ))?
            }
        };
        tuples.add_grant(tx, rule.grant());
    }

    for rule in remaining {
        tuples.remove_grant(tx, &rule.grant());
        tx.delete_rule(rule.id)?;
        sync.removed += 1;
    }

    info!(
        old = %old,
        new = %new,
        moved = sync.moved,
        created = sync.created,
        removed = sync.removed,
        "Synchronized scoped rules"
    );
    Ok(sync)
}

/// Move every row of `old` to `new`, keeping each grant's activation state.
pub(crate) fn stage_scope_move(
    engine: &Engine,
    tx: &mut Transaction,
    old: &TupleScope,
    new: &TupleScope,
) -> EngineResult<usize> {
    if old == new {
        return Ok(0);
    }
    let tuples = engine.tuples();
    let rules = tx.rules(&RuleFilter::in_scope(old.clone()));
    let moved = rules.len();
    for mut rule in rules {
        let active = tuples.remove_grant(tx, &rule.grant());
        rule.set_scope(new.clone());
        let rule = tx.update_rule(rule)?;
        if active {
            tuples.add_grant(tx, rule.grant());
        }
    }
    if moved > 0 {
        debug!(old = %old, new = %new, moved, "Moved scoped rules");
    }
    Ok(moved)
}
