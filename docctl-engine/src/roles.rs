//! Role registry.
//!
//! Roles are unique by `(name, guard_name)`. Creating or deleting a role does
//! not touch tuples; renaming one rewrites every catalog row and tuple that
//! names it, in the same transaction.

use docctl_rbac::{Action, GroupingTuple, PolicyTuple, ResourcePolicy, TupleWriter};
use docctl_registry::{Role, RoleHasRule, RuleFilter};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// A role with its catalog rows and stored tuples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDetail {
    /// The role
    pub role: Role,
    /// Catalog rows held by the role
    pub rules: Vec<RoleHasRule>,
    /// Grant tuples held by the role and grouping tuples naming it on either side
    pub tuples: Vec<PolicyTuple>,
}

/// Role registry operations.
pub struct RoleRegistry<'a> {
    engine: &'a Engine,
}

impl<'a> RoleRegistry<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Create a role under the configured guard.
    ///
    /// # Errors
    ///
    /// [`EngineError::Conflict`] if `(name, guard)` already exists.
    #[instrument(skip(self))]
    pub async fn create(&self, actor: &str, name: &str) -> EngineResult<Role> {
        self.engine
            .authorize(actor, ResourcePolicy::Roles, Action::create())
            .await?;
        validate_role_name(name)?;

        let mut tx = self.engine.database().begin().await;
        let role = tx.insert_role(Role::new(name.trim(), self.engine.config().guard_name.clone()))?;
        self.engine.commit(tx).await?;
        info!(role = %role.name, guard = %role.guard_name, "Created role");
        Ok(role)
    }

    /// Rename a role, carrying its catalog rows and tuples along.
    #[instrument(skip(self))]
    pub async fn update(&self, actor: &str, uuid: Uuid, name: &str) -> EngineResult<Role> {
        self.engine
            .authorize(actor, ResourcePolicy::Roles, Action::update())
            .await?;
        validate_role_name(name)?;
        let name = name.trim();

        let mut tx = self.engine.database().begin().await;
        let mut role = tx.role_by_uuid(uuid)?.clone();
        let old_name = role.name.clone();
        if old_name == name {
            return Ok(role);
        }
        role.name = name.to_string();
        let role = tx.update_role(role)?;

        let mut moved_rules = 0;
        for mut rule in tx.rules(&RuleFilter::for_role(old_name.clone())) {
            rule.role_guard_name = role.name.clone();
            tx.update_rule(rule)?;
            moved_rules += 1;
        }

        let mut moved_tuples = 0;
        for tuple in tx.staged_tuples() {
            let renamed = match &tuple {
                PolicyTuple::Grant(grant) if grant.subject == old_name => {
                    let mut grant = grant.clone();
                    grant.subject = role.name.clone();
                    PolicyTuple::Grant(grant)
                }
                PolicyTuple::Grouping(grouping) if grouping.role == old_name || grouping.user == old_name => {
                    let rename = |name: &String| {
                        if *name == old_name {
                            role.name.clone()
                        } else {
                            name.clone()
                        }
                    };
                    PolicyTuple::Grouping(GroupingTuple::new(rename(&grouping.user), rename(&grouping.role)))
                }
                _ => continue,
            };
            tx.delete_tuple(&tuple);
            tx.insert_tuple(renamed);
            moved_tuples += 1;
        }

        self.engine.commit(tx).await?;
        info!(
            from = %old_name,
            to = %role.name,
            rules = moved_rules,
            tuples = moved_tuples,
            "Renamed role"
        );
        Ok(role)
    }

    /// Delete a role row.
    ///
    /// Tuples naming the role are kept and stay enforced until removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, actor: &str, uuid: Uuid) -> EngineResult<Role> {
        self.engine
            .authorize(actor, ResourcePolicy::Roles, Action::delete())
            .await?;

        let mut tx = self.engine.database().begin().await;
        let id = tx.role_by_uuid(uuid)?.id;
        let role = tx.delete_role(id)?;
        let orphaned = tx.grants_of(&role.name).count() + tx.members_of(&role.name).count();
        self.engine.commit(tx).await?;

        if orphaned > 0 {
            warn!(
                role = %role.name,
                orphaned_tuples = orphaned,
                "Deleted role still has tuples; they remain enforced"
            );
        }
        info!(role = %role.name, "Deleted role");
        Ok(role)
    }

    /// Role with its catalog rows and tuples.
    pub async fn get(&self, actor: &str, uuid: Uuid) -> EngineResult<RoleDetail> {
        self.engine
            .authorize(actor, ResourcePolicy::Roles, Action::read())
            .await?;

        let tables = self.engine.database().read().await;
        let role = tables.role_by_uuid(uuid)?.clone();
        let rules = tables.rules(&RuleFilter::for_role(role.name.clone()));
        let tuples = tables
            .tuples()
            .filter(|t| match t {
                PolicyTuple::Grant(g) => g.subject == role.name,
                PolicyTuple::Grouping(g) => g.role == role.name || g.user == role.name,
            })
            .cloned()
            .collect();
        Ok(RoleDetail { role, rules, tuples })
    }

    /// Roles, optionally filtered by name.
    pub async fn list(&self, actor: &str, search: Option<&str>) -> EngineResult<Vec<Role>> {
        self.engine
            .authorize(actor, ResourcePolicy::Roles, Action::read())
            .await?;
        Ok(self.engine.database().read().await.list_roles(search))
    }
}

fn validate_role_name(name: &str) -> EngineResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::validation("role name is required"));
    }
    if name.contains(char::is_whitespace) || name.contains(',') {
        return Err(EngineError::validation(format!(
            "role name {:?} may not contain whitespace or commas",
            name
        )));
    }
    Ok(())
}
