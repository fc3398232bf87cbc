//! User-to-role assignments.
//!
//! Grouping tuples are the only record of which user holds which role.

use docctl_rbac::{Action, GroupingTuple, PolicyTuple, ResourcePolicy, TupleWriter};
use tracing::{info, instrument};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// Role assignment operations.
pub struct RoleAssignments<'a> {
    engine: &'a Engine,
}

impl<'a> RoleAssignments<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Bind `user` to `role`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if no role is named `role`
    /// - [`EngineError::Conflict`] if the user already holds the role
    #[instrument(skip(self))]
    pub async fn assign(&self, actor: &str, user: &str, role: &str) -> EngineResult<()> {
        self.engine
            .authorize(actor, ResourcePolicy::Users, Action::update())
            .await?;
        let user = validate_user(user)?;

        let mut tx = self.engine.database().begin().await;
        if tx.roles_named(role).is_empty() {
            return Err(EngineError::NotFound(format!("role {}", role)));
        }
        if !self.engine.tuples().add_grouping(&mut tx, user, role) {
            return Err(EngineError::Conflict(format!("{} already holds role {}", user, role)));
        }
        self.engine.commit(tx).await?;
        info!(user, role, "Assigned role");
        Ok(())
    }

    /// Unbind `user` from `role`.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if the user does not hold the role.
    #[instrument(skip(self))]
    pub async fn revoke(&self, actor: &str, user: &str, role: &str) -> EngineResult<()> {
        self.engine
            .authorize(actor, ResourcePolicy::Users, Action::update())
            .await?;

        let mut tx = self.engine.database().begin().await;
        if !self.engine.tuples().remove_grouping(&mut tx, user, role) {
            return Err(EngineError::NotFound(format!("{} does not hold role {}", user, role)));
        }
        self.engine.commit(tx).await?;
        info!(user, role, "Revoked role");
        Ok(())
    }

    /// Roles held by `user`, resolved transitively.
    pub async fn roles_of(&self, actor: &str, user: &str) -> EngineResult<Vec<String>> {
        self.engine
            .authorize(actor, ResourcePolicy::Users, Action::read())
            .await?;
        Ok(self.engine.tuples().roles_of(user).await?)
    }

    /// Users directly bound to `role`.
    pub async fn users_of(&self, actor: &str, role: &str) -> EngineResult<Vec<String>> {
        self.engine
            .authorize(actor, ResourcePolicy::Users, Action::read())
            .await?;
        let tables = self.engine.database().read().await;
        Ok(tables.members_of(role).map(str::to_string).collect())
    }

    /// Whether `user` directly holds `role` in the committed tables.
    pub async fn holds(&self, user: &str, role: &str) -> bool {
        let grouping = PolicyTuple::Grouping(GroupingTuple::new(user, role));
        self.engine.database().read().await.contains_tuple(&grouping)
    }
}

fn validate_user(user: &str) -> EngineResult<&str> {
    let user = user.trim();
    if user.is_empty() || user.contains(',') {
        return Err(EngineError::validation(format!("invalid user name: {:?}", user)));
    }
    Ok(user)
}
