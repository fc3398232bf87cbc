//! Rule catalog domain model
//!
//! A [`RoleHasRule`] row is the human-manageable mirror of a grant tuple:
//! "role X may perform action on resource policy, optionally scoped to a
//! category/type". At most one row exists per
//! `(role_guard_name, rule_policy, action, category, type)`.

use chrono::{DateTime, Utc};
use docctl_rbac::{Action, GrantTuple, Scope, TupleScope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalog entry.
///
/// # Examples
///
/// ```
/// use docctl_rbac::{Action, TupleScope};
/// use docctl_registry::RoleHasRule;
///
/// let rule = RoleHasRule::new(
///     "finance-clerk",
///     "document",
///     Action::read(),
///     TupleScope::document_type("FIN", "INV"),
/// );
/// let grant = rule.grant();
/// assert_eq!(grant.subject, "finance-clerk");
/// assert_eq!(grant.scope, rule.scope());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleHasRule {
    /// Row id, assigned on insert
    pub id: i64,

    /// Stable external identifier
    pub uuid: Uuid,

    /// Name of the role holding the rule
    pub role_guard_name: String,

    /// Resource policy name
    pub rule_policy: String,

    /// Granted action
    pub action: Action,

    /// Category prefix scope
    pub category: Scope,

    /// Document type prefix scope
    #[serde(rename = "type")]
    pub doc_type: Scope,

    /// When the rule was created
    pub created_at: DateTime<Utc>,

    /// When the rule was last updated
    pub updated_at: DateTime<Utc>,
}

impl RoleHasRule {
    /// Creates a new, not yet persisted catalog row.
    pub fn new(
        role_guard_name: impl Into<String>,
        rule_policy: impl Into<String>,
        action: Action,
        scope: TupleScope,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            uuid: Uuid::now_v7(),
            role_guard_name: role_guard_name.into(),
            rule_policy: rule_policy.into(),
            action,
            category: scope.category,
            doc_type: scope.doc_type,
            created_at: now,
            updated_at: now,
        }
    }

    /// Catalog row mirroring a grant tuple.
    pub fn from_grant(grant: &GrantTuple) -> Self {
        Self::new(
            grant.subject.clone(),
            grant.resource.clone(),
            grant.action.clone(),
            grant.scope.clone(),
        )
    }

    /// Scope of the row.
    pub fn scope(&self) -> TupleScope {
        TupleScope {
            category: self.category.clone(),
            doc_type: self.doc_type.clone(),
        }
    }

    /// Move the row to another scope.
    pub fn set_scope(&mut self, scope: TupleScope) {
        self.category = scope.category;
        self.doc_type = scope.doc_type;
        self.updated_at = Utc::now();
    }

    /// The grant tuple this row mirrors.
    pub fn grant(&self) -> GrantTuple {
        GrantTuple::new(
            self.role_guard_name.clone(),
            self.rule_policy.clone(),
            self.action.clone(),
            self.scope(),
        )
    }

    /// Whether the row has the given full identity.
    pub fn identifies(&self, role: &str, policy: &str, action: &Action, scope: &TupleScope) -> bool {
        self.role_guard_name == role
            && self.rule_policy == policy
            && &self.action == action
            && self.category == scope.category
            && self.doc_type == scope.doc_type
    }
}

/// Filter for catalog queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFilter {
    /// Role name
    pub role: Option<String>,
    /// Resource policy
    pub policy: Option<String>,
    /// Action
    pub action: Option<Action>,
    /// Exact scope
    pub scope: Option<TupleScope>,
}

impl RuleFilter {
    /// Filter on a role.
    pub fn for_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::default()
        }
    }

    /// Filter on an exact scope.
    pub fn in_scope(scope: TupleScope) -> Self {
        Self {
            scope: Some(scope),
            ..Self::default()
        }
    }

    /// Also filter on a policy.
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// Whether a row passes the filter.
    pub fn matches(&self, rule: &RoleHasRule) -> bool {
        self.role.as_ref().map_or(true, |r| &rule.role_guard_name == r)
            && self.policy.as_ref().map_or(true, |p| &rule.rule_policy == p)
            && self.action.as_ref().map_or(true, |a| &rule.action == a)
            && self
                .scope
                .as_ref()
                .map_or(true, |s| rule.category == s.category && rule.doc_type == s.doc_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clerk_rule() -> RoleHasRule {
        RoleHasRule::new(
            "finance-clerk",
            "document",
            Action::read(),
            TupleScope::document_type("FIN", "INV"),
        )
    }

    #[test]
    fn test_rule_mirrors_grant() {
        let rule = clerk_rule();
        let back = RoleHasRule::from_grant(&rule.grant());
        assert!(back.identifies(
            "finance-clerk",
            "document",
            &Action::read(),
            &TupleScope::document_type("FIN", "INV")
        ));
    }

    #[test]
    fn test_set_scope() {
        let mut rule = clerk_rule();
        rule.set_scope(TupleScope::document_type("FIN", "INVX"));
        assert_eq!(rule.doc_type, Scope::Key("INVX".into()));
        assert_eq!(rule.grant().scope, TupleScope::document_type("FIN", "INVX"));
    }

    #[test]
    fn test_filter() {
        let rule = clerk_rule();
        assert!(RuleFilter::default().matches(&rule));
        assert!(RuleFilter::for_role("finance-clerk").with_policy("document").matches(&rule));
        assert!(!RuleFilter::for_role("admin").matches(&rule));
        assert!(!RuleFilter::in_scope(TupleScope::category("FIN")).matches(&rule));
    }
}
