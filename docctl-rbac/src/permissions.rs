//! # Rule Payloads
//!
//! Typed rule payloads validated at the boundary.
//!
//! Rule authoring requests carry a policy name plus the actions to grant. Both
//! list form (`{"policy": "document", "actions": ["read"]}`) and toggle form
//! (`{"rule_policy": "document", "action": {"read": true, "update": false}}`)
//! are accepted; toggles set to `false` are dropped from a [`RuleGrant`] but
//! kept by a [`PermissionToggle`], where they mean "deactivate".

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::actions::Action;
use crate::error::{PolicyError, PolicyResult};
use crate::resources::normalize_policy;
use crate::scope::TupleScope;
use crate::tuples::GrantTuple;

/// A policy with the set of actions to grant on it.
///
/// # Example
///
/// ```
/// use docctl_rbac::{Action, RuleGrant};
///
/// let rule: RuleGrant = serde_json::from_str(
///     r#"{"rule_policy": "document", "action": {"read": true, "delete": false}}"#,
/// ).unwrap();
/// assert_eq!(rule.policy, "document");
/// assert!(rule.actions.contains(&Action::read()));
/// assert_eq!(rule.actions.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RulePayload")]
pub struct RuleGrant {
    /// Resource policy name.
    pub policy: String,
    /// Actions granted.
    pub actions: BTreeSet<Action>,
}

impl RuleGrant {
    /// Create a rule grant, normalizing the policy name.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] for a blank or malformed policy.
    pub fn new<I>(policy: &str, actions: I) -> PolicyResult<Self>
    where
        I: IntoIterator<Item = Action>,
    {
        let policy = normalize_policy(policy)
            .ok_or_else(|| PolicyError::InvalidRule(format!("invalid policy name: {:?}", policy)))?;
        Ok(Self {
            policy,
            actions: actions.into_iter().collect(),
        })
    }

    /// Parse action names and build a rule grant.
    pub fn parse(policy: &str, actions: &[&str]) -> PolicyResult<Self> {
        let parsed = actions
            .iter()
            .map(|name| parse_action(name))
            .collect::<PolicyResult<Vec<_>>>()?;
        Self::new(policy, parsed)
    }

    /// Grant tuples this rule produces for `subject` under `scope`.
    pub fn grants_for(&self, subject: &str, scope: &TupleScope) -> Vec<GrantTuple> {
        self.actions
            .iter()
            .map(|action| GrantTuple::new(subject, self.policy.clone(), action.clone(), scope.clone()))
            .collect()
    }
}

/// A policy with per-action activation flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RulePayload")]
pub struct PermissionToggle {
    /// Resource policy name.
    pub policy: String,
    /// Action name to "allowed" flag.
    pub actions: BTreeMap<Action, bool>,
}

impl PermissionToggle {
    /// Create a toggle set, normalizing the policy name.
    pub fn new<I>(policy: &str, actions: I) -> PolicyResult<Self>
    where
        I: IntoIterator<Item = (Action, bool)>,
    {
        let policy = normalize_policy(policy)
            .ok_or_else(|| PolicyError::InvalidRule(format!("invalid policy name: {:?}", policy)))?;
        Ok(Self {
            policy,
            actions: actions.into_iter().collect(),
        })
    }

    /// Actions switched on.
    pub fn allowed(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|(_, on)| **on).map(|(a, _)| a)
    }

    /// Actions switched off.
    pub fn denied(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|(_, on)| !**on).map(|(a, _)| a)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActionSelection {
    List(Vec<String>),
    Toggles(BTreeMap<String, bool>),
}

/// Wire form shared by [`RuleGrant`] and [`PermissionToggle`].
#[derive(Debug, Deserialize)]
pub struct RulePayload {
    #[serde(alias = "rule_policy", alias = "rulePolicy")]
    policy: String,
    #[serde(alias = "action")]
    actions: ActionSelection,
}

impl RulePayload {
    fn toggles(self) -> PolicyResult<(String, Vec<(Action, bool)>)> {
        let pairs = match self.actions {
            ActionSelection::List(names) => names
                .iter()
                .map(|name| parse_action(name).map(|a| (a, true)))
                .collect::<PolicyResult<Vec<_>>>()?,
            ActionSelection::Toggles(map) => map
                .iter()
                .map(|(name, on)| parse_action(name).map(|a| (a, *on)))
                .collect::<PolicyResult<Vec<_>>>()?,
        };
        Ok((self.policy, pairs))
    }
}

impl TryFrom<RulePayload> for RuleGrant {
    type Error = PolicyError;

    fn try_from(payload: RulePayload) -> Result<Self, Self::Error> {
        let (policy, pairs) = payload.toggles()?;
        RuleGrant::new(&policy, pairs.into_iter().filter(|(_, on)| *on).map(|(a, _)| a))
    }
}

impl TryFrom<RulePayload> for PermissionToggle {
    type Error = PolicyError;

    fn try_from(payload: RulePayload) -> Result<Self, Self::Error> {
        let (policy, pairs) = payload.toggles()?;
        PermissionToggle::new(&policy, pairs)
    }
}

fn parse_action(name: &str) -> PolicyResult<Action> {
    Action::parse(name).ok_or_else(|| PolicyError::InvalidRule(format!("invalid action name: {:?}", name)))
}

/// Login-time permission summary for a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSummary {
    /// Roles bound to the subject, transitively.
    pub roles: Vec<String>,
    /// Grants held directly by the subject.
    pub direct: Vec<GrantTuple>,
    /// Grants inherited through roles.
    pub inherited: Vec<GrantTuple>,
}

impl PermissionSummary {
    /// Whether any direct or inherited grant matches exactly.
    ///
    /// This is a presentation helper; authorization decisions go through the
    /// enforcer.
    pub fn allows(&self, resource: &str, action: &Action, scope: &TupleScope) -> bool {
        self.direct
            .iter()
            .chain(self.inherited.iter())
            .any(|g| g.resource == resource && &g.action == action && &g.scope == scope)
    }

    /// Distinct `resource:action` labels, sorted.
    pub fn labels(&self) -> Vec<String> {
        let labels: BTreeSet<String> = self
            .direct
            .iter()
            .chain(self.inherited.iter())
            .map(|g| format!("{}:{}", g.resource, g.action))
            .collect();
        labels.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_grant_list_form() {
        let rule: RuleGrant =
            serde_json::from_str(r#"{"policy": "Document", "actions": ["read", "Update"]}"#).unwrap();
        assert_eq!(rule.policy, "document");
        assert_eq!(rule.actions.len(), 2);
        assert!(rule.actions.contains(&Action::update()));
    }

    #[test]
    fn test_rule_grant_rejects_bad_payloads() {
        assert!(serde_json::from_str::<RuleGrant>(r#"{"policy": "", "actions": ["read"]}"#).is_err());
        assert!(serde_json::from_str::<RuleGrant>(r#"{"policy": "document", "actions": ["two words"]}"#).is_err());
        assert!(serde_json::from_str::<RuleGrant>(r#"{"policy": "document", "actions": 3}"#).is_err());
    }

    #[test]
    fn test_toggle_keeps_false_entries() {
        let toggle: PermissionToggle = serde_json::from_str(
            r#"{"rule_policy": "rules", "action": {"create": true, "delete": false}}"#,
        )
        .unwrap();
        assert_eq!(toggle.allowed().collect::<Vec<_>>(), vec![&Action::create()]);
        assert_eq!(toggle.denied().collect::<Vec<_>>(), vec![&Action::delete()]);
    }

    #[test]
    fn test_grants_for_scope() {
        let rule = RuleGrant::parse("document", &["read", "update"]).unwrap();
        let scope = TupleScope::document_type("FIN", "INV");
        let grants = rule.grants_for("finance-clerk", &scope);
        assert_eq!(grants.len(), 2);
        assert!(grants.iter().all(|g| g.scope == scope && g.subject == "finance-clerk"));
    }

    #[test]
    fn test_summary_allows_is_exact() {
        let summary = PermissionSummary {
            roles: vec!["clerk".into()],
            direct: vec![],
            inherited: vec![GrantTuple::new(
                "clerk",
                "document",
                Action::read(),
                TupleScope::unscoped(),
            )],
        };
        assert!(summary.allows("document", &Action::read(), &TupleScope::unscoped()));
        assert!(!summary.allows("document", &Action::read(), &TupleScope::category("FIN")));
        assert_eq!(summary.labels(), vec!["document:read".to_string()]);
    }
}
