//! # Access Decisions
//!
//! "Can subject S perform action A on resource R within scope (category, type)?"
//!
//! [`AccessDecisionService`] wraps a [`PolicyEnforcer`] and is fail-closed: an
//! enforcement error is logged and reported as a denial, never as a grant.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::actions::Action;
use crate::error::PolicyResult;
use crate::resources::ResourcePolicy;
use crate::scope::TupleScope;
use crate::store::PolicyTupleStore;

/// A single authorization question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Verified subject identifier (username).
    pub subject: String,
    /// Resource policy name.
    pub resource: String,
    /// Requested action.
    pub action: Action,
    /// Category/type scope of the target.
    #[serde(default)]
    pub scope: TupleScope,
}

impl AccessRequest {
    /// Unscoped request.
    pub fn new(subject: impl Into<String>, resource: impl Into<String>, action: Action) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action,
            scope: TupleScope::unscoped(),
        }
    }

    /// Unscoped request against an engine-guarded resource.
    pub fn for_resource(subject: impl Into<String>, resource: ResourcePolicy, action: Action) -> Self {
        Self::new(subject, resource.as_str(), action)
    }

    /// Narrow the request to a scope.
    pub fn with_scope(mut self, scope: TupleScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Outcome of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A matching grant exists.
    Allow,
    /// No matching grant exists.
    Deny,
    /// The enforcer failed; treated as a denial.
    Error(String),
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Anything that can answer an [`AccessRequest`].
#[async_trait]
pub trait PolicyEnforcer: Send + Sync {
    /// Evaluate a request. Errors mean "unknown", not "denied".
    async fn enforce(&self, request: &AccessRequest) -> PolicyResult<bool>;
}

#[async_trait]
impl PolicyEnforcer for PolicyTupleStore {
    async fn enforce(&self, request: &AccessRequest) -> PolicyResult<bool> {
        PolicyTupleStore::enforce(
            self,
            &request.subject,
            &request.resource,
            &request.action,
            &request.scope,
        )
        .await
    }
}

/// Fail-closed access checks.
#[derive(Clone)]
pub struct AccessDecisionService {
    enforcer: Arc<dyn PolicyEnforcer>,
}

impl AccessDecisionService {
    /// Create a decision service over an enforcer.
    pub fn new(enforcer: Arc<dyn PolicyEnforcer>) -> Self {
        Self { enforcer }
    }

    /// Evaluate and classify a request.
    pub async fn evaluate(&self, request: &AccessRequest) -> Decision {
        match self.enforcer.enforce(request).await {
            Ok(true) => Decision::Allow,
            Ok(false) => Decision::Deny,
            Err(e) => Decision::Error(e.to_string()),
        }
    }

    /// `true` only when a grant matches. Enforcer errors deny.
    pub async fn check_request(&self, request: &AccessRequest) -> bool {
        match self.evaluate(request).await {
            Decision::Allow => true,
            Decision::Deny => {
                debug!(
                    subject = %request.subject,
                    resource = %request.resource,
                    action = %request.action,
                    scope = %request.scope,
                    "Access denied"
                );
                false
            }
            Decision::Error(error) => {
                warn!(
                    subject = %request.subject,
                    resource = %request.resource,
                    action = %request.action,
                    scope = %request.scope,
                    error = %error,
                    "Enforcement failed, denying access"
                );
                false
            }
        }
    }

    /// Check `(subject, resource, action, category, type)`.
    pub async fn check(&self, subject: &str, resource: &str, action: &Action, scope: &TupleScope) -> bool {
        let request = AccessRequest::new(subject, resource, action.clone()).with_scope(scope.clone());
        self.check_request(&request).await
    }
}

impl std::fmt::Debug for AccessDecisionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessDecisionService").finish_non_exhaustive()
    }
}
