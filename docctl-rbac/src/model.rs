//! Embedded Casbin model.
//!
//! Every position is matched by exact equality, so the `"none"` sentinel only
//! matches itself. Role inheritance is resolved through `g(r.sub, p.sub)`.

use casbin::DefaultModel;

use crate::error::{PolicyError, PolicyResult};

/// Request/policy grammar: `sub, obj, act, cat, typ, ext`.
pub const MODEL_CONF: &str = include_str!("../policy/rbac_model.conf");

/// Parse the embedded model.
pub async fn load_model() -> PolicyResult<DefaultModel> {
    DefaultModel::from_str(MODEL_CONF)
        .await
        .map_err(|e| PolicyError::Model(e.to_string()))
}
