//! # Actions
//!
//! Defines the action names carried by grant tuples and catalog rows.
//!
//! Unlike a closed enum, the action vocabulary is open: administrators may
//! catalog arbitrary actions, and document reads are authorized against the
//! lowercased name of the document's status (`draft`, `published`, ...).
//! Names are normalized to trimmed lowercase so that `Read` and `read` are the
//! same grant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An action that can be granted on a resource policy.
///
/// Well-known actions:
/// - **create**: Create new resource instances
/// - **read**: View resource data
/// - **update**: Modify existing resource data
/// - **delete**: Remove (soft-delete) resource instances
/// - **manage**: Administer the resource as a whole
///
/// # Example
///
/// ```
/// use docctl_rbac::Action;
///
/// let action = Action::parse(" Read ").unwrap();
/// assert_eq!(action, Action::read());
/// assert_eq!(Action::parse("Published").unwrap().as_str(), "published");
/// assert!(Action::parse("   ").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Action(String);

impl Action {
    /// Create action name.
    pub const CREATE: &'static str = "create";
    /// Read action name.
    pub const READ: &'static str = "read";
    /// Update action name.
    pub const UPDATE: &'static str = "update";
    /// Delete action name.
    pub const DELETE: &'static str = "delete";
    /// Manage action name.
    pub const MANAGE: &'static str = "manage";

    /// Parse an action name, normalizing case and surrounding whitespace.
    ///
    /// # Returns
    ///
    /// `None` when the name is empty, contains whitespace or commas.
    pub fn parse(s: &str) -> Option<Self> {
        let name = s.trim().to_lowercase();
        if name.is_empty() || name.contains(char::is_whitespace) || name.contains(',') {
            return None;
        }
        Some(Action(name))
    }

    /// Action name derived from a document status (e.g. `"Published"` -> `published`).
    ///
    /// Multi-word status names are joined with `-`.
    pub fn from_status(status_name: &str) -> Option<Self> {
        let joined = status_name.split_whitespace().collect::<Vec<_>>().join("-");
        Self::parse(&joined)
    }

    /// The `create` action.
    pub fn create() -> Self {
        Action(Self::CREATE.to_string())
    }

    /// The `read` action.
    pub fn read() -> Self {
        Action(Self::READ.to_string())
    }

    /// The `update` action.
    pub fn update() -> Self {
        Action(Self::UPDATE.to_string())
    }

    /// The `delete` action.
    pub fn delete() -> Self {
        Action(Self::DELETE.to_string())
    }

    /// The `manage` action.
    pub fn manage() -> Self {
        Action(Self::MANAGE.to_string())
    }

    /// The four CRUD actions, in matrix column order.
    pub fn crud() -> Vec<Self> {
        vec![Self::create(), Self::read(), Self::update(), Self::delete()]
    }

    /// Get the normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the well-known actions.
    pub fn is_well_known(&self) -> bool {
        matches!(
            self.0.as_str(),
            Self::CREATE | Self::READ | Self::UPDATE | Self::DELETE | Self::MANAGE
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Action {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Action::parse(&value).ok_or_else(|| format!("invalid action name: {:?}", value))
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.0
    }
}
