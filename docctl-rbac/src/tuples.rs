//! # Policy Tuples
//!
//! Enforcement records and their relational row shape.
//!
//! ```text
//! ptype | v0        | v1         | v2     | v3   | v4   | v5
//! ------+-----------+------------+--------+------+------+-----
//! p     | role      | policy     | action | cat  | type | none
//! g     | username  | role       | none   | none | none | none
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::actions::Action;
use crate::error::{PolicyError, PolicyResult};
use crate::scope::{Scope, TupleScope, NONE_SENTINEL};

/// Row type of grant tuples.
pub const GRANT_PTYPE: &str = "p";

/// Row type of grouping tuples.
pub const GROUPING_PTYPE: &str = "g";

/// "subject may perform action on resource within scope".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantTuple {
    /// Role guard name (or user) holding the grant.
    pub subject: String,
    /// Resource policy name.
    pub resource: String,
    /// Granted action.
    pub action: Action,
    /// Category/type scope.
    #[serde(default)]
    pub scope: TupleScope,
}

impl GrantTuple {
    /// Create a grant tuple.
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: Action,
        scope: TupleScope,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action,
            scope,
        }
    }

    /// Positional rule values handed to the enforcer (`v0..v5`).
    pub fn to_rule(&self) -> Vec<String> {
        vec![
            self.subject.clone(),
            self.resource.clone(),
            self.action.to_string(),
            self.scope.category.to_string(),
            self.scope.doc_type.to_string(),
            NONE_SENTINEL.to_string(),
        ]
    }
}

/// "user holds role".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupingTuple {
    /// Username.
    pub user: String,
    /// Role guard name.
    pub role: String,
}

impl GroupingTuple {
    /// Create a grouping tuple.
    pub fn new(user: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            role: role.into(),
        }
    }

    /// Positional rule values handed to the enforcer.
    pub fn to_rule(&self) -> Vec<String> {
        vec![self.user.clone(), self.role.clone()]
    }
}

/// Either kind of enforcement tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyTuple {
    /// Grant tuple (`p`).
    Grant(GrantTuple),
    /// Grouping tuple (`g`).
    Grouping(GroupingTuple),
}

impl PolicyTuple {
    /// Row type (`p` or `g`).
    pub fn ptype(&self) -> &'static str {
        match self {
            PolicyTuple::Grant(_) => GRANT_PTYPE,
            PolicyTuple::Grouping(_) => GROUPING_PTYPE,
        }
    }

    /// First position: the grant subject or the grouped user.
    pub fn subject(&self) -> &str {
        match self {
            PolicyTuple::Grant(grant) => &grant.subject,
            PolicyTuple::Grouping(grouping) => &grouping.user,
        }
    }

    /// Borrow as a grant tuple.
    pub fn as_grant(&self) -> Option<&GrantTuple> {
        match self {
            PolicyTuple::Grant(grant) => Some(grant),
            PolicyTuple::Grouping(_) => None,
        }
    }

    /// Borrow as a grouping tuple.
    pub fn as_grouping(&self) -> Option<&GroupingTuple> {
        match self {
            PolicyTuple::Grant(_) => None,
            PolicyTuple::Grouping(grouping) => Some(grouping),
        }
    }

    /// Relational row with unused positions set to `"none"`.
    pub fn to_row(&self) -> PolicyRow {
        match self {
            PolicyTuple::Grant(grant) => PolicyRow::new(GRANT_PTYPE, &grant.to_rule()),
            PolicyTuple::Grouping(grouping) => PolicyRow::new(GROUPING_PTYPE, &grouping.to_rule()),
        }
    }

    /// Parse a relational row.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidTuple`] for unknown row types, blank
    /// subjects, unparsable actions or non-sentinel values in unused positions.
    pub fn from_row(row: &PolicyRow) -> PolicyResult<Self> {
        let invalid = |reason: &str| PolicyError::InvalidTuple(format!("{} ({})", reason, row));
        match row.ptype.as_str() {
            GRANT_PTYPE => {
                if row.v0.trim().is_empty() || row.v1.trim().is_empty() {
                    return Err(invalid("grant subject and resource are required"));
                }
                if row.v5 != NONE_SENTINEL {
                    return Err(invalid("extra position must be none"));
                }
                let action = Action::parse(&row.v2).ok_or_else(|| invalid("invalid action"))?;
                Ok(PolicyTuple::Grant(GrantTuple::new(
                    row.v0.clone(),
                    row.v1.clone(),
                    action,
                    TupleScope::document_type(Scope::parse(&row.v3), Scope::parse(&row.v4)),
                )))
            }
            GROUPING_PTYPE => {
                if row.v0.trim().is_empty() || row.v1.trim().is_empty() {
                    return Err(invalid("grouping user and role are required"));
                }
                let unused = [&row.v2, &row.v3, &row.v4, &row.v5];
                if unused.iter().any(|v| v.as_str() != NONE_SENTINEL) {
                    return Err(invalid("grouping tuples use two positions"));
                }
                Ok(PolicyTuple::Grouping(GroupingTuple::new(
                    row.v0.clone(),
                    row.v1.clone(),
                )))
            }
            other => Err(invalid(&format!("unknown ptype {:?}", other))),
        }
    }
}

impl From<GrantTuple> for PolicyTuple {
    fn from(grant: GrantTuple) -> Self {
        PolicyTuple::Grant(grant)
    }
}

impl From<GroupingTuple> for PolicyTuple {
    fn from(grouping: GroupingTuple) -> Self {
        PolicyTuple::Grouping(grouping)
    }
}

impl fmt::Display for PolicyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_row().fmt(f)
    }
}

/// Relational tuple row `(ptype, v0..v5)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRow {
    /// Row type.
    pub ptype: String,
    /// Position 0.
    pub v0: String,
    /// Position 1.
    pub v1: String,
    /// Position 2.
    pub v2: String,
    /// Position 3.
    pub v3: String,
    /// Position 4.
    pub v4: String,
    /// Position 5.
    pub v5: String,
}

impl PolicyRow {
    /// Build a row, padding missing positions with `"none"`.
    pub fn new(ptype: &str, values: &[String]) -> Self {
        let at = |i: usize| {
            values
                .get(i)
                .cloned()
                .unwrap_or_else(|| NONE_SENTINEL.to_string())
        };
        Self {
            ptype: ptype.to_string(),
            v0: at(0),
            v1: at(1),
            v2: at(2),
            v3: at(3),
            v4: at(4),
            v5: at(5),
        }
    }
}

impl fmt::Display for PolicyRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}, {}, {}",
            self.ptype, self.v0, self.v1, self.v2, self.v3, self.v4, self.v5
        )
    }
}
