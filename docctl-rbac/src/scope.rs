//! # Scope
//!
//! The `(category, type)` pair that narrows a grant to a taxonomy subtree.
//!
//! Unused tuple positions are stored as the literal string `"none"`. Here that
//! sentinel is an explicit [`Scope::None`] variant, and matching is exact:
//! `None` only ever matches `None`, never acts as a wildcard.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal stored in unused tuple positions.
pub const NONE_SENTINEL: &str = "none";

/// One scope dimension: unscoped, or keyed by a taxonomy prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Scope {
    /// Unscoped (stored as `"none"`).
    #[default]
    None,
    /// Scoped to a category or type prefix.
    Key(String),
}

impl Scope {
    /// Build a scope from a prefix; blank input and the sentinel map to `None`.
    ///
    /// # Example
    ///
    /// ```
    /// use docctl_rbac::Scope;
    ///
    /// assert_eq!(Scope::parse("FIN"), Scope::Key("FIN".into()));
    /// assert_eq!(Scope::parse("none"), Scope::None);
    /// assert_eq!(Scope::parse(""), Scope::None);
    /// ```
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NONE_SENTINEL) {
            Scope::None
        } else {
            Scope::Key(trimmed.to_string())
        }
    }

    /// Build a scope from an optional prefix.
    pub fn from_option(s: Option<&str>) -> Self {
        s.map(Self::parse).unwrap_or_default()
    }

    /// Tuple representation.
    pub fn as_str(&self) -> &str {
        match self {
            Scope::None => NONE_SENTINEL,
            Scope::Key(key) => key,
        }
    }

    /// Prefix if scoped.
    pub fn key(&self) -> Option<&str> {
        match self {
            Scope::None => None,
            Scope::Key(key) => Some(key),
        }
    }

    /// Whether this dimension is unscoped.
    pub fn is_none(&self) -> bool {
        matches!(self, Scope::None)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Option<String>> for Scope {
    fn from(value: Option<String>) -> Self {
        Scope::from_option(value.as_deref())
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.as_str().to_string()
    }
}

impl From<&str> for Scope {
    fn from(value: &str) -> Self {
        Scope::parse(value)
    }
}

/// Category and type scope of a grant or request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TupleScope {
    /// Category prefix scope.
    #[serde(default)]
    pub category: Scope,
    /// Document type prefix scope.
    #[serde(default, rename = "type")]
    pub doc_type: Scope,
}

impl TupleScope {
    /// Unscoped on both dimensions.
    pub fn unscoped() -> Self {
        Self::default()
    }

    /// Scoped to a category only.
    pub fn category(category: impl Into<Scope>) -> Self {
        Self {
            category: category.into(),
            doc_type: Scope::None,
        }
    }

    /// Scoped to a category and a type beneath it.
    pub fn document_type(category: impl Into<Scope>, doc_type: impl Into<Scope>) -> Self {
        Self {
            category: category.into(),
            doc_type: doc_type.into(),
        }
    }

    /// Whether both dimensions are unscoped.
    pub fn is_unscoped(&self) -> bool {
        self.category.is_none() && self.doc_type.is_none()
    }
}

impl fmt::Display for TupleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.doc_type)
    }
}
