//! # Subject Types
//!
//! A subject type names the class of entity a rule applies to
//! (e.g. `"Article"`). The tokens `all` and `any` are wildcards that match
//! every subject type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The entity class a rule or query refers to.
///
/// Unlike [`Action`](crate::Action), subject types are case-sensitive: they
/// usually mirror type names in application code.
///
/// # Example
///
/// ```
/// use warden_rules::SubjectType;
///
/// let article = SubjectType::new("Article");
/// assert!(SubjectType::all().covers(&article));
/// assert!(!article.covers(&SubjectType::new("Comment")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectType(String);

impl SubjectType {
    /// Wildcard token matching every subject type.
    pub const ALL: &'static str = "all";
    /// Alternate wildcard token.
    pub const ANY: &'static str = "any";

    /// Create a subject type from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The `all` wildcard.
    pub fn all() -> Self {
        Self(Self::ALL.to_string())
    }

    /// The `any` wildcard.
    pub fn any() -> Self {
        Self(Self::ANY.to_string())
    }

    /// Get the subject type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this is a wildcard (`all` or `any`).
    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::ALL || self.0 == Self::ANY
    }

    /// Check if a rule declared for this subject type covers `requested`.
    ///
    /// A wildcard rule covers every subject. A concrete rule only covers the
    /// same name; in particular a query for `all` is only answered by
    /// wildcard rules.
    pub fn covers(&self, requested: &SubjectType) -> bool {
        self.is_wildcard() || self == requested
    }

    /// Check if the name is empty (never valid in a rule).
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SubjectType {
    fn from(value: String) -> Self {
        Self(value)
    }
}
