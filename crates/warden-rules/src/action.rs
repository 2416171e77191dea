//! # Actions
//!
//! An action names an operation a rule grants or forbids. Actions are open
//! tokens rather than a closed enum so that rule payloads produced by other
//! systems can carry domain verbs (`publish`, `moderate`, ...) unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An operation that can be performed on a subject.
///
/// Actions are case-insensitive: the token is lower-cased on construction,
/// so `Action::new("READ") == Action::new("read")`.
///
/// Two wildcard tokens match every action:
/// - **manage**: the conventional "any action" grant
/// - **all**: synonym kept for payloads that use it
///
/// # Example
///
/// ```
/// use warden_rules::Action;
///
/// assert_eq!(Action::new("Update"), Action::update());
/// assert!(Action::manage().is_wildcard());
/// assert!(Action::manage().covers(&Action::delete()));
/// assert!(!Action::read().covers(&Action::update()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Action(String);

impl Action {
    /// Token for the "any action" wildcard.
    pub const MANAGE: &'static str = "manage";
    /// Alternate "any action" wildcard token.
    pub const ALL: &'static str = "all";

    /// Create an action from any string token.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    /// The `create` action.
    pub fn create() -> Self {
        Self::new("create")
    }

    /// The `read` action.
    pub fn read() -> Self {
        Self::new("read")
    }

    /// The `update` action.
    pub fn update() -> Self {
        Self::new("update")
    }

    /// The `delete` action.
    pub fn delete() -> Self {
        Self::new("delete")
    }

    /// The `manage` wildcard.
    pub fn manage() -> Self {
        Self::new(Self::MANAGE)
    }

    /// Get the normalized (lower-case) token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this is one of the wildcard tokens (`manage` or `all`).
    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::MANAGE || self.0 == Self::ALL
    }

    /// Check if a rule declared with this action covers `requested`.
    ///
    /// A wildcard covers everything; otherwise the tokens must be equal.
    /// Alias expansion is the engine's concern and is not applied here.
    pub fn covers(&self, requested: &Action) -> bool {
        self.is_wildcard() || self == requested
    }

    /// Check if the token is empty (never valid in a rule).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Action> for String {
    fn from(value: Action) -> Self {
        value.0
    }
}
