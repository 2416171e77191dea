//! # Rules
//!
//! A rule is the atomic permission statement: it grants (or, when
//! inverted, forbids) an action on a subject type, optionally only when
//! conditions hold and optionally only for some fields.

use std::collections::BTreeMap;
use std::fmt;

use crate::action::Action;
use crate::conditions::Conditions;
use crate::error::{RuleError, RuleResult};
use crate::subject::SubjectType;
use crate::value::ConditionValue;

/// A single permission statement.
///
/// Rules are immutable once built: the builder methods consume `self` and
/// there are no setters. A rule's identity is its content.
///
/// # Example
///
/// ```
/// use warden_rules::{Conditions, Rule};
///
/// let rule = Rule::can("update", "Article")
///     .with_conditions(Conditions::new().with("authorId", "u1"))
///     .with_fields(["title", "body"]);
///
/// assert!(!rule.is_inverted());
/// assert!(rule.has_conditions());
/// assert_eq!(rule.fields().map(|f| f.len()), Some(2));
/// assert_eq!(rule.priority(), 0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    action: Action,
    subject: SubjectType,
    conditions: Option<Conditions>,
    inverted: bool,
    fields: Option<Vec<String>>,
    reason: Option<String>,
    priority: i32,
}

impl Rule {
    /// Create a rule with an explicit `inverted` flag.
    pub fn new(action: impl Into<Action>, subject: impl Into<SubjectType>, inverted: bool) -> Self {
        Self {
            action: action.into(),
            subject: subject.into(),
            conditions: None,
            inverted,
            fields: None,
            reason: None,
            priority: 0,
        }
    }

    /// Create a granting rule.
    pub fn can(action: impl Into<Action>, subject: impl Into<SubjectType>) -> Self {
        Self::new(action, subject, false)
    }

    /// Create a forbidding (inverted) rule.
    pub fn cannot(action: impl Into<Action>, subject: impl Into<SubjectType>) -> Self {
        Self::new(action, subject, true)
    }

    /// Restrict the rule to subjects matching `conditions`.
    ///
    /// Empty conditions are normalized to "no conditions".
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = if conditions.is_empty() { None } else { Some(conditions) };
        self
    }

    /// Restrict the rule to the given fields.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Attach a human-readable reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the evaluation priority (higher is evaluated first).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The action this rule applies to.
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// The subject type this rule applies to.
    pub fn subject(&self) -> &SubjectType {
        &self.subject
    }

    /// The condition tree, if any.
    pub fn conditions(&self) -> Option<&Conditions> {
        self.conditions.as_ref()
    }

    /// Whether this is a forbid rule.
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// The permitted (or, for inverted rules, forbidden) fields.
    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    /// The reason attached to this rule.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Evaluation priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether the rule carries non-empty conditions.
    pub fn has_conditions(&self) -> bool {
        self.conditions.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Whether the rule restricts fields.
    pub fn has_fields(&self) -> bool {
        self.fields.is_some()
    }

    /// Check the rule is structurally valid.
    ///
    /// Action and subject must be non-empty and every field name non-blank.
    /// Condition semantics are not checked here: anomalies inside a
    /// condition tree resolve to "does not match" at evaluation time.
    pub fn validate(&self) -> RuleResult<()> {
        if self.action.is_empty() {
            return Err(RuleError::InvalidRule("rule action is empty".to_string()));
        }
        if self.subject.is_empty() {
            return Err(RuleError::InvalidRule(format!(
                "rule for action '{}' has an empty subject",
                self.action
            )));
        }
        if let Some(fields) = &self.fields {
            if fields.iter().any(|f| f.trim().is_empty()) {
                return Err(RuleError::InvalidRule(format!(
                    "rule '{}' contains a blank field name",
                    self
                )));
            }
        }
        Ok(())
    }

    /// Return a copy with `${name}` placeholders in conditions replaced.
    ///
    /// See [`Conditions::interpolate`].
    pub fn interpolate(&self, vars: &BTreeMap<String, ConditionValue>) -> Self {
        Self {
            conditions: self.conditions.as_ref().map(|c| c.interpolate(vars)),
            ..self.clone()
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.inverted { "cannot" } else { "can" };
        write!(f, "{} {} {}", verb, self.action, self.subject)?;
        if let Some(fields) = &self.fields {
            write!(f, " [{}]", fields.join(", "))?;
        }
        if self.has_conditions() {
            f.write_str(" (conditional)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let rule = Rule::cannot("Delete", "Article")
            .with_reason("only admins")
            .with_priority(5);

        assert!(rule.is_inverted());
        assert_eq!(rule.action(), &Action::delete());
        assert_eq!(rule.subject().as_str(), "Article");
        assert_eq!(rule.reason(), Some("only admins"));
        assert_eq!(rule.priority(), 5);
        assert!(!rule.has_conditions());
        assert!(!rule.has_fields());
    }

    #[test]
    fn test_empty_conditions_are_dropped() {
        let rule = Rule::can("read", "Article").with_conditions(Conditions::new());
        assert!(rule.conditions().is_none());
    }

    #[test]
    fn test_validate() {
        assert!(Rule::can("read", "Article").validate().is_ok());
        assert!(Rule::can("", "Article").validate().is_err());
        assert!(Rule::can("read", " ").validate().is_err());
        assert!(Rule::can("read", "Article").with_fields(["title", ""]).validate().is_err());
    }

    #[test]
    fn test_display() {
        let rule = Rule::can("read", "Article").with_fields(["title"]);
        assert_eq!(rule.to_string(), "can read Article [title]");
        let rule = Rule::cannot("update", "Article")
            .with_conditions(Conditions::new().with("published", true));
        assert_eq!(rule.to_string(), "cannot update Article (conditional)");
    }
}
