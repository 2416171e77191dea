//! Action aliases.
//!
//! An alias names a group of actions: with `modify → [update, delete]`, a
//! rule for `modify` also answers queries for `update` and `delete`. Aliases
//! expand transitively and only ever widen what a rule's action covers.

use std::collections::{BTreeMap, BTreeSet};
use warden_rules::Action;

use crate::error::{AbilityError, AbilityResult};

/// Alias → covered actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionAliases {
    aliases: BTreeMap<Action, Vec<Action>>,
}

impl ActionAliases {
    /// Create an empty alias table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an alias, builder style. Call [`validate`](Self::validate) once
    /// the table is complete.
    pub fn with<I, A>(mut self, alias: impl Into<Action>, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Action>,
    {
        self.aliases
            .entry(alias.into())
            .or_default()
            .extend(actions.into_iter().map(Into::into));
        self
    }

    /// Build and validate a table from a plain string map.
    pub fn from_map(map: &BTreeMap<String, Vec<String>>) -> AbilityResult<Self> {
        let aliases = map
            .iter()
            .fold(Self::new(), |acc, (alias, actions)| acc.with(alias.as_str(), actions.iter().map(String::as_str)));
        aliases.validate()?;
        Ok(aliases)
    }

    /// Reject empty, wildcard and cyclic aliases.
    pub fn validate(&self) -> AbilityResult<()> {
        for (alias, actions) in &self.aliases {
            if alias.is_empty() {
                return Err(AbilityError::Config("alias name cannot be empty".to_string()));
            }
            if alias.is_wildcard() {
                return Err(AbilityError::Config(format!(
                    "'{alias}' is a wildcard action and cannot be aliased"
                )));
            }
            if actions.is_empty() || actions.iter().any(Action::is_empty) {
                return Err(AbilityError::Config(format!(
                    "alias '{alias}' must name at least one non-empty action"
                )));
            }
            if self.expand(alias).iter().any(|a| a == alias) {
                return Err(AbilityError::Config(format!("alias '{alias}' refers to itself")));
            }
        }
        Ok(())
    }

    /// Every action `action` stands for, excluding itself.
    pub fn expand(&self, action: &Action) -> BTreeSet<Action> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<&Action> = self.aliases.get(action).into_iter().flatten().collect();
        while let Some(next) = pending.pop() {
            if seen.insert(next.clone()) {
                pending.extend(self.aliases.get(next).into_iter().flatten());
            }
        }
        seen
    }

    /// Check if a rule declared for `rule_action` answers a query for
    /// `requested`.
    pub fn covers(&self, rule_action: &Action, requested: &Action) -> bool {
        rule_action.covers(requested)
            || (self.aliases.contains_key(rule_action) && self.expand(rule_action).contains(requested))
    }

    /// Number of aliases.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
