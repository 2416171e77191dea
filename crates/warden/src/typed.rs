//! Statically typed abilities.
//!
//! Applications with a closed set of actions and subject types describe
//! them as enums and use [`TypedAbility`] so a misspelled action is a
//! compile error. Every call is forwarded to the string-keyed [`Ability`],
//! so both faces give identical answers for equivalent inputs.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use warden_rules::{Action, Rule, SubjectType};

use crate::ability::Ability;
use crate::engine::Target;
use crate::error::AbilityResult;
use crate::subject::Subject;

/// A closed set of actions.
pub trait ActionKind: Copy + Send + Sync {
    /// The action token.
    fn as_str(&self) -> &'static str;

    /// The action as a rule value.
    fn to_action(&self) -> Action {
        Action::new(self.as_str())
    }
}

/// A closed set of subject types.
pub trait SubjectKind: Copy + Send + Sync {
    /// The subject type name.
    fn as_str(&self) -> &'static str;

    /// The subject type as a rule value.
    fn to_subject_type(&self) -> SubjectType {
        SubjectType::new(self.as_str())
    }
}

/// Grant `action` on `subject`.
pub fn can<A: ActionKind, S: SubjectKind>(action: A, subject: S) -> Rule {
    Rule::can(action.to_action(), subject.to_subject_type())
}

/// Forbid `action` on `subject`.
pub fn cannot<A: ActionKind, S: SubjectKind>(action: A, subject: S) -> Rule {
    Rule::cannot(action.to_action(), subject.to_subject_type())
}

/// An [`Ability`] restricted to the actions `A` and subject types `S`.
pub struct TypedAbility<A, S> {
    ability: Ability,
    _kinds: PhantomData<fn(A, S)>,
}

impl<A, S> Clone for TypedAbility<A, S> {
    fn clone(&self) -> Self {
        Self {
            ability: self.ability.clone(),
            _kinds: PhantomData,
        }
    }
}

impl<A, S> std::fmt::Debug for TypedAbility<A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TypedAbility").field(&self.ability).finish()
    }
}

impl<A: ActionKind, S: SubjectKind> From<Ability> for TypedAbility<A, S> {
    fn from(ability: Ability) -> Self {
        Self {
            ability,
            _kinds: PhantomData,
        }
    }
}

impl<A: ActionKind, S: SubjectKind> TypedAbility<A, S> {
    /// Ingest `rules` now.
    pub fn new(rules: Vec<Rule>) -> Self {
        Ability::new(rules).into()
    }

    /// The underlying string-keyed ability.
    pub fn ability(&self) -> &Ability {
        &self.ability
    }

    /// Ingest staged rules. See [`Ability::initialize`].
    pub async fn initialize(&self) -> AbilityResult<()> {
        self.ability.initialize().await
    }

    /// Check if `action` is allowed on some `subject`.
    pub async fn can(&self, action: A, subject: S) -> bool {
        self.ability.can_type(action.to_action(), subject.to_subject_type()).await
    }

    /// Check if `action` is denied on `subject`.
    pub async fn cannot(&self, action: A, subject: S) -> bool {
        !self.can(action, subject).await
    }

    /// Check if `action` is allowed on an instance.
    pub async fn can_instance(&self, action: A, subject: &dyn Subject) -> bool {
        self.ability.can(action.to_action(), subject).await
    }

    /// Check if `action` is allowed on one field of `subject`.
    pub async fn can_field(&self, action: A, subject: S, field: &str) -> bool {
        let subject_type = subject.to_subject_type();
        self.ability.can_field(action.to_action(), &subject_type, field).await
    }

    /// Fields `action` may touch on `subject`; `None` means unrestricted.
    pub async fn permitted_fields_by(&self, action: A, subject: S) -> Option<BTreeSet<String>> {
        let subject_type = subject.to_subject_type();
        self.ability
            .permitted_fields_by(action.to_action(), Target::Type(&subject_type))
            .await
    }

    /// [`can`](Self::can) without waiting; `None` until ready.
    pub fn try_can(&self, action: A, subject: S) -> Option<bool> {
        self.ability.try_can_type(action.to_action(), subject.to_subject_type())
    }

    /// Append a rule.
    pub fn add_rule(&self, rule: Rule) -> AbilityResult<()> {
        self.ability.add_rule(rule)
    }

    /// Replace every rule.
    pub fn update(&self, rules: Vec<Rule>) -> AbilityResult<()> {
        self.ability.update(rules)
    }
}
