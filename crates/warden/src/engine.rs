//! # Rule Engine
//!
//! Owns an ordered rule set and answers permission queries over it.
//!
//! ## Matching
//!
//! A rule is a candidate for a query when its action covers the requested
//! action (wildcards and aliases included), its subject covers the requested
//! subject type, and its conditions hold for the subject instance.
//!
//! Type-only queries ("can this user read *some* Article?") have no instance
//! to evaluate conditions against: conditional grants count as candidates,
//! conditional forbids are ignored.
//!
//! Rules with `fields` behave differently per query kind. A grant with
//! fields answers whole-subject queries (something may be read) and field
//! queries for the fields it lists. A forbid with fields only answers field
//! queries for the fields it lists, so `cannot read User [password]` never
//! hides the whole `User`.
//!
//! ## Precedence
//!
//! The winning candidate is the one with the greatest key, compared in this
//! order: priority, forbid over grant, conditional over unconditional, fields
//! over none, concrete subject over wildcard, concrete action over wildcard.
//! Ties go to the rule inserted first.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use warden_rules::{Action, Rule, RuleResult, SubjectType};

use crate::aliases::ActionAliases;
use crate::evaluator::ConditionEvaluator;
use crate::fields::field_pattern_matches;
use crate::subject::{GenericSubject, IdentifiableSubject, Subject};

/// What a query is about: a bare subject type or a concrete instance.
#[derive(Clone, Copy)]
pub enum Target<'a> {
    /// A subject type without an instance.
    Type(&'a SubjectType),
    /// A subject instance.
    Instance(&'a dyn Subject),
}

impl<'a> Target<'a> {
    /// The subject type being queried.
    pub fn subject_type(&self) -> SubjectType {
        match self {
            Target::Type(subject_type) => (*subject_type).clone(),
            Target::Instance(subject) => subject.subject_type(),
        }
    }

    /// The instance, if any.
    pub fn instance(&self) -> Option<&'a dyn Subject> {
        match self {
            Target::Type(_) => None,
            Target::Instance(subject) => Some(*subject),
        }
    }
}

impl std::fmt::Debug for Target<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Type(subject_type) => f.debug_tuple("Type").field(subject_type).finish(),
            Target::Instance(subject) => f.debug_tuple("Instance").field(&subject.subject_type()).finish(),
        }
    }
}

impl<'a> From<&'a SubjectType> for Target<'a> {
    fn from(subject_type: &'a SubjectType) -> Self {
        Target::Type(subject_type)
    }
}

impl<'a> From<&'a dyn Subject> for Target<'a> {
    fn from(subject: &'a dyn Subject) -> Self {
        Target::Instance(subject)
    }
}

impl<'a> From<&'a GenericSubject> for Target<'a> {
    fn from(subject: &'a GenericSubject) -> Self {
        Target::Instance(subject)
    }
}

impl<'a> From<&'a IdentifiableSubject> for Target<'a> {
    fn from(subject: &'a IdentifiableSubject) -> Self {
        Target::Instance(subject)
    }
}

/// The outcome of a query and the rule that decided it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the action is allowed.
    pub allowed: bool,
    /// The winning rule; `None` when no rule matched (default deny).
    pub rule: Option<Rule>,
}

impl Decision {
    /// Check if the denial came from an explicit forbid rule.
    pub fn is_forbidden(&self) -> bool {
        self.rule.as_ref().is_some_and(Rule::is_inverted)
    }

    /// Reason from the winning rule.
    pub fn reason(&self) -> Option<&str> {
        self.rule.as_ref().and_then(Rule::reason)
    }
}

/// Precedence of a rule; greater wins.
fn precedence(rule: &Rule) -> (i32, bool, bool, bool, bool, bool) {
    (
        rule.priority(),
        rule.is_inverted(),
        rule.has_conditions(),
        rule.has_fields(),
        !rule.subject().is_wildcard(),
        !rule.action().is_wildcard(),
    )
}

/// Compare two rules by precedence, greatest first.
pub fn compare_precedence(a: &Rule, b: &Rule) -> Ordering {
    precedence(b).cmp(&precedence(a))
}

/// Ordered rule set with its evaluator and alias table.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    evaluator: ConditionEvaluator,
    aliases: ActionAliases,
}

impl RuleEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine holding `rules`.
    pub fn with_rules(rules: Vec<Rule>) -> RuleResult<Self> {
        let mut engine = Self::new();
        engine.add_rules(rules)?;
        Ok(engine)
    }

    /// Replace the alias table, builder style.
    pub fn with_aliases(mut self, aliases: ActionAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// The alias table.
    pub fn aliases(&self) -> &ActionAliases {
        &self.aliases
    }

    /// Check that a rule could be added: structure and `$regex` patterns.
    pub fn check(rule: &Rule) -> RuleResult<()> {
        rule.validate()?;
        ConditionEvaluator::new().prepare(std::slice::from_ref(rule))
    }

    /// Append a rule.
    pub fn add_rule(&mut self, rule: Rule) -> RuleResult<()> {
        self.add_rules(vec![rule])
    }

    /// Append rules. Either every rule is added or none is.
    pub fn add_rules(&mut self, rules: Vec<Rule>) -> RuleResult<()> {
        for rule in &rules {
            rule.validate()?;
        }
        self.evaluator.prepare(&rules)?;
        self.rules.extend(rules);
        Ok(())
    }

    /// Remove every rule.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Rules in insertion order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check if `action` is allowed on `target`.
    pub fn can(&self, action: &Action, target: Target<'_>) -> bool {
        self.decide(action, target).allowed
    }

    /// Check if `action` is denied on `target`.
    pub fn cannot(&self, action: &Action, target: Target<'_>) -> bool {
        !self.can(action, target)
    }

    /// Check if `action` is allowed on one field of `target`.
    pub fn can_field(&self, action: &Action, target: Target<'_>, field: &str) -> bool {
        self.decide_field(action, target, Some(field)).allowed
    }

    /// Decide a whole-subject query.
    pub fn decide(&self, action: &Action, target: Target<'_>) -> Decision {
        self.decide_field(action, target, None)
    }

    /// Decide a query, optionally for a single field.
    pub fn decide_field(&self, action: &Action, target: Target<'_>, field: Option<&str>) -> Decision {
        let subject_type = target.subject_type();
        let winner = self.winner(action, &subject_type, target.instance(), field);
        let allowed = winner.is_some_and(|rule| !rule.is_inverted());

        tracing::debug!(
            action = %action,
            subject = %subject_type,
            field = field.unwrap_or(""),
            allowed = allowed,
            priority = winner.map(Rule::priority),
            "Permission decided"
        );

        Decision {
            allowed,
            rule: winner.cloned(),
        }
    }

    /// The rule that decides a whole-subject query, if any matches.
    pub fn relevant_rule_for(&self, action: &Action, target: Target<'_>) -> Option<&Rule> {
        let subject_type = target.subject_type();
        self.winner(action, &subject_type, target.instance(), None)
    }

    /// Rules declared for `action` on `subject_type`, highest precedence
    /// first. Conditions are not evaluated.
    pub fn rules_for(&self, action: &Action, subject_type: &SubjectType) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|rule| self.covers(rule, action, subject_type))
            .collect();
        rules.sort_by(|a, b| compare_precedence(a, b));
        rules
    }

    /// Fields `action` may touch on `target`.
    ///
    /// - `None`: no restriction (the winning grant lists no fields).
    /// - `Some(fields)`: only these fields. Restricted grants at the winner's
    ///   priority are merged, minus fields forbidden at that priority or
    ///   higher.
    /// - `Some(empty)`: nothing, because a forbid won or no rule matched.
    pub fn permitted_fields_by(&self, action: &Action, target: Target<'_>) -> Option<BTreeSet<String>> {
        let subject_type = target.subject_type();
        let instance = target.instance();

        let Some(winner) = self.winner(action, &subject_type, instance, None) else {
            return Some(BTreeSet::new());
        };
        if winner.is_inverted() {
            return Some(BTreeSet::new());
        }
        let tier = winner.priority();
        let granted = winner.fields()?;

        let mut permitted: BTreeSet<String> = granted.iter().cloned().collect();
        for rule in self.matching(action, &subject_type, instance) {
            if rule.is_inverted() || rule.priority() != tier {
                continue;
            }
            if let Some(fields) = rule.fields() {
                permitted.extend(fields.iter().cloned());
            }
        }
        for field in self.forbidden_fields_by(action, target) {
            permitted.remove(&field);
        }
        Some(permitted)
    }

    /// Fields explicitly forbidden for `action` on `target` by forbid rules
    /// that rank at or above the winning whole-subject rule.
    pub fn forbidden_fields_by(&self, action: &Action, target: Target<'_>) -> BTreeSet<String> {
        let subject_type = target.subject_type();
        let instance = target.instance();
        let floor = self
            .winner(action, &subject_type, instance, None)
            .map_or(i32::MIN, Rule::priority);

        self.matching(action, &subject_type, instance)
            .filter(|rule| rule.is_inverted() && rule.priority() >= floor)
            .filter_map(Rule::fields)
            .flatten()
            .cloned()
            .collect()
    }

    fn winner<'s>(
        &'s self,
        action: &Action,
        subject_type: &SubjectType,
        instance: Option<&dyn Subject>,
        field: Option<&str>,
    ) -> Option<&'s Rule> {
        let mut best: Option<&'s Rule> = None;
        for rule in self.matching(action, subject_type, instance) {
            if !matches_field(rule, field) {
                continue;
            }
            if best.map_or(true, |current| precedence(rule) > precedence(current)) {
                best = Some(rule);
            }
        }
        best
    }

    /// Candidates by action, subject and conditions; fields not considered.
    fn matching<'s, 'q>(
        &'s self,
        action: &'q Action,
        subject_type: &'q SubjectType,
        instance: Option<&'q dyn Subject>,
    ) -> impl Iterator<Item = &'s Rule> + 'q
    where
        's: 'q,
    {
        self.rules
            .iter()
            .filter(move |rule| self.covers(rule, action, subject_type))
            .filter(move |rule| self.conditions_hold(rule, instance))
    }

    fn covers(&self, rule: &Rule, action: &Action, subject_type: &SubjectType) -> bool {
        rule.subject().covers(subject_type) && self.aliases.covers(rule.action(), action)
    }

    fn conditions_hold(&self, rule: &Rule, instance: Option<&dyn Subject>) -> bool {
        match (rule.conditions(), instance) {
            (None, _) => true,
            (Some(conditions), Some(subject)) => self.evaluator.matches(conditions, subject),
            (Some(_), None) => !rule.is_inverted(),
        }
    }
}

fn matches_field(rule: &Rule, field: Option<&str>) -> bool {
    match (rule.fields(), field) {
        (None, _) => true,
        (Some(_), None) => !rule.is_inverted(),
        (Some(patterns), Some(field)) => patterns.iter().any(|p| field_pattern_matches(p, field)),
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_rule() -> impl Strategy<Value = Rule> {
        (
            prop_oneof![Just("read"), Just("update"), Just("manage")],
            prop_oneof![Just("Article"), Just("Comment"), Just("all")],
            any::<bool>(),
            -2i32..3,
        )
            .prop_map(|(action, subject, inverted, priority)| {
                Rule::new(action, subject, inverted).with_priority(priority)
            })
    }

    proptest! {
        #[test]
        fn unmatched_queries_are_denied(rules in proptest::collection::vec(arb_rule(), 0..8)) {
            let catch_all = rules.iter().any(|r| r.action().is_wildcard() && r.subject().is_wildcard());
            let engine = RuleEngine::with_rules(rules).unwrap();
            let target = SubjectType::new("Invoice");
            if !catch_all {
                prop_assert!(!engine.can(&Action::new("archive"), Target::Type(&target)));
            }
        }

        #[test]
        fn higher_priority_forbid_flips_grant(rules in proptest::collection::vec(arb_rule(), 0..8)) {
            let mut engine = RuleEngine::with_rules(rules).unwrap();
            let target = SubjectType::new("Article");
            engine.add_rule(Rule::can("read", "Article").with_priority(10)).unwrap();
            prop_assert!(engine.can(&Action::read(), Target::Type(&target)));
            engine.add_rule(Rule::cannot("read", "Article").with_priority(11)).unwrap();
            prop_assert!(!engine.can(&Action::read(), Target::Type(&target)));
        }

        #[test]
        fn cannot_is_negation_of_can(rules in proptest::collection::vec(arb_rule(), 0..8)) {
            let engine = RuleEngine::with_rules(rules).unwrap();
            let target = SubjectType::new("Comment");
            prop_assert_ne!(
                engine.can(&Action::update(), Target::Type(&target)),
                engine.cannot(&Action::update(), Target::Type(&target))
            );
        }
    }
}
