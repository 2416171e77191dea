//! # Condition Evaluator
//!
//! Interprets a [`Conditions`] tree against a subject using MongoDB-style
//! operators. Evaluation never fails with an error.
//!
//! ## Fail-closed evaluation
//!
//! Each node resolves to one of three outcomes: match, no match, or
//! invalid. A missing field or an incomparable pair of values is a plain
//! "no match", including for `$ne` and `$nin`. An operator the evaluator
//! cannot interpret, or a malformed operand, makes the node invalid.
//! Invalid propagates through `$and`, `$or` and `$not` unchanged, so an
//! unreadable condition never matches, however deeply it is negated.

use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, HashMap};
use warden_rules::{lookup_path, ConditionValue, Conditions, Rule, RuleError, RuleResult};

use crate::subject::Subject;

/// Something properties can be read from: a subject, or an element of an
/// array during `$elemMatch`.
trait Lookup {
    fn lookup(&self, path: &str) -> Option<ConditionValue>;
}

struct SubjectLookup<'a>(&'a dyn Subject);

impl Lookup for SubjectLookup<'_> {
    fn lookup(&self, path: &str) -> Option<ConditionValue> {
        self.0.property(path)
    }
}

struct MapLookup<'a>(&'a BTreeMap<String, ConditionValue>);

impl Lookup for MapLookup<'_> {
    fn lookup(&self, path: &str) -> Option<ConditionValue> {
        lookup_path(self.0, path).cloned()
    }
}

/// Outcome of evaluating one node of a condition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Match,
    NoMatch,
    /// The node could not be interpreted. Never matches, even negated.
    Invalid,
}

impl Outcome {
    fn negate(self) -> Self {
        match self {
            Outcome::Match => Outcome::NoMatch,
            Outcome::NoMatch => Outcome::Match,
            Outcome::Invalid => Outcome::Invalid,
        }
    }

    /// Conjunction. Every node is visited so an invalid one is never hidden
    /// behind an earlier "no match".
    fn all(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let mut result = Outcome::Match;
        for outcome in outcomes {
            match outcome {
                Outcome::Invalid => return Outcome::Invalid,
                Outcome::NoMatch => result = Outcome::NoMatch,
                Outcome::Match => {}
            }
        }
        result
    }

    /// Disjunction, visiting every node for the same reason as [`Outcome::all`].
    fn any(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let mut result = Outcome::NoMatch;
        for outcome in outcomes {
            match outcome {
                Outcome::Invalid => return Outcome::Invalid,
                Outcome::Match => result = Outcome::Match,
                Outcome::NoMatch => {}
            }
        }
        result
    }
}

impl From<bool> for Outcome {
    fn from(matched: bool) -> Self {
        if matched {
            Outcome::Match
        } else {
            Outcome::NoMatch
        }
    }
}

/// Evaluates condition trees.
///
/// Holds the compiled `$regex` patterns of the rules it was prepared for;
/// patterns met for the first time at evaluation are compiled on the fly.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use warden::{ConditionEvaluator, GenericSubject};
/// use warden_rules::Conditions;
///
/// let evaluator = ConditionEvaluator::new();
/// let adult = Conditions::from_json(json!({
///     "$and": [{ "age": { "$gte": 18 } }, { "age": { "$lte": 65 } }]
/// }))
/// .unwrap();
///
/// let subject = GenericSubject::from_json("User", json!({ "age": 30 }));
/// assert!(evaluator.matches(&adult, &subject));
///
/// let child = GenericSubject::from_json("User", json!({ "age": 10 }));
/// assert!(!evaluator.matches(&adult, &child));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator {
    patterns: HashMap<(String, String), Regex>,
}

impl ConditionEvaluator {
    /// Create an evaluator with no precompiled patterns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Precompile every `$regex` pattern used by `rules`.
    ///
    /// Fails on the first pattern that does not compile, leaving the
    /// evaluator unchanged.
    pub fn prepare(&mut self, rules: &[Rule]) -> RuleResult<()> {
        let mut compiled = Vec::new();
        for rule in rules {
            if let Some(conditions) = rule.conditions() {
                collect_patterns(conditions.as_map(), &mut compiled);
            }
        }

        let mut staged = HashMap::new();
        for (pattern, options) in compiled {
            if self.patterns.contains_key(&(pattern.clone(), options.clone())) {
                continue;
            }
            let regex = compile(&pattern, &options)?;
            staged.insert((pattern, options), regex);
        }
        self.patterns.extend(staged);
        Ok(())
    }

    /// Number of precompiled patterns.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Check whether `subject` satisfies `conditions`.
    ///
    /// Empty conditions always match. Conditions that cannot be interpreted
    /// never do.
    pub fn matches(&self, conditions: &Conditions, subject: &dyn Subject) -> bool {
        self.match_document(conditions.as_map(), &SubjectLookup(subject)) == Outcome::Match
    }

    fn match_document(&self, document: &BTreeMap<String, ConditionValue>, source: &dyn Lookup) -> Outcome {
        Outcome::all(
            document
                .iter()
                .map(|(key, expected)| self.match_entry(key, expected, source)),
        )
    }

    fn match_entry(&self, key: &str, expected: &ConditionValue, source: &dyn Lookup) -> Outcome {
        match key {
            "$and" => match sub_documents(expected) {
                Some(docs) => Outcome::all(docs.iter().map(|doc| self.match_document(doc, source))),
                None => malformed("$and", expected),
            },
            "$or" => match sub_documents(expected) {
                Some(docs) => Outcome::any(docs.iter().map(|doc| self.match_document(doc, source))),
                None => malformed("$or", expected),
            },
            "$not" => match expected {
                ConditionValue::Map(doc) => self.match_document(doc, source).negate(),
                _ => malformed("$not", expected),
            },
            op if op.starts_with('$') => unknown(op),
            field => self.match_field(source.lookup(field).as_ref(), expected),
        }
    }

    fn match_field(&self, actual: Option<&ConditionValue>, expected: &ConditionValue) -> Outcome {
        match expected {
            ConditionValue::Map(ops) if expected.is_operator_map() => {
                Outcome::all(ops.iter().map(|(op, operand)| self.apply(op, operand, actual, ops)))
            }
            _ => implicit_eq(actual, expected).into(),
        }
    }

    fn apply(
        &self,
        op: &str,
        operand: &ConditionValue,
        actual: Option<&ConditionValue>,
        siblings: &BTreeMap<String, ConditionValue>,
    ) -> Outcome {
        match op {
            "$eq" => implicit_eq(actual, operand).into(),
            "$ne" => not_equal(actual, operand).into(),
            "$gt" => compare_any(actual, operand, |o| o.is_gt()).into(),
            "$gte" => compare_any(actual, operand, |o| o.is_ge()).into(),
            "$lt" => compare_any(actual, operand, |o| o.is_lt()).into(),
            "$lte" => compare_any(actual, operand, |o| o.is_le()).into(),
            "$in" => match operand.as_array() {
                Some(list) => list.iter().any(|candidate| implicit_eq(actual, candidate)).into(),
                None => malformed("$in", operand),
            },
            "$nin" => match operand.as_array() {
                Some(list) => {
                    let absent = actual.is_some() && list.iter().all(|candidate| not_equal(actual, candidate));
                    absent.into()
                }
                None => malformed("$nin", operand),
            },
            "$exists" => match operand.as_bool() {
                Some(wanted) => (actual.is_some_and(|v| !v.is_null()) == wanted).into(),
                None => malformed("$exists", operand),
            },
            "$regex" => {
                let options = siblings
                    .get("$options")
                    .and_then(ConditionValue::as_str)
                    .unwrap_or("");
                match operand.as_str() {
                    Some(pattern) => self.regex_matches(pattern, options, actual),
                    None => malformed("$regex", operand),
                }
            }
            // Modifier for $regex; meaningless on its own.
            "$options" if siblings.contains_key("$regex") => Outcome::Match,
            "$options" => malformed("$options", operand),
            "$not" => match operand {
                ConditionValue::Map(_) => self.match_field(actual, operand).negate(),
                _ => malformed("$not", operand),
            },
            "$all" => match (operand.as_array(), actual.and_then(ConditionValue::as_array)) {
                (Some(wanted), Some(items)) if !wanted.is_empty() => wanted
                    .iter()
                    .all(|w| items.iter().any(|item| item.loose_eq(w)))
                    .into(),
                (Some(_), _) => Outcome::NoMatch,
                (None, _) => malformed("$all", operand),
            },
            "$size" => match operand.as_i64() {
                Some(size) => actual
                    .and_then(ConditionValue::as_array)
                    .is_some_and(|items| items.len() as i64 == size)
                    .into(),
                None => malformed("$size", operand),
            },
            "$elemMatch" => match operand {
                ConditionValue::Map(doc) => {
                    // A placeholder element surfaces an invalid document even
                    // when there is no element to match against.
                    if self.element_matches(&ConditionValue::Null, operand, doc) == Outcome::Invalid {
                        return Outcome::Invalid;
                    }
                    let items = actual.and_then(ConditionValue::as_array).unwrap_or(&[]);
                    Outcome::any(items.iter().map(|item| self.element_matches(item, operand, doc)))
                }
                _ => malformed("$elemMatch", operand),
            },
            other => unknown(other),
        }
    }

    fn element_matches(
        &self,
        item: &ConditionValue,
        operand: &ConditionValue,
        doc: &BTreeMap<String, ConditionValue>,
    ) -> Outcome {
        if operand.is_operator_map() {
            return self.match_field(Some(item), operand);
        }
        match item {
            ConditionValue::Map(element) => self.match_document(doc, &MapLookup(element)),
            _ => match self.match_document(doc, &MapLookup(&BTreeMap::new())) {
                Outcome::Invalid => Outcome::Invalid,
                _ => Outcome::NoMatch,
            },
        }
    }

    fn regex_matches(&self, pattern: &str, options: &str, actual: Option<&ConditionValue>) -> Outcome {
        let key = (pattern.to_string(), options.to_string());
        let compiled;
        let regex = match self.patterns.get(&key) {
            Some(regex) => regex,
            None => match compile(pattern, options) {
                Ok(regex) => {
                    compiled = regex;
                    &compiled
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid $regex in condition; treating as no match");
                    return Outcome::Invalid;
                }
            },
        };

        let matched = match actual {
            Some(ConditionValue::String(s)) => regex.is_match(s),
            Some(ConditionValue::Array(items)) => items
                .iter()
                .filter_map(ConditionValue::as_str)
                .any(|s| regex.is_match(s)),
            _ => false,
        };
        matched.into()
    }
}

/// Equality with MongoDB conventions: `null` matches a missing field, and a
/// scalar matches an array field containing it.
fn implicit_eq(actual: Option<&ConditionValue>, expected: &ConditionValue) -> bool {
    match (actual, expected) {
        (None, ConditionValue::Null) => true,
        (None, _) => false,
        (Some(ConditionValue::Array(items)), e) if !matches!(e, ConditionValue::Array(_)) => {
            items.iter().any(|item| item.loose_eq(e))
        }
        (Some(a), e) => a.loose_eq(e),
    }
}

/// Inequality that only holds between a present field and a comparable
/// operand. A missing field or a value of another kind is not "not equal";
/// it does not match at all.
fn not_equal(actual: Option<&ConditionValue>, unexpected: &ConditionValue) -> bool {
    match actual {
        None => false,
        Some(ConditionValue::Array(items)) if !matches!(unexpected, ConditionValue::Array(_)) => {
            !items.is_empty()
                && items.iter().all(|item| comparable(item, unexpected))
                && !items.iter().any(|item| item.loose_eq(unexpected))
        }
        Some(value) => comparable(value, unexpected) && !value.loose_eq(unexpected),
    }
}

/// Values of the same kind, two numbers, or anything against `null`.
fn comparable(a: &ConditionValue, b: &ConditionValue) -> bool {
    a.is_null() || b.is_null() || a.kind() == b.kind() || (a.as_f64().is_some() && b.as_f64().is_some())
}

fn compare_any<F>(actual: Option<&ConditionValue>, operand: &ConditionValue, accept: F) -> bool
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    match actual {
        None => false,
        Some(ConditionValue::Array(items)) => items
            .iter()
            .any(|item| item.compare(operand).is_some_and(&accept)),
        Some(value) => value.compare(operand).is_some_and(accept),
    }
}

fn sub_documents(value: &ConditionValue) -> Option<Vec<&BTreeMap<String, ConditionValue>>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items.iter().map(ConditionValue::as_map).collect()
}

fn compile(pattern: &str, options: &str) -> RuleResult<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(RuleError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: format!("unsupported option '{other}'"),
                })
            }
        };
    }
    builder.build().map_err(|e| RuleError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn collect_patterns(document: &BTreeMap<String, ConditionValue>, out: &mut Vec<(String, String)>) {
    if let Some(ConditionValue::String(pattern)) = document.get("$regex") {
        let options = document
            .get("$options")
            .and_then(ConditionValue::as_str)
            .unwrap_or("")
            .to_string();
        out.push((pattern.clone(), options));
    }
    for value in document.values() {
        collect_value(value, out);
    }
}

fn collect_value(value: &ConditionValue, out: &mut Vec<(String, String)>) {
    match value {
        ConditionValue::Map(map) => collect_patterns(map, out),
        ConditionValue::Array(items) => items.iter().for_each(|item| collect_value(item, out)),
        _ => {}
    }
}

fn unknown(op: &str) -> Outcome {
    tracing::warn!(operator = %op, "Unknown condition operator; treating as no match");
    Outcome::Invalid
}

fn malformed(op: &str, operand: &ConditionValue) -> Outcome {
    tracing::warn!(
        operator = %op,
        operand = operand.kind(),
        "Malformed operand for condition operator; treating as no match"
    );
    Outcome::Invalid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::GenericSubject;
    use serde_json::json;

    fn conditions(value: serde_json::Value) -> Conditions {
        Conditions::from_json(value).unwrap()
    }

    fn subject(value: serde_json::Value) -> GenericSubject {
        GenericSubject::from_json("Article", value)
    }

    fn eval(cond: serde_json::Value, subj: serde_json::Value) -> bool {
        ConditionEvaluator::new().matches(&conditions(cond), &subject(subj))
    }

    #[test]
    fn test_empty_conditions_always_match() {
        assert!(eval(json!({}), json!({})));
        assert!(eval(json!({}), json!({ "a": 1 })));
    }

    #[test]
    fn test_implicit_equality() {
        assert!(eval(json!({ "authorId": "u1" }), json!({ "authorId": "u1" })));
        assert!(!eval(json!({ "authorId": "u1" }), json!({ "authorId": "u2" })));
        assert!(!eval(json!({ "authorId": "u1" }), json!({})));
        assert!(eval(json!({ "count": 1 }), json!({ "count": 1.0 })));
        assert!(eval(json!({ "tags": "rust" }), json!({ "tags": ["go", "rust"] })));
        assert!(eval(json!({ "deletedAt": null }), json!({})));
        assert!(eval(json!({ "author.id": "u1" }), json!({ "author": { "id": "u1" } })));
    }

    #[test]
    fn test_eq_ne() {
        assert!(eval(json!({ "status": { "$eq": "draft" } }), json!({ "status": "draft" })));
        assert!(eval(json!({ "status": { "$ne": "draft" } }), json!({ "status": "live" })));
        assert!(!eval(json!({ "status": { "$ne": "draft" } }), json!({ "status": "draft" })));
        assert!(eval(json!({ "deletedAt": { "$ne": null } }), json!({ "deletedAt": "2024-01-01" })));
        assert!(!eval(json!({ "deletedAt": { "$ne": null } }), json!({ "deletedAt": null })));
    }

    #[test]
    fn test_ne_missing_or_incomparable_does_not_match() {
        assert!(!eval(json!({ "status": { "$ne": "archived" } }), json!({})));
        assert!(!eval(json!({ "age": { "$ne": "x" } }), json!({ "age": 30 })));
        assert!(eval(json!({ "age": { "$ne": 31.0 } }), json!({ "age": 30 })));
        assert!(!eval(json!({ "tags": { "$ne": "rust" } }), json!({ "tags": ["go", "rust"] })));
        assert!(eval(json!({ "tags": { "$ne": "c" } }), json!({ "tags": ["go", "rust"] })));
    }

    #[test]
    fn test_ordering_operators() {
        assert!(eval(json!({ "age": { "$gt": 18 } }), json!({ "age": 19 })));
        assert!(!eval(json!({ "age": { "$gt": 18 } }), json!({ "age": 18 })));
        assert!(eval(json!({ "age": { "$gte": 18 } }), json!({ "age": 18 })));
        assert!(eval(json!({ "age": { "$lt": 18.5 } }), json!({ "age": 18 })));
        assert!(eval(json!({ "name": { "$lte": "m" } }), json!({ "name": "alice" })));
        // Incomparable types never match.
        assert!(!eval(json!({ "age": { "$gt": 18 } }), json!({ "age": "19" })));
        assert!(!eval(json!({ "age": { "$lt": 18 } }), json!({})));
    }

    #[test]
    fn test_in_nin() {
        assert!(eval(json!({ "role": { "$in": ["admin", "editor"] } }), json!({ "role": "editor" })));
        assert!(!eval(json!({ "role": { "$in": ["admin"] } }), json!({ "role": "editor" })));
        assert!(eval(json!({ "role": { "$nin": ["admin"] } }), json!({ "role": "editor" })));
        assert!(!eval(json!({ "role": { "$nin": ["admin"] } }), json!({})));
        assert!(!eval(json!({ "role": { "$nin": [1, 2] } }), json!({ "role": "editor" })));
        assert!(eval(json!({ "tags": { "$in": ["rust"] } }), json!({ "tags": ["go", "rust"] })));
        // Malformed operand fails closed, even for $nin.
        assert!(!eval(json!({ "role": { "$in": "admin" } }), json!({ "role": "admin" })));
        assert!(!eval(json!({ "role": { "$nin": "admin" } }), json!({ "role": "x" })));
    }

    #[test]
    fn test_exists() {
        assert!(eval(json!({ "email": { "$exists": true } }), json!({ "email": "a@b" })));
        assert!(!eval(json!({ "email": { "$exists": true } }), json!({ "email": null })));
        assert!(eval(json!({ "email": { "$exists": false } }), json!({})));
        assert!(!eval(json!({ "email": { "$exists": "yes" } }), json!({ "email": "a@b" })));
    }

    #[test]
    fn test_regex() {
        assert!(eval(json!({ "title": { "$regex": "^Draft" } }), json!({ "title": "Draft: x" })));
        assert!(!eval(json!({ "title": { "$regex": "^Draft" } }), json!({ "title": "draft: x" })));
        assert!(eval(
            json!({ "title": { "$regex": "^draft", "$options": "i" } }),
            json!({ "title": "Draft: x" })
        ));
        assert!(!eval(json!({ "title": { "$regex": "^1" } }), json!({ "title": 1 })));
        // Invalid pattern fails closed.
        assert!(!eval(json!({ "title": { "$regex": "(" } }), json!({ "title": "(" })));
        // $options alone is not a condition.
        assert!(!eval(json!({ "title": { "$options": "i" } }), json!({ "title": "x" })));
    }

    #[test]
    fn test_logical_combinators() {
        let range = json!({ "$and": [{ "age": { "$gte": 18 } }, { "age": { "$lte": 65 } }] });
        assert!(eval(range.clone(), json!({ "age": 30 })));
        assert!(!eval(range.clone(), json!({ "age": 10 })));
        assert!(!eval(range, json!({ "age": 70 })));

        let either = json!({ "$or": [{ "status": "draft" }, { "authorId": "u1" }] });
        assert!(eval(either.clone(), json!({ "status": "live", "authorId": "u1" })));
        assert!(!eval(either, json!({ "status": "live", "authorId": "u2" })));

        assert!(eval(json!({ "$not": { "status": "draft" } }), json!({ "status": "live" })));
        assert!(!eval(json!({ "$not": { "status": "draft" } }), json!({ "status": "draft" })));
        assert!(eval(json!({ "age": { "$not": { "$gt": 65 } } }), json!({ "age": 30 })));

        // Nested combinators.
        let nested = json!({ "$or": [
            { "$and": [{ "a": 1 }, { "b": 2 }] },
            { "$not": { "c": { "$exists": true } } }
        ] });
        assert!(eval(nested.clone(), json!({ "a": 1, "b": 2, "c": 3 })));
        assert!(eval(nested.clone(), json!({ "a": 1 })));
        assert!(!eval(nested, json!({ "a": 1, "c": 3 })));
    }

    #[test]
    fn test_malformed_combinators_fail_closed() {
        assert!(!eval(json!({ "$and": [] }), json!({})));
        assert!(!eval(json!({ "$or": { "a": 1 } }), json!({ "a": 1 })));
        assert!(!eval(json!({ "$and": [1, 2] }), json!({})));
        assert!(!eval(json!({ "$not": [] }), json!({})));
    }

    #[test]
    fn test_negated_invalid_conditions_never_match() {
        // Top-level $not over an unknown operator or a malformed operand.
        assert!(!eval(json!({ "$not": { "$bogus": 1 } }), json!({})));
        assert!(!eval(json!({ "$not": { "$and": {} } }), json!({})));
        assert!(!eval(json!({ "$not": { "age": { "$in": 5 } } }), json!({ "age": 5 })));

        // Field-level $not over malformed operands.
        assert!(!eval(json!({ "age": { "$not": { "$in": 5 } } }), json!({ "age": 5 })));
        assert!(!eval(json!({ "email": { "$not": { "$exists": "yes" } } }), json!({})));
        assert!(!eval(json!({ "title": { "$not": { "$regex": 1 } } }), json!({ "title": "x" })));
        assert!(!eval(json!({ "title": { "$not": { "$regex": "(" } } }), json!({ "title": "x" })));
        assert!(!eval(json!({ "title": { "$not": { "$options": "i" } } }), json!({ "title": "x" })));

        // Double negation does not launder it either.
        assert!(!eval(json!({ "$not": { "$not": { "$bogus": 1 } } }), json!({})));

        // Invalid branches are not hidden by a sibling that already decided.
        assert!(!eval(json!({ "$or": [{ "a": 1 }, { "$bogus": 1 }] }), json!({ "a": 1 })));
        assert!(!eval(json!({ "$not": { "$and": [{ "a": 2 }, { "$bogus": 1 }] } }), json!({ "a": 1 })));
        assert!(!eval(
            json!({ "$not": { "reviews": { "$elemMatch": { "by": { "$bogus": 1 } } } } }),
            json!({ "reviews": [] })
        ));
    }

    #[test]
    fn test_negated_grant_through_engine_is_denied() {
        let engine = crate::engine::RuleEngine::with_rules(vec![Rule::can("delete", "Article")
            .with_conditions(conditions(json!({ "$not": { "$bogus": 1 } })))])
        .unwrap();
        let article = subject(json!({ "title": "x" }));
        assert!(!engine.can(&warden_rules::Action::new("delete"), (&article).into()));
    }

    #[test]
    fn test_unknown_operators_fail_closed() {
        assert!(!eval(json!({ "age": { "$between": [1, 5] } }), json!({ "age": 3 })));
        assert!(!eval(json!({ "$where": "true" }), json!({})));
        assert!(!eval(json!({ "age": { "$gt": 1, "$bogus": 1 } }), json!({ "age": 3 })));
    }

    #[test]
    fn test_array_operators() {
        assert!(eval(json!({ "tags": { "$all": ["a", "b"] } }), json!({ "tags": ["b", "c", "a"] })));
        assert!(!eval(json!({ "tags": { "$all": ["a", "d"] } }), json!({ "tags": ["a", "b"] })));
        assert!(!eval(json!({ "tags": { "$all": [] } }), json!({ "tags": ["a"] })));
        assert!(eval(json!({ "tags": { "$size": 2 } }), json!({ "tags": ["a", "b"] })));
        assert!(!eval(json!({ "tags": { "$size": 2 } }), json!({ "tags": "ab" })));

        let reviewers = json!({ "reviews": [{ "by": "u1", "score": 3 }, { "by": "u2", "score": 5 }] });
        assert!(eval(
            json!({ "reviews": { "$elemMatch": { "by": "u2", "score": { "$gte": 4 } } } }),
            reviewers.clone()
        ));
        assert!(!eval(
            json!({ "reviews": { "$elemMatch": { "by": "u1", "score": { "$gte": 4 } } } }),
            reviewers
        ));
        assert!(eval(
            json!({ "scores": { "$elemMatch": { "$gt": 80, "$lt": 90 } } }),
            json!({ "scores": [70, 85, 95] })
        ));
    }

    #[test]
    fn test_prepare_compiles_patterns() {
        let rules = vec![
            Rule::can("read", "Article").with_conditions(conditions(json!({
                "$or": [{ "title": { "$regex": "^a" } }, { "slug": { "$regex": "^b", "$options": "i" } }]
            }))),
            Rule::can("read", "Article"),
        ];
        let mut evaluator = ConditionEvaluator::new();
        evaluator.prepare(&rules).unwrap();
        assert_eq!(evaluator.pattern_count(), 2);

        let bad = vec![Rule::can("read", "Article")
            .with_conditions(conditions(json!({ "title": { "$regex": "(" } })))];
        assert!(matches!(
            evaluator.prepare(&bad),
            Err(RuleError::InvalidPattern { .. })
        ));
        assert_eq!(evaluator.pattern_count(), 2);

        let bad_option = vec![Rule::can("read", "Article")
            .with_conditions(conditions(json!({ "title": { "$regex": "a", "$options": "q" } })))];
        assert!(evaluator.prepare(&bad_option).is_err());
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use crate::subject::GenericSubject;
    use proptest::prelude::*;
    use serde_json::json;

    fn eval(cond: serde_json::Value, subj: serde_json::Value) -> bool {
        ConditionEvaluator::new().matches(
            &Conditions::from_json(cond).unwrap(),
            &GenericSubject::from_json("Article", subj),
        )
    }

    proptest! {
        #[test]
        fn not_inverts_field_match(age in -1000i64..1000, bound in -1000i64..1000) {
            let plain = eval(json!({ "age": { "$gt": bound } }), json!({ "age": age }));
            let negated = eval(json!({ "$not": { "age": { "$gt": bound } } }), json!({ "age": age }));
            prop_assert_ne!(plain, negated);
        }

        #[test]
        fn negated_unknown_operator_never_matches(name in "[a-z]{3,8}", age in any::<i64>()) {
            let op = format!("$x{name}");
            let top = eval(json!({ "$not": { op.clone(): age } }), json!({ "age": age }));
            let field = eval(json!({ "age": { "$not": { op: age } } }), json!({ "age": age }));
            prop_assert!(!top);
            prop_assert!(!field);
        }

        #[test]
        fn in_and_nin_are_complementary(val in "[a-z]{1,6}", list in proptest::collection::vec("[a-z]{1,6}", 1..5)) {
            let is_in = eval(json!({ "v": { "$in": list.clone() } }), json!({ "v": val.clone() }));
            let not_in = eval(json!({ "v": { "$nin": list } }), json!({ "v": val }));
            prop_assert_ne!(is_in, not_in);
        }

        #[test]
        fn range_matches_iff_within(age in 0i64..120) {
            let cond = json!({ "$and": [{ "age": { "$gte": 18 } }, { "age": { "$lte": 65 } }] });
            prop_assert_eq!(eval(cond, json!({ "age": age })), (18..=65).contains(&age));
        }

        #[test]
        fn unknown_operator_never_matches(name in "[a-z]{3,8}", age in any::<i64>()) {
            let op = format!("$x{name}");
            let matched = eval(json!({ "age": { op: age } }), json!({ "age": age }));
            prop_assert!(!matched);
        }
    }
}
