//! # Conditions
//!
//! A condition tree restricts when a rule applies. Keys are either field
//! names (compared against the subject's properties) or `$`-prefixed
//! MongoDB-style operators. Evaluation lives in the `warden` crate; this
//! module only owns the data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::ConditionValue;

/// Logical and comparison operators understood by the evaluator.
pub const OPERATORS: &[&str] = &[
    "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$exists", "$regex", "$options",
    "$and", "$or", "$not", "$all", "$size", "$elemMatch",
];

/// Check if a key is an operator key (starts with `$`).
pub fn is_operator(key: &str) -> bool {
    key.starts_with('$')
}

/// A tree of field comparisons and logical combinators.
///
/// An empty tree is the "always matches" sentinel.
///
/// # Example
///
/// ```
/// use warden_rules::Conditions;
/// use serde_json::json;
///
/// let conditions = Conditions::from_json(json!({
///     "authorId": "u1",
///     "age": { "$gte": 18 }
/// }))
/// .unwrap();
/// assert_eq!(conditions.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(BTreeMap<String, ConditionValue>);

impl Conditions {
    /// Create an empty (always matching) condition tree.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build from a JSON value, which must be an object.
    ///
    /// Returns `None` for any other JSON shape.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match ConditionValue::from(value) {
            ConditionValue::Map(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Add an entry, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check for the "always matches" sentinel.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a top-level entry.
    pub fn get(&self, key: &str) -> Option<&ConditionValue> {
        self.0.get(key)
    }

    /// Iterate over top-level entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConditionValue)> {
        self.0.iter()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &BTreeMap<String, ConditionValue> {
        &self.0
    }

    /// Convert to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        ConditionValue::Map(self.0.clone()).into()
    }

    /// Replace `${name}` placeholders with caller-supplied values.
    ///
    /// A string that is exactly one placeholder is replaced by the variable
    /// itself, keeping its type (`"${age}"` → `Int(30)`). Placeholders
    /// embedded in a longer string are substituted textually. Unknown
    /// placeholders are left untouched.
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use warden_rules::{ConditionValue, Conditions};
    ///
    /// let vars = BTreeMap::from([("userId".to_string(), ConditionValue::from("u1"))]);
    /// let conditions = Conditions::new().with("authorId", "${userId}").interpolate(&vars);
    /// assert_eq!(conditions.get("authorId"), Some(&ConditionValue::from("u1")));
    /// ```
    pub fn interpolate(&self, vars: &BTreeMap<String, ConditionValue>) -> Self {
        Self(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, vars)))
                .collect(),
        )
    }
}

fn interpolate_value(value: &ConditionValue, vars: &BTreeMap<String, ConditionValue>) -> ConditionValue {
    match value {
        ConditionValue::String(s) => interpolate_string(s, vars),
        ConditionValue::Array(items) => {
            ConditionValue::Array(items.iter().map(|v| interpolate_value(v, vars)).collect())
        }
        ConditionValue::Map(map) => ConditionValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn interpolate_string(s: &str, vars: &BTreeMap<String, ConditionValue>) -> ConditionValue {
    if let Some(name) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        if !name.contains("${") {
            if let Some(value) = vars.get(name) {
                return value.clone();
            }
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 2..start + len];
        out.push_str(&rest[..start]);
        match vars.get(name) {
            Some(ConditionValue::String(v)) => out.push_str(v),
            Some(other) if !matches!(other, ConditionValue::Array(_) | ConditionValue::Map(_)) => {
                out.push_str(&serde_json::Value::from(other.clone()).to_string())
            }
            _ => out.push_str(&rest[start..start + len + 1]),
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    ConditionValue::String(out)
}

impl FromIterator<(String, ConditionValue)> for Conditions {
    fn from_iter<T: IntoIterator<Item = (String, ConditionValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, ConditionValue>> for Conditions {
    fn from(value: BTreeMap<String, ConditionValue>) -> Self {
        Self(value)
    }
}
