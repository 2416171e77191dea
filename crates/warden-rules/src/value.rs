//! # Condition Values
//!
//! The closed value space used inside condition trees and subject property
//! maps. Keeping it a plain enum (instead of `serde_json::Value` or an
//! `Any`) makes every value exhaustively matchable, serializable and
//! `Send + Sync` without synchronization.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Property map exposed by subjects: name → value.
pub type Properties = BTreeMap<String, ConditionValue>;

/// A value inside a condition tree or a subject property map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum ConditionValue {
    /// Absent or explicit null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer number.
    Int(i64),
    /// Floating-point number.
    Double(f64),
    /// String.
    String(String),
    /// Ordered list.
    Array(Vec<ConditionValue>),
    /// Nested map (ordered by key).
    Map(BTreeMap<String, ConditionValue>),
}

impl ConditionValue {
    /// Name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConditionValue::Null => "null",
            ConditionValue::Bool(_) => "bool",
            ConditionValue::Int(_) => "int",
            ConditionValue::Double(_) => "double",
            ConditionValue::String(_) => "string",
            ConditionValue::Array(_) => "array",
            ConditionValue::Map(_) => "map",
        }
    }

    /// Check for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, ConditionValue::Null)
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConditionValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConditionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Read any numeric variant as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConditionValue::Int(i) => Some(*i as f64),
            ConditionValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Read an integer (doubles with no fractional part included).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConditionValue::Int(i) => Some(*i),
            ConditionValue::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            _ => None,
        }
    }

    /// Borrow as a list.
    pub fn as_array(&self) -> Option<&[ConditionValue]> {
        match self {
            ConditionValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, ConditionValue>> {
        match self {
            ConditionValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Check whether this value is a map made only of `$`-prefixed keys.
    pub fn is_operator_map(&self) -> bool {
        match self {
            ConditionValue::Map(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
            _ => false,
        }
    }

    /// Type-aware equality.
    ///
    /// Integers and doubles compare numerically (`1 == 1.0`); all other
    /// variants require the same kind. Arrays and maps compare element-wise
    /// with the same rules.
    pub fn loose_eq(&self, other: &ConditionValue) -> bool {
        match (self, other) {
            (ConditionValue::Int(a), ConditionValue::Int(b)) => a == b,
            (ConditionValue::Int(_), ConditionValue::Double(_))
            | (ConditionValue::Double(_), ConditionValue::Int(_))
            | (ConditionValue::Double(_), ConditionValue::Double(_)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            (ConditionValue::Array(a), ConditionValue::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (ConditionValue::Map(a), ConditionValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.loose_eq(w)).unwrap_or(false))
            }
            _ => self == other,
        }
    }

    /// Ordering between comparable values.
    ///
    /// Numbers order numerically and strings lexically. Any other pairing
    /// is incomparable and yields `None`.
    pub fn compare(&self, other: &ConditionValue) -> Option<Ordering> {
        match (self, other) {
            (ConditionValue::Int(a), ConditionValue::Int(b)) => Some(a.cmp(b)),
            (ConditionValue::String(a), ConditionValue::String(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Resolve a dotted path (`"author.id"`) inside this value.
    ///
    /// Numeric segments index into arrays (`"tags.0"`).
    pub fn get_path(&self, path: &str) -> Option<&ConditionValue> {
        let mut current = self;
        for segment in path.split('.') {
            current = match current {
                ConditionValue::Map(map) => map.get(segment)?,
                ConditionValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Resolve a dotted path against a property map.
///
/// A literal key containing dots wins over path traversal so that flat maps
/// with dotted keys keep working.
pub fn lookup_path<'a>(properties: &'a Properties, path: &str) -> Option<&'a ConditionValue> {
    if let Some(value) = properties.get(path) {
        return Some(value);
    }
    let (head, rest) = path.split_once('.')?;
    properties.get(head)?.get_path(rest)
}

impl From<serde_json::Value> for ConditionValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ConditionValue::Null,
            serde_json::Value::Bool(b) => ConditionValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ConditionValue::Int(i),
                None => n.as_f64().map(ConditionValue::Double).unwrap_or(ConditionValue::Null),
            },
            serde_json::Value::String(s) => ConditionValue::String(s),
            serde_json::Value::Array(items) => {
                ConditionValue::Array(items.into_iter().map(ConditionValue::from).collect())
            }
            serde_json::Value::Object(map) => ConditionValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, ConditionValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ConditionValue> for serde_json::Value {
    fn from(value: ConditionValue) -> Self {
        match value {
            ConditionValue::Null => serde_json::Value::Null,
            ConditionValue::Bool(b) => serde_json::Value::Bool(b),
            ConditionValue::Int(i) => serde_json::Value::from(i),
            // Non-finite doubles have no JSON form.
            ConditionValue::Double(d) => serde_json::Number::from_f64(d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ConditionValue::String(s) => serde_json::Value::String(s),
            ConditionValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            ConditionValue::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::String(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        ConditionValue::String(value)
    }
}

impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        ConditionValue::Bool(value)
    }
}

impl From<i64> for ConditionValue {
    fn from(value: i64) -> Self {
        ConditionValue::Int(value)
    }
}

impl From<i32> for ConditionValue {
    fn from(value: i32) -> Self {
        ConditionValue::Int(value.into())
    }
}

impl From<u32> for ConditionValue {
    fn from(value: u32) -> Self {
        ConditionValue::Int(value.into())
    }
}

impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        ConditionValue::Double(value)
    }
}

impl<T: Into<ConditionValue>> From<Vec<T>> for ConditionValue {
    fn from(value: Vec<T>) -> Self {
        ConditionValue::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, ConditionValue>> for ConditionValue {
    fn from(value: BTreeMap<String, ConditionValue>) -> Self {
        ConditionValue::Map(value)
    }
}

impl<T: Into<ConditionValue>> From<Option<T>> for ConditionValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ConditionValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_integer_and_double_apart() {
        assert_eq!(ConditionValue::from(json!(3)), ConditionValue::Int(3));
        assert_eq!(ConditionValue::from(json!(3.5)), ConditionValue::Double(3.5));
        assert_eq!(ConditionValue::from(json!(null)), ConditionValue::Null);
    }

    #[test]
    fn test_loose_eq_numeric() {
        assert!(ConditionValue::Int(1).loose_eq(&ConditionValue::Double(1.0)));
        assert!(!ConditionValue::Int(1).loose_eq(&ConditionValue::String("1".into())));
        assert!(ConditionValue::from(vec![1, 2]).loose_eq(&ConditionValue::from(vec![1.0, 2.0])));
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            ConditionValue::Int(2).compare(&ConditionValue::Double(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            ConditionValue::from("b").compare(&ConditionValue::from("a")),
            Some(Ordering::Greater)
        );
        assert_eq!(ConditionValue::from("1").compare(&ConditionValue::Int(1)), None);
        assert_eq!(ConditionValue::Bool(true).compare(&ConditionValue::Bool(false)), None);
    }

    #[test]
    fn test_lookup_path() {
        let props: Properties = match ConditionValue::from(json!({
            "author": { "id": "u1", "tags": ["a", "b"] },
            "flat.key": 1
        })) {
            ConditionValue::Map(map) => map,
            _ => unreachable!(),
        };

        assert_eq!(lookup_path(&props, "author.id"), Some(&ConditionValue::from("u1")));
        assert_eq!(lookup_path(&props, "author.tags.1"), Some(&ConditionValue::from("b")));
        assert_eq!(lookup_path(&props, "flat.key"), Some(&ConditionValue::Int(1)));
        assert_eq!(lookup_path(&props, "author.missing"), None);
    }

    #[test]
    fn test_operator_map_detection() {
        assert!(ConditionValue::from(json!({ "$gt": 1 })).is_operator_map());
        assert!(!ConditionValue::from(json!({ "$gt": 1, "name": "x" })).is_operator_map());
        assert!(!ConditionValue::from(json!({})).is_operator_map());
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn int_and_double_compare_alike(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let ints = ConditionValue::Int(a).compare(&ConditionValue::Int(b));
            let mixed = ConditionValue::Int(a).compare(&ConditionValue::Double(b as f64));
            prop_assert_eq!(ints, mixed);
            prop_assert_eq!(
                ConditionValue::Int(a).loose_eq(&ConditionValue::Double(b as f64)),
                a == b
            );
        }

        #[test]
        fn compare_is_antisymmetric(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
            let left = ConditionValue::from(a.as_str()).compare(&ConditionValue::from(b.as_str()));
            let right = ConditionValue::from(b.as_str()).compare(&ConditionValue::from(a.as_str()));
            prop_assert_eq!(left.map(Ordering::reverse), right);
        }

        #[test]
        fn strings_and_numbers_are_incomparable(s in "[a-z0-9]{0,8}", n in any::<i64>()) {
            prop_assert_eq!(ConditionValue::from(s.as_str()).compare(&ConditionValue::Int(n)), None);
            prop_assert!(!ConditionValue::from(s.as_str()).loose_eq(&ConditionValue::Int(n)));
        }
    }
}
