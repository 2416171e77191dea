//! # Rule JSON Codec
//!
//! Encodes and decodes the rule schema shared with the CASL JavaScript
//! library, so permission sets computed by the backend can be consumed on
//! either side without transformation.
//!
//! ## Wire format
//!
//! ```json
//! [
//!   { "action": "read", "subject": "Article" },
//!   { "action": ["create", "update"], "subject": "Article",
//!     "conditions": { "authorId": "${userId}" } },
//!   { "action": "delete", "subject": "Article", "inverted": true,
//!     "reason": "Articles are append-only" },
//!   { "action": "moderate" }
//! ]
//! ```
//!
//! Three payload shapes are accepted on decode:
//! - a bare rule array (inverted rules flagged inline with `"inverted": true`)
//! - a split object `{ "can": [...], "cannot": [...] }`
//! - a [`PermissionSet`] envelope `{ "version", "metadata", "rules" }`
//!   whose `rules` is either of the above
//!
//! `priority` is internal and never appears on the wire; decoded rules
//! always have priority 0.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::conditions::Conditions;
use crate::error::{RuleError, RuleResult};
use crate::rule::Rule;
use crate::subject::SubjectType;

/// A string or an array of strings, as used by `action`, `subject` and
/// `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }

    fn from_vec(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            OneOrMany::One(values.remove(0))
        } else {
            OneOrMany::Many(values)
        }
    }
}

/// One entry of the wire format.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct RawRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conditions: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "is_false")]
    inverted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Rules plus provenance, as exchanged at the JSON boundary.
///
/// The envelope is not retained by the engine: callers hand
/// [`PermissionSet::rules`] to an ability and keep (or drop) the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionSet {
    /// Version tag of the rule set.
    pub version: String,
    /// Free-form metadata (e.g. who computed the rules and when).
    pub metadata: Option<serde_json::Value>,
    /// The rules.
    pub rules: Vec<Rule>,
}

impl PermissionSet {
    /// Version assigned when a payload does not carry one.
    pub const DEFAULT_VERSION: &'static str = "1";

    /// Create an envelope around `rules`.
    pub fn new(version: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            version: version.into(),
            metadata: None,
            rules,
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Decode an envelope, a bare rule array or a split can/cannot object.
    pub fn from_json(json: &str) -> RuleResult<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Decode from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> RuleResult<Self> {
        match value {
            serde_json::Value::Object(mut map) if map.contains_key("rules") => {
                let version = match map.remove("version") {
                    None | Some(serde_json::Value::Null) => Self::DEFAULT_VERSION.to_string(),
                    Some(serde_json::Value::String(v)) => v,
                    Some(serde_json::Value::Number(n)) => n.to_string(),
                    Some(other) => {
                        return Err(RuleError::UnsupportedPayload(format!(
                            "envelope version must be a string, got {}",
                            json_kind(&other)
                        )))
                    }
                };
                let metadata = map.remove("metadata").filter(|m| !m.is_null());
                let rules = map
                    .remove("rules")
                    .map(decode_value)
                    .transpose()?
                    .unwrap_or_default();
                Ok(Self {
                    version,
                    metadata,
                    rules,
                })
            }
            other => Ok(Self::new(Self::DEFAULT_VERSION, decode_value(other)?)),
        }
    }

    /// Encode as an envelope with an inline-`inverted` rule array.
    pub fn to_value(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("version".to_string(), serde_json::Value::String(self.version.clone()));
        if let Some(metadata) = &self.metadata {
            map.insert("metadata".to_string(), metadata.clone());
        }
        map.insert("rules".to_string(), encode_rules(&self.rules));
        serde_json::Value::Object(map)
    }

    /// Encode as a JSON string.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

/// Decode rules from a JSON string.
///
/// Accepts every shape [`PermissionSet::from_json`] accepts and returns only
/// the rules.
///
/// # Example
///
/// ```
/// use warden_rules::codec::decode_rules;
///
/// let rules = decode_rules(r#"[
///     { "action": ["create", "update"], "subject": "Article" },
///     { "action": "delete", "subject": "Article", "inverted": true }
/// ]"#).unwrap();
///
/// assert_eq!(rules.len(), 3);
/// assert!(rules[2].is_inverted());
/// ```
pub fn decode_rules(json: &str) -> RuleResult<Vec<Rule>> {
    Ok(PermissionSet::from_json(json)?.rules)
}

/// Decode rules from a parsed JSON array or split can/cannot object.
///
/// Envelopes are accepted too; their metadata is discarded.
pub fn decode_value(value: serde_json::Value) -> RuleResult<Vec<Rule>> {
    match value {
        serde_json::Value::Array(entries) => decode_entries(entries, false),
        serde_json::Value::Object(mut map) if map.contains_key("can") || map.contains_key("cannot") => {
            let mut rules = Vec::new();
            for (key, inverted) in [("can", false), ("cannot", true)] {
                match map.remove(key) {
                    None | Some(serde_json::Value::Null) => {}
                    Some(serde_json::Value::Array(entries)) => {
                        rules.extend(decode_entries(entries, inverted)?)
                    }
                    Some(other) => {
                        return Err(RuleError::UnsupportedPayload(format!(
                            "'{}' must be an array, got {}",
                            key,
                            json_kind(&other)
                        )))
                    }
                }
            }
            Ok(rules)
        }
        serde_json::Value::Object(map) if map.contains_key("rules") => {
            Ok(PermissionSet::from_value(serde_json::Value::Object(map))?.rules)
        }
        other => Err(RuleError::UnsupportedPayload(format!(
            "expected a rule array, got {}",
            json_kind(&other)
        ))),
    }
}

fn decode_entries(entries: Vec<serde_json::Value>, inverted: bool) -> RuleResult<Vec<Rule>> {
    let mut rules = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        if !entry.is_object() {
            return Err(RuleError::InvalidField {
                index,
                field: "rule",
                message: format!("expected an object, got {}", json_kind(&entry)),
            });
        }
        let raw: RawRule = serde_json::from_value(entry).map_err(|e| RuleError::InvalidField {
            index,
            field: "rule",
            message: e.to_string(),
        })?;
        rules.extend(expand(index, raw, inverted)?);
    }
    Ok(rules)
}

/// Expand one wire entry into one rule per (subject, action) pair.
fn expand(index: usize, raw: RawRule, inverted: bool) -> RuleResult<Vec<Rule>> {
    let actions = raw
        .action
        .ok_or(RuleError::MissingField { index, field: "action" })?
        .into_vec();
    if actions.is_empty() || actions.iter().any(|a| a.trim().is_empty()) {
        return Err(RuleError::InvalidField {
            index,
            field: "action",
            message: "actions must be non-empty strings".to_string(),
        });
    }

    // No subject means a claim rule, which applies regardless of subject.
    let subjects = match raw.subject {
        None => vec![SubjectType::ALL.to_string()],
        Some(s) => s.into_vec(),
    };
    if subjects.is_empty() || subjects.iter().any(|s| s.trim().is_empty()) {
        return Err(RuleError::InvalidField {
            index,
            field: "subject",
            message: "subjects must be non-empty strings".to_string(),
        });
    }

    let conditions = match raw.conditions {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => Some(Conditions::from_json(value).ok_or_else(|| RuleError::InvalidField {
            index,
            field: "conditions",
            message: "expected an object".to_string(),
        })?),
    };

    let fields = raw.fields.map(OneOrMany::into_vec);
    let inverted = inverted || raw.inverted;

    let mut rules = Vec::with_capacity(subjects.len() * actions.len());
    for subject in &subjects {
        for action in &actions {
            let mut rule = Rule::new(Action::new(action), SubjectType::new(subject.clone()), inverted);
            if let Some(conditions) = &conditions {
                rule = rule.with_conditions(conditions.clone());
            }
            if let Some(fields) = &fields {
                rule = rule.with_fields(fields.iter().cloned());
            }
            if let Some(reason) = &raw.reason {
                rule = rule.with_reason(reason.clone());
            }
            rules.push(rule);
        }
    }
    Ok(rules)
}

/// Encode rules as a JSON array with inline `inverted` flags.
///
/// Adjacent rules that differ only in action are collapsed into one entry
/// with an action array; adjacent entries that then differ only in subject
/// are collapsed into a subject array. Priority is dropped.
pub fn encode_rules(rules: &[Rule]) -> serde_json::Value {
    let entries = collapse(rules, true);
    serde_json::to_value(entries).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
}

/// Encode rules as a split `{ "can": [...], "cannot": [...] }` object.
pub fn encode_split(rules: &[Rule]) -> serde_json::Value {
    let (forbid, grant): (Vec<Rule>, Vec<Rule>) = rules.iter().cloned().partition(Rule::is_inverted);
    serde_json::json!({
        "can": serde_json::to_value(collapse(&grant, false)).unwrap_or_default(),
        "cannot": serde_json::to_value(collapse(&forbid, false)).unwrap_or_default(),
    })
}

fn collapse(rules: &[Rule], inline_inverted: bool) -> Vec<RawRule> {
    let mut by_action: Vec<(String, Vec<String>, RawRule)> = Vec::new();
    for rule in rules {
        let shape = RawRule {
            action: None,
            subject: None,
            conditions: rule.conditions().map(Conditions::to_json),
            fields: rule.fields().map(|f| OneOrMany::from_vec(f.to_vec())),
            inverted: inline_inverted && rule.is_inverted(),
            reason: rule.reason().map(str::to_string),
        };
        let subject = rule.subject().as_str().to_string();
        match by_action.last_mut() {
            Some((last_subject, actions, last_shape))
                if *last_subject == subject && *last_shape == shape =>
            {
                actions.push(rule.action().to_string());
            }
            _ => by_action.push((subject, vec![rule.action().to_string()], shape)),
        }
    }

    let mut by_subject: Vec<(Vec<String>, Vec<String>, RawRule)> = Vec::new();
    for (subject, actions, shape) in by_action {
        match by_subject.last_mut() {
            Some((subjects, last_actions, last_shape))
                if *last_actions == actions && *last_shape == shape =>
            {
                subjects.push(subject);
            }
            _ => by_subject.push((vec![subject], actions, shape)),
        }
    }

    by_subject
        .into_iter()
        .map(|(subjects, actions, shape)| RawRule {
            action: Some(OneOrMany::from_vec(actions)),
            subject: Some(OneOrMany::from_vec(subjects)),
            ..shape
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
