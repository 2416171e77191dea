//! # Field Permissions
//!
//! Checks individual field paths against a permitted-field set and filters
//! property maps down to what a caller may see.
//!
//! A permitted set of `None` means "no restriction". Entries are field
//! paths with optional wildcards:
//!
//! ```text
//! "title"        the title field
//! "address"      the address field and everything below it
//! "address.*"    every field below address (not address itself)
//! "*"            every field
//! ```
//!
//! Only [`ConditionValue::Map`] values are traversed; scalars and arrays are
//! always leaves, so filtering terminates on any input.

use std::collections::BTreeSet;
use warden_rules::{ConditionValue, Properties};

use crate::subject::Subject;

/// Check if a single permitted-field pattern covers `field`.
///
/// # Example
///
/// ```
/// use warden::fields::field_pattern_matches;
///
/// assert!(field_pattern_matches("title", "title"));
/// assert!(field_pattern_matches("address", "address.city"));
/// assert!(field_pattern_matches("address.*", "address.geo.lat"));
/// assert!(!field_pattern_matches("address.*", "address"));
/// assert!(!field_pattern_matches("address", "addresses"));
/// ```
pub fn field_pattern_matches(pattern: &str, field: &str) -> bool {
    if pattern == "*" || pattern == field {
        return true;
    }
    if let Some(parent) = pattern.strip_suffix(".*") {
        return is_descendant(parent, field);
    }
    is_descendant(pattern, field)
}

fn is_descendant(parent: &str, path: &str) -> bool {
    path.len() > parent.len() + 1 && path.starts_with(parent) && path.as_bytes()[parent.len()] == b'.'
}

/// Check a field against a permitted set by exact name.
///
/// `None` (unrestricted) permits every field.
pub fn can_access_field(field: &str, permitted: Option<&BTreeSet<String>>) -> bool {
    match permitted {
        None => true,
        Some(set) => set.contains(field),
    }
}

/// Check a (possibly nested) field path against a permitted set, honouring
/// wildcard suffixes and permitted parents.
pub fn can_access_path(path: &str, permitted: Option<&BTreeSet<String>>) -> bool {
    match permitted {
        None => true,
        Some(set) => set.iter().any(|pattern| field_pattern_matches(pattern, path)),
    }
}

/// Check if any permitted entry reaches strictly below `path`.
fn has_permitted_descendant(path: &str, permitted: &BTreeSet<String>) -> bool {
    permitted.iter().any(|pattern| match pattern.strip_suffix(".*") {
        Some(parent) => parent == path || is_descendant(path, parent),
        None => is_descendant(path, pattern),
    })
}

/// Filter a property map down to the permitted fields.
///
/// Fields granted as a whole (directly, by a parent or by a wildcard) are
/// copied with their entire subtree. Nested maps that are not granted as a
/// whole are only entered when some permitted entry points inside them, and
/// are dropped if nothing inside survives.
///
/// # Example
///
/// ```
/// use std::collections::BTreeSet;
/// use serde_json::json;
/// use warden::fields::filter_fields;
/// use warden_rules::ConditionValue;
///
/// let ConditionValue::Map(properties) = ConditionValue::from(json!({
///     "title": "Hello",
///     "secret": "s3cr3t",
///     "address": { "city": "Oslo", "street": "Main" }
/// })) else { unreachable!() };
///
/// let permitted: BTreeSet<String> = ["title", "address.city"].map(String::from).into();
/// let filtered = filter_fields(&properties, Some(&permitted));
///
/// assert_eq!(
///     serde_json::Value::from(ConditionValue::Map(filtered)),
///     json!({ "title": "Hello", "address": { "city": "Oslo" } })
/// );
/// ```
pub fn filter_fields(properties: &Properties, permitted: Option<&BTreeSet<String>>) -> Properties {
    match permitted {
        None => properties.clone(),
        Some(set) => filter_map(properties, "", set),
    }
}

/// Filter a subject's properties down to the permitted fields.
pub fn filter_subject(subject: &dyn Subject, permitted: Option<&BTreeSet<String>>) -> Properties {
    filter_fields(&subject.properties(), permitted)
}

/// Remove forbidden fields (same pattern syntax as permitted sets) from a
/// property map. Nested maps left empty are kept.
pub fn strip_fields(properties: &Properties, forbidden: &BTreeSet<String>) -> Properties {
    if forbidden.is_empty() {
        return properties.clone();
    }
    strip_map(properties, "", forbidden)
}

fn strip_map(map: &Properties, prefix: &str, forbidden: &BTreeSet<String>) -> Properties {
    let mut out = Properties::new();
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if can_access_path(&path, Some(forbidden)) {
            continue;
        }
        match value {
            ConditionValue::Map(child) if has_permitted_descendant(&path, forbidden) => {
                out.insert(key.clone(), ConditionValue::Map(strip_map(child, &path, forbidden)));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

fn filter_map(map: &Properties, prefix: &str, permitted: &BTreeSet<String>) -> Properties {
    let mut out = Properties::new();
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if can_access_path(&path, Some(permitted)) {
            out.insert(key.clone(), value.clone());
            continue;
        }

        if let ConditionValue::Map(child) = value {
            if has_permitted_descendant(&path, permitted) {
                let filtered = filter_map(child, &path, permitted);
                if !filtered.is_empty() {
                    out.insert(key.clone(), ConditionValue::Map(filtered));
                }
            }
        }
    }
    out
}
