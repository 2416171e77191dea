//! # Subjects
//!
//! The capability the engine evaluates rules against. Application types
//! implement [`Subject`] deliberately; [`GenericSubject`] and
//! [`IdentifiableSubject`] wrap dictionary-shaped data, and
//! [`GenericSubject::from_serializable`] is the structural fallback for
//! opaque values that only implement `Serialize`.

use serde::Serialize;
use std::any::Any;
use warden_rules::{lookup_path, ConditionValue, Properties, SubjectType};

use crate::detect::{Detectable, SubjectTypeDetector};
use crate::error::{AbilityError, AbilityResult};

/// Anything a rule can be checked against.
///
/// # Example
///
/// ```
/// use warden::Subject;
/// use warden_rules::{Properties, SubjectType};
///
/// struct Article {
///     id: String,
///     author_id: String,
///     published: bool,
/// }
///
/// impl Subject for Article {
///     fn subject_type(&self) -> SubjectType {
///         SubjectType::new("Article")
///     }
///
///     fn properties(&self) -> Properties {
///         Properties::from([
///             ("id".to_string(), self.id.clone().into()),
///             ("authorId".to_string(), self.author_id.clone().into()),
///             ("published".to_string(), self.published.into()),
///         ])
///     }
///
///     fn id(&self) -> Option<String> {
///         Some(self.id.clone())
///     }
/// }
/// ```
pub trait Subject: Send + Sync {
    /// The subject type tag rules are matched against.
    fn subject_type(&self) -> SubjectType;

    /// The subject's properties as name → value pairs.
    fn properties(&self) -> Properties;

    /// Identifier, for identifiable entities.
    fn id(&self) -> Option<String> {
        None
    }

    /// Read one property; dotted paths walk nested maps.
    ///
    /// The default builds the full property map; override it when that is
    /// expensive.
    fn property(&self, path: &str) -> Option<ConditionValue> {
        lookup_path(&self.properties(), path).cloned()
    }
}

/// Property names checked (in order) when inferring a type tag.
pub const TYPE_TAG_KEYS: &[&str] = &["__typename", "__type"];

/// A subject backed by a property map.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericSubject {
    subject_type: SubjectType,
    properties: Properties,
}

impl GenericSubject {
    /// Create a subject with an explicit type tag.
    pub fn new(subject_type: impl Into<SubjectType>, properties: Properties) -> Self {
        Self {
            subject_type: subject_type.into(),
            properties,
        }
    }

    /// Create a subject whose type tag is read from the properties
    /// (`__typename`, then `__type`).
    ///
    /// Returns `None` when no tag property holds a non-empty string.
    pub fn inferred(properties: Properties) -> Option<Self> {
        let subject_type = TYPE_TAG_KEYS
            .iter()
            .filter_map(|key| properties.get(*key).and_then(ConditionValue::as_str))
            .find(|tag| !tag.trim().is_empty())
            .map(SubjectType::new)?;
        Some(Self {
            subject_type,
            properties,
        })
    }

    /// Create a subject from a JSON object.
    ///
    /// Non-object values produce a subject with no properties.
    pub fn from_json(subject_type: impl Into<SubjectType>, value: serde_json::Value) -> Self {
        let properties = match ConditionValue::from(value) {
            ConditionValue::Map(map) => map,
            _ => Properties::new(),
        };
        Self::new(subject_type, properties)
    }

    /// Build a subject from any serializable value.
    ///
    /// Properties come from the value's serde representation; the type tag
    /// comes from `detector`.
    pub fn from_serializable<T>(value: &T, detector: &dyn SubjectTypeDetector) -> AbilityResult<Self>
    where
        T: Serialize + Any,
    {
        let detectable = Detectable::new(value);
        let subject_type = detector
            .detect(&detectable)
            .ok_or_else(|| AbilityError::UndetectedSubject(detectable.type_name().to_string()))?;
        Ok(Self::from_json(subject_type, serde_json::to_value(value)?))
    }

    /// Add a property, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attach an identifier.
    pub fn identified(self, id: impl Into<String>) -> IdentifiableSubject {
        IdentifiableSubject::new(id, self)
    }

    /// Borrow the property map.
    pub fn as_properties(&self) -> &Properties {
        &self.properties
    }
}

impl Subject for GenericSubject {
    fn subject_type(&self) -> SubjectType {
        self.subject_type.clone()
    }

    fn properties(&self) -> Properties {
        self.properties.clone()
    }

    fn property(&self, path: &str) -> Option<ConditionValue> {
        lookup_path(&self.properties, path).cloned()
    }
}

/// A [`GenericSubject`] with an identifier.
///
/// The identifier is also visible to conditions as the `id` property unless
/// the wrapped properties already define one.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiableSubject {
    id: String,
    inner: GenericSubject,
}

impl IdentifiableSubject {
    /// Wrap `inner` with an identifier.
    pub fn new(id: impl Into<String>, inner: GenericSubject) -> Self {
        Self {
            id: id.into(),
            inner,
        }
    }

    /// The identifier.
    pub fn id_str(&self) -> &str {
        &self.id
    }

    /// The wrapped subject.
    pub fn inner(&self) -> &GenericSubject {
        &self.inner
    }
}

impl Subject for IdentifiableSubject {
    fn subject_type(&self) -> SubjectType {
        self.inner.subject_type()
    }

    fn properties(&self) -> Properties {
        let mut properties = self.inner.properties();
        properties
            .entry("id".to_string())
            .or_insert_with(|| ConditionValue::String(self.id.clone()));
        properties
    }

    fn id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn property(&self, path: &str) -> Option<ConditionValue> {
        match self.inner.property(path) {
            None if path == "id" => Some(ConditionValue::String(self.id.clone())),
            found => found,
        }
    }
}
