//! # Subject Type Detection
//!
//! Maps arbitrary application values to a [`SubjectType`]. The default
//! strategy uses the value's self-reported type when it implements
//! [`Subject`], and its Rust type name otherwise. Detectors are pure
//! functions of their input: they take `&self`, hold no interior
//! mutability, and never modify the value.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use warden_rules::SubjectType;

use crate::subject::Subject;

/// The view of a value that detectors inspect.
pub struct Detectable<'a> {
    type_name: &'static str,
    value: &'a dyn Any,
    reported: Option<SubjectType>,
}

impl<'a> Detectable<'a> {
    /// Wrap any value. No self-reported type is available.
    pub fn new<T: Any>(value: &'a T) -> Self {
        Self {
            type_name: type_name::<T>(),
            value,
            reported: None,
        }
    }

    /// Wrap a value that reports its own subject type.
    pub fn from_subject<T: Subject + Any>(value: &'a T) -> Self {
        Self {
            type_name: type_name::<T>(),
            value,
            reported: Some(value.subject_type()),
        }
    }

    /// Fully qualified Rust type name of the value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The value, for downcasting.
    pub fn value(&self) -> &'a dyn Any {
        self.value
    }

    /// The subject type the value reports for itself, if any.
    pub fn reported(&self) -> Option<&SubjectType> {
        self.reported.as_ref()
    }
}

impl fmt::Debug for Detectable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detectable")
            .field("type_name", &self.type_name)
            .field("reported", &self.reported)
            .finish()
    }
}

/// Strategy mapping a value to its subject type.
pub trait SubjectTypeDetector: Send + Sync {
    /// Detect the subject type, or `None` if this strategy does not apply.
    fn detect(&self, input: &Detectable<'_>) -> Option<SubjectType>;
}

impl<F> SubjectTypeDetector for F
where
    F: Fn(&Detectable<'_>) -> Option<SubjectType> + Send + Sync,
{
    fn detect(&self, input: &Detectable<'_>) -> Option<SubjectType> {
        self(input)
    }
}

/// Shorten a Rust type name to its last path segment.
///
/// `my_app::models::Article` → `Article`,
/// `alloc::vec::Vec<my_app::Tag>` → `Vec`, `&my_app::Article` → `Article`.
pub fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    let base = base.trim_start_matches('&').trim_start_matches("mut ");
    base.rsplit("::").next().unwrap_or(base)
}

/// Default detector: self-reported type, else the concrete type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeNameDetector {
    /// Strip module path and generic arguments from the type name.
    pub strip_module_prefix: bool,
}

impl Default for TypeNameDetector {
    fn default() -> Self {
        Self {
            strip_module_prefix: true,
        }
    }
}

impl TypeNameDetector {
    /// Create a detector.
    pub fn new(strip_module_prefix: bool) -> Self {
        Self { strip_module_prefix }
    }
}

impl SubjectTypeDetector for TypeNameDetector {
    fn detect(&self, input: &Detectable<'_>) -> Option<SubjectType> {
        if let Some(reported) = input.reported() {
            return Some(reported.clone());
        }
        let name = if self.strip_module_prefix {
            short_type_name(input.type_name())
        } else {
            input.type_name()
        };
        (!name.is_empty()).then(|| SubjectType::new(name))
    }
}

/// Detector bound to one root type, reading the type through an extractor.
///
/// ```
/// use warden::detect::{Detectable, ExtractorDetector, SubjectTypeDetector};
/// use warden_rules::SubjectType;
///
/// struct Record {
///     kind: String,
/// }
///
/// let detector = ExtractorDetector::new(|r: &Record| Some(SubjectType::new(r.kind.clone())));
/// let record = Record { kind: "Invoice".to_string() };
///
/// assert_eq!(detector.detect(&Detectable::new(&record)), Some(SubjectType::new("Invoice")));
/// assert_eq!(detector.detect(&Detectable::new(&42)), None);
/// ```
pub struct ExtractorDetector<T> {
    extract: Box<dyn Fn(&T) -> Option<SubjectType> + Send + Sync>,
    _root: PhantomData<fn(&T)>,
}

impl<T: Any> ExtractorDetector<T> {
    /// Create a detector from an extractor closure.
    pub fn new<F>(extract: F) -> Self
    where
        F: Fn(&T) -> Option<SubjectType> + Send + Sync + 'static,
    {
        Self {
            extract: Box::new(extract),
            _root: PhantomData,
        }
    }

    /// Create a detector reading a string-like key of the root type.
    pub fn from_key<F, S>(key: F) -> Self
    where
        F: Fn(&T) -> S + Send + Sync + 'static,
        S: AsRef<str>,
    {
        Self::new(move |root| {
            let name = key(root);
            let name = name.as_ref().trim();
            (!name.is_empty()).then(|| SubjectType::new(name))
        })
    }
}

impl<T: Any> SubjectTypeDetector for ExtractorDetector<T> {
    fn detect(&self, input: &Detectable<'_>) -> Option<SubjectType> {
        input.value().downcast_ref::<T>().and_then(|root| (self.extract)(root))
    }
}

impl<T> fmt::Debug for ExtractorDetector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorDetector")
            .field("root", &type_name::<T>())
            .finish()
    }
}

/// Tries several detectors in order; the first non-`None` result wins.
#[derive(Default)]
pub struct CompositeDetector {
    detectors: Vec<Box<dyn SubjectTypeDetector>>,
}

impl CompositeDetector {
    /// Create an empty composite (detects nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a detector, builder style.
    pub fn with(mut self, detector: impl SubjectTypeDetector + 'static) -> Self {
        self.detectors.push(Box::new(detector));
        self
    }

    /// Number of detectors.
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

impl SubjectTypeDetector for CompositeDetector {
    fn detect(&self, input: &Detectable<'_>) -> Option<SubjectType> {
        self.detectors.iter().find_map(|d| d.detect(input))
    }
}

impl fmt::Debug for CompositeDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeDetector")
            .field("detectors", &self.detectors.len())
            .finish()
    }
}

/// Matches type-name substrings against an ordered predicate list.
#[derive(Debug, Clone, Default)]
pub struct PredicateDetector {
    predicates: Vec<(String, SubjectType)>,
}

impl PredicateDetector {
    /// Create an empty predicate list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map type names containing `needle` to `subject_type`.
    pub fn when_contains(mut self, needle: impl Into<String>, subject_type: impl Into<SubjectType>) -> Self {
        self.predicates.push((needle.into(), subject_type.into()));
        self
    }
}

impl SubjectTypeDetector for PredicateDetector {
    fn detect(&self, input: &Detectable<'_>) -> Option<SubjectType> {
        let name = input.type_name();
        self.predicates
            .iter()
            .find(|(needle, _)| name.contains(needle.as_str()))
            .map(|(_, subject_type)| subject_type.clone())
    }
}

/// Detect a value's subject type with the default strategy.
pub fn detect_subject_type<T: Any>(value: &T) -> Option<SubjectType> {
    TypeNameDetector::default().detect(&Detectable::new(value))
}
