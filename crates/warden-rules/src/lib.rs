//! # Warden Rules
//!
//! The permission rule model shared by every Warden consumer, plus the JSON
//! codec for the CASL-compatible rule schema.
//!
//! ## Overview
//!
//! The warden-rules crate handles:
//! - **Actions**: case-insensitive operation tokens with `manage`/`all` wildcards
//! - **Subject Types**: entity class tokens with `all`/`any` wildcards
//! - **Conditions**: MongoDB-style condition trees over a closed value type
//! - **Rules**: immutable grant/forbid statements with fields, reason and priority
//! - **Codec**: decoding/encoding of rule arrays and permission set envelopes
//!
//! ## Architecture
//!
//! ```text
//! Rule = Action + SubjectType [+ Conditions] [+ Fields] [+ Reason], inverted?, priority
//!
//! Examples:
//!   can read Article
//!   can update Article where { authorId: "u1" }
//!   cannot delete Article                 "Articles are append-only"
//!   can manage all
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use warden_rules::{codec, Conditions, Rule};
//!
//! let rules = vec![
//!     Rule::can("read", "Article"),
//!     Rule::can("update", "Article").with_conditions(Conditions::new().with("authorId", "u1")),
//! ];
//!
//! let json = codec::encode_rules(&rules);
//! let decoded = codec::decode_value(json).unwrap();
//! assert_eq!(decoded, rules);
//! ```
//!
//! Evaluation (matching rules against subjects) lives in the `warden` crate.

pub mod action;
pub mod codec;
pub mod conditions;
pub mod error;
pub mod rule;
pub mod subject;
pub mod value;

// Re-export main types for convenience
pub use action::Action;
pub use codec::PermissionSet;
pub use conditions::Conditions;
pub use error::{RuleError, RuleResult};
pub use rule::Rule;
pub use subject::SubjectType;
pub use value::{lookup_path, ConditionValue, Properties};
