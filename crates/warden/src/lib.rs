//! # Warden
//!
//! Rule-based authorization: given declarative permission rules, answer
//! "can this caller perform this action on this subject (or field)?".
//!
//! ## Overview
//!
//! The warden crate handles:
//! - **Evaluation**: MongoDB-style conditions checked against subjects
//! - **Engine**: rule matching, precedence and field permissions
//! - **Detection**: mapping application values to subject types
//! - **Fields**: permitted-field checks and property filtering
//! - **Ability**: the async façade with an explicit load state
//!
//! ## Architecture
//!
//! ```text
//! JSON rules ──decode──▶ Vec<Rule> ──▶ Ability ──▶ RuleEngine ──▶ ConditionEvaluator
//!                                        │             │
//!                                        │             └──▶ field permissions
//!                                        └──▶ TypedAbility (enum actions/subjects)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use serde_json::json;
//! use warden::{Ability, GenericSubject};
//! use warden_rules::{Conditions, Rule};
//!
//! let ability = Ability::new(vec![
//!     Rule::can("read", "Article"),
//!     Rule::can("update", "Article").with_conditions(Conditions::new().with("authorId", "u1")),
//!     Rule::cannot("delete", "Article").with_reason("Articles are append-only"),
//! ]);
//!
//! let article = GenericSubject::from_json("Article", json!({ "authorId": "u1" }));
//! assert_eq!(ability.try_can("update", &article), Some(true));
//! assert_eq!(ability.try_can("delete", &article), Some(false));
//! ```
//!
//! ## Precedence
//!
//! The highest-precedence matching rule decides. Priority comes first, then
//! forbids over grants, conditional over unconditional, rules with fields
//! over rules without, concrete subjects and actions over wildcards. Equal
//! rules are resolved by insertion order. No matching rule means deny.

pub mod ability;
pub mod aliases;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod fields;
pub mod subject;
pub mod typed;

// Re-export main types for convenience
pub use ability::{Ability, AbilityBuilder, LoadState};
pub use aliases::ActionAliases;
pub use config::AbilityOptions;
pub use detect::{detect_subject_type, Detectable, SubjectTypeDetector, TypeNameDetector};
pub use engine::{Decision, RuleEngine, Target};
pub use error::{AbilityError, AbilityResult};
pub use evaluator::ConditionEvaluator;
pub use subject::{GenericSubject, IdentifiableSubject, Subject};
pub use typed::{ActionKind, SubjectKind, TypedAbility};

pub use warden_rules;
