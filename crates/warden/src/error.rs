//! Error types for ability operations
//!
//! Only decode errors and explicit initialization failures reach callers.
//! Evaluation-time anomalies never surface here: they resolve to a deny
//! decision inside the engine.

use thiserror::Error;
use warden_rules::RuleError;

/// Ability error types.
#[derive(Debug, Error)]
pub enum AbilityError {
    /// Rule payload failed to decode or a rule failed validation
    #[error(transparent)]
    Rules(#[from] RuleError),

    /// Ingesting the rule set failed; the ability is in the failed state
    #[error("Ability initialization failed: {0}")]
    Initialization(String),

    /// The action is not permitted
    #[error("Cannot {action} {subject}{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Forbidden {
        /// Requested action.
        action: String,
        /// Requested subject type.
        subject: String,
        /// Reason from the forbidding rule, if any.
        reason: Option<String>,
    },

    /// A value could not be converted into subject properties
    #[error("Subject serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No detector produced a subject type for the value
    #[error("Could not detect subject type for {0}")]
    UndetectedSubject(String),

    /// Options are inconsistent (e.g. a cyclic action alias)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for ability operations.
pub type AbilityResult<T> = Result<T, AbilityError>;

impl AbilityError {
    /// Check if this error denies access (as opposed to a setup problem).
    pub fn is_forbidden(&self) -> bool {
        matches!(self, AbilityError::Forbidden { .. })
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AbilityError::Rules(e) => e.error_code(),
            AbilityError::Initialization(_) => "ABILITY_INIT_FAILED",
            AbilityError::Forbidden { .. } => "FORBIDDEN",
            AbilityError::Serialization(_) => "SUBJECT_SERIALIZATION",
            AbilityError::UndetectedSubject(_) => "SUBJECT_UNDETECTED",
            AbilityError::Config(_) => "CONFIG_ERROR",
        }
    }
}
