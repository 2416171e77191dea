//! Error types for rule decoding and validation
//!
//! Decode errors are always returned to the caller of the codec; a malformed
//! payload is never silently dropped or defaulted.

use thiserror::Error;

/// Rule model and codec errors.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Payload is not valid JSON or does not fit the rule schema
    #[error("Failed to decode rules: {0}")]
    Decode(#[from] serde_json::Error),

    /// A rule entry is missing a required field
    #[error("Rule #{index} is missing required field '{field}'")]
    MissingField {
        /// Position of the entry in its array.
        index: usize,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A rule entry carries a field with the wrong shape
    #[error("Rule #{index} has an invalid '{field}': {message}")]
    InvalidField {
        /// Position of the entry in its array.
        index: usize,
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong.
        message: String,
    },

    /// Payload is neither a rule array, a can/cannot object nor an envelope
    #[error("Unsupported rule payload: {0}")]
    UnsupportedPayload(String),

    /// Rule failed structural validation
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// `$regex` operand does not compile
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },
}

/// Result type for rule operations.
pub type RuleResult<T> = Result<T, RuleError>;

impl RuleError {
    /// Get a stable error code for API responses and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            RuleError::Decode(_) => "RULES_DECODE",
            RuleError::MissingField { .. } => "RULE_MISSING_FIELD",
            RuleError::InvalidField { .. } => "RULE_INVALID_FIELD",
            RuleError::UnsupportedPayload(_) => "RULES_UNSUPPORTED_PAYLOAD",
            RuleError::InvalidRule(_) => "RULE_INVALID",
            RuleError::InvalidPattern { .. } => "RULE_INVALID_PATTERN",
        }
    }
}
