//! Error types for the transaction execution core
//!
//! This module defines the error taxonomy surfaced to callers of the
//! transaction layer and the structured outcome attached to each error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Severity of a structured outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// Structured outcome attached to every error surfaced by the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub severity: Severity,
    /// Short machine-readable code
    pub code: String,
    /// Human-readable description
    pub text: String,
    /// Path expressions identifying offending fields, e.g. `Patient.foo`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression: Vec<String>,
}

/// Canonical PostgreSQL message for a session in the aborted-block state
pub const ABORTED_BLOCK_TEXT: &str =
    "current transaction is aborted, commands ignored until end of transaction block";

#[derive(Error, Debug)]
pub enum CarehausError {
    #[error("Validation failed: {text}")]
    Validation {
        text: String,
        expression: Vec<String>,
    },

    #[error("Not found: {text}")]
    NotFound { text: String },

    #[error("Conflict: {text}")]
    UniqueConflict { text: String },

    #[error("Serialization conflict: {text}")]
    SerializationConflict { text: String },

    #[error("Transaction aborted: {text}")]
    TransactionAborted { text: String },

    #[error("Connection lost: {text}")]
    ConnectionLost { text: String },

    #[error("Internal error: {text}")]
    Internal { text: String },
}

impl CarehausError {
    /// Create a validation error with offending path expressions
    pub fn validation(text: impl Into<String>, expression: Vec<String>) -> Self {
        Self::Validation {
            text: text.into(),
            expression,
        }
    }

    /// Create a not-found error
    pub fn not_found(resource_type: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            text: format!("{}/{} not found", resource_type, id),
        }
    }

    /// Create a conflict error
    pub fn conflict(text: impl Into<String>) -> Self {
        Self::UniqueConflict { text: text.into() }
    }

    /// Create a serialization conflict error
    pub fn serialization_conflict(text: impl Into<String>) -> Self {
        Self::SerializationConflict { text: text.into() }
    }

    /// Create a transaction-aborted error with the canonical session message
    pub fn aborted() -> Self {
        Self::TransactionAborted {
            text: ABORTED_BLOCK_TEXT.to_string(),
        }
    }

    /// Create a connection-lost error
    pub fn connection_lost(text: impl Into<String>) -> Self {
        Self::ConnectionLost { text: text.into() }
    }

    /// Create an internal error
    pub fn internal(text: impl Into<String>) -> Self {
        Self::Internal { text: text.into() }
    }

    /// Short machine code for the structured outcome
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "invalid",
            Self::NotFound { .. } => "not-found",
            Self::UniqueConflict { .. } => "conflict",
            Self::SerializationConflict { .. } => "serialization-conflict",
            Self::TransactionAborted { .. } => "aborted",
            Self::ConnectionLost { .. } => "connection-lost",
            Self::Internal { .. } => "internal",
        }
    }

    /// Outcome severity for this error
    pub fn severity(&self) -> Severity {
        match self {
            Self::ConnectionLost { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Render the structured outcome surfaced to callers
    pub fn outcome(&self) -> Outcome {
        let expression = match self {
            Self::Validation { expression, .. } => expression.clone(),
            _ => Vec::new(),
        };
        let text = match self {
            Self::Validation { text, .. }
            | Self::NotFound { text }
            | Self::UniqueConflict { text }
            | Self::SerializationConflict { text }
            | Self::TransactionAborted { text }
            | Self::ConnectionLost { text }
            | Self::Internal { text } => text.clone(),
        };
        Outcome {
            severity: self.severity(),
            code: self.code().to_string(),
            text,
            expression,
        }
    }

    /// Check if the failed transaction is worth retrying from scratch
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SerializationConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_codes() {
        let cases: Vec<(CarehausError, &str)> = vec![
            (CarehausError::validation("bad", vec![]), "invalid"),
            (CarehausError::not_found("Patient", "x"), "not-found"),
            (CarehausError::conflict("dup"), "conflict"),
            (
                CarehausError::serialization_conflict("ssi"),
                "serialization-conflict",
            ),
            (CarehausError::aborted(), "aborted"),
            (CarehausError::connection_lost("io"), "connection-lost"),
            (CarehausError::internal("boom"), "internal"),
        ];

        for (err, code) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.outcome().code, code);
        }
    }

    #[test]
    fn test_validation_outcome_carries_expression() {
        let err = CarehausError::validation(
            "Invalid additional property \"foo\"",
            vec!["Patient.foo".to_string()],
        );
        let outcome = err.outcome();
        assert_eq!(outcome.severity, Severity::Error);
        assert_eq!(outcome.text, "Invalid additional property \"foo\"");
        assert_eq!(outcome.expression, vec!["Patient.foo".to_string()]);
    }

    #[test]
    fn test_connection_lost_is_fatal() {
        assert_eq!(
            CarehausError::connection_lost("io").severity(),
            Severity::Fatal
        );
    }

    #[test]
    fn test_only_serialization_conflict_is_retryable() {
        assert!(CarehausError::serialization_conflict("ssi").is_retryable());
        assert!(!CarehausError::aborted().is_retryable());
        assert!(!CarehausError::conflict("dup").is_retryable());
    }

    #[test]
    fn test_aborted_uses_canonical_text() {
        let outcome = CarehausError::aborted().outcome();
        assert_eq!(outcome.text, ABORTED_BLOCK_TEXT);
    }
}
