//! Driver error classification
//!
//! Translates sqlx errors into the core error taxonomy. Classification is by
//! SQLSTATE where the engine provides one; connectivity failures are mapped
//! before any database-level inspection.

use crate::errors::CarehausError;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const IN_FAILED_SQL_TRANSACTION: &str = "25P02";

/// Classify a driver error raised while running `operation`
pub fn classify(operation: &str, err: sqlx::Error) -> CarehausError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            CarehausError::connection_lost(format!("{}: {}", operation, err))
        }
        sqlx::Error::RowNotFound => CarehausError::NotFound {
            text: format!("{}: row not found", operation),
        },
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            match db.code().as_deref() {
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    CarehausError::serialization_conflict(message)
                }
                Some(UNIQUE_VIOLATION) => CarehausError::conflict(message),
                Some(FOREIGN_KEY_VIOLATION) | Some(CHECK_VIOLATION) => {
                    CarehausError::validation(message, Vec::new())
                }
                Some(IN_FAILED_SQL_TRANSACTION) => CarehausError::TransactionAborted {
                    text: message,
                },
                _ => CarehausError::internal(message),
            }
        }
        _ => CarehausError::internal(format!("{}: {}", operation, err)),
    }
}
