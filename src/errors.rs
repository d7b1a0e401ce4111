//! Error types for the CareHaus crate
//!
//! This module contains the errors returned by coordinator-level operations.
//! Errors surfaced from inside a transaction use `tx_system::CarehausError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CareHausError {
    #[error("Database connection error: {0}")]
    DatabaseConnection(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),
}
