//! Convenience re-exports for common CareHaus usage
//!
//! This prelude module re-exports the most commonly used items from the
//! CareHaus ecosystem, making it easier to import everything you need with a
//! single use statement.
//!
//! # Example
//!
//! ```rust
//! use carehaus::prelude::*;
//!
//! // Now you have access to all the common CareHaus types
//! ```

// Core CareHaus components
pub use crate::core::CareHaus;
pub use crate::errors::CareHausError;
pub use crate::migration;

// Re-export centralized config
pub use config::{AppConfig, ConfigError, DatabaseConfig, TransactionConfig};

// Re-export commonly used resource-store and transaction types
pub use resource_store::prelude::*;

// Re-export member crates for qualified access
pub use resource_store;
pub use tx_system;

// Common external dependencies
pub use async_trait;
pub use sqlx;
pub use tokio;
