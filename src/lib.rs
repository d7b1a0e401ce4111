//! # CareHaus
//!
//! A transactional healthcare resource repository for PostgreSQL with nested
//! logical transactions, serializable-isolation opt-in, and post-commit
//! side effects.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use carehaus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig {
//!         database: DatabaseConfig::new(
//!             "localhost".to_string(), 5432, "carehaus".to_string(),
//!             "postgres".to_string(), "password".to_string(),
//!             1, 5, 30, 600, 3600,
//!         ),
//!         transaction: TransactionConfig::new(30),
//!     };
//!
//!     let carehaus = CareHaus::new(config).await?;
//!     carehaus.migrate().await?;
//!
//!     let store = carehaus.resources().clone();
//!     let patient = carehaus
//!         .with_transaction(TxOptions::new(), |ch| {
//!             let store = store.clone();
//!             async move {
//!                 let patient = store
//!                     .create_in(&ch, "Patient", json!({
//!                         "resourceType": "Patient",
//!                         "name": [{"family": "Simpson", "given": ["Homer"]}],
//!                     }))
//!                     .await?;
//!
//!                 // Runs only once the transaction durably commits
//!                 post_commit(|| async { Ok(()) })?;
//!
//!                 Ok(patient)
//!             }
//!         })
//!         .await?;
//!
//!     println!("Created Patient/{}", patient.id);
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod core;
pub mod errors;
pub mod migration;
pub mod prelude;

// Re-export the main public types for convenience
pub use crate::core::CareHaus;
pub use errors::CareHausError;

// Re-export centralized config
pub use config::{AppConfig, ConfigError, DatabaseConfig, TransactionConfig};

// Re-export internal crates forming the public API
pub use resource_store;
pub use tx_system;

// Most callers only need these from the transaction core
pub use tx_system::{
    post_commit, with_transaction, CarehausError, ConnectionHandle, Outcome, Severity, TxOptions,
};

// Re-export external dependencies used in public API
pub use async_trait;
pub use sqlx;
