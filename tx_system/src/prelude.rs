//! Convenience re-exports for common transaction-system usage

// Executor entry points
pub use crate::executor::{post_commit, with_transaction, with_transaction_on, TxOptions};

// Connection handle passed to transaction callbacks
pub use crate::connection::ConnectionHandle;

// Ambient context discovery
pub use crate::ambient::{current, in_transaction};

// Error taxonomy and structured outcomes
pub use crate::errors::{CarehausError, Outcome, Severity};

// SQL value bridge
pub use crate::value::{SqlRow, SqlValue};

// Driver session seam
pub use crate::session::{PgSession, SqlSession};

// Common external dependencies that are frequently used
pub use async_trait::async_trait;
pub use sqlx::PgPool;
pub use uuid::Uuid;
