//! Transaction System - Nested transaction execution core for CareHaus
//!
//! This crate provides the logical transaction layer between the resource
//! repository and PostgreSQL: an ambient, arbitrarily nestable
//! `with_transaction` with savepoint-backed nesting, serializable-isolation
//! opt-in, post-commit callbacks, and a structured error taxonomy.

pub mod ambient;
pub mod classify;
pub mod connection;
pub mod context;
pub mod errors;
pub mod executor;
pub mod prelude;
pub mod session;
pub mod value;

pub use ambient::{current, in_transaction};
pub use connection::ConnectionHandle;
pub use context::{PostCommitFn, TxContext};
pub use errors::{CarehausError, Outcome, Severity, ABORTED_BLOCK_TEXT};
pub use executor::{post_commit, with_transaction, with_transaction_on, TxOptions};
pub use session::{PgSession, SqlSession};
pub use value::{SqlRow, SqlValue};
