//! Connection handle
//!
//! A clonable wrapper over one exclusively-owned database session. User
//! callbacks receive a [`ConnectionHandle`] and may run arbitrary SQL through
//! it; transaction control statements are crate-internal.

use crate::errors::CarehausError;
use crate::session::SqlSession;
use crate::value::{SqlRow, SqlValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared state between the handle clones and the owning transaction context
pub(crate) struct HandleState {
    /// Set once the engine rejects a statement with its aborted-block error
    /// (or the connection is lost); never cleared for the lifetime of the
    /// transaction context.
    aborted: AtomicBool,
    /// True while a physical transaction is open on the session
    open: AtomicBool,
}

struct SessionCell {
    session: Option<Box<dyn SqlSession>>,
    state: Arc<HandleState>,
}

impl Drop for SessionCell {
    fn drop(&mut self) {
        // Cancellation path: the executor never got to commit or rollback.
        // The session must not return to the pool mid-transaction.
        if self.state.open.load(Ordering::SeqCst) {
            if let Some(mut session) = self.session.take() {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(e) = session.batch("ROLLBACK").await {
                            tracing::warn!("rollback on cancelled transaction failed: {}", e);
                        }
                    });
                }
            }
        }
    }
}

/// Handle to the database session owned by the current transaction
///
/// Clones share the same underlying session; all statements within one
/// transaction are strictly serialized through it.
#[derive(Clone)]
pub struct ConnectionHandle {
    cell: Arc<Mutex<SessionCell>>,
    state: Arc<HandleState>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("aborted", &self.is_aborted())
            .field("open", &self.state.open.load(Ordering::SeqCst))
            .finish()
    }
}

impl ConnectionHandle {
    pub(crate) fn new(session: Box<dyn SqlSession>) -> Self {
        let state = Arc::new(HandleState {
            aborted: AtomicBool::new(false),
            open: AtomicBool::new(false),
        });
        Self {
            cell: Arc::new(Mutex::new(SessionCell {
                session: Some(session),
                state: Arc::clone(&state),
            })),
            state,
        }
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_aborted(&self) {
        self.state.aborted.store(true, Ordering::SeqCst);
    }

    /// Run a query and return the decoded rows
    ///
    /// Fails fast with `TransactionAborted` once the transaction is poisoned.
    /// Observing the engine's aborted-block rejection (or losing the
    /// connection) poisons the transaction permanently; ordinary statement
    /// errors do not, since a savepoint rollback clears them.
    pub async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, CarehausError> {
        if self.is_aborted() {
            return Err(CarehausError::aborted());
        }
        let mut cell = self.cell.lock().await;
        let session = Self::session_mut(&mut cell)?;
        let result = session.query(sql, params).await;
        drop(cell);
        self.poison_on_error(&result);
        result
    }

    /// Run a DML statement and return the affected row count
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, CarehausError> {
        if self.is_aborted() {
            return Err(CarehausError::aborted());
        }
        let mut cell = self.cell.lock().await;
        let session = Self::session_mut(&mut cell)?;
        let result = session.execute(sql, params).await;
        drop(cell);
        self.poison_on_error(&result);
        result
    }

    fn session_mut<'a>(
        cell: &'a mut SessionCell,
    ) -> Result<&'a mut Box<dyn SqlSession>, CarehausError> {
        cell.session
            .as_mut()
            .ok_or_else(|| CarehausError::internal("database session already released"))
    }

    fn poison_on_error<T>(&self, result: &Result<T, CarehausError>) {
        if matches!(
            result,
            Err(CarehausError::TransactionAborted { .. })
                | Err(CarehausError::ConnectionLost { .. })
        ) {
            self.mark_aborted();
        }
    }

    /// Transaction control statement; bypasses the aborted fail-fast gate
    async fn control(&self, sql: &str) -> Result<(), CarehausError> {
        let mut cell = self.cell.lock().await;
        let session = Self::session_mut(&mut cell)?;
        session.batch(sql).await
    }

    pub(crate) async fn begin(&self, serializable: bool) -> Result<(), CarehausError> {
        let sql = if serializable {
            "BEGIN; SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"
        } else {
            "BEGIN"
        };
        self.control(sql).await?;
        self.state.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) async fn set_statement_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<(), CarehausError> {
        self.control(&format!(
            "SET LOCAL statement_timeout = {}",
            timeout.as_millis()
        ))
        .await
    }

    pub(crate) async fn savepoint(&self, name: &str) -> Result<(), CarehausError> {
        self.control(&format!("SAVEPOINT {}", name)).await
    }

    pub(crate) async fn release(&self, name: &str) -> Result<(), CarehausError> {
        self.control(&format!("RELEASE SAVEPOINT {}", name)).await
    }

    pub(crate) async fn rollback_to(&self, name: &str) -> Result<(), CarehausError> {
        self.control(&format!("ROLLBACK TO SAVEPOINT {}", name)).await
    }

    pub(crate) async fn commit(&self) -> Result<(), CarehausError> {
        let result = self.control("COMMIT").await;
        // Either way the engine has ended the transaction block.
        self.state.open.store(false, Ordering::SeqCst);
        result
    }

    pub(crate) async fn rollback(&self) -> Result<(), CarehausError> {
        let result = self.control("ROLLBACK").await;
        self.state.open.store(false, Ordering::SeqCst);
        result
    }
}
