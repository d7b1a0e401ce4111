//! Transaction executor
//!
//! `with_transaction` runs a callback under a logical transaction. The
//! outermost call owns the physical `BEGIN`/`COMMIT`; nested calls on the same
//! task are emulated with savepoints on the shared session. Post-commit
//! callbacks registered through [`post_commit`] run only after the outermost
//! transaction durably commits.

use crate::ambient;
use crate::classify::classify;
use crate::connection::ConnectionHandle;
use crate::context::{PostCommitEntry, TxContext};
use crate::errors::CarehausError;
use crate::session::{PgSession, SqlSession};
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Options for one `with_transaction` call
#[derive(Debug, Clone, Default)]
pub struct TxOptions {
    /// Request serializable isolation for the outermost transaction. Ignored
    /// on nested calls when the outer transaction is already serializable;
    /// requesting it under a non-serializable outer transaction is a
    /// programming error.
    pub serializable: bool,
    /// Statement timeout applied with `SET LOCAL` after `BEGIN`; outermost
    /// calls only.
    pub statement_timeout: Option<Duration>,
}

impl TxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serializable() -> Self {
        Self {
            serializable: true,
            statement_timeout: None,
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }
}

/// Run `callback` under a logical transaction
///
/// If the current task already holds a transaction, a nested savepoint frame
/// is opened on its session and the pool is not touched. Otherwise a
/// connection is checked out for the lifetime of the transaction.
pub async fn with_transaction<F, Fut, T>(
    pool: &PgPool,
    options: TxOptions,
    callback: F,
) -> Result<T, CarehausError>
where
    F: FnOnce(ConnectionHandle) -> Fut,
    Fut: Future<Output = Result<T, CarehausError>>,
{
    if let Some(tc) = ambient::current() {
        return nested(tc, options, callback).await;
    }
    let conn = pool
        .acquire()
        .await
        .map_err(|e| classify("acquire connection", e))?;
    outermost(Box::new(PgSession::new(conn)), options, callback).await
}

/// Run `callback` under a logical transaction on an explicit session
///
/// Same contract as [`with_transaction`]; the session is only used when this
/// call turns out to be outermost.
pub async fn with_transaction_on<F, Fut, T>(
    session: Box<dyn SqlSession>,
    options: TxOptions,
    callback: F,
) -> Result<T, CarehausError>
where
    F: FnOnce(ConnectionHandle) -> Fut,
    Fut: Future<Output = Result<T, CarehausError>>,
{
    if let Some(tc) = ambient::current() {
        return nested(tc, options, callback).await;
    }
    outermost(session, options, callback).await
}

/// Register a callback to run after the outermost transaction commits
///
/// Callbacks run FIFO in registration order once the physical `COMMIT`
/// succeeds, with the transaction already closed. Callbacks registered inside
/// a savepoint frame that rolls back are discarded; none run if the
/// transaction rolls back. A callback failure is logged and does not affect
/// later callbacks or the committed transaction.
pub fn post_commit<F, Fut>(callback: F) -> Result<(), CarehausError>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), CarehausError>> + Send + 'static,
{
    let tc = ambient::current()
        .ok_or_else(|| CarehausError::internal("post_commit requires an active transaction"))?;
    tc.push_post_commit(Box::new(move || Box::pin(callback())));
    Ok(())
}

async fn outermost<F, Fut, T>(
    session: Box<dyn SqlSession>,
    options: TxOptions,
    callback: F,
) -> Result<T, CarehausError>
where
    F: FnOnce(ConnectionHandle) -> Fut,
    Fut: Future<Output = Result<T, CarehausError>>,
{
    let ch = ConnectionHandle::new(session);
    ch.begin(options.serializable).await?;
    if let Some(timeout) = options.statement_timeout {
        if let Err(e) = ch.set_statement_timeout(timeout).await {
            rollback_quietly(&ch).await;
            return Err(e);
        }
    }

    let tc = Arc::new(TxContext::new(ch.clone(), options.serializable));
    let result = ambient::enter(Arc::clone(&tc), callback(ch.clone())).await;

    match result {
        Ok(value) => {
            if tc.is_aborted() {
                rollback_quietly(&ch).await;
                return Err(CarehausError::aborted());
            }
            // Commit failures (serialization, connectivity) surface to the
            // caller; the queued callbacks die with the context.
            ch.commit().await?;
            let entries = tc.take_post_commit();
            drop(tc);
            run_post_commit(entries).await;
            Ok(value)
        }
        Err(err) => {
            rollback_quietly(&ch).await;
            Err(err)
        }
    }
}

async fn nested<F, Fut, T>(
    tc: Arc<TxContext>,
    options: TxOptions,
    callback: F,
) -> Result<T, CarehausError>
where
    F: FnOnce(ConnectionHandle) -> Fut,
    Fut: Future<Output = Result<T, CarehausError>>,
{
    if options.serializable && !tc.serializable() {
        return Err(CarehausError::internal(
            "serializable requested on a nested transaction whose outer transaction is not serializable",
        ));
    }
    if tc.is_aborted() {
        return Err(CarehausError::aborted());
    }

    let ch = tc.handle();
    let name = tc.enter_frame();
    if let Err(e) = ch.savepoint(&name).await {
        tc.mark_aborted();
        tc.rollback_frame(&name);
        return Err(e);
    }

    match callback(ch.clone()).await {
        Ok(value) => {
            if tc.is_aborted() {
                rollback_savepoint_quietly(&tc, &ch, &name).await;
                tc.rollback_frame(&name);
                return Err(CarehausError::aborted());
            }
            match ch.release(&name).await {
                Ok(()) => {
                    tc.release_frame(&name);
                    Ok(value)
                }
                Err(e) => {
                    // The engine refused the release; the enclosing
                    // transaction block is no longer commitable.
                    tc.mark_aborted();
                    rollback_savepoint_quietly(&tc, &ch, &name).await;
                    tc.rollback_frame(&name);
                    Err(e)
                }
            }
        }
        Err(err) => {
            rollback_savepoint_quietly(&tc, &ch, &name).await;
            tc.rollback_frame(&name);
            Err(err)
        }
    }
}

async fn rollback_quietly(ch: &ConnectionHandle) {
    if let Err(e) = ch.rollback().await {
        tracing::warn!("rollback failed: {}", e);
    }
}

/// Roll a savepoint frame back and drop it, tolerating engine refusal
async fn rollback_savepoint_quietly(tc: &TxContext, ch: &ConnectionHandle, name: &str) {
    match ch.rollback_to(name).await {
        Ok(()) => {
            if let Err(e) = ch.release(name).await {
                tracing::warn!("release of savepoint {} after rollback failed: {}", name, e);
                tc.mark_aborted();
            }
        }
        Err(e) => {
            tracing::warn!("rollback to savepoint {} failed: {}", name, e);
            tc.mark_aborted();
        }
    }
}

async fn run_post_commit(entries: Vec<PostCommitEntry>) {
    for entry in entries {
        if let Err(e) = (entry.callback)().await {
            tracing::warn!(depth = entry.depth, "post-commit callback failed: {}", e);
        }
    }
}
