//! Ambient context store
//!
//! Task-local storage for the currently running transaction context. Nested
//! calls anywhere inside a transaction callback discover the live context
//! without it being threaded through every signature, and the association
//! survives suspension points. Keying by cooperative task also prevents a
//! context from ever being observed by another task.

use crate::context::TxContext;
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static CURRENT_TX: Arc<TxContext>;
}

/// The transaction context of the current task, if one is live
pub fn current() -> Option<Arc<TxContext>> {
    CURRENT_TX.try_with(Arc::clone).ok()
}

/// True when the current task is inside a transaction
pub fn in_transaction() -> bool {
    CURRENT_TX.try_with(|_| ()).is_ok()
}

/// Run `fut` with `tc` installed as the task's transaction context
pub(crate) async fn enter<F>(tc: Arc<TxContext>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_TX.scope(tc, fut).await
}
