//! Transaction context
//!
//! Per-logical-transaction state: the owned connection handle, the savepoint
//! frame stack, and the post-commit callback queue. Exactly one context exists
//! per outermost transaction; nested frames share it through the ambient
//! store.

use crate::connection::ConnectionHandle;
use crate::errors::CarehausError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Boxed post-commit callback; runs after the outermost commit, with the
/// transaction already closed.
pub type PostCommitFn =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), CarehausError>> + Send>> + Send>;

pub(crate) struct PostCommitEntry {
    /// Nesting depth of the frame that registered the callback
    pub depth: u32,
    pub callback: PostCommitFn,
}

pub(crate) struct SavepointFrame {
    pub name: String,
    pub depth: u32,
    /// Queue length when the frame opened; rolling the frame back truncates
    /// the queue to this mark, discarding entries from the frame and any
    /// frames nested inside it.
    pub post_commit_mark: usize,
}

struct TxState {
    /// Current nesting depth; 1 while only the outermost frame is live
    depth: u32,
    /// Monotonic savepoint sequence; names are never reused within a context
    savepoint_seq: u32,
    frames: Vec<SavepointFrame>,
    post_commit: Vec<PostCommitEntry>,
}

/// State of one logical transaction
pub struct TxContext {
    handle: ConnectionHandle,
    serializable: bool,
    state: Mutex<TxState>,
}

impl TxContext {
    pub(crate) fn new(handle: ConnectionHandle, serializable: bool) -> Self {
        Self {
            handle,
            serializable,
            state: Mutex::new(TxState {
                depth: 1,
                savepoint_seq: 0,
                frames: Vec::new(),
                post_commit: Vec::new(),
            }),
        }
    }

    pub(crate) fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Whether the outermost transaction was opened serializable
    pub fn serializable(&self) -> bool {
        self.serializable
    }

    /// Whether the transaction has been poisoned by a session-level failure
    pub fn is_aborted(&self) -> bool {
        self.handle.is_aborted()
    }

    pub(crate) fn mark_aborted(&self) {
        self.handle.mark_aborted();
    }

    /// Current nesting depth (1 = outermost only)
    pub fn depth(&self) -> u32 {
        self.state.lock().unwrap().depth
    }

    /// Open a nested savepoint frame, returning its name
    pub(crate) fn enter_frame(&self) -> String {
        let mut state = self.state.lock().unwrap();
        state.savepoint_seq += 1;
        state.depth += 1;
        let name = format!("sp{}", state.savepoint_seq);
        let depth = state.depth;
        let post_commit_mark = state.post_commit.len();
        state.frames.push(SavepointFrame {
            name: name.clone(),
            depth,
            post_commit_mark,
        });
        name
    }

    /// Close the innermost frame after a successful release; its post-commit
    /// entries stay queued on the context.
    pub(crate) fn release_frame(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(frame) = state.frames.pop() {
            debug_assert_eq!(frame.name, name, "savepoint frames must unwind LIFO");
            state.depth = frame.depth - 1;
        }
    }

    /// Close the innermost frame after a rollback, discarding every callback
    /// registered since the frame opened.
    pub(crate) fn rollback_frame(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(frame) = state.frames.pop() {
            debug_assert_eq!(frame.name, name, "savepoint frames must unwind LIFO");
            state.post_commit.truncate(frame.post_commit_mark);
            state.depth = frame.depth - 1;
        }
    }

    /// Register a post-commit callback at the current nesting depth
    pub(crate) fn push_post_commit(&self, callback: PostCommitFn) {
        let mut state = self.state.lock().unwrap();
        let depth = state.depth;
        state.post_commit.push(PostCommitEntry { depth, callback });
    }

    /// Drain the queue for execution after the outermost commit
    pub(crate) fn take_post_commit(&self) -> Vec<PostCommitEntry> {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.post_commit)
    }

    /// Number of callbacks currently queued
    pub fn pending_post_commit(&self) -> usize {
        self.state.lock().unwrap().post_commit.len()
    }
}
