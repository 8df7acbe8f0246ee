//! Async bridge: pairs pending host operations with script callbacks.
//!
//! A script-initiated request stores a [`CallbackContext`] (which owns a clone
//! of the callback object, keeping it alive) in the [`BridgeCallback`] table and
//! hands the host a [`CompletionHandle`]. The handle is `Send` and can be
//! completed from any thread; completion only enqueues a [`Task`] on the engine
//! thread's queue. The engine thread removes the context from the table,
//! invokes the callback and drops the context, which is the release.
//!
//! Exactly-once holds by ownership: `complete` consumes the handle, the handle
//! cannot be cloned, and removal from the table yields the only owner of the
//! context.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::mpsc::Sender;

use boa_engine::{Context, JsNativeError, JsObject, JsResult, JsString, JsValue};

use crate::engine::ScriptContext;
use crate::{Error, Result};

/// Identifier handed to the host in place of the callback itself.
pub type CallbackId = u64;

/// Result payload a host capability delivers to a script callback.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Json(serde_json::Value),
    /// Delivered to script as an `Error` object carrying the message.
    Error(String),
}

impl HostValue {
    /// Convert into a script value; must run on the engine thread.
    pub fn into_js(self, context: &mut Context) -> JsResult<JsValue> {
        Ok(match self {
            HostValue::Null => JsValue::null(),
            HostValue::Bool(b) => JsValue::from(b),
            HostValue::Number(n) => JsValue::from(n),
            HostValue::String(s) => JsValue::from(JsString::from(s.as_str())),
            HostValue::Json(json) => JsValue::from_json(&json, context)?,
            HostValue::Error(message) => JsNativeError::error()
                .with_message(message)
                .to_opaque(context)
                .into(),
        })
    }
}

/// One pending operation: the duplicated callback reference plus the data
/// identifying it. Dropping it releases the callback.
pub struct CallbackContext {
    context_id: i32,
    callback: JsObject,
    operation: &'static str,
}

impl CallbackContext {
    pub fn new(context_id: i32, callback: JsObject, operation: &'static str) -> Self {
        Self {
            context_id,
            callback,
            operation,
        }
    }

    pub fn context_id(&self) -> i32 {
        self.context_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn callback(&self) -> &JsObject {
        &self.callback
    }
}

impl std::fmt::Debug for CallbackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackContext")
            .field("context_id", &self.context_id)
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

/// How a pending operation ended on the host side.
#[derive(Debug)]
pub enum Outcome {
    Fire(HostValue),
    /// The handle was dropped without completing; release only.
    Abandon,
}

#[derive(Debug)]
pub struct Completion {
    pub callback_id: CallbackId,
    pub context_id: i32,
    pub outcome: Outcome,
}

/// Work for the engine thread.
pub enum Task {
    Complete(Completion),
    Run(Box<dyn FnOnce(&mut ScriptContext) + Send>),
    Shutdown,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::Complete(c) => f.debug_tuple("Complete").field(c).finish(),
            Task::Run(_) => f.write_str("Run(..)"),
            Task::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Cloneable, thread-safe sender into an engine thread's task queue.
#[derive(Clone, Debug)]
pub struct TaskSender {
    context_id: i32,
    tx: Sender<Task>,
}

impl TaskSender {
    pub(crate) fn new(context_id: i32, tx: Sender<Task>) -> Self {
        Self { context_id, tx }
    }

    /// Run `f` on the engine thread with exclusive access to the context.
    pub fn run<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ScriptContext) + Send + 'static,
    {
        self.send(Task::Run(Box::new(f)))
    }

    /// Ask `run_until_shutdown` to return once the current task finishes.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Task::Shutdown)
    }

    fn send(&self, task: Task) -> Result<()> {
        self.tx
            .send(task)
            .map_err(|_| Error::ContextClosed(self.context_id))
    }
}

/// Host-side half of a pending operation: the completion trampoline.
///
/// Not `Clone`; completing consumes it. Dropping it uncompleted enqueues an
/// abandon message so the engine still releases the callback.
#[derive(Debug)]
pub struct CompletionHandle {
    callback_id: CallbackId,
    context_id: i32,
    tx: Option<Sender<Task>>,
}

impl CompletionHandle {
    pub fn callback_id(&self) -> CallbackId {
        self.callback_id
    }

    pub fn context_id(&self) -> i32 {
        self.context_id
    }

    /// Deliver `payload` to the script callback. Safe to call from any thread.
    pub fn complete(mut self, payload: HostValue) -> Result<()> {
        self.finish(Outcome::Fire(payload))
    }

    /// Deliver an error payload.
    pub fn fail(self, message: impl Into<String>) -> Result<()> {
        self.complete(HostValue::Error(message.into()))
    }

    fn finish(&mut self, outcome: Outcome) -> Result<()> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        tx.send(Task::Complete(Completion {
            callback_id: self.callback_id,
            context_id: self.context_id,
            outcome,
        }))
        .map_err(|_| Error::ContextClosed(self.context_id))
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        if self.tx.is_some() {
            log::warn!(
                "completion handle {} of context {} dropped without completing",
                self.callback_id,
                self.context_id
            );
            let _ = self.finish(Outcome::Abandon);
        }
    }
}

/// Counters over the lifetime of a bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub registered: u64,
    pub completed: u64,
    pub abandoned: u64,
    pub orphaned: u64,
}

impl BridgeStats {
    /// Contexts that have been created and not yet released.
    pub fn live(&self) -> u64 {
        self.registered - self.completed - self.abandoned - self.orphaned
    }
}

/// Pending-operation table of one script context. Lives on the engine thread.
pub struct BridgeCallback {
    context_id: i32,
    tx: Sender<Task>,
    next_id: Cell<CallbackId>,
    pending: RefCell<HashMap<CallbackId, CallbackContext>>,
    stats: Cell<BridgeStats>,
}

impl BridgeCallback {
    pub(crate) fn new(context_id: i32, tx: Sender<Task>) -> Self {
        Self {
            context_id,
            tx,
            next_id: Cell::new(1),
            pending: RefCell::new(HashMap::new()),
            stats: Cell::new(BridgeStats::default()),
        }
    }

    pub fn context_id(&self) -> i32 {
        self.context_id
    }

    /// Take ownership of `context` and start the host operation.
    ///
    /// `initiator` receives the completion handle and the context id and must
    /// not block; the host keeps the handle until the result is ready.
    pub fn register_callback<F>(&self, context: CallbackContext, initiator: F) -> CallbackId
    where
        F: FnOnce(CompletionHandle, i32),
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        log::debug!(
            "registering callback {} for '{}' in context {}",
            id,
            context.operation,
            self.context_id
        );
        self.pending.borrow_mut().insert(id, context);
        self.update_stats(|s| s.registered += 1);

        let handle = CompletionHandle {
            callback_id: id,
            context_id: self.context_id,
            tx: Some(self.tx.clone()),
        };
        initiator(handle, self.context_id);
        id
    }

    /// Remove a pending context so the caller becomes its only owner.
    pub(crate) fn take(&self, id: CallbackId, outcome: &Outcome) -> Option<CallbackContext> {
        let context = self.pending.borrow_mut().remove(&id)?;
        match outcome {
            Outcome::Fire(_) => self.update_stats(|s| s.completed += 1),
            Outcome::Abandon => self.update_stats(|s| s.abandoned += 1),
        }
        Some(context)
    }

    /// Release every pending context without invoking it.
    pub(crate) fn orphan_all(&self) -> usize {
        let drained: Vec<CallbackContext> = self
            .pending
            .borrow_mut()
            .drain()
            .map(|(_, context)| context)
            .collect();
        let count = drained.len();
        self.update_stats(|s| s.orphaned += count as u64);
        drop(drained);
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats.get()
    }

    fn update_stats(&self, f: impl FnOnce(&mut BridgeStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn complete_sends_exactly_one_message() {
        let (tx, rx) = channel();
        let handle = CompletionHandle {
            callback_id: 7,
            context_id: 2,
            tx: Some(tx),
        };
        handle.complete(HostValue::Bool(true)).unwrap();
        let Ok(Task::Complete(c)) = rx.try_recv() else {
            panic!("expected a completion");
        };
        assert_eq!(c.callback_id, 7);
        assert_eq!(c.context_id, 2);
        assert!(matches!(c.outcome, Outcome::Fire(HostValue::Bool(true))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_handle_abandons() {
        let (tx, rx) = channel();
        drop(CompletionHandle {
            callback_id: 1,
            context_id: 0,
            tx: Some(tx),
        });
        let Ok(Task::Complete(c)) = rx.try_recv() else {
            panic!("expected an abandon message");
        };
        assert!(matches!(c.outcome, Outcome::Abandon));
    }

    #[test]
    fn completing_after_teardown_reports_closed_context() {
        let (tx, rx) = channel();
        drop(rx);
        let handle = CompletionHandle {
            callback_id: 1,
            context_id: 4,
            tx: Some(tx),
        };
        assert!(matches!(
            handle.fail("late"),
            Err(Error::ContextClosed(4))
        ));
    }

    #[test]
    fn stats_track_live_contexts() {
        let stats = BridgeStats {
            registered: 5,
            completed: 2,
            abandoned: 1,
            orphaned: 1,
        };
        assert_eq!(stats.live(), 1);
    }
}
