//! Per-context state reachable from native functions.
//!
//! Natives are registered with `NativeFunction::from_copy_closure` and capture
//! only a [`StateKey`]; the Rust state they operate on lives in a thread-local
//! table. A `ScriptContext` is not `Send`, so the thread that installs an
//! entry is the one that removes it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use boa_engine::{JsNativeError, JsResult};

use crate::bindings::BindingScope;
use crate::dom::Document;
use crate::html_parser::HtmlParser;

pub(crate) type StateKey = u64;

/// Receiver of `done(status)` calls made by the execute-test callback.
pub(crate) type DoneFn = Rc<dyn Fn(i32, String)>;

pub(crate) struct NativeState {
    pub(crate) scope: Rc<BindingScope>,
    pub(crate) document: Rc<RefCell<Document>>,
    pub(crate) parser: Rc<HtmlParser>,
    pub(crate) on_done: RefCell<Option<DoneFn>>,
}

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static STATES: RefCell<HashMap<StateKey, Rc<NativeState>>> = RefCell::new(HashMap::new());
}

pub(crate) fn install(state: NativeState) -> StateKey {
    let key = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
    STATES.with(|states| states.borrow_mut().insert(key, Rc::new(state)));
    key
}

/// Drop the table's reference. Quietly does nothing once the thread's table
/// has itself been destroyed.
pub(crate) fn remove(key: StateKey) -> Option<Rc<NativeState>> {
    STATES
        .try_with(|states| states.borrow_mut().remove(&key))
        .ok()
        .flatten()
}

/// State of a live context. The table borrow ends before this returns, so
/// callers may reenter script while holding the result.
pub(crate) fn get(key: StateKey) -> JsResult<Rc<NativeState>> {
    let state = STATES.with(|states| states.borrow().get(&key).cloned());
    state.ok_or_else(|| {
        JsNativeError::error()
            .with_message("script context has been torn down")
            .into()
    })
}
