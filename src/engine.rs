//! Script engine context: the boa context plus everything bound to it.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{
    Context, JsArgs, JsError, JsNativeError, JsObject, JsResult, JsValue, NativeFunction, Source,
};

use crate::bindings::{self, BindingScope};
use crate::bridge::{BridgeCallback, BridgeStats, Completion, Outcome, Task, TaskSender};
use crate::dom::Document;
use crate::dom_bindings;
use crate::host::HostMethods;
use crate::html_parser::HtmlParser;
use crate::state::{self, NativeState, StateKey};
use crate::{BridgeConfig, Error, Result, ScriptResult};

/// An uncaught exception raised by an inline script or a bridge callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptException {
    pub context_id: i32,
    pub message: String,
}

pub type ExceptionHandler = Arc<dyn Fn(&ScriptException) + Send + Sync>;

/// The standard exception-reporting hook shared by everything that runs
/// script on behalf of the host.
#[derive(Clone)]
pub(crate) struct ExceptionReporter {
    context_id: i32,
    handler: Rc<RefCell<Option<ExceptionHandler>>>,
}

impl ExceptionReporter {
    pub(crate) fn new(context_id: i32) -> Self {
        Self {
            context_id,
            handler: Rc::new(RefCell::new(None)),
        }
    }

    pub(crate) fn report(&self, err: &JsError) {
        let exception = ScriptException {
            context_id: self.context_id,
            message: err.to_string(),
        };
        log::error!(
            "Uncaught exception in context {}: {}",
            exception.context_id,
            exception.message
        );
        // Clone out so the handler may replace itself.
        let handler = self.handler.borrow().clone();
        if let Some(cb) = handler {
            cb(&exception);
        }
    }
}

/// Run queued promise jobs after host-driven script execution.
pub(crate) fn run_jobs(context: &mut Context) {
    let _ = context.run_jobs();
}

/// A script engine context bound to the thread that created it.
///
/// Everything that touches engine values goes through `&mut self`; other
/// threads interact only through [`TaskSender`] and
/// [`CompletionHandle`](crate::bridge::CompletionHandle).
pub struct ScriptContext {
    context: Context,
    config: BridgeConfig,
    bridge: Rc<BridgeCallback>,
    scope: Rc<BindingScope>,
    document: Rc<RefCell<Document>>,
    parser: Rc<HtmlParser>,
    reporter: ExceptionReporter,
    state_key: StateKey,
    tasks: TaskSender,
    task_rx: Receiver<Task>,
    shutdown_requested: bool,
}

impl ScriptContext {
    /// Create a context with a fresh document and the given host capabilities.
    pub fn new(config: BridgeConfig, host: HostMethods) -> Result<Self> {
        Self::with_document(config, host, Document::new())
    }

    pub fn with_document(config: BridgeConfig, host: HostMethods, document: Document) -> Result<Self> {
        config.validate()?;
        let context_id = config.context_id;

        let mut context = Context::default();
        if config.script_loop_iteration_limit > 0 {
            context
                .runtime_limits_mut()
                .set_loop_iteration_limit(config.script_loop_iteration_limit);
        }
        if config.script_recursion_limit < usize::MAX {
            context
                .runtime_limits_mut()
                .set_recursion_limit(config.script_recursion_limit);
        }

        let (tx, task_rx) = channel::<Task>();
        let bridge = Rc::new(BridgeCallback::new(context_id, tx.clone()));
        let document = Rc::new(RefCell::new(document));
        let reporter = ExceptionReporter::new(context_id);
        let parser = Rc::new(HtmlParser::new(
            Rc::clone(&document),
            reporter.clone(),
            config.enable_javascript,
        ));
        let scope = Rc::new(BindingScope::new(context_id, host, Rc::clone(&bridge)));

        let state_key = state::install(NativeState {
            scope: Rc::clone(&scope),
            document: Rc::clone(&document),
            parser: Rc::clone(&parser),
            on_done: RefCell::new(None),
        });
        let installed = bindings::register(&mut context, state_key)
            .map_err(|e| Error::InitializationError(format!("failed to install bindings: {}", e)))
            .and_then(|()| {
                dom_bindings::register(&mut context, state_key)
                    .map_err(|e| Error::InitializationError(format!("failed to install DOM: {}", e)))
            });
        if let Err(e) = installed {
            state::remove(state_key);
            return Err(e);
        }

        Ok(Self {
            context,
            config,
            bridge,
            scope,
            document,
            parser,
            reporter,
            state_key,
            tasks: TaskSender::new(context_id, tx),
            task_rx,
            shutdown_requested: false,
        })
    }

    pub fn context_id(&self) -> i32 {
        self.config.context_id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn global_object(&self) -> JsObject {
        self.context.global_object()
    }

    /// Direct access to the engine, for hosts that install their own natives.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn document(&self) -> Rc<RefCell<Document>> {
        Rc::clone(&self.document)
    }

    /// Markup of the body subtree, or `None` when the document has no body.
    pub fn body_markup(&self) -> Option<String> {
        let doc = self.document.borrow();
        doc.body().map(|body| doc.markup(body))
    }

    /// Register the exception hook. Every uncaught exception is also logged.
    pub fn on_exception<F>(&mut self, cb: F)
    where
        F: Fn(&ScriptException) + Send + Sync + 'static,
    {
        *self.reporter.handler.borrow_mut() = Some(Arc::new(cb));
    }

    pub fn clear_on_exception(&mut self) {
        *self.reporter.handler.borrow_mut() = None;
    }

    /// Evaluate `code` as a program in the global scope.
    ///
    /// A thrown exception is reported through the exception hook and comes
    /// back as a `ScriptResult` with `is_error` set.
    pub fn evaluate_script(&mut self, code: &str) -> Result<ScriptResult> {
        if !self.config.enable_javascript {
            return Err(Error::ScriptError("JavaScript is disabled in config".into()));
        }
        let result = match self.context.eval(Source::from_bytes(code.as_bytes())) {
            Ok(val) => ScriptResult {
                value: format!("{}", val.display()),
                is_error: false,
            },
            Err(e) => {
                self.reporter.report(&e);
                ScriptResult {
                    value: format!("Script thrown: {}", e),
                    is_error: true,
                }
            }
        };
        run_jobs(&mut self.context);
        Ok(result)
    }

    /// Build the nodes of `html` under the document body.
    pub fn parse_html(&mut self, html: &str) -> bool {
        self.parser.parse_html(&mut self.context, html)
    }

    pub fn task_sender(&self) -> TaskSender {
        self.tasks.clone()
    }

    pub fn pending_callbacks(&self) -> usize {
        self.bridge.pending_count()
    }

    pub fn bridge_stats(&self) -> BridgeStats {
        self.bridge.stats()
    }

    /// Call the callback registered through `__rfox_execute_test__`, passing
    /// it a `done(status)` function that forwards to `on_done`.
    ///
    /// Returns `false` when no test callback is registered. The stored
    /// callback is released after the call.
    pub fn invoke_execute_test<F>(&mut self, on_done: F) -> Result<bool>
    where
        F: Fn(i32, String) + 'static,
    {
        let Some(callback) = self.scope.take_execute_test() else {
            return Ok(false);
        };
        let state = state::get(self.state_key).map_err(|e| Error::ScriptError(e.to_string()))?;
        *state.on_done.borrow_mut() = Some(Rc::new(on_done));

        let context_id = self.context_id();
        let key = self.state_key;
        let done = NativeFunction::from_copy_closure(move |_this, args, _context| {
            test_done(key, context_id, args.get_or_undefined(0))
        });
        let done = FunctionObjectBuilder::new(self.context.realm(), done)
            .length(1)
            .build();

        let this = JsValue::from(callback.clone());
        if let Err(e) = callback.call(&this, &[done.into()], &mut self.context) {
            self.reporter.report(&e);
        }
        run_jobs(&mut self.context);
        Ok(true)
    }

    /// Handle every task already queued, without blocking.
    pub fn run_pending_tasks(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(task) = self.task_rx.try_recv() {
            self.run_task(task);
            handled += 1;
        }
        handled
    }

    /// Handle tasks until no callback is pending or `timeout` passes.
    pub fn wait_for_pending(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        self.run_pending_tasks();
        while self.bridge.pending_count() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.task_rx.recv_timeout(remaining) {
                Ok(task) => self.run_task(task),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(Error::Timeout(timeout.as_millis() as u64))
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }

    /// Block on the task queue until a shutdown task arrives.
    pub fn run_until_shutdown(&mut self) {
        while !self.shutdown_requested {
            match self.task_rx.recv() {
                Ok(task) => self.run_task(task),
                Err(_) => break,
            }
        }
    }

    fn run_task(&mut self, task: Task) {
        match task {
            Task::Complete(completion) => self.dispatch_completion(completion),
            Task::Run(f) => f(self),
            Task::Shutdown => self.shutdown_requested = true,
        }
    }

    /// Engine-thread half of the completion trampoline.
    fn dispatch_completion(&mut self, completion: Completion) {
        let Completion {
            callback_id,
            context_id,
            outcome,
        } = completion;
        let Some(pending) = self.bridge.take(callback_id, &outcome) else {
            log::warn!(
                "completion for unknown callback {} in context {}",
                callback_id,
                context_id
            );
            return;
        };

        match outcome {
            Outcome::Fire(payload) => {
                log::debug!(
                    "completing '{}' callback {} in context {}",
                    pending.operation(),
                    callback_id,
                    context_id
                );
                let global = JsValue::from(self.context.global_object());
                let result = payload
                    .into_js(&mut self.context)
                    .and_then(|value| pending.callback().call(&global, &[value], &mut self.context));
                if let Err(e) = result {
                    self.reporter.report(&e);
                }
                run_jobs(&mut self.context);
            }
            Outcome::Abandon => {
                log::warn!(
                    "releasing '{}' callback {} without a result",
                    pending.operation(),
                    callback_id
                );
            }
        }
        drop(pending);
    }
}

/// Body of the `done(status)` function handed to the execute-test callback.
fn test_done(key: StateKey, context_id: i32, status: &JsValue) -> JsResult<JsValue> {
    let Some(status) = status.as_string() else {
        return Err(JsNativeError::typ()
            .with_message("Failed to execute 'done': parameter 1 (status) is not a string")
            .into());
    };
    let status = status.to_std_string_escaped();
    let on_done = state::get(key)?.on_done.borrow().clone();
    if let Some(on_done) = on_done {
        on_done(context_id, status);
    }
    Ok(JsValue::null())
}

impl Drop for ScriptContext {
    fn drop(&mut self) {
        let orphaned = self.bridge.orphan_all();
        if orphaned > 0 {
            log::warn!(
                "context {} torn down with {} pending callback(s); released without invoking",
                self.context_id(),
                orphaned
            );
        }
        self.scope.take_execute_test();
        self.scope.release_host();
        state::remove(self.state_key);
    }
}
