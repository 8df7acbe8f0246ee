use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::bridge::TaskSender;
use crate::engine::ScriptContext;
use crate::host::HostMethods;
use crate::{BridgeConfig, Error, Result, ScriptResult};

/// An async-friendly handle to a script context running on its own thread.
///
/// The worker thread owns the `ScriptContext` (which is not `Send`) and runs
/// its task queue; calls from async tasks are sent as closures and answered
/// through oneshot channels. Host completions land on the same queue, so
/// callbacks and calls are serialized on the worker thread.
///
/// Clones share one worker. Dropping the last clone shuts it down the same
/// way [`Bridge::close`] does.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Worker>,
    pending_timeout: Duration,
}

struct Worker {
    tasks: TaskSender,
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Already gone after `close` or a failed worker; nothing to stop.
        let _ = self.tasks.shutdown();
    }
}

impl Bridge {
    /// Create a new bridge (spawns a background thread that owns the context).
    pub async fn new(config: Option<BridgeConfig>, host: HostMethods) -> Result<Self> {
        let config = config.unwrap_or_default();
        let pending_timeout = Duration::from_millis(config.pending_timeout_ms);

        let (init_tx, init_rx) = oneshot::channel::<Result<TaskSender>>();

        thread::spawn(move || {
            // Initialize the context on the worker thread
            let mut ctx = match ScriptContext::new(config, host) {
                Ok(ctx) => ctx,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let _ = init_tx.send(Ok(ctx.task_sender()));
            ctx.run_until_shutdown();
        });

        let tasks = init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))??;

        Ok(Self {
            inner: Arc::new(Worker { tasks }),
            pending_timeout,
        })
    }

    async fn call<R, F>(&self, label: &str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut ScriptContext) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.inner.tasks.run(move |ctx| {
            let _ = tx.send(f(ctx));
        })?;
        rx.await
            .map_err(|e| Error::Other(format!("{} canceled: {}", label, e)))
    }

    /// Evaluate JavaScript and return the displayed result
    pub async fn evaluate(&self, script: &str) -> Result<ScriptResult> {
        let script = script.to_string();
        self.call("Evaluate", move |ctx| ctx.evaluate_script(&script))
            .await?
    }

    /// Parse HTML into the document body
    pub async fn parse_html(&self, html: &str) -> Result<bool> {
        let html = html.to_string();
        self.call("ParseHtml", move |ctx| ctx.parse_html(&html)).await
    }

    /// Markup of the current body subtree
    pub async fn body_markup(&self) -> Result<Option<String>> {
        self.call("BodyMarkup", |ctx| ctx.body_markup()).await
    }

    /// Wait until every pending host callback has been delivered
    pub async fn settle(&self) -> Result<()> {
        let timeout = self.pending_timeout;
        self.call("Settle", move |ctx| ctx.wait_for_pending(timeout))
            .await?
    }

    /// Shutdown the background worker; pending callbacks are released unrun.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.tasks.run(move |ctx| {
            let _ = tx.send(ctx.pending_callbacks());
        })?;
        let pending = rx
            .await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?;
        if pending > 0 {
            log::debug!("closing bridge with {} pending callback(s)", pending);
        }
        self.inner.tasks.shutdown()
    }
}
