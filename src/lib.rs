//! RFox Script Bridge
//!
//! Connects a native host to the embedded JavaScript engine of the RFox
//! rendering component:
//!
//! - **Async bridge**: script calls a bound global, the host gets a
//!   [`CompletionHandle`] and completes it later from any thread; the callback
//!   runs on the engine thread exactly once.
//! - **HTML tree builder**: raw HTML becomes live DOM nodes under the document
//!   body, with inline scripts evaluated and inline styles applied in document
//!   order.
//!
//! # Example
//!
//! ```no_run
//! use rfbridge::{BridgeConfig, HostMethods, ScriptContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ctx = ScriptContext::new(BridgeConfig::default(), HostMethods::new())?;
//! assert!(ctx.parse_html(r#"<div style="color:red">hi</div>"#));
//! println!("{}", ctx.body_markup().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod bindings;
pub mod bridge;
pub mod dom;
mod dom_bindings;
pub mod engine;
pub mod host;
pub mod html_parser;
mod state;

// Async-friendly facade (worker thread owning the context)
pub mod async_api;

pub use async_api::Bridge;
pub use bridge::{BridgeStats, CallbackContext, CompletionHandle, HostValue, TaskSender};
pub use engine::{ScriptContext, ScriptException};
pub use host::{Capability, HostMethods, MethodCall, MousePointer, SnapshotDirectory, SnapshotRequest};

/// Configuration for a script context
///
/// The defaults mirror the engine defaults of the RFox headless backend:
/// JavaScript on, a loop iteration limit, and a bounded recursion depth.
///
/// # Examples
///
/// ```
/// let cfg = rfbridge::BridgeConfig::default();
/// assert!(cfg.enable_javascript);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Identifier handed to host capabilities alongside each request
    pub context_id: i32,
    /// Whether inline scripts and `evaluate_script` run at all
    pub enable_javascript: bool,
    /// Maximum loop iterations before Boa throws an error (0 => disabled)
    pub script_loop_iteration_limit: u64,
    /// Maximum recursion depth before Boa throws (usize::MAX => disabled)
    pub script_recursion_limit: usize,
    /// How long callers settle pending callbacks before giving up
    pub pending_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            context_id: 0,
            enable_javascript: true,
            script_loop_iteration_limit: 1000000,
            script_recursion_limit: 1024,
            pending_timeout_ms: 5000,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.context_id < 0 {
            return Err(Error::ConfigError(format!(
                "context_id must be non-negative, got {}",
                self.context_id
            )));
        }
        if self.script_recursion_limit == 0 {
            return Err(Error::ConfigError("script_recursion_limit must be at least 1".into()));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }
}

/// Result of JavaScript execution
///
/// `value` is the displayed result of the evaluation. `is_error` indicates
/// whether the script threw an exception.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptResult {
    /// Serialized result value
    pub value: String,
    /// Whether the script threw an error
    pub is_error: bool,
}
