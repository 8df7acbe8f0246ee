//! Host capability table.
//!
//! The platform installs whichever capabilities it supports; each binding
//! checks for the one it needs and throws when it is missing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::bridge::{CompletionHandle, HostValue};
use crate::{Error, Result};

/// One pointer sample forwarded by `__rfox_simulate_pointer__`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MousePointer {
    pub context_id: i32,
    pub x: f64,
    pub y: f64,
    pub change: f64,
}

/// Bytes and golden name handed to the snapshot capability.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRequest {
    pub context_id: i32,
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A method-channel invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub context_id: i32,
    pub method: String,
    pub arguments: serde_json::Value,
}

pub type EnvironmentFn = Arc<dyn Fn() -> String + Send + Sync>;
pub type MatchImageSnapshotFn = Arc<dyn Fn(SnapshotRequest, CompletionHandle) + Send + Sync>;
pub type SimulatePointerFn = Arc<dyn Fn(&[MousePointer], u32) + Send + Sync>;
pub type SimulateInputTextFn = Arc<dyn Fn(&str) + Send + Sync>;
pub type InvokeMethodFn = Arc<dyn Fn(MethodCall, CompletionHandle) + Send + Sync>;

/// Capabilities a binding may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Environment,
    MatchImageSnapshot,
    SimulatePointer,
    SimulateInputText,
    InvokeMethod,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Capability::Environment => "environment",
            Capability::MatchImageSnapshot => "matchImageSnapshot",
            Capability::SimulatePointer => "simulatePointer",
            Capability::SimulateInputText => "simulateInputText",
            Capability::InvokeMethod => "invokeMethod",
        }
    }
}

/// Optional host functions. Unset slots make the matching bindings throw.
#[derive(Clone, Default)]
pub struct HostMethods {
    pub environment: Option<EnvironmentFn>,
    pub match_image_snapshot: Option<MatchImageSnapshotFn>,
    pub simulate_pointer: Option<SimulatePointerFn>,
    pub simulate_input_text: Option<SimulateInputTextFn>,
    pub invoke_method: Option<InvokeMethodFn>,
}

impl HostMethods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Environment => self.environment.is_some(),
            Capability::MatchImageSnapshot => self.match_image_snapshot.is_some(),
            Capability::SimulatePointer => self.simulate_pointer.is_some(),
            Capability::SimulateInputText => self.simulate_input_text.is_some(),
            Capability::InvokeMethod => self.invoke_method.is_some(),
        }
    }

    pub fn with_environment<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.environment = Some(Arc::new(f));
        self
    }

    pub fn with_match_image_snapshot<F>(mut self, f: F) -> Self
    where
        F: Fn(SnapshotRequest, CompletionHandle) + Send + Sync + 'static,
    {
        self.match_image_snapshot = Some(Arc::new(f));
        self
    }

    pub fn with_simulate_pointer<F>(mut self, f: F) -> Self
    where
        F: Fn(&[MousePointer], u32) + Send + Sync + 'static,
    {
        self.simulate_pointer = Some(Arc::new(f));
        self
    }

    pub fn with_simulate_input_text<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.simulate_input_text = Some(Arc::new(f));
        self
    }

    pub fn with_invoke_method<F>(mut self, f: F) -> Self
    where
        F: Fn(MethodCall, CompletionHandle) + Send + Sync + 'static,
    {
        self.invoke_method = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for HostMethods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMethods")
            .field("environment", &self.environment.is_some())
            .field("match_image_snapshot", &self.match_image_snapshot.is_some())
            .field("simulate_pointer", &self.simulate_pointer.is_some())
            .field("simulate_input_text", &self.simulate_input_text.is_some())
            .field("invoke_method", &self.invoke_method.is_some())
            .finish()
    }
}

/// Content-addressed snapshot goldens: `<root>/<name>.sha256` holds the hex
/// SHA-256 of the expected bytes. A missing golden is recorded and matches.
#[derive(Debug, Clone)]
pub struct SnapshotDirectory {
    root: PathBuf,
}

impl SnapshotDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn golden_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(Error::Other(format!("invalid snapshot name: {:?}", name)));
        }
        Ok(self.root.join(format!("{}.sha256", name)))
    }

    pub fn matches(&self, name: &str, bytes: &[u8]) -> Result<bool> {
        let path = self.golden_path(name)?;
        let digest = hex::encode(Sha256::digest(bytes));
        if !path.exists() {
            fs::create_dir_all(&self.root)?;
            fs::write(&path, &digest)?;
            log::debug!("recorded snapshot golden {:?}", path);
            return Ok(true);
        }
        let expected = fs::read_to_string(&path)?;
        Ok(expected.trim() == digest)
    }

    /// Wrap as a `matchImageSnapshot` capability. Each comparison runs on its
    /// own thread and completes the handle from there.
    pub fn into_capability(self) -> MatchImageSnapshotFn {
        let dir = Arc::new(self);
        Arc::new(move |request: SnapshotRequest, handle: CompletionHandle| {
            let dir = Arc::clone(&dir);
            std::thread::spawn(move || {
                let sent = match dir.matches(&request.name, &request.bytes) {
                    Ok(matched) => handle.complete(HostValue::Bool(matched)),
                    Err(e) => handle.fail(e.to_string()),
                };
                if let Err(e) = sent {
                    log::warn!("snapshot '{}' finished after teardown: {}", request.name, e);
                }
            });
        })
    }
}
