//! Error types for the script bridge

use boa_engine::{JsError, JsNativeError};
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the script bridge
#[derive(Error, Debug)]
pub enum Error {
    /// A script-callable entry point received an argument of the wrong type
    #[error("Failed to execute '{operation}': parameter {index} ({name}) {expectation}.")]
    ArgumentType {
        operation: &'static str,
        index: usize,
        name: &'static str,
        expectation: &'static str,
    },

    /// The host did not install the capability an operation needs
    #[error("Failed to execute '{operation}': host method ({capability}) is not registered.")]
    CapabilityUnavailable {
        operation: &'static str,
        capability: &'static str,
    },

    /// The document has no body container
    #[error("HTML structure error: {0}")]
    StructuralParse(String),

    /// Failed to execute JavaScript
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Invalid node id or tree operation
    #[error("DOM error: {0}")]
    DomError(String),

    /// The script context a completion or task was addressed to is gone
    #[error("Script context {0} has been torn down")]
    ContextClosed(i32),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Failed to initialize the script context
    #[error("Context initialization failed: {0}")]
    InitializationError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error surfaces as a `TypeError` when thrown into script.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            Error::ArgumentType { .. } | Error::CapabilityUnavailable { .. }
        )
    }
}

impl From<Error> for JsError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        if err.is_type_error() {
            JsNativeError::typ().with_message(message).into()
        } else {
            JsNativeError::error().with_message(message).into()
        }
    }
}
