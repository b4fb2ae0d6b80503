//! Error types for the callbridge boundary

use std::any::Any;

use crate::handle::Handle;
use crate::kind::CallbackKind;

/// Result type for calls that cross the boundary
pub type BridgeResult<T> = Result<T, NativeError>;

/// Errors raised while dispatching into native code
#[derive(Debug, Clone, thiserror::Error)]
pub enum NativeError {
    /// An adapter was built around the null handle
    #[error("Null handle")]
    NullHandle,

    /// The handle was released or never issued
    #[error("Stale handle: {0}")]
    StaleHandle(Handle),

    /// The handle names a callback of another kind
    #[error("Callback kind mismatch: expected {expected}, got {got}")]
    KindMismatch {
        /// Kind the adapter dispatches to
        expected: CallbackKind,
        /// Kind stored under the handle
        got: CallbackKind,
    },

    /// Type mismatch during argument conversion
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// A command argument was not present in the context
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// Native callback reported a failure
    #[error("Callback failed: {0}")]
    Callback(String),

    /// Native callback panicked
    #[error("Callback panicked: {0}")]
    Panic(String),

    /// The host side of the boundary failed
    #[error("Host error: {0}")]
    Host(String),
}

impl NativeError {
    /// Convert a caught panic payload into an error
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        NativeError::Panic(msg)
    }
}

impl From<String> for NativeError {
    fn from(s: String) -> Self {
        NativeError::Callback(s)
    }
}

impl From<&str> for NativeError {
    fn from(s: &str) -> Self {
        NativeError::Callback(s.to_string())
    }
}
