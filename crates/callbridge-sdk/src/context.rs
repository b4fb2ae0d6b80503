//! Parsed command arguments
//!
//! The host parses a command line and hands native executors and suggestion
//! providers a context. Native code only sees this trait.

use std::collections::HashMap;

use crate::error::{BridgeResult, NativeError};
use crate::value::{ArgValue, FromArg};

/// Parsed arguments of one command invocation.
pub trait CommandContext: Send + Sync {
    /// Raw command line as typed by the sender
    fn input(&self) -> &str;

    /// Look up a parsed argument by name
    fn argument(&self, name: &str) -> Option<ArgValue>;
}

impl dyn CommandContext + '_ {
    /// Get a typed argument by name
    pub fn get<T: FromArg>(&self, name: &str) -> BridgeResult<T> {
        let value = self
            .argument(name)
            .ok_or_else(|| NativeError::MissingArgument(name.to_string()))?;
        T::from_arg(&value)
    }

    /// Get a string argument by name
    pub fn get_string(&self, name: &str) -> BridgeResult<String> {
        self.get(name)
    }

    /// Check whether an argument was supplied
    pub fn has(&self, name: &str) -> bool {
        self.argument(name).is_some()
    }
}

/// In-memory command context.
///
/// Used by hosts that parse commands on the Rust side, and by tests.
#[derive(Debug, Clone, Default)]
pub struct ArgumentMap {
    input: String,
    args: HashMap<String, ArgValue>,
}

impl ArgumentMap {
    /// Create an empty context for the given command line
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            args: HashMap::new(),
        }
    }

    /// Add an argument (builder style)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace an argument
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        self.args.insert(name.into(), value.into());
    }

    /// Number of parsed arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Check if no arguments were parsed
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl CommandContext for ArgumentMap {
    fn input(&self) -> &str {
        &self.input
    }

    fn argument(&self, name: &str) -> Option<ArgValue> {
        self.args.get(name).cloned()
    }
}
