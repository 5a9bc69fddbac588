//! Method-call boundary between the service stack and bench handlers.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};
use uabench_frame::Variant;

use crate::error::MethodInvocationError;

/// An incoming method call, already decoded by the service stack.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    /// Node id of the object the method was called on.
    pub object: String,
    pub method: String,
    pub inputs: Vec<Variant>,
}

impl MethodCall {
    pub fn new(object: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            method: method.into(),
            inputs: Vec::new(),
        }
    }

    /// Reject calls carrying more inputs than `expected`.
    pub fn expect_inputs(&self, expected: usize) -> Result<(), MethodInvocationError> {
        if self.inputs.len() > expected {
            return Err(MethodInvocationError::TooManyArguments {
                expected,
                actual: self.inputs.len(),
            });
        }
        Ok(())
    }
}

type MethodHandler =
    Box<dyn Fn(&MethodCall) -> Result<Vec<Variant>, MethodInvocationError> + Send>;

/// Handlers keyed by method name.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: BTreeMap<String, MethodHandler>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&MethodCall) -> Result<Vec<Variant>, MethodInvocationError> + Send + 'static,
    {
        let name = name.into();
        if self.handlers.insert(name.clone(), Box::new(handler)).is_some() {
            warn!(method = %name, "method handler replaced");
        } else {
            debug!(method = %name, "method registered");
        }
    }

    /// Invoke the handler registered for `call.method`.
    pub fn call(&self, call: &MethodCall) -> Result<Vec<Variant>, MethodInvocationError> {
        let handler = self
            .handlers
            .get(&call.method)
            .ok_or_else(|| MethodInvocationError::UnknownMethod(call.method.clone()))?;
        handler(call)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
