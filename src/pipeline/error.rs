//! Error types and reporting for pipeline components.

use std::any::Any;
use std::fmt;

/// Errors a component can raise while processing segments.
///
/// None of these abort a pipeline run; the orchestrator records them and
/// returns the last good segment list.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentError {
    /// The component ran but could not produce output.
    Failed(String),
    /// A dependency of the component (model, audio) is missing.
    Unavailable(String),
    /// The component panicked.
    Panicked(String),
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentError::Failed(msg) => write!(f, "component failed: {}", msg),
            ComponentError::Unavailable(msg) => write!(f, "component unavailable: {}", msg),
            ComponentError::Panicked(msg) => write!(f, "component panicked: {}", msg),
        }
    }
}

impl std::error::Error for ComponentError {}

impl From<crate::error::SubalignError> for ComponentError {
    fn from(e: crate::error::SubalignError) -> Self {
        ComponentError::Failed(e.to_string())
    }
}

impl ComponentError {
    /// Builds a `Panicked` error from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("unknown panic");
        ComponentError::Panicked(msg.to_string())
    }
}

/// Trait for reporting component errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a component.
    fn report(&self, component: &str, error: &ComponentError);
}

/// Reports component errors as warnings on the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, component: &str, error: &ComponentError) {
        tracing::warn!(component, error = %error, "pipeline component failed; returning last good output");
    }
}
