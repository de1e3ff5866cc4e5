//! Exception Handler Implementation
//!
//! Exception handlers decide what happens when a handler invocation fails.
//! Processors always advance past the failing event first; the exception
//! handler then either lets the processor continue or escalates by returning
//! an error, which ends the processor loop.

use crate::disruptor::{DisruptorError, Result};
use parking_lot::RwLock;
use std::sync::Arc;

/// Handler for failures raised by event handlers
///
/// # Type Parameters
/// * `T` - The event type being processed
pub trait ExceptionHandler<T>: Send + Sync {
    /// Handle a failure raised while processing `event`
    ///
    /// # Arguments
    /// * `error` - The failure raised by the handler (panics arrive here as errors too)
    /// * `sequence` - The sequence of the failing event
    /// * `event` - The failing event
    ///
    /// # Returns
    /// `Ok(())` to continue processing, or an error to stop the processor
    fn handle_event_exception(&self, error: anyhow::Error, sequence: i64, event: &T) -> Result<()>;

    /// Handle a failure raised by a handler's start hook
    fn handle_on_start_exception(&self, error: &anyhow::Error);

    /// Handle a failure raised by a handler's shutdown hook, or a shutdown timeout
    fn handle_on_shutdown_exception(&self, error: &anyhow::Error);
}

/// Logs the failure and stops the processor
#[derive(Debug, Default, Clone, Copy)]
pub struct FatalExceptionHandler;

impl FatalExceptionHandler {
    /// Create a new fatal exception handler
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for FatalExceptionHandler {
    fn handle_event_exception(&self, error: anyhow::Error, sequence: i64, _event: &T) -> Result<()> {
        tracing::error!(sequence, "Exception processing event: {error:#}");
        Err(DisruptorError::Fatal {
            sequence,
            source: error.into(),
        })
    }

    fn handle_on_start_exception(&self, error: &anyhow::Error) {
        tracing::error!("Exception during on_start(): {error:#}");
    }

    fn handle_on_shutdown_exception(&self, error: &anyhow::Error) {
        tracing::error!("Exception during on_shutdown(): {error:#}");
    }
}

/// Logs the failure at info level and lets the processor continue
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreExceptionHandler;

impl IgnoreExceptionHandler {
    /// Create a new ignore exception handler
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for IgnoreExceptionHandler {
    fn handle_event_exception(&self, error: anyhow::Error, sequence: i64, _event: &T) -> Result<()> {
        tracing::info!(sequence, "Exception processing event: {error:#}");
        Ok(())
    }

    fn handle_on_start_exception(&self, error: &anyhow::Error) {
        tracing::info!("Exception during on_start(): {error:#}");
    }

    fn handle_on_shutdown_exception(&self, error: &anyhow::Error) {
        tracing::info!("Exception during on_shutdown(): {error:#}");
    }
}

/// Exception handler whose delegate can be swapped after processors are built
///
/// Processors registered through the DSL without an explicit handler share one
/// wrapper, so switching its delegate changes the policy for all of them.
/// The delegate defaults to [`FatalExceptionHandler`].
pub struct ExceptionHandlerWrapper<T> {
    delegate: RwLock<Arc<dyn ExceptionHandler<T>>>,
}

impl<T: 'static> ExceptionHandlerWrapper<T> {
    /// Create a wrapper delegating to [`FatalExceptionHandler`]
    pub fn new() -> Self {
        Self {
            delegate: RwLock::new(Arc::new(FatalExceptionHandler)),
        }
    }

    /// Replace the delegate
    pub fn switch_to(&self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        *self.delegate.write() = exception_handler;
    }

    // Cloned out so a delegate call never holds the lock.
    fn current(&self) -> Arc<dyn ExceptionHandler<T>> {
        Arc::clone(&self.delegate.read())
    }
}

impl<T: 'static> Default for ExceptionHandlerWrapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> ExceptionHandler<T> for ExceptionHandlerWrapper<T> {
    fn handle_event_exception(&self, error: anyhow::Error, sequence: i64, event: &T) -> Result<()> {
        self.current().handle_event_exception(error, sequence, event)
    }

    fn handle_on_start_exception(&self, error: &anyhow::Error) {
        self.current().handle_on_start_exception(error);
    }

    fn handle_on_shutdown_exception(&self, error: &anyhow::Error) {
        self.current().handle_on_shutdown_exception(error);
    }
}

impl<T> std::fmt::Debug for ExceptionHandlerWrapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionHandlerWrapper").finish_non_exhaustive()
    }
}
