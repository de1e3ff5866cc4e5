//! Event Handler Implementation
//!
//! User callbacks invoked by the processors. [`EventHandler`] is driven by a
//! [`BatchEventProcessor`](crate::disruptor::BatchEventProcessor) and sees every
//! event in order. [`WorkHandler`] is driven by a
//! [`WorkerPool`](crate::disruptor::WorkerPool) and sees each event on exactly
//! one worker of the pool.
//!
//! Handlers read events through a shared reference because several consumers
//! may observe the same slot concurrently. Failures are reported as
//! [`anyhow::Error`] and routed to the processor's exception handler.

/// Handler for processing events from the Disruptor
///
/// # Type Parameters
/// * `T` - The event type that will be processed
///
/// # Examples
/// ```
/// use ringbatch::disruptor::EventHandler;
///
/// #[derive(Default)]
/// struct Trade {
///     quantity: u64,
/// }
///
/// #[derive(Default)]
/// struct VolumeCounter {
///     total: u64,
/// }
///
/// impl EventHandler<Trade> for VolumeCounter {
///     fn on_event(&mut self, event: &Trade, _sequence: i64, _end_of_batch: bool) -> anyhow::Result<()> {
///         self.total += event.quantity;
///         Ok(())
///     }
/// }
/// ```
pub trait EventHandler<T>: Send {
    /// Process an event
    ///
    /// # Arguments
    /// * `event` - The published event
    /// * `sequence` - The sequence number of the event in the ring buffer
    /// * `end_of_batch` - True if this is the last event of the batch that became available
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> anyhow::Result<()>;

    /// Called on the processor thread before the first event
    fn on_start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called on the processor thread after the last event, before the thread exits
    fn on_shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<T> EventHandler<T> for Box<dyn EventHandler<T>> {
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> anyhow::Result<()> {
        (**self).on_event(event, sequence, end_of_batch)
    }

    fn on_start(&mut self) -> anyhow::Result<()> {
        (**self).on_start()
    }

    fn on_shutdown(&mut self) -> anyhow::Result<()> {
        (**self).on_shutdown()
    }
}

/// Event handler backed by a closure
///
/// # Examples
/// ```
/// use ringbatch::disruptor::event_handler::ClosureEventHandler;
///
/// let handler = ClosureEventHandler::new(|value: &i64, sequence: i64, _end: bool| -> anyhow::Result<()> {
///     assert!(*value >= 0 && sequence >= 0);
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> ClosureEventHandler<F> {
    /// Create a new closure-based event handler
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<T, F> EventHandler<T> for ClosureEventHandler<F>
where
    F: FnMut(&T, i64, bool) -> anyhow::Result<()> + Send,
{
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> anyhow::Result<()> {
        (self.handler)(event, sequence, end_of_batch)
    }
}

/// Handler for competing consumers in a worker pool
pub trait WorkHandler<T>: Send {
    /// Process an event claimed by this worker
    fn on_event(&mut self, event: &T) -> anyhow::Result<()>;

    /// Called on the worker thread before the first event
    fn on_start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called on the worker thread before it exits
    fn on_shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<T> WorkHandler<T> for Box<dyn WorkHandler<T>> {
    fn on_event(&mut self, event: &T) -> anyhow::Result<()> {
        (**self).on_event(event)
    }

    fn on_start(&mut self) -> anyhow::Result<()> {
        (**self).on_start()
    }

    fn on_shutdown(&mut self) -> anyhow::Result<()> {
        (**self).on_shutdown()
    }
}

/// Work handler backed by a closure
pub struct ClosureWorkHandler<F> {
    handler: F,
}

impl<F> ClosureWorkHandler<F> {
    /// Create a new closure-based work handler
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<T, F> WorkHandler<T> for ClosureWorkHandler<F>
where
    F: FnMut(&T) -> anyhow::Result<()> + Send,
{
    fn on_event(&mut self, event: &T) -> anyhow::Result<()> {
        (self.handler)(event)
    }
}
