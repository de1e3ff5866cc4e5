//! Event Processor implementation for the Disruptor
//!
//! An event processor is a consumer loop that owns one sequence and runs on a
//! thread supplied by an executor. [`BatchEventProcessor`] hands every event to
//! one [`EventHandler`], in order, in whatever batch sizes the barrier makes
//! available.

use crate::disruptor::{
    DisruptorError, EventHandler, ExceptionHandler, Result, RingBuffer, Sequence,
    SequenceBarrier, Task,
};
use anyhow::anyhow;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// A consumer loop that can be run on an executor thread and halted from another
pub trait EventProcessor: Send + Sync {
    /// The sequence this processor advances as it consumes events
    fn sequence(&self) -> Arc<Sequence>;

    /// Request the processor to stop at its next opportunity
    fn halt(&self);

    /// Whether the processor has been started and has not yet fully stopped
    fn is_running(&self) -> bool;

    /// Whether [`EventProcessor::run`] has been entered at least once
    ///
    /// Unlike [`EventProcessor::is_running`] this never goes back to false, so a
    /// caller can wait on it without racing a processor that exits right away.
    fn has_started(&self) -> bool;

    /// Run the processing loop on the calling thread until halted
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if another thread is running this processor, or the
    /// error produced by the exception handler when it escalates a failure
    fn run(&self) -> Result<()>;
}

const IDLE: u8 = 0;
const HALTED: u8 = 1;
const RUNNING: u8 = 2;

/// Lifecycle of a processor: Idle, Running or Halted
#[derive(Debug)]
pub(crate) struct RunState {
    state: AtomicU8,
    entered: AtomicBool,
}

/// Outcome of trying to enter the running state
pub(crate) enum Start {
    Started,
    HaltedBeforeStart,
}

impl RunState {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            entered: AtomicBool::new(false),
        }
    }

    pub(crate) fn start(&self) -> Result<Start> {
        let start = match self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Start::Started,
            Err(RUNNING) => return Err(DisruptorError::AlreadyRunning),
            Err(_) => Start::HaltedBeforeStart,
        };
        // Set only once the state is no longer idle, so observers of the latch
        // also see the processor as active until it finishes
        self.entered.store(true, Ordering::Release);
        Ok(start)
    }

    pub(crate) fn halt(&self) {
        self.state.store(HALTED, Ordering::Release);
    }

    pub(crate) fn finish(&self) {
        self.state.store(IDLE, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) != IDLE
    }

    pub(crate) fn has_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// Invoke a handler callback, turning a panic into an error
pub(crate) fn invoke_guarded<F>(callback: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_owned());
            Err(anyhow!("handler panicked: {message}"))
        }
    }
}

/// Wrap a processor into an executor task
pub(crate) fn processor_task(processor: Arc<dyn EventProcessor>) -> Task {
    Box::new(move || {
        if let Err(DisruptorError::AlreadyRunning) = processor.run() {
            tracing::warn!("processor submitted while already running");
        }
    })
}

/// Single-threaded consumer that delivers every event to one handler
///
/// After each batch the processor publishes its progress with an ordered write,
/// so every read of the batch happens-before downstream consumers and the
/// producer see the slots as released.
pub struct BatchEventProcessor<T, H> {
    state: RunState,
    ring_buffer: Arc<RingBuffer<T>>,
    barrier: Arc<dyn SequenceBarrier>,
    handler: Mutex<H>,
    sequence: Arc<Sequence>,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
}

impl<T, H> BatchEventProcessor<T, H>
where
    T: Send + Sync,
    H: EventHandler<T>,
{
    /// Create a new batch event processor
    ///
    /// # Arguments
    /// * `ring_buffer` - The buffer events are read from
    /// * `barrier` - The barrier bounding how far this processor may read
    /// * `handler` - The handler every event is delivered to
    /// * `exception_handler` - Policy for handler failures
    pub fn new(
        ring_buffer: Arc<RingBuffer<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        handler: H,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
    ) -> Self {
        Self {
            state: RunState::new(),
            ring_buffer,
            barrier,
            handler: Mutex::new(handler),
            sequence: Arc::new(Sequence::default()),
            exception_handler,
        }
    }

    fn notify_start(&self, handler: &mut H) {
        if let Err(error) = invoke_guarded(|| handler.on_start()) {
            self.exception_handler.handle_on_start_exception(&error);
        }
    }

    fn notify_shutdown(&self, handler: &mut H) {
        if let Err(error) = invoke_guarded(|| handler.on_shutdown()) {
            self.exception_handler.handle_on_shutdown_exception(&error);
        }
    }

    fn run_with(&self, handler: &mut H, started: Start) -> Result<()> {
        self.notify_start(handler);
        // A halt can land between entering the running state and this point
        if matches!(started, Start::HaltedBeforeStart) || !self.state.is_running() {
            self.notify_shutdown(handler);
            return Ok(());
        }
        tracing::debug!(sequence = self.sequence.get(), "batch event processor started");

        let result = self.process_events(handler);
        if let Err(error) = &result {
            tracing::error!(sequence = self.sequence.get(), "batch event processor stopped: {error}");
        }

        self.notify_shutdown(handler);
        tracing::debug!(sequence = self.sequence.get(), "batch event processor halted");
        result
    }

    fn process_events(&self, handler: &mut H) -> Result<()> {
        let mut next_sequence = self.sequence.get() + 1;

        loop {
            let available_sequence = match self.barrier.wait_for(next_sequence) {
                Ok(available) => available,
                Err(DisruptorError::Alert) => {
                    if !self.state.is_running() {
                        return Ok(());
                    }
                    continue;
                }
                Err(other) => return Err(other),
            };

            while next_sequence <= available_sequence {
                // SAFETY: the barrier has published `next_sequence` and the producer cannot
                // reclaim the slot until this processor's sequence moves past it.
                let event = unsafe { self.ring_buffer.get(next_sequence) };
                let end_of_batch = next_sequence == available_sequence;

                if let Err(error) =
                    invoke_guarded(|| handler.on_event(event, next_sequence, end_of_batch))
                {
                    let failed = next_sequence;
                    self.sequence.set(failed);
                    next_sequence += 1;
                    self.exception_handler
                        .handle_event_exception(error, failed, event)?;
                    continue;
                }
                next_sequence += 1;
            }

            self.sequence.set(available_sequence);
        }
    }
}

impl<T, H> EventProcessor for BatchEventProcessor<T, H>
where
    T: Send + Sync,
    H: EventHandler<T>,
{
    fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    fn halt(&self) {
        self.state.halt();
        self.barrier.alert();
    }

    fn is_running(&self) -> bool {
        self.state.is_active()
    }

    fn has_started(&self) -> bool {
        self.state.has_entered()
    }

    /// Runs until halted. The barrier's alert is not cleared here: it is shared
    /// with sibling processors, so whoever starts the stage clears it first.
    fn run(&self) -> Result<()> {
        let started = self.state.start()?;
        let result = match self.handler.try_lock() {
            Some(mut handler) => self.run_with(&mut handler, started),
            None => Err(DisruptorError::AlreadyRunning),
        };
        // The handler guard is released above, so a rerun can take it at once
        self.state.finish();
        result
    }
}

impl<T, H> std::fmt::Debug for BatchEventProcessor<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEventProcessor")
            .field("sequence", &self.sequence)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
