//! Worker Pool Implementation
//!
//! Competing consumers: every [`WorkProcessor`] in a pool races on one shared
//! work sequence, so each published event is handled by exactly one worker.
//! Downstream stages gate on the whole set of worker sequences plus the shared
//! work sequence.

use crate::disruptor::event_processor::{invoke_guarded, processor_task, RunState, Start};
use crate::disruptor::{
    get_minimum_sequence, DisruptorError, EventFactory, EventProcessor, ExceptionHandler,
    Executor, Result, RingBuffer, Sequence, SequenceBarrier, WaitStrategy, WorkHandler,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// One competing consumer of a [`WorkerPool`]
pub struct WorkProcessor<T, H> {
    state: RunState,
    sequence: Arc<Sequence>,
    work_sequence: Arc<Sequence>,
    ring_buffer: Arc<RingBuffer<T>>,
    barrier: Arc<dyn SequenceBarrier>,
    handler: Mutex<H>,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
}

impl<T, H> WorkProcessor<T, H>
where
    T: Send + Sync,
    H: WorkHandler<T>,
{
    /// Create a worker that claims from `work_sequence`
    ///
    /// # Arguments
    /// * `ring_buffer` - The buffer events are read from
    /// * `barrier` - The barrier bounding how far the pool may read
    /// * `handler` - The handler for events this worker wins
    /// * `exception_handler` - Policy for handler failures
    /// * `work_sequence` - Claim counter shared by every worker in the pool
    pub fn new(
        ring_buffer: Arc<RingBuffer<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        handler: H,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        work_sequence: Arc<Sequence>,
    ) -> Self {
        Self {
            state: RunState::new(),
            sequence: Arc::new(Sequence::default()),
            work_sequence,
            ring_buffer,
            barrier,
            handler: Mutex::new(handler),
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
        tracing::debug!(sequence = self.sequence.get(), "work processor started");

        let result = self.process_events(handler);
        if let Err(error) = &result {
            tracing::error!(sequence = self.sequence.get(), "work processor stopped: {error}");
        }

        self.notify_shutdown(handler);
        tracing::debug!(sequence = self.sequence.get(), "work processor halted");
        result
    }

    fn process_events(&self, handler: &mut H) -> Result<()> {
        let mut processed = true;
        let mut cached_available = i64::MIN;
        let mut next_sequence = self.sequence.get();

        loop {
            if processed {
                processed = false;
                // Publish the claim minus one first so gating never runs ahead of the work
                loop {
                    next_sequence = self.work_sequence.get() + 1;
                    self.sequence.set(next_sequence - 1);
                    if self
                        .work_sequence
                        .compare_and_set(next_sequence - 1, next_sequence)
                    {
                        break;
                    }
                }
            }

            if cached_available >= next_sequence {
                // SAFETY: `next_sequence` is published and was claimed by this worker alone;
                // the producer is gated by this worker's sequence, which is still below it.
                let event = unsafe { self.ring_buffer.get(next_sequence) };
                let outcome = invoke_guarded(|| handler.on_event(event));
                processed = true;
                self.sequence.set(next_sequence);
                if let Err(error) = outcome {
                    self.exception_handler
                        .handle_event_exception(error, next_sequence, event)?;
                }
                continue;
            }

            match self.barrier.wait_for(next_sequence) {
                Ok(available) => cached_available = available,
                Err(DisruptorError::Alert) => {
                    if !self.state.is_running() {
                        return Ok(());
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }
}

impl<T, H> EventProcessor for WorkProcessor<T, H>
where
    T: Send + Sync,
    H: WorkHandler<T>,
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

    fn run(&self) -> Result<()> {
        let started = self.state.start()?;
        let result = match self.handler.try_lock() {
            Some(mut handler) => self.run_with(&mut handler, started),
            None => Err(DisruptorError::AlreadyRunning),
        };
        self.state.finish();
        result
    }
}

impl<T, H> std::fmt::Debug for WorkProcessor<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkProcessor")
            .field("sequence", &self.sequence)
            .field("work_sequence", &self.work_sequence)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// A pool of workers sharing one claim counter
///
/// # Type Parameters
/// * `T` - The event type stored in the ring buffer
pub struct WorkerPool<T> {
    started: AtomicBool,
    work_sequence: Arc<Sequence>,
    ring_buffer: Arc<RingBuffer<T>>,
    barrier: Arc<dyn SequenceBarrier>,
    processors: Vec<Arc<dyn EventProcessor>>,
}

impl<T> WorkerPool<T>
where
    T: Send + Sync + 'static,
{
    /// Create a pool over an existing ring buffer
    ///
    /// The caller is responsible for adding [`WorkerPool::worker_sequences`] to the
    /// ring buffer's gating sequences.
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidArgument` if `handlers` is empty
    pub fn new<H, I>(
        ring_buffer: Arc<RingBuffer<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        handlers: I,
    ) -> Result<Self>
    where
        H: WorkHandler<T> + 'static,
        I: IntoIterator<Item = H>,
    {
        let work_sequence = Arc::new(Sequence::default());
        let processors: Vec<Arc<dyn EventProcessor>> = handlers
            .into_iter()
            .map(|handler| {
                Arc::new(WorkProcessor::new(
                    Arc::clone(&ring_buffer),
                    Arc::clone(&barrier),
                    handler,
                    Arc::clone(&exception_handler),
                    Arc::clone(&work_sequence),
                )) as Arc<dyn EventProcessor>
            })
            .collect();

        if processors.is_empty() {
            return Err(DisruptorError::InvalidArgument(
                "a worker pool needs at least one work handler".to_string(),
            ));
        }

        Ok(Self {
            started: AtomicBool::new(false),
            work_sequence,
            ring_buffer,
            barrier,
            processors,
        })
    }

    /// Create a pool that owns a fresh multi-producer ring buffer
    ///
    /// The workers' sequences are registered as the buffer's gating sequences.
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if `buffer_size` is not a power of 2
    pub fn with_event_factory<F, H, I>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        handlers: I,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
        H: WorkHandler<T> + 'static,
        I: IntoIterator<Item = H>,
    {
        let ring_buffer = Arc::new(RingBuffer::create_multi_producer(
            event_factory,
            buffer_size,
            wait_strategy,
        )?);
        let barrier = ring_buffer.new_barrier(&[]);
        let pool = Self::new(Arc::clone(&ring_buffer), barrier, exception_handler, handlers)?;
        ring_buffer.add_gating_sequences(&pool.worker_sequences());
        Ok(pool)
    }

    /// Every worker's sequence followed by the shared work sequence
    pub fn worker_sequences(&self) -> Vec<Arc<Sequence>> {
        self.processors
            .iter()
            .map(|processor| processor.sequence())
            .chain(std::iter::once(Arc::clone(&self.work_sequence)))
            .collect()
    }

    /// Seed the workers at the current cursor and submit them to `executor`
    ///
    /// # Errors
    /// Returns `DisruptorError::AlreadyStarted` if the pool is running, or the
    /// executor's error if a worker could not be submitted
    pub fn start(&self, executor: &dyn Executor) -> Result<Arc<RingBuffer<T>>> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(DisruptorError::AlreadyStarted("WorkerPool"));
        }

        // Workers share the barrier, so the alert left by a previous halt is
        // cleared here rather than by each worker
        self.barrier.clear_alert();
        let cursor = self.ring_buffer.cursor();
        self.work_sequence.set(cursor);
        for processor in &self.processors {
            processor.sequence().set(cursor);
        }

        for processor in &self.processors {
            executor.execute(processor_task(Arc::clone(processor)))?;
        }
        tracing::debug!(workers = self.processors.len(), cursor, "worker pool started");

        Ok(Arc::clone(&self.ring_buffer))
    }

    /// Wait until every worker has caught up with the cursor, then halt
    pub fn drain_and_halt(&self) {
        let sequences = self.worker_sequences();
        while self.ring_buffer.cursor() > get_minimum_sequence(&sequences, i64::MAX) {
            thread::yield_now();
        }
        self.halt();
    }

    /// Halt every worker immediately
    pub fn halt(&self) {
        for processor in &self.processors {
            processor.halt();
        }
        self.started.store(false, Ordering::Release);
    }

    /// Whether any worker is still running
    pub fn is_running(&self) -> bool {
        self.processors.iter().any(|processor| processor.is_running())
    }

    /// Whether every worker has entered its run loop at least once
    pub fn has_started(&self) -> bool {
        self.processors.iter().all(|processor| processor.has_started())
    }

    /// The workers of this pool
    pub fn processors(&self) -> &[Arc<dyn EventProcessor>] {
        &self.processors
    }

    /// The ring buffer the pool consumes from
    pub fn ring_buffer(&self) -> Arc<RingBuffer<T>> {
        Arc::clone(&self.ring_buffer)
    }
}

impl<T> std::fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.processors.len())
            .field("work_sequence", &self.work_sequence)
            .field("started", &self.started)
            .finish()
    }
}
