//! Disruptor DSL
//!
//! [`Disruptor`] owns the ring buffer and assembles consumers into a dependency
//! graph. Stages registered with [`Disruptor::handle_events_with`] read straight
//! behind the producer; stages registered through [`Disruptor::after`] or
//! [`EventHandlerGroup::then`] read behind the stages they depend on. Only the
//! last stage of each chain gates the producer.

use crate::disruptor::{
    BatchEventProcessor, ConsumerId, ConsumerRepository, DisruptorConfig, DisruptorError,
    EventFactory, EventHandler, EventHandlerGroup, EventProcessor, EventTranslator, EventTranslatorOneArg,
    ExceptionHandler, ExceptionHandlerWrapper, Executor, ProducerType, Result, RingBuffer,
    Sequence, SequenceBarrier, WaitStrategy, WorkHandler, WorkerPool,
};
use anyhow::anyhow;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Entry point for building and running a pipeline
///
/// # Type Parameters
/// * `T` - The event type stored in the ring buffer
///
/// # Examples
/// ```
/// use ringbatch::disruptor::event_handler::ClosureEventHandler;
/// use ringbatch::disruptor::{
///     BlockingWaitStrategy, DefaultEventFactory, Disruptor, ProducerType, ThreadExecutor,
/// };
/// use std::sync::Arc;
///
/// let mut disruptor = Disruptor::new(
///     DefaultEventFactory::<u64>::new(),
///     64,
///     Arc::new(ThreadExecutor::new()),
///     ProducerType::Single,
///     Arc::new(BlockingWaitStrategy::new()),
/// )
/// .unwrap();
///
/// disruptor
///     .handle_events_with([ClosureEventHandler::new(
///         |value: &u64, _sequence: i64, _end_of_batch: bool| -> anyhow::Result<()> {
///             assert!(*value < 10);
///             Ok(())
///         },
///     )])
///     .unwrap();
///
/// disruptor.start().unwrap();
/// for i in 0..10 {
///     disruptor.publish_event(move |slot: &mut u64, _seq: i64| *slot = i).unwrap();
/// }
/// disruptor.shutdown().unwrap();
/// ```
pub struct Disruptor<T> {
    ring_buffer: Arc<RingBuffer<T>>,
    executor: Arc<dyn Executor>,
    consumer_repository: ConsumerRepository<T>,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
    default_exception_handler: Option<Arc<ExceptionHandlerWrapper<T>>>,
    started: bool,
}

impl<T> Disruptor<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new Disruptor
    ///
    /// # Arguments
    /// * `event_factory` - Pre-populates every slot of the ring buffer
    /// * `buffer_size` - Number of slots, must be a power of 2
    /// * `executor` - Runs one task per consumer when the pipeline starts
    /// * `producer_type` - Whether one or many threads publish
    /// * `wait_strategy` - How consumers wait for events
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if `buffer_size` is not a power of 2
    pub fn new<F>(
        event_factory: F,
        buffer_size: usize,
        executor: Arc<dyn Executor>,
        producer_type: ProducerType,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let ring_buffer =
            RingBuffer::create(producer_type, event_factory, buffer_size, wait_strategy)?;
        let wrapper = Arc::new(ExceptionHandlerWrapper::new());

        Ok(Self {
            ring_buffer: Arc::new(ring_buffer),
            executor,
            consumer_repository: ConsumerRepository::new(),
            exception_handler: Arc::clone(&wrapper) as Arc<dyn ExceptionHandler<T>>,
            default_exception_handler: Some(wrapper),
            started: false,
        })
    }

    /// Create a Disruptor from a validated configuration
    ///
    /// # Errors
    /// Returns `DisruptorError::Config` if the configuration does not validate
    pub fn with_config<F>(
        event_factory: F,
        executor: Arc<dyn Executor>,
        config: &DisruptorConfig,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        config.validate()?;
        Self::new(
            event_factory,
            config.buffer_size,
            executor,
            config.producer_type,
            config.build_wait_strategy(),
        )
    }

    /// Register handlers that read directly behind the producer
    ///
    /// Each handler gets its own [`BatchEventProcessor`]; all of them share one
    /// barrier on the producer cursor.
    ///
    /// # Errors
    /// Returns `DisruptorError::AlreadyStarted` after [`Disruptor::start`], or
    /// `DisruptorError::InvalidArgument` if `handlers` is empty
    pub fn handle_events_with<H, I>(&mut self, handlers: I) -> Result<EventHandlerGroup>
    where
        H: EventHandler<T> + 'static,
        I: IntoIterator<Item = H>,
    {
        self.create_event_processors(&[], handlers)
    }

    /// Register a pool of competing workers that reads directly behind the producer
    ///
    /// # Errors
    /// Returns `DisruptorError::AlreadyStarted` after [`Disruptor::start`], or
    /// `DisruptorError::InvalidArgument` if `handlers` is empty
    pub fn handle_events_with_worker_pool<H, I>(&mut self, handlers: I) -> Result<EventHandlerGroup>
    where
        H: WorkHandler<T> + 'static,
        I: IntoIterator<Item = H>,
    {
        self.create_worker_pool(&[], handlers)
    }

    /// Start a stage that depends on every consumer in `group`
    pub fn after(&mut self, group: &EventHandlerGroup) -> StageBuilder<'_, T> {
        StageBuilder {
            disruptor: self,
            barrier_sequences: group.sequences().to_vec(),
        }
    }

    /// Use `exception_handler` for every consumer registered after this call
    pub fn handle_exceptions_with(&mut self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        self.exception_handler = exception_handler;
        self.default_exception_handler = None;
    }

    /// Change the policy of every consumer that uses the default exception handler
    ///
    /// # Errors
    /// Returns `DisruptorError::AlreadyStarted` after start, or
    /// `DisruptorError::InvalidArgument` once [`Disruptor::handle_exceptions_with`] was used
    pub fn set_default_exception_handler(
        &mut self,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
    ) -> Result<()> {
        self.check_not_started()?;
        match &self.default_exception_handler {
            Some(wrapper) => {
                wrapper.switch_to(exception_handler);
                Ok(())
            }
            None => Err(DisruptorError::InvalidArgument(
                "cannot mix handle_exceptions_with and set_default_exception_handler".to_string(),
            )),
        }
    }

    /// Launch every registered consumer on the executor
    ///
    /// Returns once every consumer has entered its run loop. A consumer that
    /// stops straight away, for example on a fatal error, does not hold this up.
    ///
    /// # Errors
    /// Returns `DisruptorError::AlreadyStarted` on a second call, or the
    /// executor's error if a consumer could not be submitted
    pub fn start(&mut self) -> Result<Arc<RingBuffer<T>>> {
        self.check_not_started()?;
        self.started = true;
        self.consumer_repository.start_all(self.executor.as_ref())?;
        tracing::info!(
            consumers = self.consumer_repository.len(),
            buffer_size = self.ring_buffer.buffer_size(),
            "disruptor started"
        );
        Ok(Arc::clone(&self.ring_buffer))
    }

    /// Stop every consumer immediately, abandoning any backlog
    pub fn halt(&self) {
        self.consumer_repository.halt_all();
        tracing::info!(cursor = self.ring_buffer.cursor(), "disruptor halted");
    }

    /// Wait until every published event has passed through the whole graph, then halt
    ///
    /// # Errors
    /// Never times out; the `Result` mirrors [`Disruptor::shutdown_timeout`]
    pub fn shutdown(&self) -> Result<()> {
        while self.has_backlog() {
            thread::yield_now();
        }
        self.halt();
        Ok(())
    }

    /// Like [`Disruptor::shutdown`], giving up after `timeout`
    ///
    /// On timeout the exception handler's shutdown hook is told and the consumers
    /// are left running; call [`Disruptor::halt`] to force them down.
    ///
    /// # Errors
    /// Returns `DisruptorError::Timeout` if the backlog did not drain in time
    pub fn shutdown_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while self.has_backlog() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    cursor = self.ring_buffer.cursor(),
                    timeout_ms = timeout.as_millis() as u64,
                    "shutdown timed out with events still in flight"
                );
                self.exception_handler
                    .handle_on_shutdown_exception(&anyhow!(DisruptorError::Timeout));
                return Err(DisruptorError::Timeout);
            }
            thread::yield_now();
        }
        self.halt();
        Ok(())
    }

    /// Whether any running end-of-chain consumer is behind the producer
    pub fn has_backlog(&self) -> bool {
        self.consumer_repository
            .has_backlog(self.ring_buffer.cursor(), false)
    }

    /// Claim a slot, fill it with `translator` and publish it
    pub fn publish_event<E>(&self, translator: E) -> Result<()>
    where
        E: EventTranslator<T>,
    {
        self.ring_buffer.publish_event(translator)
    }

    /// Claim a slot, fill it from `arg` and publish it
    pub fn publish_event_with<A, E>(&self, translator: E, arg: A) -> Result<()>
    where
        E: EventTranslatorOneArg<T, A>,
    {
        self.ring_buffer.publish_event_with(translator, arg)
    }

    /// Publish one event per argument as a single batch
    ///
    /// # Returns
    /// The highest sequence published
    pub fn publish_events<A, E, I>(&self, translator: E, args: I) -> Result<i64>
    where
        E: EventTranslatorOneArg<T, A>,
        I: IntoIterator<Item = A>,
        I::IntoIter: ExactSizeIterator,
    {
        self.ring_buffer.publish_events(translator, args)
    }

    /// The ring buffer
    pub fn ring_buffer(&self) -> Arc<RingBuffer<T>> {
        Arc::clone(&self.ring_buffer)
    }

    /// The producer cursor
    ///
    /// With a single producer this is the highest published sequence. With
    /// multiple producers it is the highest claimed sequence; slots below it may
    /// still be unpublished.
    pub fn cursor(&self) -> i64 {
        self.ring_buffer.cursor()
    }

    /// Number of slots in the ring buffer
    pub fn buffer_size(&self) -> usize {
        self.ring_buffer.buffer_size()
    }

    /// Progress of a consumer: its sequence, or the slowest sequence of a worker pool
    pub fn sequence_value_for(&self, id: ConsumerId) -> Option<i64> {
        self.consumer_repository
            .sequences_for(id)
            .iter()
            .map(|sequence| sequence.get())
            .min()
    }

    /// The barrier a consumer reads through
    pub fn barrier_for(&self, id: ConsumerId) -> Option<Arc<dyn SequenceBarrier>> {
        self.consumer_repository.barrier_for(id)
    }

    /// Whether [`Disruptor::start`] has been called
    pub fn is_started(&self) -> bool {
        self.started
    }

    fn check_not_started(&self) -> Result<()> {
        if self.started {
            return Err(DisruptorError::AlreadyStarted("Disruptor"));
        }
        Ok(())
    }

    pub(crate) fn create_event_processors<H, I>(
        &mut self,
        barrier_sequences: &[Arc<Sequence>],
        handlers: I,
    ) -> Result<EventHandlerGroup>
    where
        H: EventHandler<T> + 'static,
        I: IntoIterator<Item = H>,
    {
        self.check_not_started()?;

        let barrier: Arc<dyn SequenceBarrier> = self.ring_buffer.new_barrier(barrier_sequences);
        let mut sequences = Vec::new();
        let mut consumers = Vec::new();

        for handler in handlers {
            let processor = Arc::new(BatchEventProcessor::new(
                Arc::clone(&self.ring_buffer),
                Arc::clone(&barrier),
                handler,
                Arc::clone(&self.exception_handler),
            ));
            sequences.push(processor.sequence());
            consumers.push(
                self.consumer_repository
                    .add_processor(processor, Arc::clone(&barrier)),
            );
        }

        if consumers.is_empty() {
            return Err(DisruptorError::InvalidArgument(
                "a stage needs at least one event handler".to_string(),
            ));
        }

        self.update_gating_sequences_for_next_in_chain(barrier_sequences, &sequences);
        Ok(EventHandlerGroup::new(sequences, consumers))
    }

    pub(crate) fn create_worker_pool<H, I>(
        &mut self,
        barrier_sequences: &[Arc<Sequence>],
        handlers: I,
    ) -> Result<EventHandlerGroup>
    where
        H: WorkHandler<T> + 'static,
        I: IntoIterator<Item = H>,
    {
        self.check_not_started()?;

        let barrier: Arc<dyn SequenceBarrier> = self.ring_buffer.new_barrier(barrier_sequences);
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&self.ring_buffer),
            Arc::clone(&barrier),
            Arc::clone(&self.exception_handler),
            handlers,
        )?);
        let sequences = pool.worker_sequences();
        let id = self.consumer_repository.add_worker_pool(pool, barrier);

        self.update_gating_sequences_for_next_in_chain(barrier_sequences, &sequences);
        Ok(EventHandlerGroup::new(sequences, vec![id]))
    }

    fn update_gating_sequences_for_next_in_chain(
        &mut self,
        barrier_sequences: &[Arc<Sequence>],
        processor_sequences: &[Arc<Sequence>],
    ) {
        if processor_sequences.is_empty() {
            return;
        }
        self.ring_buffer.add_gating_sequences(processor_sequences);
        for sequence in barrier_sequences {
            self.ring_buffer.remove_gating_sequence(sequence);
        }
        self.consumer_repository
            .unmark_as_end_of_chain(barrier_sequences);
    }
}

impl<T> std::fmt::Debug for Disruptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disruptor")
            .field("ring_buffer", &self.ring_buffer)
            .field("consumers", &self.consumer_repository)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

/// Registers a stage behind a set of upstream consumers
///
/// Returned by [`Disruptor::after`].
pub struct StageBuilder<'a, T> {
    disruptor: &'a mut Disruptor<T>,
    barrier_sequences: Vec<Arc<Sequence>>,
}

impl<T> StageBuilder<'_, T>
where
    T: Send + Sync + 'static,
{
    /// Register handlers that each see every event after the upstream stage
    ///
    /// # Errors
    /// As [`Disruptor::handle_events_with`]
    pub fn handle_events_with<H, I>(self, handlers: I) -> Result<EventHandlerGroup>
    where
        H: EventHandler<T> + 'static,
        I: IntoIterator<Item = H>,
    {
        self.disruptor
            .create_event_processors(&self.barrier_sequences, handlers)
    }

    /// Register a pool of competing workers after the upstream stage
    ///
    /// # Errors
    /// As [`Disruptor::handle_events_with_worker_pool`]
    pub fn handle_events_with_worker_pool<H, I>(self, handlers: I) -> Result<EventHandlerGroup>
    where
        H: WorkHandler<T> + 'static,
        I: IntoIterator<Item = H>,
    {
        self.disruptor
            .create_worker_pool(&self.barrier_sequences, handlers)
    }
}
