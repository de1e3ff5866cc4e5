//! Consumer Repository
//!
//! Bookkeeping for the consumers registered through the DSL. Consumers live in
//! an arena indexed by [`ConsumerId`]; each entry records the consumer, the
//! barrier it reads through, and whether anything downstream depends on it.
//! Dependency edges are not stored: they are implied by the barriers.

use crate::disruptor::event_processor::processor_task;
use crate::disruptor::{
    EventProcessor, Executor, Result, Sequence, SequenceBarrier, WorkerPool,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

/// Handle to a consumer registered in a [`ConsumerRepository`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(usize);

impl ConsumerId {
    /// Position of the consumer in registration order
    pub fn index(&self) -> usize {
        self.0
    }
}

enum Consumer<T> {
    Processor(Arc<dyn EventProcessor>),
    WorkerPool(Arc<WorkerPool<T>>),
}

struct ConsumerInfo<T> {
    consumer: Consumer<T>,
    barrier: Arc<dyn SequenceBarrier>,
    end_of_chain: bool,
}

impl<T: Send + Sync + 'static> ConsumerInfo<T> {
    fn sequences(&self) -> Vec<Arc<Sequence>> {
        match &self.consumer {
            Consumer::Processor(processor) => vec![processor.sequence()],
            Consumer::WorkerPool(pool) => pool.worker_sequences(),
        }
    }

    fn is_running(&self) -> bool {
        match &self.consumer {
            Consumer::Processor(processor) => processor.is_running(),
            Consumer::WorkerPool(pool) => pool.is_running(),
        }
    }

    fn has_started(&self) -> bool {
        match &self.consumer {
            Consumer::Processor(processor) => processor.has_started(),
            Consumer::WorkerPool(pool) => pool.has_started(),
        }
    }

    fn start(&self, executor: &dyn Executor) -> Result<()> {
        match &self.consumer {
            Consumer::Processor(processor) => executor.execute(processor_task(Arc::clone(processor))),
            Consumer::WorkerPool(pool) => pool.start(executor).map(|_| ()),
        }
    }

    fn halt(&self) {
        match &self.consumer {
            Consumer::Processor(processor) => processor.halt(),
            Consumer::WorkerPool(pool) => pool.halt(),
        }
    }
}

/// Arena of the consumers in a pipeline
pub struct ConsumerRepository<T> {
    consumers: Vec<ConsumerInfo<T>>,
    by_sequence: HashMap<usize, ConsumerId>,
}

fn sequence_key(sequence: &Arc<Sequence>) -> usize {
    Arc::as_ptr(sequence) as usize
}

impl<T: Send + Sync + 'static> ConsumerRepository<T> {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            consumers: Vec::new(),
            by_sequence: HashMap::new(),
        }
    }

    fn insert(&mut self, info: ConsumerInfo<T>) -> ConsumerId {
        let id = ConsumerId(self.consumers.len());
        for sequence in info.sequences() {
            self.by_sequence.insert(sequence_key(&sequence), id);
        }
        self.consumers.push(info);
        id
    }

    /// Register a single-threaded processor
    pub fn add_processor(
        &mut self,
        processor: Arc<dyn EventProcessor>,
        barrier: Arc<dyn SequenceBarrier>,
    ) -> ConsumerId {
        self.insert(ConsumerInfo {
            consumer: Consumer::Processor(processor),
            barrier,
            end_of_chain: true,
        })
    }

    /// Register a worker pool
    pub fn add_worker_pool(
        &mut self,
        pool: Arc<WorkerPool<T>>,
        barrier: Arc<dyn SequenceBarrier>,
    ) -> ConsumerId {
        self.insert(ConsumerInfo {
            consumer: Consumer::WorkerPool(pool),
            barrier,
            end_of_chain: true,
        })
    }

    /// Submit every consumer to `executor`, then wait until each has entered its loop
    ///
    /// The wait means a drain check issued right after start sees every consumer
    /// that is still running. It does not wait on the live running state, so a
    /// consumer that stops straight away cannot stall start. `executor` must run
    /// every task concurrently.
    ///
    /// # Errors
    /// Returns the first error reported while submitting a consumer
    pub fn start_all(&self, executor: &dyn Executor) -> Result<()> {
        // Stage siblings share a barrier; clear every alert before any consumer runs
        for info in &self.consumers {
            info.barrier.clear_alert();
        }
        for info in &self.consumers {
            info.start(executor)?;
        }
        while !self.consumers.iter().all(ConsumerInfo::has_started) {
            thread::yield_now();
        }
        Ok(())
    }

    /// Halt every consumer
    pub fn halt_all(&self) {
        for info in &self.consumers {
            info.halt();
        }
    }

    /// Sequences of the consumers nothing else depends on
    ///
    /// # Arguments
    /// * `include_stopped` - Also report consumers that are no longer running
    pub fn last_sequences_in_chain(&self, include_stopped: bool) -> Vec<Arc<Sequence>> {
        self.consumers
            .iter()
            .filter(|info| info.end_of_chain && (include_stopped || info.is_running()))
            .flat_map(ConsumerInfo::sequences)
            .collect()
    }

    /// Mark the consumers owning `sequences` as having a downstream dependent
    pub fn unmark_as_end_of_chain(&mut self, sequences: &[Arc<Sequence>]) {
        for sequence in sequences {
            if let Some(id) = self.by_sequence.get(&sequence_key(sequence)) {
                self.consumers[id.0].end_of_chain = false;
            }
        }
    }

    /// Whether any running end-of-chain consumer is behind `cursor`
    pub fn has_backlog(&self, cursor: i64, include_stopped: bool) -> bool {
        self.last_sequences_in_chain(include_stopped)
            .iter()
            .any(|sequence| sequence.get() < cursor)
    }

    /// Whether the consumer has no registered dependents
    pub fn is_end_of_chain(&self, id: ConsumerId) -> Option<bool> {
        self.consumers.get(id.0).map(|info| info.end_of_chain)
    }

    /// The barrier the consumer reads through
    pub fn barrier_for(&self, id: ConsumerId) -> Option<Arc<dyn SequenceBarrier>> {
        self.consumers.get(id.0).map(|info| Arc::clone(&info.barrier))
    }

    /// The sequences the consumer advances
    ///
    /// A processor owns one sequence. A worker pool reports every worker's
    /// sequence plus its shared work sequence.
    pub fn sequences_for(&self, id: ConsumerId) -> Vec<Arc<Sequence>> {
        self.consumers
            .get(id.0)
            .map(ConsumerInfo::sequences)
            .unwrap_or_default()
    }

    /// Find the consumer that owns `sequence`
    pub fn consumer_for(&self, sequence: &Arc<Sequence>) -> Option<ConsumerId> {
        self.by_sequence.get(&sequence_key(sequence)).copied()
    }

    /// Whether the consumer is running
    pub fn is_running(&self, id: ConsumerId) -> bool {
        self.consumers
            .get(id.0)
            .is_some_and(ConsumerInfo::is_running)
    }

    /// Number of registered consumers
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether no consumer is registered
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

impl<T: Send + Sync + 'static> Default for ConsumerRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ConsumerRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let end_of_chain = self.consumers.iter().filter(|info| info.end_of_chain).count();
        f.debug_struct("ConsumerRepository")
            .field("consumers", &self.consumers.len())
            .field("end_of_chain", &end_of_chain)
            .finish()
    }
}
