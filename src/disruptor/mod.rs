//! RingBatch Disruptor Implementation
//!
//! This module wires together the pieces of the pipeline: padded sequences, the
//! pre-allocated ring buffer, single and multi producer sequencers, sequence barriers
//! with pluggable wait strategies, the batch and competing-consumer processors, and
//! the DSL that assembles consumers into a dependency graph.

pub mod config;
pub mod consumer_repository;
pub mod disruptor;
pub mod event_factory;
pub mod event_handler;
pub mod event_handler_group;
pub mod event_processor;
pub mod event_translator;
pub mod exception_handler;
pub mod executor;
pub mod producer_type;
pub mod ring_buffer;
pub mod sequence;
pub mod sequence_barrier;
pub mod sequencer;
pub mod wait_strategy;
pub mod worker_pool;

#[cfg(test)]
mod property_tests;

pub use config::{DisruptorConfig, WaitStrategyKind};
pub use consumer_repository::{ConsumerId, ConsumerRepository};
pub use disruptor::{Disruptor, StageBuilder};
pub use event_factory::{ClosureEventFactory, DefaultEventFactory, EventFactory};
pub use event_handler::{EventHandler, WorkHandler};
pub use event_handler_group::EventHandlerGroup;
pub use event_processor::{BatchEventProcessor, EventProcessor};
pub use event_translator::{EventTranslator, EventTranslatorOneArg};
pub use exception_handler::{
    ExceptionHandler, ExceptionHandlerWrapper, FatalExceptionHandler, IgnoreExceptionHandler,
};
pub use executor::{Executor, Task, ThreadExecutor};
pub use producer_type::ProducerType;
pub use ring_buffer::RingBuffer;
pub use sequence::{get_minimum_sequence, Sequence, SequenceGroup};
pub use sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, WaitStrategy,
    YieldingWaitStrategy,
};
pub use worker_pool::{WorkProcessor, WorkerPool};

/// The initial cursor value for sequences
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Errors that can occur in the Disruptor
#[derive(Debug, thiserror::Error)]
pub enum DisruptorError {
    #[error("Buffer size must be a power of 2, got: {0}")]
    InvalidBufferSize(usize),

    #[error("Claim size must be between 1 and {buffer_size}, got: {requested}")]
    InvalidClaimSize { requested: i64, buffer_size: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient capacity in the ring buffer")]
    InsufficientCapacity,

    #[error("Sequence barrier was alerted")]
    Alert,

    #[error("Timed out waiting for consumers to drain")]
    Timeout,

    #[error("{0} has already been started")]
    AlreadyStarted(&'static str),

    #[error("Processor is already running")]
    AlreadyRunning,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Fatal handler failure at sequence {sequence}: {source}")]
    Fatal {
        sequence: i64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Failed to spawn consumer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DisruptorError>;

/// Utility function to check if a number is a power of 2
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Integer base-2 logarithm of a power-of-two buffer size
pub(crate) fn log2(n: usize) -> u32 {
    usize::BITS - 1 - n.leading_zeros()
}
