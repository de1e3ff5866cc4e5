//! `RingBatch` - Pre-allocated Ring Buffer Pipelines
//!
//! Inter-thread messaging through a fixed ring of reusable event slots. Producers
//! claim slots by sequence number, fill them in place and publish; consumers read
//! published slots in order, in batches, arranged into a dependency graph.
//!
//! ## Features
//!
//! - **Lock-free sequencing**: claims and progress are tracked with atomics only
//! - **Pre-allocated slots**: events are created once and overwritten in place
//! - **Backpressure**: producers never overtake the slowest terminal consumer
//! - **Dependency graphs**: pipelines, fan-out, fan-in and competing worker pools
//! - **Pluggable waiting**: blocking, busy-spin, yielding and sleeping strategies
//!
//! ## Quick Start
//!
//! ```rust
//! use ringbatch::disruptor::{
//!     BlockingWaitStrategy, DefaultEventFactory, Disruptor, EventHandler, ProducerType,
//!     ThreadExecutor,
//! };
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct PriceTick {
//!     price: u64,
//! }
//!
//! #[derive(Default)]
//! struct Summer {
//!     total: u64,
//! }
//!
//! impl EventHandler<PriceTick> for Summer {
//!     fn on_event(&mut self, event: &PriceTick, _sequence: i64, _end_of_batch: bool) -> anyhow::Result<()> {
//!         self.total += event.price;
//!         Ok(())
//!     }
//! }
//!
//! let mut disruptor = Disruptor::new(
//!     DefaultEventFactory::<PriceTick>::new(),
//!     1024, // must be a power of 2
//!     Arc::new(ThreadExecutor::new()),
//!     ProducerType::Single,
//!     Arc::new(BlockingWaitStrategy::new()),
//! )
//! .unwrap();
//!
//! disruptor.handle_events_with([Summer::default()]).unwrap();
//! disruptor.start().unwrap();
//!
//! for price in 1..=100 {
//!     disruptor
//!         .publish_event(move |tick: &mut PriceTick, _sequence: i64| tick.price = price)
//!         .unwrap();
//! }
//!
//! // Waits until every published tick went through every handler
//! disruptor.shutdown().unwrap();
//! ```
//!
//! ## Architecture
//!
//! - **`Sequence`**: padded atomic position counter
//! - **`RingBuffer`**: pre-allocated slots plus the sequencer that guards them
//! - **`Sequencer`**: claim and publish protocol, single or multi producer
//! - **`SequenceBarrier`**: how far a consumer may read
//! - **`WaitStrategy`**: how a consumer waits at its barrier
//! - **`BatchEventProcessor`** / **`WorkerPool`**: the consumer loops
//! - **`Disruptor`**: DSL wiring consumers into a graph

pub mod disruptor;

// Re-export the main types for convenience
pub use disruptor::{
    // Utility functions
    get_minimum_sequence,
    is_power_of_two,

    // Core types
    Disruptor,
    DisruptorConfig,
    DisruptorError,
    EventHandlerGroup,
    ProducerType,
    Result,
    RingBuffer,
    WaitStrategyKind,

    // Events
    DefaultEventFactory,
    EventFactory,
    EventHandler,
    EventTranslator,
    EventTranslatorOneArg,
    WorkHandler,

    // Consumers
    BatchEventProcessor,
    EventProcessor,
    Executor,
    ThreadExecutor,
    WorkProcessor,
    WorkerPool,

    // Exception handling
    ExceptionHandler,
    FatalExceptionHandler,
    IgnoreExceptionHandler,

    // Sequencing
    MultiProducerSequencer,
    Sequence,
    SequenceBarrier,
    Sequencer,
    SingleProducerSequencer,

    // Wait strategies
    BlockingWaitStrategy,
    BusySpinWaitStrategy,
    SleepingWaitStrategy,
    WaitStrategy,
    YieldingWaitStrategy,

    // Constants
    INITIAL_CURSOR_VALUE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `RingBatch` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
