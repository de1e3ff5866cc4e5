//! Event Handler Group
//!
//! The handle returned by every stage registration. A group is the frontier of
//! sequences that a following stage must wait on.

use crate::disruptor::{
    ConsumerId, Disruptor, EventHandler, ProcessingSequenceBarrier, Result, Sequence, WorkHandler,
};
use std::sync::Arc;

/// A set of consumers that later stages can depend on
#[derive(Debug, Clone, Default)]
pub struct EventHandlerGroup {
    sequences: Vec<Arc<Sequence>>,
    consumers: Vec<ConsumerId>,
}

impl EventHandlerGroup {
    pub(crate) fn new(sequences: Vec<Arc<Sequence>>, consumers: Vec<ConsumerId>) -> Self {
        Self {
            sequences,
            consumers,
        }
    }

    /// Merge two groups so a later stage waits on both (fan-in)
    pub fn and(&self, other: &EventHandlerGroup) -> EventHandlerGroup {
        let mut merged = self.clone();
        merged.sequences.extend(other.sequences.iter().cloned());
        merged.consumers.extend(other.consumers.iter().copied());
        merged
    }

    /// Register handlers that process each event after every consumer in this group
    ///
    /// # Errors
    /// As [`Disruptor::handle_events_with`]
    pub fn then<T, H, I>(&self, disruptor: &mut Disruptor<T>, handlers: I) -> Result<EventHandlerGroup>
    where
        T: Send + Sync + 'static,
        H: EventHandler<T> + 'static,
        I: IntoIterator<Item = H>,
    {
        disruptor.after(self).handle_events_with(handlers)
    }

    /// Register a pool of competing workers after every consumer in this group
    ///
    /// # Errors
    /// As [`Disruptor::handle_events_with_worker_pool`]
    pub fn then_handle_events_with_worker_pool<T, H, I>(
        &self,
        disruptor: &mut Disruptor<T>,
        handlers: I,
    ) -> Result<EventHandlerGroup>
    where
        T: Send + Sync + 'static,
        H: WorkHandler<T> + 'static,
        I: IntoIterator<Item = H>,
    {
        disruptor.after(self).handle_events_with_worker_pool(handlers)
    }

    /// A barrier that waits on the producer and every consumer in this group
    ///
    /// Useful for driving a hand-built processor off the pipeline.
    pub fn as_sequence_barrier<T>(&self, disruptor: &Disruptor<T>) -> Arc<ProcessingSequenceBarrier>
    where
        T: Send + Sync + 'static,
    {
        disruptor.ring_buffer().new_barrier(&self.sequences)
    }

    /// The sequences of every consumer in the group
    pub fn sequences(&self) -> &[Arc<Sequence>] {
        &self.sequences
    }

    /// The consumers in the group
    pub fn consumers(&self) -> &[ConsumerId] {
        &self.consumers
    }
}
