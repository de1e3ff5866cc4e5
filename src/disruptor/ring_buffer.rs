//! Ring Buffer Implementation
//!
//! The ring buffer is a pre-allocated, power-of-two array of event slots that
//! owns one [`Sequencer`]. Slots are addressed by `sequence & (buffer_size - 1)`
//! and are never replaced, only overwritten in place. Access to a slot is
//! serialised by the sequence protocol instead of locks.

use crate::disruptor::{
    is_power_of_two, BlockingWaitStrategy, DisruptorError, EventFactory, EventTranslator,
    EventTranslatorOneArg, MultiProducerSequencer, ProcessingSequenceBarrier, ProducerType,
    Result, Sequence, Sequencer, SingleProducerSequencer, WaitStrategy,
};
use std::cell::UnsafeCell;
use std::sync::Arc;

/// Publishes a claimed range when dropped, so a panicking translator can never
/// leave a claimed slot unpublished and stall every consumer behind it.
struct PublishGuard<'a> {
    sequencer: &'a dyn Sequencer,
    low: i64,
    high: i64,
}

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        self.sequencer.publish_range(self.low, self.high);
    }
}

/// The core ring buffer for storing events
///
/// # Type Parameters
/// * `T` - The event type stored in the buffer
pub struct RingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,
    index_mask: i64,
    sequencer: Arc<dyn Sequencer>,
}

// SAFETY: slots are only handed out under the sequence protocol. A producer has
// exclusive access to a claimed, unpublished slot; consumers share read access
// to published slots that no producer can claim until every gating consumer has
// moved past them.
unsafe impl<T: Send + Sync> Send for RingBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Create a ring buffer around an existing sequencer
    ///
    /// # Arguments
    /// * `event_factory` - Called once per slot to pre-populate the buffer
    /// * `sequencer` - The sequencer that coordinates producers
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if the sequencer's size is not a power of 2
    pub fn new<F>(event_factory: F, sequencer: Arc<dyn Sequencer>) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let buffer_size = sequencer.buffer_size();
        if !is_power_of_two(buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(buffer_size));
        }

        let slots: Box<[UnsafeCell<T>]> = (0..buffer_size)
            .map(|_| UnsafeCell::new(event_factory.new_instance()))
            .collect();

        Ok(Self {
            slots,
            index_mask: (buffer_size - 1) as i64,
            sequencer,
        })
    }

    /// Create a ring buffer with a sequencer for the given producer type
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if `buffer_size` is not a power of 2
    pub fn create<F>(
        producer_type: ProducerType,
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        match producer_type {
            ProducerType::Single => {
                Self::create_single_producer(event_factory, buffer_size, wait_strategy)
            }
            ProducerType::Multi => {
                Self::create_multi_producer(event_factory, buffer_size, wait_strategy)
            }
        }
    }

    /// Create a ring buffer for exactly one publishing thread
    pub fn create_single_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let sequencer = SingleProducerSequencer::new(buffer_size, wait_strategy)?;
        Self::new(event_factory, Arc::new(sequencer))
    }

    /// Create a ring buffer for any number of publishing threads
    pub fn create_multi_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let sequencer = MultiProducerSequencer::new(buffer_size, wait_strategy)?;
        Self::new(event_factory, Arc::new(sequencer))
    }

    /// Single-producer ring buffer with the blocking wait strategy
    pub fn with_defaults<F>(event_factory: F, buffer_size: usize) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::create_single_producer(
            event_factory,
            buffer_size,
            Arc::new(BlockingWaitStrategy::new()),
        )
    }

    /// Shared reference to the event at `sequence`
    ///
    /// # Safety
    /// The caller must know that `sequence` is published and that no producer can
    /// claim its slot while the reference lives, which holds for a consumer that
    /// obtained `sequence` from its barrier and has not yet advanced past it.
    #[inline]
    pub unsafe fn get(&self, sequence: i64) -> &T {
        let index = (sequence & self.index_mask) as usize;
        &*self.slots.get_unchecked(index).get()
    }

    /// Exclusive reference to the event at `sequence`
    ///
    /// # Safety
    /// The caller must own a claim on `sequence` that has not been published yet,
    /// and must not create any other reference to the same slot meanwhile.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, sequence: i64) -> &mut T {
        let index = (sequence & self.index_mask) as usize;
        &mut *self.slots.get_unchecked(index).get()
    }

    /// Claim the next sequence, waiting under backpressure
    pub fn next(&self) -> Result<i64> {
        self.sequencer.next()
    }

    /// Claim the next `n` sequences, waiting under backpressure
    ///
    /// # Returns
    /// The highest sequence claimed
    pub fn next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.next_n(n)
    }

    /// Claim the next sequence without waiting
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    /// Claim the next `n` sequences without waiting
    pub fn try_next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    /// Make a claimed sequence visible to consumers
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Make every claimed sequence in `low..=high` visible to consumers
    pub fn publish_range(&self, low: i64, high: i64) {
        self.sequencer.publish_range(low, high);
    }

    fn translate_and_publish<E>(&self, translator: &E, sequence: i64)
    where
        E: EventTranslator<T>,
    {
        let _guard = PublishGuard {
            sequencer: self.sequencer.as_ref(),
            low: sequence,
            high: sequence,
        };
        // SAFETY: `sequence` was claimed by this call and is published only when the guard drops.
        let event = unsafe { self.get_mut(sequence) };
        translator.translate_to(event, sequence);
    }

    /// Claim a slot, fill it with `translator` and publish it
    pub fn publish_event<E>(&self, translator: E) -> Result<()>
    where
        E: EventTranslator<T>,
    {
        let sequence = self.sequencer.next()?;
        self.translate_and_publish(&translator, sequence);
        Ok(())
    }

    /// Like [`RingBuffer::publish_event`] but fails instead of waiting when the buffer is full
    ///
    /// # Errors
    /// Returns `DisruptorError::InsufficientCapacity` if no slot is free
    pub fn try_publish_event<E>(&self, translator: E) -> Result<()>
    where
        E: EventTranslator<T>,
    {
        let sequence = self.sequencer.try_next()?;
        self.translate_and_publish(&translator, sequence);
        Ok(())
    }

    /// Claim a slot, fill it from `arg` and publish it
    pub fn publish_event_with<A, E>(&self, translator: E, arg: A) -> Result<()>
    where
        E: EventTranslatorOneArg<T, A>,
    {
        let sequence = self.sequencer.next()?;
        let _guard = PublishGuard {
            sequencer: self.sequencer.as_ref(),
            low: sequence,
            high: sequence,
        };
        // SAFETY: `sequence` was claimed by this call and is published only when the guard drops.
        let event = unsafe { self.get_mut(sequence) };
        translator.translate_to(event, sequence, arg);
        Ok(())
    }

    /// Publish one event per argument as a single contiguous batch
    ///
    /// # Returns
    /// The highest sequence published
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidClaimSize` if `args` is empty or larger than the buffer
    pub fn publish_events<A, E, I>(&self, translator: E, args: I) -> Result<i64>
    where
        E: EventTranslatorOneArg<T, A>,
        I: IntoIterator<Item = A>,
        I::IntoIter: ExactSizeIterator,
    {
        let args = args.into_iter();
        let batch_size = args.len() as i64;
        let high = self.sequencer.next_n(batch_size)?;
        self.translate_batch(translator, args, high - batch_size + 1, high);
        Ok(high)
    }

    /// Like [`RingBuffer::publish_events`] but fails instead of waiting when the buffer is full
    pub fn try_publish_events<A, E, I>(&self, translator: E, args: I) -> Result<i64>
    where
        E: EventTranslatorOneArg<T, A>,
        I: IntoIterator<Item = A>,
        I::IntoIter: ExactSizeIterator,
    {
        let args = args.into_iter();
        let batch_size = args.len() as i64;
        let high = self.sequencer.try_next_n(batch_size)?;
        self.translate_batch(translator, args, high - batch_size + 1, high);
        Ok(high)
    }

    fn translate_batch<A, E>(&self, translator: E, args: impl Iterator<Item = A>, low: i64, high: i64)
    where
        E: EventTranslatorOneArg<T, A>,
    {
        let _guard = PublishGuard {
            sequencer: self.sequencer.as_ref(),
            low,
            high,
        };
        for (sequence, arg) in (low..=high).zip(args) {
            // SAFETY: the whole range was claimed by this call and is published when the guard drops.
            let event = unsafe { self.get_mut(sequence) };
            translator.translate_to(event, sequence, arg);
        }
    }

    /// Register consumer sequences the producer must not overtake
    pub fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(gating_sequences);
    }

    /// Deregister a gating sequence
    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Create a barrier over the cursor and the given upstream sequences
    pub fn new_barrier(&self, sequences_to_track: &[Arc<Sequence>]) -> Arc<ProcessingSequenceBarrier> {
        Arc::new(ProcessingSequenceBarrier::new(
            Arc::clone(&self.sequencer),
            sequences_to_track.to_vec(),
        ))
    }

    /// The sequencer backing this buffer
    pub fn sequencer(&self) -> Arc<dyn Sequencer> {
        Arc::clone(&self.sequencer)
    }

    /// Current producer cursor value
    pub fn cursor(&self) -> i64 {
        self.sequencer.cursor().get()
    }

    /// Get the size of the buffer
    pub fn buffer_size(&self) -> usize {
        self.slots.len()
    }

    /// Whether `required` slots could be claimed without waiting
    pub fn has_available_capacity(&self, required: i64) -> bool {
        self.sequencer.has_available_capacity(required)
    }

    /// Number of slots that could currently be claimed
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// Minimum of the gating sequences and the cursor
    pub fn minimum_gating_sequence(&self) -> i64 {
        self.sequencer.minimum_sequence()
    }

    /// Whether `sequence` is published and still held in the buffer
    pub fn is_published(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("buffer_size", &self.buffer_size())
            .field("sequencer", &self.sequencer)
            .finish()
    }
}
