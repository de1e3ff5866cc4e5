//! Sequencer Implementation
//!
//! Sequencers hand out sequence numbers to producers and make sure a producer
//! never wraps onto a slot that a gating consumer has not finished with.
//! [`SingleProducerSequencer`] assumes exactly one publishing thread and keeps
//! its claim state local. [`MultiProducerSequencer`] lets any number of threads
//! race for claims through a CAS on the cursor and tracks out-of-order
//! publication with a per-slot availability buffer.

use crate::disruptor::{
    is_power_of_two, log2, DisruptorError, Result, Sequence, SequenceGroup, WaitStrategy,
    INITIAL_CURSOR_VALUE,
};
use crossbeam_utils::Backoff;
use std::sync::atomic::{fence, AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;

/// Coordinates claiming and publishing of ring buffer slots
pub trait Sequencer: Send + Sync + std::fmt::Debug {
    /// The producer cursor
    fn cursor(&self) -> Arc<Sequence>;

    /// The size of the ring buffer
    fn buffer_size(&self) -> usize;

    /// The wait strategy consumers of this sequencer block on
    fn wait_strategy(&self) -> Arc<dyn WaitStrategy>;

    /// Claim the next sequence, waiting under backpressure
    fn next(&self) -> Result<i64> {
        self.next_n(1)
    }

    /// Claim the next `n` sequences, waiting under backpressure
    ///
    /// # Returns
    /// The highest sequence claimed
    ///
    /// # Errors
    /// Returns `InvalidClaimSize` if `n` is below 1 or above the buffer size
    fn next_n(&self, n: i64) -> Result<i64>;

    /// Claim the next sequence without waiting
    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Claim the next `n` sequences without waiting
    ///
    /// # Errors
    /// Returns `InsufficientCapacity` if the claim would wrap a gating sequence
    fn try_next_n(&self, n: i64) -> Result<i64>;

    /// Publish a claimed sequence
    fn publish(&self, sequence: i64);

    /// Publish every sequence in `low..=high`
    fn publish_range(&self, low: i64, high: i64);

    /// Whether `sequence` has been published and not yet overwritten
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest contiguous published sequence in `next_sequence..=available_sequence`
    ///
    /// # Returns
    /// `next_sequence - 1` when `next_sequence` itself is not yet published
    fn get_highest_published_sequence(&self, next_sequence: i64, available_sequence: i64) -> i64;

    /// Whether `required` slots could be claimed without waiting
    fn has_available_capacity(&self, required: i64) -> bool;

    /// Number of slots that could currently be claimed
    fn remaining_capacity(&self) -> i64;

    /// Register sequences the producer must not overtake
    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]);

    /// Deregister a gating sequence
    ///
    /// # Returns
    /// True if the sequence was registered
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Minimum of the gating sequences and the cursor
    fn minimum_sequence(&self) -> i64;
}

fn validate_claim(n: i64, buffer_size: usize) -> Result<()> {
    if n < 1 || n > buffer_size as i64 {
        return Err(DisruptorError::InvalidClaimSize {
            requested: n,
            buffer_size,
        });
    }
    Ok(())
}

/// State shared by both sequencer flavours
#[derive(Debug)]
struct SequencerCore {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    gating_sequences: SequenceGroup,
}

impl SequencerCore {
    fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        if !is_power_of_two(buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(buffer_size));
        }
        Ok(Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::new(INITIAL_CURSOR_VALUE)),
            gating_sequences: SequenceGroup::new(),
        })
    }

    #[inline]
    fn size(&self) -> i64 {
        self.buffer_size as i64
    }
}

/// Single producer sequencer
///
/// Only one thread may call the claim methods. The last claimed sequence and
/// the last observed minimum gating sequence are kept locally so that consumer
/// sequences are read only when the producer is close to wrapping.
#[derive(Debug)]
pub struct SingleProducerSequencer {
    core: SequencerCore,
    next_value: AtomicI64,
    cached_value: AtomicI64,
}

impl SingleProducerSequencer {
    /// Create a new single producer sequencer
    ///
    /// # Errors
    /// Returns `InvalidBufferSize` unless `buffer_size` is a power of two
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        Ok(Self {
            core: SequencerCore::new(buffer_size, wait_strategy)?,
            next_value: AtomicI64::new(INITIAL_CURSOR_VALUE),
            cached_value: AtomicI64::new(INITIAL_CURSOR_VALUE),
        })
    }

    // Owned by the single producer thread, so relaxed access is enough.
    #[inline]
    fn next_value(&self) -> i64 {
        self.next_value.load(Ordering::Relaxed)
    }

    fn has_capacity(&self, required: i64) -> bool {
        let next_value = self.next_value();
        let wrap_point = next_value + required - self.core.size();
        let cached = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached || cached > next_value {
            fence(Ordering::SeqCst);
            let min_sequence = self.core.gating_sequences.minimum(next_value);
            self.cached_value.store(min_sequence, Ordering::Relaxed);
            if wrap_point > min_sequence {
                return false;
            }
        }
        true
    }
}

impl Sequencer for SingleProducerSequencer {
    fn cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.core.cursor)
    }

    fn buffer_size(&self) -> usize {
        self.core.buffer_size
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.core.wait_strategy)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.core.buffer_size)?;

        let next_value = self.next_value();
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.core.size();
        let cached = self.cached_value.load(Ordering::Relaxed);

        // The cache is a minimum bounded by `next_value`, so it never runs ahead of the claim
        if wrap_point > cached {
            // Order the claim state before reading consumer sequences.
            fence(Ordering::SeqCst);

            let backoff = Backoff::new();
            let min_sequence = loop {
                let min_sequence = self.core.gating_sequences.minimum(next_value);
                if wrap_point <= min_sequence {
                    break min_sequence;
                }
                backoff.snooze();
            };

            self.cached_value.store(min_sequence, Ordering::Relaxed);
        }

        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.core.buffer_size)?;

        if !self.has_capacity(n) {
            return Err(DisruptorError::InsufficientCapacity);
        }

        let next_sequence = self.next_value() + n;
        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn publish(&self, sequence: i64) {
        self.core.cursor.set(sequence);
        self.core.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _low: i64, high: i64) {
        self.publish(high);
    }

    fn is_available(&self, sequence: i64) -> bool {
        let current = self.core.cursor.get();
        sequence <= current && sequence > current - self.core.size()
    }

    fn get_highest_published_sequence(&self, _next_sequence: i64, available_sequence: i64) -> i64 {
        available_sequence
    }

    fn has_available_capacity(&self, required: i64) -> bool {
        self.has_capacity(required)
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.next_value();
        let consumed = self.core.gating_sequences.minimum(next_value);
        self.core.size() - (next_value - consumed)
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.core
            .gating_sequences
            .add(&self.core.cursor, gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.core.gating_sequences.remove(sequence)
    }

    fn minimum_sequence(&self) -> i64 {
        self.core.gating_sequences.minimum(self.core.cursor.get())
    }
}

/// Multi producer sequencer
///
/// Claims are made with a CAS on the cursor, so the cursor marks what has been
/// claimed rather than what has been published. Each slot records the lap
/// (`sequence >> log2(buffer_size)`) at which it was last published, and
/// consumers only ever see the contiguous published prefix.
#[derive(Debug)]
pub struct MultiProducerSequencer {
    core: SequencerCore,
    gating_sequence_cache: Sequence,
    available_buffer: Box<[AtomicI32]>,
    index_mask: i64,
    index_shift: u32,
}

impl MultiProducerSequencer {
    /// Create a new multi producer sequencer
    ///
    /// # Errors
    /// Returns `InvalidBufferSize` unless `buffer_size` is a power of two
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        let core = SequencerCore::new(buffer_size, wait_strategy)?;
        let available_buffer = (0..buffer_size)
            .map(|_| AtomicI32::new(-1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            core,
            gating_sequence_cache: Sequence::new(INITIAL_CURSOR_VALUE),
            available_buffer,
            index_mask: buffer_size as i64 - 1,
            index_shift: log2(buffer_size),
        })
    }

    #[inline]
    fn calculate_index(&self, sequence: i64) -> usize {
        (sequence & self.index_mask) as usize
    }

    #[inline]
    fn calculate_availability_flag(&self, sequence: i64) -> i32 {
        (sequence >> self.index_shift) as i32
    }

    #[inline]
    fn set_available(&self, sequence: i64) {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].store(flag, Ordering::Release);
    }

    fn has_capacity(&self, required: i64, cursor_value: i64) -> bool {
        let wrap_point = cursor_value + required - self.core.size();
        let cached = self.gating_sequence_cache.get();

        if wrap_point > cached || cached > cursor_value {
            let min_sequence = self.core.gating_sequences.minimum(cursor_value);
            self.gating_sequence_cache.set(min_sequence);
            if wrap_point > min_sequence {
                return false;
            }
        }
        true
    }
}

impl Sequencer for MultiProducerSequencer {
    fn cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.core.cursor)
    }

    fn buffer_size(&self) -> usize {
        self.core.buffer_size
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.core.wait_strategy)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.core.buffer_size)?;

        let backoff = Backoff::new();
        loop {
            let current = self.core.cursor.get();
            let next = current + n;

            let wrap_point = next - self.core.size();
            let cached_gating_sequence = self.gating_sequence_cache.get();

            if wrap_point > cached_gating_sequence {
                let gating_sequence = self.core.gating_sequences.minimum(current);
                if wrap_point > gating_sequence {
                    backoff.snooze();
                    continue;
                }
                self.gating_sequence_cache.set(gating_sequence);
            } else if self.core.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
        }
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.core.buffer_size)?;

        loop {
            let current = self.core.cursor.get();
            let next = current + n;

            if !self.has_capacity(n, current) {
                return Err(DisruptorError::InsufficientCapacity);
            }
            if self.core.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
        }
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.core.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, low: i64, high: i64) {
        for sequence in low..=high {
            self.set_available(sequence);
        }
        self.core.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: i64) -> bool {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].load(Ordering::Acquire) == flag
    }

    fn get_highest_published_sequence(&self, next_sequence: i64, available_sequence: i64) -> i64 {
        for sequence in next_sequence..=available_sequence {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }
        available_sequence
    }

    fn has_available_capacity(&self, required: i64) -> bool {
        self.has_capacity(required, self.core.cursor.get())
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.core.cursor.get();
        let consumed = self.core.gating_sequences.minimum(produced);
        self.core.size() - (produced - consumed)
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.core
            .gating_sequences
            .add(&self.core.cursor, gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.core.gating_sequences.remove(sequence)
    }

    fn minimum_sequence(&self) -> i64 {
        self.core.gating_sequences.minimum(self.core.cursor.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{BlockingWaitStrategy, BusySpinWaitStrategy};
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    fn strategy() -> Arc<dyn WaitStrategy> {
        Arc::new(BusySpinWaitStrategy::new())
    }

    #[test]
    fn test_rejects_invalid_buffer_size() {
        assert!(matches!(
            SingleProducerSequencer::new(6, strategy()),
            Err(DisruptorError::InvalidBufferSize(6))
        ));
        assert!(matches!(
            MultiProducerSequencer::new(0, strategy()),
            Err(DisruptorError::InvalidBufferSize(0))
        ));
    }

    #[test]
    fn test_rejects_invalid_claim_size() {
        let single = SingleProducerSequencer::new(8, strategy()).unwrap();
        assert!(matches!(
            single.next_n(0),
            Err(DisruptorError::InvalidClaimSize { requested: 0, .. })
        ));
        assert!(matches!(
            single.next_n(9),
            Err(DisruptorError::InvalidClaimSize { requested: 9, .. })
        ));

        let multi = MultiProducerSequencer::new(8, strategy()).unwrap();
        assert!(multi.try_next_n(-1).is_err());
    }

    #[test]
    fn test_single_producer_claim_and_publish() {
        let sequencer = SingleProducerSequencer::new(8, strategy()).unwrap();
        assert_eq!(sequencer.next().unwrap(), 0);
        assert_eq!(sequencer.next_n(3).unwrap(), 3);
        assert_eq!(sequencer.cursor().get(), -1);

        sequencer.publish_range(0, 3);
        assert_eq!(sequencer.cursor().get(), 3);
        assert!(sequencer.is_available(3));
        assert!(!sequencer.is_available(4));
        assert_eq!(sequencer.get_highest_published_sequence(0, 3), 3);
    }

    #[test]
    fn test_single_producer_try_next_respects_gating() {
        let sequencer = SingleProducerSequencer::new(4, strategy()).unwrap();
        let consumer = Arc::new(Sequence::default());
        sequencer.add_gating_sequences(&[Arc::clone(&consumer)]);

        let hi = sequencer.try_next_n(4).unwrap();
        sequencer.publish(hi);
        assert_eq!(sequencer.remaining_capacity(), 0);
        assert!(!sequencer.has_available_capacity(1));
        assert!(matches!(
            sequencer.try_next(),
            Err(DisruptorError::InsufficientCapacity)
        ));

        consumer.set(1);
        assert_eq!(sequencer.remaining_capacity(), 2);
        assert_eq!(sequencer.try_next_n(2).unwrap(), 5);
    }

    #[test]
    fn test_single_producer_next_waits_for_consumer() {
        let sequencer = Arc::new(SingleProducerSequencer::new(4, strategy()).unwrap());
        let consumer = Arc::new(Sequence::default());
        sequencer.add_gating_sequences(&[Arc::clone(&consumer)]);

        let hi = sequencer.next_n(4).unwrap();
        sequencer.publish(hi);

        let producer = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.next().unwrap())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!producer.is_finished());

        consumer.set(0);
        assert_eq!(producer.join().unwrap(), 4);
    }

    #[test]
    fn test_single_producer_cache_never_passes_claim() {
        let sequencer = SingleProducerSequencer::new(4, strategy()).unwrap();
        let consumer = Arc::new(Sequence::default());
        sequencer.add_gating_sequences(&[Arc::clone(&consumer)]);
        consumer.set(100);

        // A consumer ahead of the producer still caches at most the claim
        for _ in 0..3 {
            let hi = sequencer.next_n(3).unwrap();
            sequencer.publish(hi);
            assert!(sequencer.cached_value.load(Ordering::Relaxed) <= sequencer.next_value());
        }
        assert!(sequencer.try_next().is_ok());
        assert!(sequencer.cached_value.load(Ordering::Relaxed) <= sequencer.next_value());
    }

    #[test]
    fn test_multi_producer_out_of_order_publication() {
        let sequencer = MultiProducerSequencer::new(8, strategy()).unwrap();
        let a = sequencer.next().unwrap();
        let b = sequencer.next().unwrap();
        let c = sequencer.next().unwrap();
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(sequencer.cursor().get(), 2);

        sequencer.publish(c);
        assert_eq!(sequencer.get_highest_published_sequence(0, 2), -1);
        sequencer.publish(a);
        assert_eq!(sequencer.get_highest_published_sequence(0, 2), 0);
        sequencer.publish(b);
        assert_eq!(sequencer.get_highest_published_sequence(0, 2), 2);
    }

    #[test]
    fn test_multi_producer_lap_flags() {
        let sequencer = MultiProducerSequencer::new(4, strategy()).unwrap();
        let hi = sequencer.next_n(4).unwrap();
        sequencer.publish_range(0, hi);
        assert!(sequencer.is_available(1));
        // Sequence 5 shares slot 1 but belongs to the next lap.
        assert!(!sequencer.is_available(5));

        let next = sequencer.next_n(2).unwrap();
        assert_eq!(next, 5);
        sequencer.publish_range(4, 5);
        assert!(sequencer.is_available(5));
        assert!(!sequencer.is_available(1));
    }

    #[test]
    fn test_multi_producer_try_next_respects_gating() {
        let sequencer = MultiProducerSequencer::new(4, strategy()).unwrap();
        let consumer = Arc::new(Sequence::default());
        sequencer.add_gating_sequences(&[Arc::clone(&consumer)]);

        assert_eq!(sequencer.try_next_n(4).unwrap(), 3);
        assert!(matches!(
            sequencer.try_next(),
            Err(DisruptorError::InsufficientCapacity)
        ));
        consumer.set(0);
        assert_eq!(sequencer.try_next().unwrap(), 4);
    }

    #[test]
    fn test_multi_producer_concurrent_claims_are_unique() {
        let sequencer = Arc::new(MultiProducerSequencer::new(1024, strategy()).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sequencer = Arc::clone(&sequencer);
                thread::spawn(move || {
                    (0..200)
                        .map(|_| {
                            let seq = sequencer.next().unwrap();
                            sequencer.publish(seq);
                            seq
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for seq in handle.join().unwrap() {
                assert!(seen.insert(seq), "sequence {seq} claimed twice");
            }
        }

        assert_eq!(seen.len(), 800);
        assert_eq!(sequencer.cursor().get(), 799);
        assert_eq!(sequencer.get_highest_published_sequence(0, 799), 799);
    }

    #[test]
    fn test_gating_registration() {
        let sequencer = SingleProducerSequencer::new(8, Arc::new(BlockingWaitStrategy::new())).unwrap();
        let hi = sequencer.next_n(3).unwrap();
        sequencer.publish(hi);

        let consumer = Arc::new(Sequence::default());
        sequencer.add_gating_sequences(&[Arc::clone(&consumer)]);
        assert_eq!(consumer.get(), 2);
        assert_eq!(sequencer.minimum_sequence(), 2);

        assert!(sequencer.remove_gating_sequence(&consumer));
        assert!(!sequencer.remove_gating_sequence(&consumer));
    }
}
