//! Sequence Barrier Implementation
//!
//! A sequence barrier is the consumer-facing wait point. It bounds how far a
//! consumer may read by the producer cursor, by multi-producer availability and
//! by any upstream consumer sequences, and it carries the cancellation flag used
//! to stop a blocked consumer.

use crate::disruptor::{DisruptorError, Result, Sequence, Sequencer, WaitStrategy};
use crate::disruptor::sequence::get_minimum_sequence;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Coordination barrier for managing dependencies between event processors
pub trait SequenceBarrier: Send + Sync {
    /// Wait for the given sequence to become available
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    ///
    /// # Returns
    /// The highest sequence that is safe to read. This may be lower than
    /// `sequence` when a wait strategy returns early; callers then poll again.
    ///
    /// # Errors
    /// Returns `DisruptorError::Alert` if the barrier has been alerted
    fn wait_for(&self, sequence: i64) -> Result<i64>;

    /// Current value of the slowest sequence this barrier depends on
    fn cursor(&self) -> i64;

    /// Check if this barrier has been alerted
    fn is_alerted(&self) -> bool;

    /// Alert this barrier and wake any waiting thread
    fn alert(&self);

    /// Clear the alert status so the barrier can be reused
    fn clear_alert(&self);

    /// Check the alert flag
    ///
    /// # Errors
    /// Returns `DisruptorError::Alert` if the barrier has been alerted
    fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            Err(DisruptorError::Alert)
        } else {
            Ok(())
        }
    }
}

/// Standard sequence barrier bound to one sequencer
///
/// The dependent sequences are fixed at construction. When none are supplied the
/// barrier depends on the producer cursor alone.
pub struct ProcessingSequenceBarrier {
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    dependent_sequences: Vec<Arc<Sequence>>,
    alerted: AtomicBool,
}

impl ProcessingSequenceBarrier {
    /// Create a new processing sequence barrier
    ///
    /// # Arguments
    /// * `sequencer` - The sequencer whose cursor and availability bound this barrier
    /// * `dependent_sequences` - Upstream consumer sequences; empty means "the cursor only"
    pub fn new(sequencer: Arc<dyn Sequencer>, dependent_sequences: Vec<Arc<Sequence>>) -> Self {
        let cursor = sequencer.cursor();
        let wait_strategy = sequencer.wait_strategy();
        let dependent_sequences = if dependent_sequences.is_empty() {
            vec![Arc::clone(&cursor)]
        } else {
            dependent_sequences
        };

        Self {
            sequencer,
            wait_strategy,
            cursor,
            dependent_sequences,
            alerted: AtomicBool::new(false),
        }
    }

    /// The sequences this barrier waits on
    pub fn dependent_sequences(&self) -> &[Arc<Sequence>] {
        &self.dependent_sequences
    }
}

impl SequenceBarrier for ProcessingSequenceBarrier {
    fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.check_alert()?;

        let available =
            self.wait_strategy
                .wait_for(sequence, &self.cursor, &self.dependent_sequences, self)?;

        if available < sequence {
            return Ok(available);
        }

        Ok(self
            .sequencer
            .get_highest_published_sequence(sequence, available))
    }

    fn cursor(&self) -> i64 {
        get_minimum_sequence(&self.dependent_sequences, i64::MAX)
    }

    fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ProcessingSequenceBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingSequenceBarrier")
            .field("cursor", &self.cursor)
            .field("dependent_sequences", &self.dependent_sequences)
            .field("alerted", &self.is_alerted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{
        BlockingWaitStrategy, BusySpinWaitStrategy, MultiProducerSequencer,
        SingleProducerSequencer,
    };
    use std::thread;
    use std::time::Duration;

    fn single(size: usize) -> Arc<dyn Sequencer> {
        Arc::new(SingleProducerSequencer::new(size, Arc::new(BlockingWaitStrategy::new())).unwrap())
    }

    #[test]
    fn test_defaults_to_cursor() {
        let sequencer = single(8);
        let barrier = ProcessingSequenceBarrier::new(Arc::clone(&sequencer), Vec::new());
        assert_eq!(barrier.dependent_sequences().len(), 1);
        assert!(Arc::ptr_eq(
            &barrier.dependent_sequences()[0],
            &sequencer.cursor()
        ));
        assert_eq!(barrier.cursor(), -1);
    }

    #[test]
    fn test_wait_for_published_sequence() {
        let sequencer = single(8);
        let barrier = ProcessingSequenceBarrier::new(Arc::clone(&sequencer), Vec::new());

        let hi = sequencer.next_n(3).unwrap();
        sequencer.publish_range(0, hi);

        assert_eq!(barrier.wait_for(0).unwrap(), 2);
    }

    #[test]
    fn test_clamped_by_upstream_consumer() {
        let sequencer = single(8);
        let upstream = Arc::new(Sequence::new(1));
        let barrier = ProcessingSequenceBarrier::new(
            Arc::clone(&sequencer),
            vec![Arc::clone(&upstream)],
        );

        let hi = sequencer.next_n(5).unwrap();
        sequencer.publish(hi);

        assert_eq!(barrier.wait_for(0).unwrap(), 1);
        upstream.set(4);
        assert_eq!(barrier.wait_for(2).unwrap(), 4);
    }

    #[test]
    fn test_multi_producer_returns_contiguous_prefix() {
        let sequencer: Arc<dyn Sequencer> = Arc::new(
            MultiProducerSequencer::new(8, Arc::new(BusySpinWaitStrategy::new())).unwrap(),
        );
        let barrier = ProcessingSequenceBarrier::new(Arc::clone(&sequencer), Vec::new());

        let hi = sequencer.next_n(4).unwrap();
        assert_eq!(hi, 3);
        sequencer.publish(0);
        sequencer.publish(1);
        sequencer.publish(3);

        assert_eq!(barrier.wait_for(0).unwrap(), 1);
        sequencer.publish(2);
        assert_eq!(barrier.wait_for(2).unwrap(), 3);
    }

    #[test]
    fn test_alerted_barrier_fails_fast() {
        let barrier = ProcessingSequenceBarrier::new(single(8), Vec::new());
        barrier.alert();
        assert!(barrier.is_alerted());
        assert!(matches!(barrier.wait_for(0), Err(DisruptorError::Alert)));

        barrier.clear_alert();
        assert!(!barrier.is_alerted());
        assert!(barrier.check_alert().is_ok());
    }

    #[test]
    fn test_alert_wakes_blocked_waiter() {
        let barrier = Arc::new(ProcessingSequenceBarrier::new(single(8), Vec::new()));

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait_for(0))
        };

        thread::sleep(Duration::from_millis(20));
        barrier.alert();

        assert!(matches!(waiter.join().unwrap(), Err(DisruptorError::Alert)));
    }
}
