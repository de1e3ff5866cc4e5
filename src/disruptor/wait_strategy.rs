//! Wait Strategy Implementation
//!
//! Wait strategies decide how a consumer waits for a sequence to become available.
//! Each strategy re-checks the barrier's alert flag on every iteration so that a
//! halt request is observed within one spin or wake cycle.

use crate::disruptor::sequence::get_minimum_sequence;
use crate::disruptor::{Result, Sequence, SequenceBarrier};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Strategy for waiting for events to become available
pub trait WaitStrategy: Send + Sync + std::fmt::Debug {
    /// Wait for the given sequence to become available
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    /// * `cursor` - The producer cursor
    /// * `dependent_sequences` - Sequences this consumer must not overtake
    /// * `barrier` - The barrier whose alert flag cancels the wait
    ///
    /// # Returns
    /// The minimum of the dependent sequences, which may be higher than requested
    ///
    /// # Errors
    /// Returns [`DisruptorError::Alert`](crate::disruptor::DisruptorError::Alert)
    /// if the barrier is alerted while waiting
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64>;

    /// Wake every thread blocked in [`WaitStrategy::wait_for`]
    fn signal_all_when_blocking(&self);
}

/// Spin until the slowest dependent sequence reaches `sequence`
#[inline]
fn spin_on_dependents(
    sequence: i64,
    dependent_sequences: &[Arc<Sequence>],
    barrier: &dyn SequenceBarrier,
) -> Result<i64> {
    loop {
        let available = get_minimum_sequence(dependent_sequences, i64::MAX);
        if available >= sequence {
            return Ok(available);
        }
        barrier.check_alert()?;
        std::hint::spin_loop();
    }
}

/// Blocking wait strategy using a mutex and condition variable
///
/// Consumers park on the condition variable until the producer cursor has moved
/// past the requested sequence, then spin for upstream consumers. Producers signal
/// every waiter on each publish.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    /// Create a new blocking wait strategy
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                self.condvar.wait(&mut guard);
            }
        }

        spin_on_dependents(sequence, dependent_sequences, barrier)
    }

    fn signal_all_when_blocking(&self) {
        // Taking the lock orders the notification after any waiter's cursor check.
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Busy-spin wait strategy
///
/// Polls continuously with a CPU spin hint. Lowest latency, but it needs a
/// dedicated core per waiting consumer.
#[derive(Debug, Default)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    /// Create a new busy-spin wait strategy
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        spin_on_dependents(sequence, dependent_sequences, barrier)
    }

    fn signal_all_when_blocking(&self) {}
}

const SPIN_TRIES: u32 = 100;

/// Yielding wait strategy
///
/// Spins for a bounded number of iterations, then yields the thread between polls.
#[derive(Debug, Default)]
pub struct YieldingWaitStrategy;

impl YieldingWaitStrategy {
    /// Create a new yielding wait strategy
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        let mut counter = SPIN_TRIES;
        loop {
            let available = get_minimum_sequence(dependent_sequences, i64::MAX);
            if available >= sequence {
                return Ok(available);
            }
            barrier.check_alert()?;
            if counter == 0 {
                thread::yield_now();
            } else {
                counter -= 1;
                std::hint::spin_loop();
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

const DEFAULT_RETRIES: u32 = 200;

/// Sleeping wait strategy
///
/// Spins, then yields, then sleeps for a fixed duration between polls. Trades
/// latency for very low CPU usage on idle pipelines.
#[derive(Debug)]
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep_duration: Duration,
}

impl SleepingWaitStrategy {
    /// Create a new sleeping wait strategy with default sleep duration
    pub fn new() -> Self {
        Self::new_with_duration(Duration::from_micros(100))
    }

    /// Create a new sleeping wait strategy with custom sleep duration
    ///
    /// # Arguments
    /// * `sleep_duration` - How long to sleep between checks once spinning and yielding are exhausted
    pub fn new_with_duration(sleep_duration: Duration) -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            sleep_duration,
        }
    }

    /// The configured sleep between polls
    pub fn sleep_duration(&self) -> Duration {
        self.sleep_duration
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        let mut counter = self.retries;
        loop {
            let available = get_minimum_sequence(dependent_sequences, i64::MAX);
            if available >= sequence {
                return Ok(available);
            }
            barrier.check_alert()?;
            if counter > SPIN_TRIES {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(self.sleep_duration);
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::DisruptorError;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FlagBarrier {
        alerted: AtomicBool,
    }

    impl SequenceBarrier for FlagBarrier {
        fn wait_for(&self, _sequence: i64) -> Result<i64> {
            unreachable!("strategies never call back into wait_for")
        }

        fn cursor(&self) -> i64 {
            0
        }

        fn is_alerted(&self) -> bool {
            self.alerted.load(Ordering::Acquire)
        }

        fn alert(&self) {
            self.alerted.store(true, Ordering::Release);
        }

        fn clear_alert(&self) {
            self.alerted.store(false, Ordering::Release);
        }
    }

    fn strategies() -> Vec<Arc<dyn WaitStrategy>> {
        vec![
            Arc::new(BlockingWaitStrategy::new()),
            Arc::new(BusySpinWaitStrategy::new()),
            Arc::new(YieldingWaitStrategy::new()),
            Arc::new(SleepingWaitStrategy::new_with_duration(Duration::from_micros(50))),
        ]
    }

    #[test]
    fn test_returns_immediately_when_available() {
        let barrier = FlagBarrier::default();
        for strategy in strategies() {
            let cursor = Arc::new(Sequence::new(10));
            let deps = vec![Arc::clone(&cursor)];
            assert_eq!(strategy.wait_for(5, &cursor, &deps, &barrier).unwrap(), 10);
        }
    }

    #[test]
    fn test_clamped_to_slowest_dependent() {
        let barrier = FlagBarrier::default();
        for strategy in strategies() {
            let cursor = Sequence::new(10);
            let deps = vec![Arc::new(Sequence::new(8)), Arc::new(Sequence::new(6))];
            assert_eq!(strategy.wait_for(5, &cursor, &deps, &barrier).unwrap(), 6);
        }
    }

    #[test]
    fn test_alert_interrupts_wait() {
        for strategy in strategies() {
            let barrier = Arc::new(FlagBarrier::default());
            let cursor = Arc::new(Sequence::default());

            let waiter = {
                let strategy = Arc::clone(&strategy);
                let barrier = Arc::clone(&barrier);
                let cursor = Arc::clone(&cursor);
                thread::spawn(move || {
                    let deps = vec![Arc::clone(&cursor)];
                    strategy.wait_for(0, &cursor, &deps, barrier.as_ref())
                })
            };

            thread::sleep(Duration::from_millis(20));
            barrier.alert();
            strategy.signal_all_when_blocking();

            let result = waiter.join().unwrap();
            assert!(matches!(result, Err(DisruptorError::Alert)));
        }
    }

    #[test]
    fn test_blocking_wakes_on_publish() {
        let strategy = Arc::new(BlockingWaitStrategy::new());
        let cursor = Arc::new(Sequence::default());
        let barrier = Arc::new(FlagBarrier::default());

        let waiter = {
            let strategy = Arc::clone(&strategy);
            let cursor = Arc::clone(&cursor);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let deps = vec![Arc::clone(&cursor)];
                strategy.wait_for(3, &cursor, &deps, barrier.as_ref())
            })
        };

        thread::sleep(Duration::from_millis(10));
        cursor.set(3);
        strategy.signal_all_when_blocking();

        assert_eq!(waiter.join().unwrap().unwrap(), 3);
    }
}
