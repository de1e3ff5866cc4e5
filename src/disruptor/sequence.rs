//! Sequence implementation for the Disruptor
//!
//! A Sequence tracks progress through the ring buffer for producers and consumers.
//! Every sequence owns its cache line so that the producer cursor, each consumer
//! sequence and the shared work-claim counter never falsely share.

use arc_swap::ArcSwap;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::disruptor::INITIAL_CURSOR_VALUE;

/// A cache-line padded, atomically observable 64-bit counter
///
/// Two write modes are provided. [`Sequence::set`] is an ordered (release) store
/// used on the hot publish and advance paths. [`Sequence::set_volatile`] is a
/// sequentially consistent store used when registering sequences across threads.
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Create a new sequence with the given initial value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial_value)),
        }
    }

    /// Get the current sequence value
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Ordered write: all prior writes become visible before the new value
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Strongly visible write, fenced against subsequent loads
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically set the value to `new` if it currently equals `expected`
    ///
    /// # Returns
    /// True if the swap happened
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Increment and get the new value
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Add a value and get the new result
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("value", &self.get())
            .finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Minimum value across `sequences`, or `minimum` if it is lower (or the slice is empty)
pub fn get_minimum_sequence(sequences: &[Arc<Sequence>], minimum: i64) -> i64 {
    sequences
        .iter()
        .map(|sequence| sequence.get())
        .fold(minimum, i64::min)
}

/// Copy-on-write set of gating sequences
///
/// Readers on the claim path take a lock-free snapshot. Writers publish a new
/// array through [`ArcSwap::rcu`], so concurrent add/remove calls never lose
/// each other's updates.
pub struct SequenceGroup {
    sequences: ArcSwap<Vec<Arc<Sequence>>>,
}

impl SequenceGroup {
    /// Create a new empty sequence group
    pub fn new() -> Self {
        Self {
            sequences: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Add sequences, moving each of them to the cursor position
    ///
    /// The values are written before the swap so that the producer never sees a
    /// stale (far behind) sequence, and again afterwards to pick up any sequences
    /// claimed in the meantime.
    ///
    /// # Arguments
    /// * `cursor` - The producer cursor the new sequences should start from
    /// * `to_add` - The sequences to register
    pub fn add(&self, cursor: &Sequence, to_add: &[Arc<Sequence>]) {
        let cursor_value = cursor.get();
        for sequence in to_add {
            sequence.set(cursor_value);
        }

        self.sequences.rcu(|current| {
            let mut updated = Vec::with_capacity(current.len() + to_add.len());
            updated.extend(current.iter().cloned());
            updated.extend(to_add.iter().cloned());
            updated
        });

        let cursor_value = cursor.get();
        for sequence in to_add {
            sequence.set(cursor_value);
        }
    }

    /// Remove every occurrence of `sequence` (compared by identity)
    ///
    /// # Returns
    /// True if at least one entry was removed
    pub fn remove(&self, sequence: &Arc<Sequence>) -> bool {
        let mut removed = false;
        self.sequences.rcu(|current| {
            let updated: Vec<Arc<Sequence>> = current
                .iter()
                .filter(|s| !Arc::ptr_eq(s, sequence))
                .cloned()
                .collect();
            removed = updated.len() != current.len();
            updated
        });
        removed
    }

    /// Minimum value in the group, bounded above by `default`
    pub fn minimum(&self, default: i64) -> i64 {
        get_minimum_sequence(&self.sequences.load(), default)
    }

    /// Snapshot of the current members
    pub fn snapshot(&self) -> Arc<Vec<Arc<Sequence>>> {
        self.sequences.load_full()
    }

    /// Get the number of sequences in the group
    pub fn len(&self) -> usize {
        self.sequences.load().len()
    }

    /// Check if the group is empty
    pub fn is_empty(&self) -> bool {
        self.sequences.load().is_empty()
    }
}

impl Default for SequenceGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SequenceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.sequences.load().iter()).finish()
    }
}
