//! Property-based tests for disruptor components
//!
//! These tests use proptest to check the sequence arithmetic that every other
//! component relies on.

use crate::disruptor::{
    get_minimum_sequence, BusySpinWaitStrategy, DefaultEventFactory, DisruptorConfig,
    DisruptorError, MultiProducerSequencer, ProducerType, RingBuffer, Sequence, Sequencer,
    SingleProducerSequencer, WaitStrategyKind,
};
use proptest::prelude::*;
use std::sync::Arc;

/// Property tests for Sequence
mod sequence_properties {
    use super::*;

    proptest! {
        #[test]
        fn add_and_get_accumulates(initial in -1_000_000i64..1_000_000, increments in prop::collection::vec(1i64..100, 1..50)) {
            let seq = Sequence::new(initial);
            let mut expected = initial;

            for inc in increments {
                expected += inc;
                prop_assert_eq!(seq.add_and_get(inc), expected);
            }
            prop_assert_eq!(seq.get(), expected);
        }

        #[test]
        fn compare_and_set_only_matches_current(initial in any::<i64>(), expected in any::<i64>(), new_value in any::<i64>()) {
            let seq = Sequence::new(initial);
            let swapped = seq.compare_and_set(expected, new_value);
            prop_assert_eq!(swapped, expected == initial);
            prop_assert_eq!(seq.get(), if swapped { new_value } else { initial });
        }

        #[test]
        fn minimum_sequence_is_smallest_or_default(values in prop::collection::vec(-1i64..10_000, 0..16), default in any::<i64>()) {
            let sequences: Vec<Arc<Sequence>> = values.iter().map(|v| Arc::new(Sequence::new(*v))).collect();
            let expected = values.iter().copied().fold(default, i64::min);
            prop_assert_eq!(get_minimum_sequence(&sequences, default), expected);
        }
    }
}

/// Property tests for `SingleProducerSequencer`
mod single_producer_properties {
    use super::*;

    proptest! {
        #[test]
        fn claims_are_contiguous(size_power in 1u32..10, requests in prop::collection::vec(1i64..8, 1..30)) {
            let buffer_size = 1usize << size_power;
            let sequencer = SingleProducerSequencer::new(buffer_size, Arc::new(BusySpinWaitStrategy::new())).unwrap();

            let mut last = -1i64;
            for n in requests {
                match sequencer.next_n(n) {
                    Ok(high) => {
                        prop_assert_eq!(high, last + n);
                        sequencer.publish_range(last + 1, high);
                        prop_assert_eq!(sequencer.cursor().get(), high);
                        last = high;
                    }
                    Err(DisruptorError::InvalidClaimSize { .. }) => prop_assert!(n > buffer_size as i64),
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
            }
        }

        #[test]
        fn try_next_respects_gating(size_power in 1u32..7, consumed in 0i64..64, requests in prop::collection::vec(1i64..4, 1..40)) {
            let buffer_size = 1i64 << size_power;
            let sequencer = SingleProducerSequencer::new(buffer_size as usize, Arc::new(BusySpinWaitStrategy::new())).unwrap();
            let gate = Arc::new(Sequence::new(-1));
            sequencer.add_gating_sequences(&[Arc::clone(&gate)]);

            let mut claimed = -1i64;
            for n in requests {
                if n > buffer_size {
                    continue;
                }
                let gating = gate.get();
                let fits = claimed + n - gating <= buffer_size;
                prop_assert_eq!(sequencer.remaining_capacity(), buffer_size - (claimed - gating));
                match sequencer.try_next_n(n) {
                    Ok(high) => {
                        prop_assert!(fits);
                        prop_assert_eq!(high, claimed + n);
                        sequencer.publish(high);
                        claimed = high;
                    }
                    Err(DisruptorError::InsufficientCapacity) => prop_assert!(!fits),
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
                // Release part of the backlog
                gate.set(gating.max(claimed.min(consumed)));
            }
        }
    }
}

/// Property tests for `MultiProducerSequencer`
mod multi_producer_properties {
    use super::*;

    proptest! {
        #[test]
        fn highest_published_stops_at_first_gap(
            size_power in 3u32..7,
            published in prop::collection::vec(any::<bool>(), 1..8),
        ) {
            let buffer_size = 1usize << size_power;
            let sequencer = MultiProducerSequencer::new(buffer_size, Arc::new(BusySpinWaitStrategy::new())).unwrap();
            let count = published.len() as i64;
            let high = sequencer.next_n(count).unwrap();
            prop_assert_eq!(high, count - 1);

            // Publish out of order: highest first
            for (offset, publish) in published.iter().enumerate().rev() {
                if *publish {
                    sequencer.publish(offset as i64);
                }
            }

            let contiguous = published.iter().take_while(|p| **p).count() as i64;
            prop_assert_eq!(sequencer.get_highest_published_sequence(0, high), contiguous - 1);
            for (offset, publish) in published.iter().enumerate() {
                prop_assert_eq!(sequencer.is_available(offset as i64), *publish);
            }
        }

        #[test]
        fn availability_tracks_laps(size_power in 1u32..5, laps in 1i64..5) {
            let buffer_size = 1i64 << size_power;
            let sequencer = MultiProducerSequencer::new(buffer_size as usize, Arc::new(BusySpinWaitStrategy::new())).unwrap();

            let total = buffer_size * laps;
            for sequence in 0..total {
                prop_assert_eq!(sequencer.next().unwrap(), sequence);
                sequencer.publish(sequence);
            }

            // Only the last lap is still marked available
            for sequence in 0..total {
                prop_assert_eq!(sequencer.is_available(sequence), sequence >= total - buffer_size);
            }
        }
    }
}

/// Property tests for `RingBuffer`
mod ring_buffer_properties {
    use super::*;

    proptest! {
        #[test]
        fn published_values_read_back(size_power in 1u32..8, values in prop::collection::vec(any::<i64>(), 1..64)) {
            let size = 1usize << size_power;
            let ring = RingBuffer::create(
                ProducerType::Multi,
                DefaultEventFactory::<i64>::new(),
                size,
                Arc::new(BusySpinWaitStrategy::new()),
            ).unwrap();

            for (index, value) in values.iter().enumerate() {
                let value = *value;
                ring.publish_event(move |slot: &mut i64, _s: i64| *slot = value).unwrap();
                prop_assert_eq!(ring.cursor(), index as i64);
                // SAFETY: published and no producer is running concurrently
                prop_assert_eq!(unsafe { *ring.get(index as i64) }, value);
            }

            // Slots are reused modulo the buffer size
            let last = ring.cursor();
            // SAFETY: as above
            prop_assert_eq!(unsafe { *ring.get(last) }, unsafe { *ring.get(last + size as i64) });
        }

        #[test]
        fn non_power_of_two_sizes_rejected(size in 3usize..4096) {
            prop_assume!(!size.is_power_of_two());
            let result = RingBuffer::create(
                ProducerType::Single,
                DefaultEventFactory::<i64>::new(),
                size,
                Arc::new(BusySpinWaitStrategy::new()),
            );
            prop_assert!(matches!(result, Err(DisruptorError::InvalidBufferSize(s)) if s == size));
        }
    }
}

/// Property tests for `DisruptorConfig`
mod config_properties {
    use super::*;

    fn wait_strategy_kind() -> impl Strategy<Value = WaitStrategyKind> {
        prop_oneof![
            Just(WaitStrategyKind::Blocking),
            Just(WaitStrategyKind::BusySpin),
            Just(WaitStrategyKind::Yielding),
            Just(WaitStrategyKind::Sleeping),
        ]
    }

    proptest! {
        #[test]
        fn json_round_trip(
            size_power in 0u32..20,
            multi in any::<bool>(),
            wait_strategy in wait_strategy_kind(),
            sleep_micros in 1u64..10_000,
            cores in prop::collection::vec(0usize..64, 0..4),
        ) {
            let config = DisruptorConfig {
                buffer_size: 1 << size_power,
                producer_type: if multi { ProducerType::Multi } else { ProducerType::Single },
                wait_strategy,
                sleep_micros,
                thread_name_prefix: "prop".to_string(),
                pin_to_cores: cores,
            };
            let json = config.to_json_pretty().unwrap();
            prop_assert_eq!(DisruptorConfig::from_json(&json).unwrap(), config);
        }
    }
}
