//! Disruptor Configuration
//!
//! Serializable settings for assembling a pipeline: ring size, producer mode,
//! wait strategy, and how consumer threads are named and pinned.

use crate::disruptor::{
    is_power_of_two, BlockingWaitStrategy, BusySpinWaitStrategy, DisruptorError, ProducerType,
    Result, SleepingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Which wait strategy consumers use while waiting for events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategyKind {
    /// Mutex and condition variable, lowest CPU usage
    #[default]
    Blocking,
    /// Tight spin, lowest latency
    BusySpin,
    /// Spin, then yield the thread
    Yielding,
    /// Spin, yield, then sleep
    Sleeping,
}

impl WaitStrategyKind {
    /// Build the wait strategy
    ///
    /// # Arguments
    /// * `sleep` - Park duration used by [`WaitStrategyKind::Sleeping`], ignored otherwise
    pub fn build(self, sleep: Duration) -> Arc<dyn WaitStrategy> {
        match self {
            Self::Blocking => Arc::new(BlockingWaitStrategy::new()),
            Self::BusySpin => Arc::new(BusySpinWaitStrategy::new()),
            Self::Yielding => Arc::new(YieldingWaitStrategy::new()),
            Self::Sleeping => Arc::new(SleepingWaitStrategy::new_with_duration(sleep)),
        }
    }
}

/// Settings for a [`Disruptor`](crate::disruptor::Disruptor)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisruptorConfig {
    /// Number of slots in the ring, must be a power of 2
    pub buffer_size: usize,

    /// Whether one or many threads publish
    pub producer_type: ProducerType,

    /// How consumers wait for new events
    pub wait_strategy: WaitStrategyKind,

    /// Park duration of the sleeping wait strategy, in microseconds
    pub sleep_micros: u64,

    /// Consumer threads are named `{prefix}-{n}`
    pub thread_name_prefix: String,

    /// CPU cores consumer threads are pinned to, round-robin. Empty disables pinning.
    pub pin_to_cores: Vec<usize>,
}

impl Default for DisruptorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            producer_type: ProducerType::default(),
            wait_strategy: WaitStrategyKind::Blocking,
            sleep_micros: 100,
            thread_name_prefix: "ringbatch".to_string(),
            pin_to_cores: Vec::new(),
        }
    }
}

impl DisruptorConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ring size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the producer type
    pub fn with_producer_type(mut self, producer_type: ProducerType) -> Self {
        self.producer_type = producer_type;
        self
    }

    /// Set the wait strategy
    pub fn with_wait_strategy(mut self, wait_strategy: WaitStrategyKind) -> Self {
        self.wait_strategy = wait_strategy;
        self
    }

    /// Set the consumer thread name prefix
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Pin consumer threads to these cores
    pub fn with_pinned_cores(mut self, cores: Vec<usize>) -> Self {
        self.pin_to_cores = cores;
        self
    }

    /// Parse and validate a JSON configuration
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    /// Returns `DisruptorError::ConfigParse` for malformed JSON and
    /// `DisruptorError::Config` if the result does not validate
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as pretty-printed JSON
    ///
    /// # Errors
    /// Returns `DisruptorError::ConfigParse` if serialization fails
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the configuration for values the pipeline cannot be built from
    ///
    /// # Errors
    /// Returns `DisruptorError::Config` describing the first invalid field
    pub fn validate(&self) -> Result<()> {
        if !is_power_of_two(self.buffer_size) {
            return Err(DisruptorError::Config(format!(
                "buffer_size must be a power of 2, got {}",
                self.buffer_size
            )));
        }
        if self.buffer_size > i32::MAX as usize {
            return Err(DisruptorError::Config(format!(
                "buffer_size too large: {}",
                self.buffer_size
            )));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(DisruptorError::Config(
                "thread_name_prefix cannot be empty".to_string(),
            ));
        }
        if self.wait_strategy == WaitStrategyKind::Sleeping && self.sleep_micros == 0 {
            return Err(DisruptorError::Config(
                "sleep_micros must be positive for the sleeping wait strategy".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the configured wait strategy
    pub fn build_wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        self.wait_strategy
            .build(Duration::from_micros(self.sleep_micros))
    }
}
