//! Executors that run consumer loops
//!
//! The pipeline never creates threads on its own. Each consumer is submitted
//! once, at start, to an [`Executor`]. [`ThreadExecutor`] is the stock
//! implementation: one named OS thread per task, optionally pinned to a CPU core.

use crate::disruptor::{DisruptorConfig, Result};
use core_affinity::CoreId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// A unit of work submitted to an executor
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted tasks on some thread
///
/// Scheduling is fire-and-forget: the pipeline only requires that each task
/// eventually runs, concurrently with the others.
pub trait Executor: Send + Sync {
    /// Submit a task
    ///
    /// # Errors
    /// Returns an error if the task could not be scheduled
    fn execute(&self, task: Task) -> Result<()>;
}

/// Spawns one named thread per task
///
/// Threads are named `{prefix}-{n}`. When a core list is configured, tasks are
/// pinned to those cores round-robin in submission order.
#[derive(Debug)]
pub struct ThreadExecutor {
    name_prefix: String,
    cores: Vec<usize>,
    spawned: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadExecutor {
    /// Create an executor with the default `processor` thread name prefix
    pub fn new() -> Self {
        Self::with_name_prefix("processor")
    }

    /// Create an executor whose threads are named `{prefix}-{n}`
    pub fn with_name_prefix<S: Into<String>>(prefix: S) -> Self {
        Self {
            name_prefix: prefix.into(),
            cores: Vec::new(),
            spawned: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Pin spawned threads to these CPU cores, round-robin
    pub fn pin_to_cores(mut self, cores: Vec<usize>) -> Self {
        self.cores = cores;
        self
    }

    /// Build an executor from the thread settings of a configuration
    pub fn from_config(config: &DisruptorConfig) -> Self {
        Self::with_name_prefix(config.thread_name_prefix.clone())
            .pin_to_cores(config.pin_to_cores.clone())
    }

    /// Number of tasks spawned so far
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Acquire)
    }

    /// Wait for every spawned thread to finish
    ///
    /// # Returns
    /// The number of threads that terminated with a panic
    pub fn join(&self) -> usize {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        handles
            .into_iter()
            .map(JoinHandle::join)
            .filter(|result| result.is_err())
            .count()
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        let index = self.spawned.fetch_add(1, Ordering::AcqRel);
        let thread_name = format!("{}-{index}", self.name_prefix);
        let affinity = (!self.cores.is_empty()).then(|| CoreId {
            id: self.cores[index % self.cores.len()],
        });

        tracing::debug!(thread = %thread_name, "spawning consumer thread");

        let name_for_thread = thread_name.clone();
        let handle = thread::Builder::new().name(thread_name).spawn(move || {
            set_affinity_if_defined(affinity, &name_for_thread);
            task();
        })?;

        self.handles.lock().push(handle);
        Ok(())
    }
}

fn set_affinity_if_defined(affinity: Option<CoreId>, thread_name: &str) {
    if let Some(core_id) = affinity {
        if !core_affinity::set_for_current(core_id) {
            tracing::warn!(
                thread = thread_name,
                core = core_id.id,
                "could not pin thread to core"
            );
        }
    }
}
