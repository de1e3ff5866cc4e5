//! Event Factory Implementation
//!
//! Factories pre-populate every ring buffer slot once at construction time.
//! Slots are reused in place afterwards, so the hot path never allocates.

/// Factory for creating events in the Disruptor
///
/// Called exactly `buffer_size` times when a ring buffer is created.
///
/// # Examples
/// ```
/// use ringbatch::disruptor::EventFactory;
///
/// struct PriceTick {
///     price: i64,
/// }
///
/// struct PriceTickFactory;
///
/// impl EventFactory<PriceTick> for PriceTickFactory {
///     fn new_instance(&self) -> PriceTick {
///         PriceTick { price: 0 }
///     }
/// }
/// ```
pub trait EventFactory<T>: Send + Sync {
    /// Create a blank event instance
    fn new_instance(&self) -> T;
}

/// Event factory that uses the Default trait
pub struct DefaultEventFactory<T: Default> {
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T: Default> DefaultEventFactory<T> {
    /// Create a new default event factory
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: Default> Default for DefaultEventFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> EventFactory<T> for DefaultEventFactory<T> {
    fn new_instance(&self) -> T {
        T::default()
    }
}

/// Event factory backed by a closure
pub struct ClosureEventFactory<F> {
    factory_fn: F,
}

impl<F> ClosureEventFactory<F> {
    /// Create a new closure-based event factory
    ///
    /// # Arguments
    /// * `factory_fn` - The closure that creates new event instances
    pub fn new(factory_fn: F) -> Self {
        Self { factory_fn }
    }
}

impl<T, F> EventFactory<T> for ClosureEventFactory<F>
where
    F: Fn() -> T + Send + Sync,
{
    fn new_instance(&self) -> T {
        (self.factory_fn)()
    }
}
