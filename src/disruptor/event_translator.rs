//! Event Translator Implementation
//!
//! Translators write producer data into a claimed slot. The ring buffer claims
//! the sequence, hands the slot to the translator and publishes it afterwards,
//! even if the translator panics.

/// Populates a claimed event in place
///
/// Closures of the form `Fn(&mut T, i64)` implement this trait.
///
/// # Examples
/// ```
/// use ringbatch::disruptor::EventTranslator;
///
/// #[derive(Default)]
/// struct Order {
///     id: u64,
///     sequence: i64,
/// }
///
/// struct OrderTranslator {
///     id: u64,
/// }
///
/// impl EventTranslator<Order> for OrderTranslator {
///     fn translate_to(&self, event: &mut Order, sequence: i64) {
///         event.id = self.id;
///         event.sequence = sequence;
///     }
/// }
/// ```
pub trait EventTranslator<T> {
    /// Translate data into an event
    ///
    /// # Arguments
    /// * `event` - The slot to populate
    /// * `sequence` - The sequence the slot was claimed at
    fn translate_to(&self, event: &mut T, sequence: i64);
}

impl<T, F> EventTranslator<T> for F
where
    F: Fn(&mut T, i64),
{
    fn translate_to(&self, event: &mut T, sequence: i64) {
        self(event, sequence)
    }
}

/// Populates a claimed event from one argument
///
/// Used for single and batch publication of argument values. Closures of the
/// form `Fn(&mut T, i64, A)` implement this trait.
pub trait EventTranslatorOneArg<T, A> {
    /// Translate `arg` into an event
    fn translate_to(&self, event: &mut T, sequence: i64, arg: A);
}

impl<T, A, F> EventTranslatorOneArg<T, A> for F
where
    F: Fn(&mut T, i64, A),
{
    fn translate_to(&self, event: &mut T, sequence: i64, arg: A) {
        self(event, sequence, arg)
    }
}
