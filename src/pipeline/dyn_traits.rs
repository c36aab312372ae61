//! Object-safe dynamic pipeline traits.
//!
//! Components that hand data across a thread boundary talk through
//! [`Pushable<T>`] so either side can be swapped (a real socket, an in-memory
//! fake, a jitter buffer) without touching the other.

use std::sync::Arc;

/// Passive receiver - can receive pushed data.
///
/// Implementations are called from whatever thread produced the data and
/// must hand off quickly.
pub trait Pushable<T>: Send + Sync {
    fn push(&self, input: T);
}

impl<T: Send + Sync> Pushable<T> for Arc<dyn Pushable<T>> {
    fn push(&self, input: T) {
        (**self).push(input)
    }
}

/// Forwards pushes to a closure.
pub struct PushFn<F>(pub F);

impl<T, F> Pushable<T> for PushFn<F>
where
    F: Fn(T) + Send + Sync,
{
    fn push(&self, input: T) {
        (self.0)(input)
    }
}
