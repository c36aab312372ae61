//! Object-safe seams between pipeline components.

pub mod dyn_traits;

pub use dyn_traits::{PushFn, Pushable};
