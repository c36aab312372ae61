//! Audio buffer implementations.
//!
//! - [`JitterBuffer`] - Bounded receive queue with drop-oldest overflow and
//!   silence fill on underrun

pub mod jitter_buffer;

pub use jitter_buffer::{JitterBuffer, JitterStats};
