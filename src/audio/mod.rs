//! Audio data types, processing stages, and the two real-time schedulers.
//!
//! # Data Types
//! - [`AudioSample`] - Device sample formats convertible to 16-bit PCM
//! - [`Frame`] - An owned block of mono 16-bit samples
//! - [`AudioFormat`] - Sample rate and nominal frame length
//!
//! # Buffers
//! - [`buffers::JitterBuffer`] - Receive queue with drop-oldest overflow
//!
//! # Effects
//! - [`effects::FxChain`] - Ordered transmit stages and presets
//! - [`effects::NoiseGate`] - RMS gate applied after the chain
//!
//! # Schedulers
//! - [`playback::PlaybackScheduler`] - Output callback body
//! - [`capture::CaptureScheduler`] - Input callback body

pub mod buffers;
pub mod capture;
pub mod effects;
pub mod frame;
pub mod playback;
pub mod sample;

pub use buffers::{JitterBuffer, JitterStats};
pub use capture::{CaptureScheduler, CaptureStats};
pub use frame::{AudioFormat, Frame};
pub use playback::PlaybackScheduler;
pub use sample::AudioSample;
