//! Full-duplex voice relay between a packet voice channel and local audio
//! hardware.
//!
//! - [`audio`] - Frames, effect stages, the jitter buffer and both schedulers
//! - [`io`] - Audio device and voice session collaborators
//! - [`pipeline`] - Push/pull seams between components
//! - [`relay`] - Configuration and the duplex orchestrator

pub mod audio;
pub mod io;
pub mod pipeline;
pub mod relay;
