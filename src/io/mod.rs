//! Hardware and network I/O.
//!
//! The relay core depends only on the two collaborator traits defined here:
//!
//! - [`AudioDevice`] - Opens input/output streams with a per-period callback
//! - [`VoiceSession`] - Sends and receives raw PCM frames
//!
//! plus one concrete implementation of each: [`CpalDevice`] and
//! [`UdpVoiceSession`].

pub mod audio;
pub mod network;

#[cfg(test)]
pub mod testing;

pub use audio::{
    AudioDevice, AudioStream, CpalDevice, DeviceInfo, Direction, InputCallback, OutputCallback,
    StreamConfig, list_devices,
};
pub use network::{SessionStats, UdpVoiceSession, VoiceSession, decode_pcm, encode_pcm};
