//! Command-line argument parsing

use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::{Context, Result};
use clap::Parser;

use voice_relay::audio::effects::{EffectParams, EffectPreset};
use voice_relay::relay::{Mode, RelayConfig};

/// Full-duplex voice relay between a UDP peer and local audio devices
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Remote peer host
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Remote peer port
    #[arg(long, env = "PORT", default_value_t = 64738)]
    pub port: u16,

    /// Local address to receive on
    #[arg(long, env = "BIND", default_value = "0.0.0.0:64738")]
    pub bind: SocketAddr,

    /// Directions to relay
    #[arg(long, env = "MODE", value_enum, default_value_t = Mode::Both)]
    pub mode: Mode,

    /// Input device (index or name substring; default device if omitted)
    #[arg(long, env = "ALSA_INPUT")]
    pub input: Option<String>,

    /// Output device (index or name substring; default device if omitted)
    #[arg(long, env = "ALSA_OUTPUT")]
    pub output: Option<String>,

    /// Print audio devices and exit
    #[arg(long, default_value = "false")]
    pub list_devices: bool,

    /// Receive jitter budget in milliseconds
    #[arg(long, default_value_t = 200)]
    pub max_buffer_ms: u32,

    /// Noise gate RMS (0 = off)
    #[arg(long, default_value_t = 0.0)]
    pub gate: f64,

    /// Transmit high-pass cutoff in Hz (0 = off)
    #[arg(long, default_value_t = 0.0)]
    pub highpass: f32,

    /// Voice effect for transmit
    #[arg(long, env = "FX", value_enum, default_value_t = EffectPreset::None)]
    pub fx: EffectPreset,

    /// Robot carrier frequency in Hz
    #[arg(long, default_value_t = 90.0)]
    pub fx_robot_hz: f32,

    /// Echo delay in milliseconds
    #[arg(long, default_value_t = 140.0)]
    pub fx_echo_ms: f32,

    /// Echo feedback (0..0.95)
    #[arg(long, default_value_t = 0.25)]
    pub fx_echo_fb: f32,

    /// Echo wet mix (0..1)
    #[arg(long, default_value_t = 0.25)]
    pub fx_echo_mix: f32,

    /// Bitcrusher depth (1..15)
    #[arg(long, default_value_t = 6)]
    pub fx_bitcrush_bits: u32,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    pub sample_rate: u32,

    /// Samples per frame and hardware period
    #[arg(long, default_value_t = 960)]
    pub frame_size: usize,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            mode: self.mode,
            sample_rate: self.sample_rate,
            frame_size: self.frame_size,
            max_buffer_ms: self.max_buffer_ms,
            gate_threshold: self.gate,
            highpass_hz: self.highpass,
            effect: self.fx,
            effect_params: EffectParams {
                robot_hz: self.fx_robot_hz,
                echo_ms: self.fx_echo_ms,
                echo_feedback: self.fx_echo_fb,
                echo_mix: self.fx_echo_mix,
                bitcrush_bits: self.fx_bitcrush_bits,
            },
            input_device: self.input.clone(),
            output_device: self.output.clone(),
        }
    }

    /// Resolves `host:port` to the first address it names.
    pub fn remote_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("No address found for {}", self.host))
    }
}
