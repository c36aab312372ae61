//! Configuration for the relay pipeline.

use std::fmt;

use anyhow::{Result, bail};
use tracing::warn;

use crate::audio::buffers::JitterBuffer;
use crate::audio::effects::{EffectParams, EffectPreset, FxChain, NoiseGate};
use crate::audio::frame::AudioFormat;
use crate::io::audio::StreamConfig;

const MAX_BUFFER_MS: u32 = 10_000;
const MAX_GATE: f64 = 32768.0;

/// Which directions the relay carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Mode {
    /// Play received audio only
    Rx,
    /// Send microphone audio only
    Tx,
    #[default]
    Both,
}

impl Mode {
    pub fn receives(self) -> bool {
        matches!(self, Mode::Rx | Mode::Both)
    }

    pub fn transmits(self) -> bool {
        matches!(self, Mode::Tx | Mode::Both)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Rx => f.write_str("rx"),
            Mode::Tx => f.write_str("tx"),
            Mode::Both => f.write_str("both"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelayConfig {
    pub mode: Mode,
    pub sample_rate: u32,
    pub frame_size: usize,
    /// Receive jitter budget.
    pub max_buffer_ms: u32,
    /// Transmit noise gate RMS; 0 disables.
    pub gate_threshold: f64,
    /// Transmit hum-removal cutoff; 0 disables.
    pub highpass_hz: f32,
    pub effect: EffectPreset,
    pub effect_params: EffectParams,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Both,
            sample_rate: 44100,
            frame_size: 960,
            max_buffer_ms: 200,
            gate_threshold: 0.0,
            highpass_hz: 0.0,
            effect: EffectPreset::None,
            effect_params: EffectParams::default(),
            input_device: None,
            output_device: None,
        }
    }
}

impl RelayConfig {
    /// Checks the configuration once before anything starts.
    ///
    /// Values the pipeline cannot run with are rejected. Everything else is
    /// clamped into range with a warning.
    pub fn validate(mut self) -> Result<Self> {
        if self.sample_rate == 0 {
            bail!("Sample rate must be positive");
        }
        if self.frame_size == 0 {
            bail!("Frame size must be positive");
        }
        if !self.gate_threshold.is_finite() {
            bail!("Gate threshold must be a finite number");
        }
        if !self.highpass_hz.is_finite() {
            bail!("High-pass cutoff must be a finite number");
        }

        if self.max_buffer_ms > MAX_BUFFER_MS {
            warn!(
                "max_buffer_ms = {} is out of range, using {}",
                self.max_buffer_ms, MAX_BUFFER_MS
            );
            self.max_buffer_ms = MAX_BUFFER_MS;
        }

        let gate = self.gate_threshold.clamp(0.0, MAX_GATE);
        if gate != self.gate_threshold {
            warn!(
                "gate = {} is out of range, using {}",
                self.gate_threshold, gate
            );
            self.gate_threshold = gate;
        }

        let nyquist = self.sample_rate as f32 / 2.0;
        let highpass = self.highpass_hz.clamp(0.0, nyquist);
        if highpass != self.highpass_hz {
            warn!(
                "highpass = {} is out of range, using {}",
                self.highpass_hz, highpass
            );
            self.highpass_hz = highpass;
        }

        self.effect_params = self.effect_params.clamped(self.sample_rate);
        Ok(self)
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.frame_size)
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::mono(self.sample_rate, self.frame_size)
    }

    pub fn jitter_budget_samples(&self) -> usize {
        JitterBuffer::budget_samples(self.format(), self.max_buffer_ms)
    }

    /// A fresh transmit chain. Each call starts with clean stage state.
    pub fn build_fx_chain(&self) -> FxChain {
        FxChain::from_preset(
            self.effect,
            &self.effect_params,
            self.highpass_hz,
            self.sample_rate,
        )
    }

    pub fn noise_gate(&self) -> NoiseGate {
        NoiseGate::new(self.gate_threshold)
    }
}
