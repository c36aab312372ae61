//! Ordered effect chain and the named voice presets built on it.

use std::fmt;

use tracing::warn;

use super::{AudioEffect, Bitcrusher, Echo, HighPass, LowPass, RingModulator, SignalStage};

const RADIO_LOW_CUT_HZ: f32 = 300.0;
const RADIO_HIGH_CUT_HZ: f32 = 3400.0;
const VADER_CARRIER_HZ: f32 = 70.0;
const VADER_HIGH_CUT_HZ: f32 = 1500.0;

const MAX_ECHO_MS: f32 = 2000.0;
const MAX_ECHO_FEEDBACK: f32 = 0.95;

/// Voice effect selected for the transmit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EffectPreset {
    #[default]
    None,
    /// Telephone band: high-pass 300 Hz then low-pass 3.4 kHz
    Radio,
    /// Ring modulator at the configured carrier frequency
    Robot,
    /// Feedback delay
    Echo,
    /// Bit-depth reduction
    Bitcrush,
    /// Ring modulator at 70 Hz then low-pass 1.5 kHz
    Vader,
}

impl fmt::Display for EffectPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectPreset::None => "none",
            EffectPreset::Radio => "radio",
            EffectPreset::Robot => "robot",
            EffectPreset::Echo => "echo",
            EffectPreset::Bitcrush => "bitcrush",
            EffectPreset::Vader => "vader",
        };
        f.write_str(name)
    }
}

/// Numeric parameters for the presets that take them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParams {
    pub robot_hz: f32,
    pub echo_ms: f32,
    pub echo_feedback: f32,
    pub echo_mix: f32,
    pub bitcrush_bits: u32,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            robot_hz: 90.0,
            echo_ms: 140.0,
            echo_feedback: 0.25,
            echo_mix: 0.25,
            bitcrush_bits: 6,
        }
    }
}

fn clamp_logged<T: PartialOrd + Copy + fmt::Display>(name: &str, value: T, min: T, max: T) -> T {
    let clamped = if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    };
    if clamped != value {
        warn!("{} = {} is out of range, using {}", name, value, clamped);
    }
    clamped
}

impl EffectParams {
    /// Returns a copy with every parameter forced into its valid range.
    ///
    /// Carrier frequencies are limited to Nyquist for `sample_rate`.
    pub fn clamped(self, sample_rate: u32) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        Self {
            robot_hz: clamp_logged("robot_hz", self.robot_hz, 0.0, nyquist),
            echo_ms: clamp_logged("echo_ms", self.echo_ms, 1.0, MAX_ECHO_MS),
            echo_feedback: clamp_logged(
                "echo_feedback",
                self.echo_feedback,
                0.0,
                MAX_ECHO_FEEDBACK,
            ),
            echo_mix: clamp_logged("echo_mix", self.echo_mix, 0.0, 1.0),
            bitcrush_bits: clamp_logged("bitcrush_bits", self.bitcrush_bits, 1, 15),
        }
    }
}

/// An ordered list of stages applied left to right.
///
/// Later stages see the output of earlier ones. The stage list is fixed once
/// built; an empty chain leaves samples untouched.
#[derive(Debug, Clone, Default)]
pub struct FxChain {
    stages: Vec<SignalStage>,
}

impl FxChain {
    pub fn new(stages: Vec<SignalStage>) -> Self {
        Self { stages }
    }

    /// Builds the transmit chain: an optional hum-removal high-pass, then the
    /// stages of `preset`.
    pub fn from_preset(
        preset: EffectPreset,
        params: &EffectParams,
        highpass_hz: f32,
        sample_rate: u32,
    ) -> Self {
        let mut stages: Vec<SignalStage> = Vec::new();

        if highpass_hz > 0.0 {
            stages.push(HighPass::new(highpass_hz, sample_rate).into());
        }

        match preset {
            EffectPreset::None => {}
            EffectPreset::Radio => {
                stages.push(HighPass::new(RADIO_LOW_CUT_HZ, sample_rate).into());
                stages.push(LowPass::new(RADIO_HIGH_CUT_HZ, sample_rate).into());
            }
            EffectPreset::Robot => {
                stages.push(RingModulator::new(params.robot_hz, sample_rate).into());
            }
            EffectPreset::Echo => {
                stages.push(
                    Echo::new(
                        params.echo_ms,
                        sample_rate,
                        params.echo_feedback,
                        params.echo_mix,
                    )
                    .into(),
                );
            }
            EffectPreset::Bitcrush => {
                stages.push(Bitcrusher::new(params.bitcrush_bits).into());
            }
            EffectPreset::Vader => {
                stages.push(RingModulator::new(VADER_CARRIER_HZ, sample_rate).into());
                stages.push(LowPass::new(VADER_HIGH_CUT_HZ, sample_rate).into());
            }
        }

        Self { stages }
    }

    pub fn process(&mut self, samples: &mut [i16]) {
        for stage in &mut self.stages {
            stage.process(samples);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}
