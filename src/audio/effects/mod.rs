//! Transmit-side signal stages.
//!
//! Every stage is a streaming transform over a block of mono 16-bit samples.
//! Stages keep whatever history they need (filter memory, oscillator phase,
//! delay line) between calls, so one instance must only ever see a single
//! continuous signal.
//!
//! - [`filter`] - One-pole high-pass and low-pass filters
//! - [`ring_mod`] - Ring modulator
//! - [`echo`] - Feedback delay
//! - [`bitcrusher`] - Bit-depth reduction
//! - [`noise_gate`] - RMS gate applied after the chain
//! - [`chain`] - Ordered stage list and named presets

pub mod bitcrusher;
pub mod chain;
pub mod echo;
pub mod filter;
pub mod noise_gate;
pub mod ring_mod;

pub use bitcrusher::Bitcrusher;
pub use chain::{EffectParams, EffectPreset, FxChain};
pub use echo::Echo;
pub use filter::{HighPass, LowPass};
pub use noise_gate::{NoiseGate, rms};
pub use ring_mod::RingModulator;

/// Pure audio processing effect.
///
/// Transforms a block in place; the block length never changes. Implementations
/// must not allocate, block, or log: they run inside the capture callback.
pub trait AudioEffect: Send {
    fn process(&mut self, samples: &mut [i16]);

    fn name(&self) -> &'static str;
}

/// Converts a float-domain sample back to 16-bit, clamping first so loud
/// signals saturate instead of wrapping.
#[inline]
pub(crate) fn quantize(value: f32) -> i16 {
    value.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// One element of an [`FxChain`].
#[derive(Debug, Clone)]
pub enum SignalStage {
    HighPass(HighPass),
    LowPass(LowPass),
    RingModulator(RingModulator),
    Echo(Echo),
    Bitcrusher(Bitcrusher),
}

impl AudioEffect for SignalStage {
    fn process(&mut self, samples: &mut [i16]) {
        match self {
            SignalStage::HighPass(stage) => stage.process(samples),
            SignalStage::LowPass(stage) => stage.process(samples),
            SignalStage::RingModulator(stage) => stage.process(samples),
            SignalStage::Echo(stage) => stage.process(samples),
            SignalStage::Bitcrusher(stage) => stage.process(samples),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SignalStage::HighPass(stage) => stage.name(),
            SignalStage::LowPass(stage) => stage.name(),
            SignalStage::RingModulator(stage) => stage.name(),
            SignalStage::Echo(stage) => stage.name(),
            SignalStage::Bitcrusher(stage) => stage.name(),
        }
    }
}

impl From<HighPass> for SignalStage {
    fn from(stage: HighPass) -> Self {
        SignalStage::HighPass(stage)
    }
}

impl From<LowPass> for SignalStage {
    fn from(stage: LowPass) -> Self {
        SignalStage::LowPass(stage)
    }
}

impl From<RingModulator> for SignalStage {
    fn from(stage: RingModulator) -> Self {
        SignalStage::RingModulator(stage)
    }
}

impl From<Echo> for SignalStage {
    fn from(stage: Echo) -> Self {
        SignalStage::Echo(stage)
    }
}

impl From<Bitcrusher> for SignalStage {
    fn from(stage: Bitcrusher) -> Self {
        SignalStage::Bitcrusher(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_saturates() {
        assert_eq!(quantize(40000.0), i16::MAX);
        assert_eq!(quantize(-40000.0), i16::MIN);
        assert_eq!(quantize(123.9), 123);
        assert_eq!(quantize(-123.9), -123);
    }

    #[test]
    fn test_stage_dispatch_uses_inner_name() {
        let stage: SignalStage = Bitcrusher::new(6).into();
        assert_eq!(stage.name(), "bitcrush");
    }
}
