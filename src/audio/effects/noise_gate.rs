//! Noise gate.
//!
//! Unlike the other stages the gate is a decision, not a transform: it looks
//! at the RMS energy of a whole frame, after the effect chain, and decides
//! whether the frame goes out as-is or as silence.

/// Root-mean-square energy of a block of 16-bit samples.
///
/// Squares are accumulated in `i64`, which holds any realistic frame without
/// overflow. An empty block has zero energy.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: i64 = samples
        .iter()
        .map(|&s| {
            let v = s as i64;
            v * v
        })
        .sum();
    (sum_sq as f64 / samples.len() as f64).sqrt()
}

/// Mutes frames whose RMS falls strictly below a threshold.
///
/// A threshold of zero or below disables the gate.
#[derive(Debug, Clone, Copy)]
pub struct NoiseGate {
    threshold: f64,
}

impl NoiseGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn is_enabled(&self) -> bool {
        self.threshold > 0.0
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn should_mute(&self, samples: &[i16]) -> bool {
        self.is_enabled() && rms(samples) < self.threshold
    }

    /// Zeroes the block if it is gated. Returns whether it was.
    pub fn apply(&self, samples: &mut [i16]) -> bool {
        let muted = self.should_mute(samples);
        if muted {
            samples.fill(0);
        }
        muted
    }
}
