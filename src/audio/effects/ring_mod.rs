use std::f64::consts::TAU;

use super::{AudioEffect, quantize};

/// Multiplies the signal by a free-running sine carrier.
///
/// The carrier phase is kept between calls (wrapped into `[0, 2π)`), so frame
/// boundaries never introduce a phase jump.
#[derive(Debug, Clone)]
pub struct RingModulator {
    phase: f64,
    increment: f64,
}

impl RingModulator {
    pub fn new(freq_hz: f32, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            increment: TAU * freq_hz as f64 / sample_rate.max(1) as f64,
        }
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }
}

impl AudioEffect for RingModulator {
    fn process(&mut self, samples: &mut [i16]) {
        for sample in samples.iter_mut() {
            let carrier = self.phase.sin() as f32;
            *sample = quantize(*sample as f32 * carrier);
            self.phase = (self.phase + self.increment).rem_euclid(TAU);
        }
    }

    fn name(&self) -> &'static str {
        "ringmod"
    }
}
