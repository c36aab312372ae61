//! One-pole IIR filters.

use std::f32::consts::PI;

use super::{AudioEffect, quantize};

fn time_constant(cutoff_hz: f32) -> f32 {
    1.0 / (2.0 * PI * cutoff_hz)
}

/// First-order high-pass: `y[n] = a * (y[n-1] + x[n] - x[n-1])`.
///
/// A cutoff of zero or below disables the filter; it then passes samples
/// through untouched.
#[derive(Debug, Clone)]
pub struct HighPass {
    alpha: Option<f32>,
    x1: f32,
    y1: f32,
}

impl HighPass {
    pub fn new(cutoff_hz: f32, sample_rate: u32) -> Self {
        let alpha = (cutoff_hz > 0.0).then(|| {
            let rc = time_constant(cutoff_hz);
            rc / (rc + 1.0 / sample_rate as f32)
        });
        Self {
            alpha,
            x1: 0.0,
            y1: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.alpha.is_some()
    }
}

impl AudioEffect for HighPass {
    fn process(&mut self, samples: &mut [i16]) {
        let Some(a) = self.alpha else {
            return;
        };
        let (mut x1, mut y1) = (self.x1, self.y1);
        for sample in samples.iter_mut() {
            let x = *sample as f32;
            let y = a * (y1 + x - x1);
            *sample = quantize(y);
            x1 = x;
            y1 = y;
        }
        self.x1 = x1;
        self.y1 = y1;
    }

    fn name(&self) -> &'static str {
        "highpass"
    }
}

/// First-order low-pass: `y[n] = y[n-1] + a * (x[n] - y[n-1])`.
///
/// A cutoff of zero or below disables the filter.
#[derive(Debug, Clone)]
pub struct LowPass {
    alpha: Option<f32>,
    y1: f32,
}

impl LowPass {
    pub fn new(cutoff_hz: f32, sample_rate: u32) -> Self {
        let alpha = (cutoff_hz > 0.0).then(|| {
            let rc = time_constant(cutoff_hz);
            1.0 / (1.0 + rc * sample_rate as f32)
        });
        Self { alpha, y1: 0.0 }
    }

    pub fn is_enabled(&self) -> bool {
        self.alpha.is_some()
    }
}

impl AudioEffect for LowPass {
    fn process(&mut self, samples: &mut [i16]) {
        let Some(a) = self.alpha else {
            return;
        };
        let mut y1 = self.y1;
        for sample in samples.iter_mut() {
            y1 += a * (*sample as f32 - y1);
            *sample = quantize(y1);
        }
        self.y1 = y1;
    }

    fn name(&self) -> &'static str {
        "lowpass"
    }
}
