use super::{AudioEffect, quantize};

/// Feedback delay line.
///
/// For each sample the delayed value `d` at the cursor is read, the output is
/// `x + mix * d`, and `x + feedback * d` is written back in the same slot.
#[derive(Debug, Clone)]
pub struct Echo {
    line: Vec<f32>,
    cursor: usize,
    feedback: f32,
    mix: f32,
}

impl Echo {
    pub fn new(delay_ms: f32, sample_rate: u32, feedback: f32, mix: f32) -> Self {
        let len = (sample_rate as f64 * delay_ms.max(0.0) as f64 / 1000.0).round() as usize;
        Self {
            line: vec![0.0; len.max(1)],
            cursor: 0,
            feedback,
            mix,
        }
    }

    /// Delay in samples.
    pub fn delay_len(&self) -> usize {
        self.line.len()
    }
}

impl AudioEffect for Echo {
    fn process(&mut self, samples: &mut [i16]) {
        let len = self.line.len();
        for sample in samples.iter_mut() {
            let x = *sample as f32;
            let delayed = self.line[self.cursor];
            *sample = quantize(x + self.mix * delayed);
            self.line[self.cursor] = x + self.feedback * delayed;
            self.cursor = (self.cursor + 1) % len;
        }
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}
