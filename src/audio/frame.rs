/// A block of mono 16-bit PCM samples handed between pipeline stages.
///
/// Frames are owned: a producer builds one and moves it to the consumer, so
/// no two threads ever see the same sample storage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    samples: Vec<i16>,
}

impl Frame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// A frame of `len` zero samples.
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![0; len],
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_inner(self) -> Vec<i16> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Sample rate and nominal frame length shared by every stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub frame_size: usize,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, frame_size: usize) -> Self {
        Self {
            sample_rate,
            frame_size,
        }
    }

    /// Duration of `samples` samples in milliseconds.
    pub fn ms_for_samples(&self, samples: usize) -> f64 {
        samples as f64 * 1000.0 / self.sample_rate.max(1) as f64
    }
}
