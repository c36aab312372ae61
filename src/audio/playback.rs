//! Receive path driven by the output device clock.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::buffers::JitterBuffer;

/// Feeds the output device from a [`JitterBuffer`].
///
/// `render` always fills the whole block it is given, whatever state the
/// buffer is in.
pub struct PlaybackScheduler {
    buffer: Arc<JitterBuffer>,
    panics: AtomicU64,
}

impl PlaybackScheduler {
    pub fn new(buffer: Arc<JitterBuffer>) -> Self {
        Self {
            buffer,
            panics: AtomicU64::new(0),
        }
    }

    pub fn buffer(&self) -> &Arc<JitterBuffer> {
        &self.buffer
    }

    /// Callback panics caught so far.
    pub fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// Writes exactly `out.len()` samples; silence wherever nothing is queued.
    pub fn render(&self, out: &mut [i16]) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.buffer.pull_into(out)));
        if result.is_err() {
            out.fill(0);
            self.panics.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_splits_frames_across_blocks() {
        let buffer = Arc::new(JitterBuffer::new(4096));
        let playback = PlaybackScheduler::new(buffer.clone());

        buffer.push_samples((1..=960).map(|v| v as i16).collect());

        let mut block = vec![0i16; 256];
        let mut played = Vec::new();
        for _ in 0..4 {
            playback.render(&mut block);
            played.extend_from_slice(&block);
        }

        let expected: Vec<i16> = (1..=960).map(|v| v as i16).chain(std::iter::repeat_n(0, 64)).collect();
        assert_eq!(played, expected);
        assert_eq!(buffer.stats().underruns(), 1);
    }

    #[test]
    fn test_render_overwrites_stale_output() {
        let playback = PlaybackScheduler::new(Arc::new(JitterBuffer::new(960)));
        let mut block = vec![i16::MAX; 128];
        playback.render(&mut block);
        assert!(block.iter().all(|&s| s == 0));
        assert_eq!(playback.panics(), 0);
    }
}
