//! Transmit path driven by the input device clock.
//!
//! Each hardware block is accumulated into whole frames. A complete frame is
//! run through the effect chain, then the noise gate, then queued on the
//! voice session. Nothing here blocks or logs.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::effects::{FxChain, NoiseGate};
use crate::audio::frame::Frame;
use crate::io::network::VoiceSession;

/// Counters for the capture callback, readable from any thread.
#[derive(Debug, Default)]
pub struct CaptureStats {
    frames_processed: AtomicU64,
    frames_gated: AtomicU64,
    frames_dropped: AtomicU64,
    panics: AtomicU64,
}

impl CaptureStats {
    /// Frames handed to the session, gated ones included.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_gated(&self) -> u64 {
        self.frames_gated.load(Ordering::Relaxed)
    }

    /// Frames discarded because the session was not connected.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }
}

pub struct CaptureScheduler {
    chain: FxChain,
    gate: NoiseGate,
    session: Arc<dyn VoiceSession>,
    frame_size: usize,
    pending: Vec<i16>,
    stats: Arc<CaptureStats>,
}

impl CaptureScheduler {
    pub fn new(
        chain: FxChain,
        gate: NoiseGate,
        session: Arc<dyn VoiceSession>,
        frame_size: usize,
    ) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            chain,
            gate,
            session,
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
            stats: Arc::new(CaptureStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples waiting for the rest of their frame.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Consumes one block of mono microphone samples.
    ///
    /// A panic while processing is contained here: the partial frame is
    /// discarded and the panic is counted.
    pub fn on_block(&mut self, mono: &[i16]) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.process_block(mono)));
        if result.is_err() {
            self.pending.clear();
            self.stats.panics.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn process_block(&mut self, mono: &[i16]) {
        if mono.is_empty() {
            return;
        }
        self.pending.extend_from_slice(mono);

        while self.pending.len() >= self.frame_size {
            if !self.session.is_connected() {
                self.pending.drain(..self.frame_size);
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            // The session takes the frame by value: one allocation of exactly
            // `frame_size` samples per sent frame, nothing else.
            let mut frame: Vec<i16> = self.pending.drain(..self.frame_size).collect();

            self.chain.process(&mut frame);
            if self.gate.apply(&mut frame) {
                self.stats.frames_gated.fetch_add(1, Ordering::Relaxed);
            }

            self.session.send_frame(Frame::new(frame));
            self.stats.frames_processed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
