//! Receive-side jitter buffer.
//!
//! Network frames arrive whenever the session delivers them; the output device
//! asks for a fixed number of samples on its own clock. The buffer sits between
//! the two as a queue of sample runs with a hard cap on queued audio.
//!
//! Key rules:
//! - `push` never blocks and never fails; it only trims the queue back to
//!   twice the cap, so storage stays bounded when nothing is pulling
//! - every pull first drops whole runs from the front (oldest first) until the
//!   queued total fits the cap, so latency cannot grow without bound
//! - a pull always produces exactly the requested number of samples; whatever
//!   the queue cannot supply is silence
//! - a run that is only partly consumed stays at the head and the next pull
//!   resumes from the same position

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::audio::frame::{AudioFormat, Frame};
use crate::pipeline::Pushable;

/// Storage ceiling on the push side, as a multiple of the cap.
const PUSH_HEADROOM: usize = 2;

/// Counters describing buffer behaviour, readable from any thread.
#[derive(Debug, Default)]
pub struct JitterStats {
    frames_pushed: AtomicU64,
    samples_pushed: AtomicU64,
    underruns: AtomicU64,
    overrun_runs: AtomicU64,
    overrun_samples: AtomicU64,
}

impl JitterStats {
    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed.load(Ordering::Relaxed)
    }

    pub fn samples_pushed(&self) -> u64 {
        self.samples_pushed.load(Ordering::Relaxed)
    }

    /// Pulls that had to pad with silence.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Runs discarded to honour the cap.
    pub fn overrun_runs(&self) -> u64 {
        self.overrun_runs.load(Ordering::Relaxed)
    }

    pub fn overrun_samples(&self) -> u64 {
        self.overrun_samples.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct State {
    runs: VecDeque<Vec<i16>>,
    /// Samples of `runs[0]` already handed out.
    head_offset: usize,
    /// Unconsumed samples across all runs.
    queued: usize,
}

impl State {
    /// Drops runs from the front until the queued total is within `max`.
    /// Returns the number of runs and samples discarded.
    fn enforce_cap(&mut self, max: usize) -> (u64, u64) {
        let mut runs = 0u64;
        let mut samples = 0u64;
        while self.queued > max {
            let Some(run) = self.runs.pop_front() else {
                self.queued = 0;
                break;
            };
            let remaining = run.len() - self.head_offset;
            self.queued -= remaining;
            self.head_offset = 0;
            runs += 1;
            samples += remaining as u64;
        }
        (runs, samples)
    }

    /// Copies queued samples into `out`, returning how many were written.
    fn drain_into(&mut self, out: &mut [i16]) -> usize {
        let mut pos = 0;
        while pos < out.len() {
            let Some(run) = self.runs.front() else {
                break;
            };
            let available = &run[self.head_offset..];
            let take = available.len().min(out.len() - pos);
            out[pos..pos + take].copy_from_slice(&available[..take]);
            pos += take;
            self.queued -= take;

            if take == available.len() {
                self.runs.pop_front();
                self.head_offset = 0;
            } else {
                self.head_offset += take;
            }
        }
        pos
    }
}

/// Bounded FIFO of received PCM with drop-oldest overflow.
///
/// One producer (the network receive thread) and one consumer (the output
/// callback) share it. The lock is held only while queue metadata and sample
/// copies are touched, never across I/O.
#[derive(Debug)]
pub struct JitterBuffer {
    state: Mutex<State>,
    max_samples: usize,
    stats: JitterStats,
}

impl JitterBuffer {
    /// Creates a buffer holding at most `max_samples` queued samples after
    /// each pull.
    pub fn new(max_samples: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_samples,
            stats: JitterStats::default(),
        }
    }

    /// Creates a buffer whose cap is `max_buffer_ms` rounded down to whole
    /// frames of `format`, and never less than one frame.
    pub fn with_budget_ms(format: AudioFormat, max_buffer_ms: u32) -> Self {
        Self::new(Self::budget_samples(format, max_buffer_ms))
    }

    /// Sample cap for a millisecond budget.
    ///
    /// Counts the whole frames that fit in the budget using the exact frame
    /// duration, so the cap never plays longer than `max_buffer_ms` unless a
    /// single frame already does.
    pub fn budget_samples(format: AudioFormat, max_buffer_ms: u32) -> usize {
        let budget = max_buffer_ms as u64 * format.sample_rate as u64;
        let frame = 1000 * format.frame_size.max(1) as u64;
        let frames = (budget / frame).max(1);
        frames as usize * format.frame_size
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn queued_samples(&self) -> usize {
        self.lock().queued
    }

    pub fn stats(&self) -> &JitterStats {
        &self.stats
    }

    /// Most samples the queue ever holds between pulls.
    pub fn storage_limit(&self) -> usize {
        self.max_samples.saturating_mul(PUSH_HEADROOM)
    }

    /// Enqueues newly received samples. Empty frames are ignored.
    ///
    /// If the queue grows past [`storage_limit`](Self::storage_limit) the
    /// oldest runs are dropped right away.
    pub fn push_samples(&self, samples: Vec<i16>) {
        if samples.is_empty() {
            return;
        }
        let len = samples.len();
        let (dropped_runs, dropped_samples) = {
            let mut state = self.lock();
            state.queued += len;
            state.runs.push_back(samples);
            state.enforce_cap(self.storage_limit())
        };
        self.stats.frames_pushed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .samples_pushed
            .fetch_add(len as u64, Ordering::Relaxed);
        self.record_overrun(dropped_runs, dropped_samples);
    }

    fn record_overrun(&self, runs: u64, samples: u64) {
        if runs > 0 {
            self.stats.overrun_runs.fetch_add(runs, Ordering::Relaxed);
            self.stats
                .overrun_samples
                .fetch_add(samples, Ordering::Relaxed);
        }
    }

    /// Fills `out` completely: queued audio first, silence for the rest.
    ///
    /// Does not allocate, so it is safe to call from an output callback.
    pub fn pull_into(&self, out: &mut [i16]) {
        let (dropped_runs, dropped_samples, written) = {
            let mut state = self.lock();
            let (runs, samples) = state.enforce_cap(self.max_samples);
            let written = state.drain_into(out);
            (runs, samples, written)
        };

        self.record_overrun(dropped_runs, dropped_samples);
        if written < out.len() {
            out[written..].fill(0);
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns exactly `len` samples.
    pub fn pull_frame(&self, len: usize) -> Frame {
        let mut samples = vec![0; len];
        self.pull_into(&mut samples);
        Frame::new(samples)
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.runs.clear();
        state.head_offset = 0;
        state.queued = 0;
    }
}

impl Pushable<Frame> for JitterBuffer {
    fn push(&self, input: Frame) {
        self.push_samples(input.into_inner());
    }
}
