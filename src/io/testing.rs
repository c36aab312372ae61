//! In-memory collaborators for unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};

use super::audio::{AudioDevice, AudioStream, InputCallback, OutputCallback, StreamConfig};
use super::network::VoiceSession;
use crate::audio::frame::Frame;
use crate::pipeline::Pushable;

type Slot<T> = Arc<Mutex<Option<T>>>;

struct ManualStream<T> {
    slot: Slot<T>,
    live: Arc<AtomicUsize>,
}

impl<T> AudioStream for ManualStream<T> {
    fn pause(&self) -> Result<()> {
        Ok(())
    }
}

impl<T> Drop for ManualStream<T> {
    fn drop(&mut self) {
        self.slot.lock().unwrap().take();
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An audio device whose clock is advanced by the test.
#[derive(Default)]
pub struct ManualDevice {
    input: Slot<InputCallback>,
    output: Slot<OutputCallback>,
    live: Arc<AtomicUsize>,
    fail_input: AtomicBool,
    fail_output: AtomicBool,
    last_config: Mutex<Option<StreamConfig>>,
    panics: Arc<AtomicU64>,
}

impl ManualDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_input(&self, fail: bool) {
        self.fail_input.store(fail, Ordering::SeqCst);
    }

    pub fn fail_output(&self, fail: bool) {
        self.fail_output.store(fail, Ordering::SeqCst);
    }

    /// Records a panic as if the backend had caught one in a callback.
    pub fn count_callback_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Streams opened and not yet dropped.
    pub fn open_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<StreamConfig> {
        *self.last_config.lock().unwrap()
    }

    /// Delivers one captured block. Returns false if no input is open.
    pub fn tick_input(&self, block: &[i16]) -> bool {
        match self.input.lock().unwrap().as_mut() {
            Some(callback) => {
                callback(block);
                true
            }
            None => false,
        }
    }

    /// Requests one output block of `len` samples, or `None` if no output is
    /// open.
    pub fn tick_output(&self, len: usize) -> Option<Vec<i16>> {
        let mut guard = self.output.lock().unwrap();
        let callback = guard.as_mut()?;
        let mut block = vec![i16::MIN; len];
        callback(&mut block);
        Some(block)
    }
}

impl AudioDevice for ManualDevice {
    fn open_input(
        &self,
        config: &StreamConfig,
        callback: InputCallback,
    ) -> Result<Box<dyn AudioStream>> {
        if self.fail_input.load(Ordering::SeqCst) {
            bail!("input device unavailable");
        }
        *self.last_config.lock().unwrap() = Some(*config);
        *self.input.lock().unwrap() = Some(callback);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ManualStream {
            slot: self.input.clone(),
            live: self.live.clone(),
        }))
    }

    fn open_output(
        &self,
        config: &StreamConfig,
        callback: OutputCallback,
    ) -> Result<Box<dyn AudioStream>> {
        if self.fail_output.load(Ordering::SeqCst) {
            bail!("output device unavailable");
        }
        *self.last_config.lock().unwrap() = Some(*config);
        *self.output.lock().unwrap() = Some(callback);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ManualStream {
            slot: self.output.clone(),
            live: self.live.clone(),
        }))
    }

    fn panic_counter(&self) -> Option<Arc<AtomicU64>> {
        Some(self.panics.clone())
    }
}

/// A voice session that records what is sent and lets the test inject
/// received frames.
pub struct MemorySession {
    connected: AtomicBool,
    panic_on_send: AtomicBool,
    sent: Mutex<Vec<Frame>>,
    sink: Mutex<Option<Arc<dyn Pushable<Frame>>>>,
}

impl MemorySession {
    pub fn connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
            panic_on_send: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn panic_on_send(&self, panic: bool) {
        self.panic_on_send.store(panic, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().unwrap().clone()
    }

    pub fn has_sink(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    /// Hands `frame` to the registered sink. Returns false if there is none.
    pub fn deliver(&self, frame: Frame) -> bool {
        let sink = self.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => {
                sink.push(frame);
                true
            }
            None => false,
        }
    }
}

impl VoiceSession for MemorySession {
    fn send_frame(&self, frame: Frame) {
        if self.panic_on_send.load(Ordering::SeqCst) {
            panic!("send_frame failed");
        }
        self.sent.lock().unwrap().push(frame);
    }

    fn on_frame_received(&self, sink: Arc<dyn Pushable<Frame>>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    fn clear_frame_sink(&self) {
        *self.sink.lock().unwrap() = None;
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
