//! Full-duplex relay orchestrator.
//!
//! Wires the capture and playback schedulers to an [`AudioDevice`] and a
//! [`VoiceSession`] and owns everything it started. Dropping the pipeline
//! stops it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use super::config::RelayConfig;
use crate::audio::buffers::JitterBuffer;
use crate::audio::capture::{CaptureScheduler, CaptureStats};
use crate::audio::frame::Frame;
use crate::audio::playback::PlaybackScheduler;
use crate::io::audio::{AudioDevice, AudioStream};
use crate::io::network::VoiceSession;
use crate::pipeline::Pushable;

const STOP_POLL: Duration = Duration::from_millis(100);
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub rx_frames: u64,
    pub rx_underruns: u64,
    pub rx_overrun_samples: u64,
    pub rx_queued_samples: usize,
    pub tx_frames: u64,
    pub tx_gated: u64,
    pub tx_dropped: u64,
    pub panics: u64,
}

impl fmt::Display for RelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rx frames={} underruns={} overrun_samples={} queued={} | \
             tx frames={} gated={} dropped={} | panics={}",
            self.rx_frames,
            self.rx_underruns,
            self.rx_overrun_samples,
            self.rx_queued_samples,
            self.tx_frames,
            self.tx_gated,
            self.tx_dropped,
            self.panics
        )
    }
}

#[derive(Clone)]
struct StatsSources {
    jitter: Option<Arc<JitterBuffer>>,
    playback: Option<Arc<PlaybackScheduler>>,
    capture: Option<Arc<CaptureStats>>,
    /// Panics the device caught outside the schedulers.
    device_panics: Option<Arc<AtomicU64>>,
}

impl StatsSources {
    fn snapshot(&self) -> RelayStats {
        let mut stats = RelayStats::default();
        if let Some(jitter) = &self.jitter {
            let s = jitter.stats();
            stats.rx_frames = s.frames_pushed();
            stats.rx_underruns = s.underruns();
            stats.rx_overrun_samples = s.overrun_samples();
            stats.rx_queued_samples = jitter.queued_samples();
        }
        if let Some(playback) = &self.playback {
            stats.panics += playback.panics();
        }
        if let Some(capture) = &self.capture {
            stats.tx_frames = capture.frames_processed();
            stats.tx_gated = capture.frames_gated();
            stats.tx_dropped = capture.frames_dropped();
            stats.panics += capture.panics();
        }
        if let Some(device_panics) = &self.device_panics {
            stats.panics += device_panics.load(Ordering::Relaxed);
        }
        stats
    }
}

pub struct DuplexPipeline {
    session: Arc<dyn VoiceSession>,
    streams: Vec<Box<dyn AudioStream>>,
    sources: StatsSources,
    shutdown_flag: Arc<AtomicBool>,
    reporter: Option<JoinHandle<()>>,
    running: bool,
}

impl DuplexPipeline {
    /// Opens every stream the configured mode needs and starts relaying.
    ///
    /// Fails if the session is not connected or any stream cannot be opened;
    /// in that case nothing is left running.
    pub fn start(
        config: &RelayConfig,
        device: &dyn AudioDevice,
        session: Arc<dyn VoiceSession>,
    ) -> Result<Self> {
        if !session.is_connected() {
            bail!("Voice session is not connected");
        }

        info!(
            "Starting relay: mode={} rate={} frame={} buffer={}ms",
            config.mode, config.sample_rate, config.frame_size, config.max_buffer_ms
        );

        let stream_config = config.stream_config();
        let mut streams: Vec<Box<dyn AudioStream>> = Vec::new();
        let mut sources = StatsSources {
            jitter: None,
            playback: None,
            capture: None,
            device_panics: device.panic_counter(),
        };

        // ============================================================
        // RX: VoiceSession -> JitterBuffer -> PlaybackScheduler -> output
        // ============================================================
        if config.mode.receives() {
            let jitter = Arc::new(JitterBuffer::with_budget_ms(
                config.format(),
                config.max_buffer_ms,
            ));
            let playback = Arc::new(PlaybackScheduler::new(jitter.clone()));

            let render = playback.clone();
            let stream = device
                .open_output(
                    &stream_config,
                    Box::new(move |out: &mut [i16]| render.render(out)),
                )
                .context("Failed to open output stream")?;
            streams.push(stream);

            info!(
                "RX: jitter budget {} samples ({:.0} ms)",
                jitter.max_samples(),
                config.format().ms_for_samples(jitter.max_samples())
            );
            sources.jitter = Some(jitter);
            sources.playback = Some(playback);
        }

        // ============================================================
        // TX: input -> CaptureScheduler (FxChain -> NoiseGate) -> VoiceSession
        // ============================================================
        if config.mode.transmits() {
            let chain = config.build_fx_chain();
            let gate = config.noise_gate();
            info!(
                "TX: effect={} stages={:?} gate={}",
                config.effect,
                chain.stage_names(),
                gate.threshold()
            );

            let mut capture =
                CaptureScheduler::new(chain, gate, session.clone(), config.frame_size);
            sources.capture = Some(capture.stats());

            let stream = device
                .open_input(
                    &stream_config,
                    Box::new(move |block: &[i16]| capture.on_block(block)),
                )
                .context("Failed to open input stream")?;
            streams.push(stream);
        }

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let reporter = {
            let sources = sources.clone();
            let shutdown_flag = shutdown_flag.clone();
            thread::Builder::new()
                .name("relay-stats".into())
                .spawn(move || run_reporter(sources, shutdown_flag))
                .context("Failed to spawn stats thread")?
        };

        // Registered last so a failed start never leaves frames flowing.
        if let Some(jitter) = &sources.jitter {
            let sink: Arc<dyn Pushable<Frame>> = jitter.clone();
            session.on_frame_received(sink);
        }

        info!("Relay running");

        Ok(Self {
            session,
            streams,
            sources,
            shutdown_flag,
            reporter: Some(reporter),
            running: true,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn jitter_buffer(&self) -> Option<&Arc<JitterBuffer>> {
        self.sources.jitter.as_ref()
    }

    pub fn capture_stats(&self) -> Option<&Arc<CaptureStats>> {
        self.sources.capture.as_ref()
    }

    pub fn stats(&self) -> RelayStats {
        self.sources.snapshot()
    }

    /// Stops relaying: detaches from the session, closes the streams, and
    /// joins the stats thread. Idempotent.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        if let Some(jitter) = &self.sources.jitter {
            self.session.clear_frame_sink();
            jitter.clear();
        }
        for stream in &self.streams {
            if let Err(e) = stream.pause() {
                debug!("{:#}", e);
            }
        }
        self.streams.clear();

        self.shutdown_flag.store(true, Ordering::Relaxed);
        if let Some(reporter) = self.reporter.take() {
            let _ = reporter.join();
        }

        info!("Relay stopped: {}", self.sources.snapshot());
    }
}

impl Drop for DuplexPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_reporter(sources: StatsSources, shutdown_flag: Arc<AtomicBool>) {
    let mut last = sources.snapshot();
    let mut last_report = Instant::now();

    while !shutdown_flag.load(Ordering::Relaxed) {
        thread::sleep(STOP_POLL);

        if last_report.elapsed() < REPORT_INTERVAL {
            continue;
        }
        last_report = Instant::now();

        let current = sources.snapshot();
        if current != last {
            debug!("{}", current);
            last = current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::effects::EffectPreset;
    use crate::io::testing::{ManualDevice, MemorySession};
    use crate::relay::config::Mode;

    fn config(mode: Mode) -> RelayConfig {
        RelayConfig {
            mode,
            frame_size: 4,
            sample_rate: 8000,
            ..RelayConfig::default()
        }
    }

    #[test]
    fn test_both_mode_relays_in_each_direction() {
        let device = ManualDevice::new();
        let session = Arc::new(MemorySession::connected());
        let mut pipeline = DuplexPipeline::start(&config(Mode::Both), &device, session.clone()).unwrap();

        assert_eq!(device.open_streams(), 2);
        assert!(session.has_sink());
        assert_eq!(device.last_config().unwrap().period_size, 4);

        assert!(session.deliver(Frame::new(vec![1, 2, 3, 4])));
        assert_eq!(device.tick_output(6).unwrap(), vec![1, 2, 3, 4, 0, 0]);

        assert!(device.tick_input(&[9, 9, 9, 9]));
        assert_eq!(session.sent(), vec![Frame::new(vec![9, 9, 9, 9])]);

        let stats = pipeline.stats();
        assert_eq!(stats.rx_frames, 1);
        assert_eq!(stats.rx_underruns, 1);
        assert_eq!(stats.tx_frames, 1);

        pipeline.stop();
        assert!(!pipeline.is_running());
        assert_eq!(device.open_streams(), 0);
        assert!(!session.has_sink());
    }

    #[test]
    fn test_rx_mode_opens_output_only() {
        let device = ManualDevice::new();
        let session = Arc::new(MemorySession::connected());
        let pipeline = DuplexPipeline::start(&config(Mode::Rx), &device, session.clone()).unwrap();

        assert_eq!(device.open_streams(), 1);
        assert!(session.has_sink());
        assert!(!device.tick_input(&[1, 2, 3, 4]));
        assert!(pipeline.capture_stats().is_none());
    }

    #[test]
    fn test_tx_mode_does_not_register_sink() {
        let device = ManualDevice::new();
        let session = Arc::new(MemorySession::connected());
        let pipeline = DuplexPipeline::start(&config(Mode::Tx), &device, session.clone()).unwrap();

        assert_eq!(device.open_streams(), 1);
        assert!(!session.has_sink());
        assert!(device.tick_output(4).is_none());
        assert!(pipeline.jitter_buffer().is_none());
    }

    #[test]
    fn test_disconnected_session_is_fatal() {
        let device = ManualDevice::new();
        let session = Arc::new(MemorySession::connected());
        session.set_connected(false);

        assert!(DuplexPipeline::start(&config(Mode::Both), &device, session.clone()).is_err());
        assert_eq!(device.open_streams(), 0);
    }

    #[test]
    fn test_failed_output_leaves_nothing_running() {
        let device = ManualDevice::new();
        device.fail_output(true);
        let session = Arc::new(MemorySession::connected());

        let err = DuplexPipeline::start(&config(Mode::Both), &device, session.clone())
            .err()
            .expect("start must fail");
        assert!(format!("{:#}", err).contains("output"));
        assert_eq!(device.open_streams(), 0);
        assert!(!session.has_sink());
        assert!(!device.tick_input(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_device_panics_are_reported() {
        let device = ManualDevice::new();
        let session = Arc::new(MemorySession::connected());
        let pipeline = DuplexPipeline::start(&config(Mode::Both), &device, session).unwrap();
        assert_eq!(pipeline.stats().panics, 0);

        device.count_callback_panic();
        device.count_callback_panic();
        assert_eq!(pipeline.stats().panics, 2);
    }

    #[test]
    fn test_failed_input_leaves_nothing_running() {
        let device = ManualDevice::new();
        device.fail_input(true);
        let session = Arc::new(MemorySession::connected());

        let err = DuplexPipeline::start(&config(Mode::Both), &device, session.clone())
            .err()
            .expect("start must fail");
        assert!(format!("{:#}", err).contains("input"));
        assert_eq!(device.open_streams(), 0);
        assert!(!session.has_sink());
    }

    #[test]
    fn test_session_loss_degrades_to_dropped_frames() {
        let device = ManualDevice::new();
        let session = Arc::new(MemorySession::connected());
        let pipeline = DuplexPipeline::start(&config(Mode::Tx), &device, session.clone()).unwrap();

        session.set_connected(false);
        device.tick_input(&[1; 8]);
        assert!(pipeline.is_running());
        assert_eq!(pipeline.stats().tx_dropped, 2);
        assert!(session.sent().is_empty());
    }

    #[test]
    fn test_effect_is_applied_on_tx() {
        let device = ManualDevice::new();
        let session = Arc::new(MemorySession::connected());
        let config = RelayConfig {
            effect: EffectPreset::Bitcrush,
            effect_params: crate::audio::effects::EffectParams {
                bitcrush_bits: 1,
                ..Default::default()
            },
            ..config(Mode::Tx)
        };
        let _pipeline = DuplexPipeline::start(&config, &device, session.clone()).unwrap();

        device.tick_input(&[-20000, 100, 20000, -1]);
        assert_eq!(session.sent()[0].samples(), &[-32768, 0, 0, 0]);
    }

    #[test]
    fn test_drop_stops_pipeline() {
        let device = ManualDevice::new();
        let session = Arc::new(MemorySession::connected());
        {
            let _pipeline =
                DuplexPipeline::start(&config(Mode::Both), &device, session.clone()).unwrap();
            assert_eq!(device.open_streams(), 2);
        }
        assert_eq!(device.open_streams(), 0);
        assert!(!session.has_sink());
    }
}
