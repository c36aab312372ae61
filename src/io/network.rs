//! Voice transport.
//!
//! The relay core only sees the [`VoiceSession`] trait. [`UdpVoiceSession`]
//! is the shipped implementation: raw little-endian PCM, one frame per
//! datagram, exchanged with a single remote peer.
//!
//! # Threads
//!
//! - sender: drains a bounded queue filled by [`VoiceSession::send_frame`]
//! - receiver: decodes datagrams and pushes them to the registered sink
//!
//! Both poll a shutdown flag every [`POLL_INTERVAL`] and are joined on drop.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::audio::frame::Frame;
use crate::pipeline::Pushable;

/// Frames that may wait for the sender thread before new ones are dropped.
pub const SEND_QUEUE_FRAMES: usize = 64;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM: usize = 65507;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A connected voice channel carrying raw PCM frames.
pub trait VoiceSession: Send + Sync {
    /// Queues a frame for transmission. Never blocks; may drop the frame
    /// under backpressure.
    fn send_frame(&self, frame: Frame);

    /// Registers the sink that receives every incoming frame, replacing any
    /// previous one. The sink is called from a network thread.
    fn on_frame_received(&self, sink: Arc<dyn Pushable<Frame>>);

    /// Removes the registered sink, if any.
    fn clear_frame_sink(&self);

    fn is_connected(&self) -> bool;
}

/// Serializes samples as little-endian 16-bit PCM.
pub fn encode_pcm(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Parses little-endian 16-bit PCM. Returns `None` for an odd byte count.
pub fn decode_pcm(bytes: &[u8]) -> Option<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
    )
}

/// Traffic counters for a [`UdpVoiceSession`].
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    send_errors: AtomicU64,
    frames_received: AtomicU64,
    malformed: AtomicU64,
}

impl SessionStats {
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Frames discarded because the send queue was full.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Datagrams that were not whole 16-bit samples.
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

type SinkSlot = Arc<Mutex<Option<Arc<dyn Pushable<Frame>>>>>;

/// UDP voice session with one remote peer.
pub struct UdpVoiceSession {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    queue: Sender<Frame>,
    sink: SinkSlot,
    connected: Arc<AtomicBool>,
    shutdown_flag: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl UdpVoiceSession {
    /// Binds `bind_addr` (with address reuse) and connects to `remote_addr`.
    pub fn open(bind_addr: SocketAddr, remote_addr: SocketAddr) -> Result<Self> {
        let domain = Domain::for_address(bind_addr);
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .context("Failed to create socket")?;

        socket
            .set_reuse_address(true)
            .context("Failed to set reuse address")?;

        socket
            .bind(&bind_addr.into())
            .context(format!("Failed to bind {bind_addr}"))?;

        Self::from_socket(socket.into(), remote_addr)
    }

    /// Takes over an already bound socket and connects it to `remote_addr`.
    pub fn from_socket(socket: UdpSocket, remote_addr: SocketAddr) -> Result<Self> {
        socket
            .connect(remote_addr)
            .context(format!("Failed to connect to {remote_addr}"))?;
        socket
            .set_read_timeout(Some(POLL_INTERVAL))
            .context("Failed to set read timeout")?;

        let local_addr = socket.local_addr().context("Failed to read local address")?;
        let socket = Arc::new(socket);

        let (queue, outgoing) = channel::bounded(SEND_QUEUE_FRAMES);
        let sink: SinkSlot = Arc::new(Mutex::new(None));
        let connected = Arc::new(AtomicBool::new(true));
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(SessionStats::default());

        let sender = {
            let socket = socket.clone();
            let shutdown_flag = shutdown_flag.clone();
            let stats = stats.clone();
            thread::Builder::new()
                .name("voice-send".into())
                .spawn(move || run_sender(socket, outgoing, shutdown_flag, stats))
                .context("Failed to spawn sender thread")?
        };

        let receiver = {
            let sink = sink.clone();
            let shutdown_flag = shutdown_flag.clone();
            let stats = stats.clone();
            let spawned = thread::Builder::new()
                .name("voice-recv".into())
                .spawn({
                    let shutdown_flag = shutdown_flag.clone();
                    move || run_receiver(socket, sink, shutdown_flag, stats)
                });
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    shutdown_flag.store(true, Ordering::Relaxed);
                    let _ = sender.join();
                    return Err(e).context("Failed to spawn receiver thread");
                }
            }
        };

        info!("Voice session {} <-> {}", local_addr, remote_addr);

        Ok(Self {
            local_addr,
            remote_addr,
            queue,
            sink,
            connected,
            shutdown_flag,
            stats,
            threads: Mutex::new(vec![sender, receiver]),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    /// Stops both threads and waits for them. Idempotent.
    pub fn shutdown(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.shutdown_flag.store(true, Ordering::Relaxed);

        let handles: Vec<_> = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            let _ = handle.join();
        }
        info!(
            "Voice session with {} closed: sent={} dropped={} received={} malformed={}",
            self.remote_addr(),
            self.stats.frames_sent(),
            self.stats.frames_dropped(),
            self.stats.frames_received(),
            self.stats.malformed()
        );
    }
}

impl VoiceSession for UdpVoiceSession {
    fn send_frame(&self, frame: Frame) {
        if !self.is_connected() {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.queue.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn on_frame_received(&self, sink: Arc<dyn Pushable<Frame>>) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn clear_frame_sink(&self) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for UdpVoiceSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_sender(
    socket: Arc<UdpSocket>,
    outgoing: Receiver<Frame>,
    shutdown_flag: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
) {
    debug!("Voice sender thread started");
    let mut failing = false;

    while !shutdown_flag.load(Ordering::Relaxed) {
        let frame = match outgoing.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let bytes = encode_pcm(frame.samples());
        if bytes.len() > MAX_DATAGRAM {
            warn!("Frame of {} bytes exceeds datagram limit", bytes.len());
            stats.send_errors.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        match socket.send(&bytes) {
            Ok(_) => {
                stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                if failing {
                    info!("Voice send recovered");
                    failing = false;
                }
            }
            Err(e) => {
                stats.send_errors.fetch_add(1, Ordering::Relaxed);
                if failing {
                    debug!("Voice send failed: {}", e);
                } else {
                    warn!("Voice send failed: {}", e);
                    failing = true;
                }
            }
        }
    }

    debug!("Voice sender thread stopped");
}

fn run_receiver(
    socket: Arc<UdpSocket>,
    sink: SinkSlot,
    shutdown_flag: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
) {
    debug!("Voice receiver thread started");
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while !shutdown_flag.load(Ordering::Relaxed) {
        let size = match socket.recv(&mut buf) {
            Ok(size) => size,
            Err(e) => {
                match e.kind() {
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {}
                    // Peer not listening yet; ICMP errors surface on connected sockets.
                    ErrorKind::ConnectionRefused => {}
                    _ => warn!("Failed to receive UDP packet: {:?}", e),
                }
                continue;
            }
        };

        let Some(samples) = decode_pcm(&buf[..size]) else {
            stats.malformed.fetch_add(1, Ordering::Relaxed);
            continue;
        };
        if samples.is_empty() {
            continue;
        }
        stats.frames_received.fetch_add(1, Ordering::Relaxed);

        let target = sink.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(target) = target {
            target.push(Frame::new(samples));
        }
    }

    debug!("Voice receiver thread stopped");
}
