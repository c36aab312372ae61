//! Audio device I/O.
//!
//! The relay drives hardware through the [`AudioDevice`] trait: open a mono
//! 16-bit input or output stream at a fixed rate and period, and get a
//! callback per period. [`CpalDevice`] implements it with cpal and converts
//! whatever sample format and channel layout the device actually runs in.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, SupportedBufferSize};
use tracing::{debug, error, info, warn};

use crate::audio::AudioSample;

/// Called once per input period with mono samples.
pub type InputCallback = Box<dyn FnMut(&[i16]) + Send + 'static>;

/// Called once per output period; must fill the whole slice.
pub type OutputCallback = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

/// What the relay asks of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per callback the relay would like to see.
    pub period_size: usize,
}

impl StreamConfig {
    pub fn mono(sample_rate: u32, period_size: usize) -> Self {
        Self {
            sample_rate,
            channels: 1,
            period_size,
        }
    }
}

/// A running stream. Dropping it closes the stream.
pub trait AudioStream {
    fn pause(&self) -> Result<()>;
}

impl AudioStream for cpal::Stream {
    fn pause(&self) -> Result<()> {
        StreamTrait::pause(self).context("Failed to pause stream")
    }
}

/// Source of input and output streams.
pub trait AudioDevice {
    fn open_input(
        &self,
        config: &StreamConfig,
        callback: InputCallback,
    ) -> Result<Box<dyn AudioStream>>;

    fn open_output(
        &self,
        config: &StreamConfig,
        callback: OutputCallback,
    ) -> Result<Box<dyn AudioStream>>;

    /// Counter of panics caught at this device's callback boundary, if it
    /// keeps one.
    fn panic_counter(&self) -> Option<Arc<AtomicU64>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// One entry of [`list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub direction: Direction,
    pub is_default: bool,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_default { '*' } else { ' ' };
        write!(f, "{} {:>2} [{}] {}", marker, self.index, self.direction, self.name)?;
        if let (Some(channels), Some(rate)) = (self.channels, self.sample_rate) {
            write!(f, " ({} ch, {} Hz)", channels, rate)?;
        }
        Ok(())
    }
}

/// Enumerates input and output devices of the default host.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let mut infos = Vec::new();

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let inputs = host
        .input_devices()
        .context("Failed to enumerate input devices")?;
    for (index, device) in inputs.enumerate() {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let config = device.default_input_config().ok();
        infos.push(DeviceInfo {
            index,
            is_default: default_input.as_deref() == Some(name.as_str()),
            name,
            direction: Direction::Input,
            channels: config.as_ref().map(|c| c.channels()),
            sample_rate: config.as_ref().map(|c| c.sample_rate().0),
        });
    }

    let default_output = host.default_output_device().and_then(|d| d.name().ok());
    let outputs = host
        .output_devices()
        .context("Failed to enumerate output devices")?;
    for (index, device) in outputs.enumerate() {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let config = device.default_output_config().ok();
        infos.push(DeviceInfo {
            index,
            is_default: default_output.as_deref() == Some(name.as_str()),
            name,
            direction: Direction::Output,
            channels: config.as_ref().map(|c| c.channels()),
            sample_rate: config.as_ref().map(|c| c.sample_rate().0),
        });
    }

    Ok(infos)
}

/// Finds a device by index (when `pattern` is a number) or by name substring.
fn find_device<I: Iterator<Item = Device>>(devices: I, pattern: &str) -> Option<Device> {
    let devices: Vec<Device> = devices.collect();
    if let Ok(index) = pattern.parse::<usize>() {
        if let Some(device) = devices.get(index) {
            return Some(device.clone());
        }
    }
    devices
        .into_iter()
        .find(|d| d.name().map(|n| n.contains(pattern)).unwrap_or(false))
}

fn get_input_device(pattern: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    match pattern {
        Some(pattern) => {
            let devices = host
                .input_devices()
                .context("Failed to enumerate input devices")?;
            find_device(devices, pattern)
                .with_context(|| format!("Input device '{pattern}' not found"))
        }
        None => host
            .default_input_device()
            .context("No default input device available"),
    }
}

fn get_output_device(pattern: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    match pattern {
        Some(pattern) => {
            let devices = host
                .output_devices()
                .context("Failed to enumerate output devices")?;
            find_device(devices, pattern)
                .with_context(|| format!("Output device '{pattern}' not found"))
        }
        None => host
            .default_output_device()
            .context("No default output device available"),
    }
}

/// A device configuration we know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    channels: u16,
    min_rate: u32,
    max_rate: u32,
    format: SampleFormat,
    buffer: Option<(u32, u32)>,
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Picks the best candidate for `want`: the rate must be supported, then the
/// requested channel count wins, then the cheapest sample conversion.
fn choose_candidate(candidates: &[Candidate], want: &StreamConfig) -> Option<Candidate> {
    candidates
        .iter()
        .filter(|c| c.channels > 0)
        .filter(|c| (c.min_rate..=c.max_rate).contains(&want.sample_rate))
        .filter_map(|c| format_rank(c.format).map(|rank| (c, rank)))
        .min_by_key(|(c, rank)| (c.channels != want.channels, *rank, c.channels))
        .map(|(c, _)| *c)
}

fn buffer_size_for(candidate: &Candidate, period_size: usize) -> BufferSize {
    let period = period_size as u32;
    match candidate.buffer {
        Some((min, max)) if (min..=max).contains(&period) => BufferSize::Fixed(period),
        Some((min, max)) => {
            debug!(
                "Period {} outside device range {}..={}, using default",
                period, min, max
            );
            BufferSize::Default
        }
        None => BufferSize::Default,
    }
}

fn candidate_from_range(range: &cpal::SupportedStreamConfigRange) -> Candidate {
    Candidate {
        channels: range.channels(),
        min_rate: range.min_sample_rate().0,
        max_rate: range.max_sample_rate().0,
        format: range.sample_format(),
        buffer: match range.buffer_size() {
            SupportedBufferSize::Range { min, max } => Some((*min, *max)),
            SupportedBufferSize::Unknown => None,
        },
    }
}

fn resolve_config(
    ranges: Vec<cpal::SupportedStreamConfigRange>,
    want: &StreamConfig,
    direction: Direction,
) -> Result<(cpal::StreamConfig, SampleFormat)> {
    let candidates: Vec<Candidate> = ranges.iter().map(candidate_from_range).collect();
    let Some(chosen) = choose_candidate(&candidates, want) else {
        bail!(
            "No {} configuration supports {} Hz in i16, u16 or f32",
            direction,
            want.sample_rate
        );
    };

    let config = cpal::StreamConfig {
        channels: chosen.channels,
        sample_rate: SampleRate(want.sample_rate),
        buffer_size: buffer_size_for(&chosen, want.period_size),
    };
    Ok((config, chosen.format))
}

fn stream_error_handler(direction: Direction) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| match err {
        cpal::StreamError::DeviceNotAvailable => {
            error!("The {} device is no longer available", direction)
        }
        other => warn!("An error occurred on the {} audio stream: {}", direction, other),
    }
}

/// [`AudioDevice`] backed by the default cpal host.
///
/// Devices are chosen by index or name substring; `None` means the system
/// default.
pub struct CpalDevice {
    input: Option<String>,
    output: Option<String>,
    panics: Arc<AtomicU64>,
}

impl CpalDevice {
    pub fn new(input: Option<String>, output: Option<String>) -> Self {
        Self {
            input,
            output,
            panics: Arc::new(AtomicU64::new(0)),
        }
    }

    fn build_input<T: AudioSample>(
        &self,
        device: &Device,
        config: &cpal::StreamConfig,
        period_size: usize,
        mut callback: InputCallback,
    ) -> Result<cpal::Stream> {
        let channels = config.channels.max(1) as usize;
        let panics = self.panics.clone();
        let mut mono: Vec<i16> = Vec::with_capacity(period_size * 2);

        let stream = device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.iter().step_by(channels).map(|&s| s.to_pcm()));
                let result = panic::catch_unwind(AssertUnwindSafe(|| callback(&mono)));
                if result.is_err() {
                    panics.fetch_add(1, Ordering::Relaxed);
                }
            },
            stream_error_handler(Direction::Input),
            None,
        )?;
        Ok(stream)
    }

    fn build_output<T: AudioSample>(
        &self,
        device: &Device,
        config: &cpal::StreamConfig,
        period_size: usize,
        mut callback: OutputCallback,
    ) -> Result<cpal::Stream> {
        let channels = config.channels.max(1) as usize;
        let panics = self.panics.clone();
        let mut mono: Vec<i16> = vec![0; period_size];

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                if mono.len() < frames {
                    mono.resize(frames, 0);
                }
                let block = &mut mono[..frames];
                let result = panic::catch_unwind(AssertUnwindSafe(|| callback(&mut *block)));
                if result.is_err() {
                    block.fill(0);
                    panics.fetch_add(1, Ordering::Relaxed);
                }
                for (out, &sample) in data.chunks_exact_mut(channels).zip(block.iter()) {
                    let value = T::from_pcm(sample);
                    for slot in out {
                        *slot = value;
                    }
                }
                // Trailing partial frame, if the backend ever hands one over.
                for slot in data[frames * channels..].iter_mut() {
                    *slot = T::silence();
                }
            },
            stream_error_handler(Direction::Output),
            None,
        )?;
        Ok(stream)
    }
}

impl AudioDevice for CpalDevice {
    fn open_input(
        &self,
        config: &StreamConfig,
        callback: InputCallback,
    ) -> Result<Box<dyn AudioStream>> {
        let device = get_input_device(self.input.as_deref())?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let ranges: Vec<_> = device
            .supported_input_configs()
            .context("Failed to query input configs")?
            .collect();
        let (stream_config, format) = resolve_config(ranges, config, Direction::Input)?;
        debug!("Input config: {stream_config:?} {format:?}");

        let stream = match format {
            SampleFormat::I16 => {
                self.build_input::<i16>(&device, &stream_config, config.period_size, callback)
            }
            SampleFormat::U16 => {
                self.build_input::<u16>(&device, &stream_config, config.period_size, callback)
            }
            SampleFormat::F32 => {
                self.build_input::<f32>(&device, &stream_config, config.period_size, callback)
            }
            format => bail!("Unsupported sample format: {:?}", format),
        }
        .context("Failed to build input stream")?;

        stream.play().context("Failed to start input stream")?;
        info!(
            "Input: {} @ {} Hz, {} ch, {:?} {:?}",
            name,
            config.sample_rate,
            stream_config.channels,
            format,
            stream_config.buffer_size
        );
        Ok(Box::new(stream))
    }

    fn open_output(
        &self,
        config: &StreamConfig,
        callback: OutputCallback,
    ) -> Result<Box<dyn AudioStream>> {
        let device = get_output_device(self.output.as_deref())?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let ranges: Vec<_> = device
            .supported_output_configs()
            .context("Failed to query output configs")?
            .collect();
        let (stream_config, format) = resolve_config(ranges, config, Direction::Output)?;
        debug!("Output config: {stream_config:?} {format:?}");

        let stream = match format {
            SampleFormat::I16 => {
                self.build_output::<i16>(&device, &stream_config, config.period_size, callback)
            }
            SampleFormat::U16 => {
                self.build_output::<u16>(&device, &stream_config, config.period_size, callback)
            }
            SampleFormat::F32 => {
                self.build_output::<f32>(&device, &stream_config, config.period_size, callback)
            }
            format => bail!("Unsupported sample format: {:?}", format),
        }
        .context("Failed to build output stream")?;

        stream.play().context("Failed to start output stream")?;
        info!(
            "Output: {} @ {} Hz, {} ch, {:?} {:?}",
            name,
            config.sample_rate,
            stream_config.channels,
            format,
            stream_config.buffer_size
        );
        Ok(Box::new(stream))
    }

    fn panic_counter(&self) -> Option<Arc<AtomicU64>> {
        Some(self.panics.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(channels: u16, format: SampleFormat) -> Candidate {
        Candidate {
            channels,
            min_rate: 8000,
            max_rate: 48000,
            format,
            buffer: Some((64, 4096)),
        }
    }

    #[test]
    fn test_prefers_mono_then_i16() {
        let want = StreamConfig::mono(44100, 960);
        let candidates = [
            candidate(2, SampleFormat::I16),
            candidate(1, SampleFormat::F32),
            candidate(1, SampleFormat::I16),
        ];
        let chosen = choose_candidate(&candidates, &want).unwrap();
        assert_eq!(chosen.channels, 1);
        assert_eq!(chosen.format, SampleFormat::I16);
    }

    #[test]
    fn test_falls_back_to_stereo_float() {
        let want = StreamConfig::mono(48000, 960);
        let candidates = [
            candidate(2, SampleFormat::F32),
            candidate(1, SampleFormat::I32),
        ];
        let chosen = choose_candidate(&candidates, &want).unwrap();
        assert_eq!(chosen.channels, 2);
        assert_eq!(chosen.format, SampleFormat::F32);
    }

    #[test]
    fn test_rejects_unsupported_rate() {
        let want = StreamConfig::mono(96000, 960);
        assert!(choose_candidate(&[candidate(1, SampleFormat::I16)], &want).is_none());
    }

    #[test]
    fn test_fixed_period_only_when_in_range() {
        let c = candidate(1, SampleFormat::I16);
        assert_eq!(buffer_size_for(&c, 960), BufferSize::Fixed(960));
        assert_eq!(buffer_size_for(&c, 8192), BufferSize::Default);

        let unknown = Candidate { buffer: None, ..c };
        assert_eq!(buffer_size_for(&unknown, 960), BufferSize::Default);
    }

    #[test]
    fn test_cpal_device_exposes_panic_counter() {
        let device = CpalDevice::new(None, None);
        let counter = device.panic_counter().unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 0);

        device.panics.fetch_add(1, Ordering::Relaxed);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo {
            index: 3,
            name: "USB Audio".into(),
            direction: Direction::Input,
            is_default: true,
            channels: Some(1),
            sample_rate: Some(48000),
        };
        assert_eq!(info.to_string(), "*  3 [input] USB Audio (1 ch, 48000 Hz)");
    }
}
