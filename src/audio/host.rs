//! Hardware capture through cpal
//!
//! A `cpal::Stream` cannot leave the thread that built it on every platform,
//! so each opened device gets a dedicated capture thread that owns the stream
//! and serves start/stop/shutdown commands over a channel.
//!
//! Devices are opened in their own format (closest to mono S16 at 44.1 kHz
//! that they support) and converted to the capture format in the callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    HostId, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfig,
    SupportedStreamConfigRange,
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::audio::backend::{
    AudioBackend, AudioContext, CaptureDevice, DeviceInfo, FrameCallback, LogSink, StreamFormat,
};
use crate::audio::convert::FrameConverter;
use crate::error::AudioError;

/// Backend over the platform's cpal host
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    host_id: Option<HostId>,
}

impl CpalBackend {
    /// Use the platform default host
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific cpal host (e.g. JACK instead of ALSA)
    pub fn with_host(host_id: HostId) -> Self {
        Self {
            host_id: Some(host_id),
        }
    }

    /// Select a host by its cpal name, case-insensitive ("ALSA", "Jack", "WASAPI")
    pub fn from_host_name(name: &str) -> Result<Self, AudioError> {
        cpal::available_hosts()
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(name))
            .map(Self::with_host)
            .ok_or_else(|| AudioError::DeviceInit(format!("audio host not available: {}", name)))
    }

    pub fn host_id(&self) -> Option<HostId> {
        self.host_id
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn create_context(&self, log_sink: LogSink) -> Result<Box<dyn AudioContext>, AudioError> {
        let host = match self.host_id {
            Some(id) => cpal::host_from_id(id).map_err(|e| AudioError::DeviceInit(e.to_string()))?,
            None => cpal::default_host(),
        };

        log_sink(&format!("Initialized audio host {}", host.id().name()));

        Ok(Box::new(CpalContext {
            host_id: host.id(),
            log_sink,
            released: false,
        }))
    }
}

struct CpalContext {
    host_id: HostId,
    log_sink: LogSink,
    released: bool,
}

impl CpalContext {
    fn host(&self) -> Result<cpal::Host, AudioError> {
        cpal::host_from_id(self.host_id).map_err(|e| AudioError::DeviceInit(e.to_string()))
    }

    /// Find the input device whose ID matches `info`
    fn find_device(&self, info: &DeviceInfo) -> Result<cpal::Device, AudioError> {
        let host = self.host()?;
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::DeviceOpen(e.to_string()))?;

        for (index, device) in devices.enumerate() {
            if device_id(index, &device) == info.id {
                return Ok(device);
            }
        }

        Err(AudioError::DeviceOpen(format!("device not found: {}", info.id)))
    }
}

impl AudioContext for CpalContext {
    fn enumerate_capture_devices(&self) -> Result<Vec<DeviceInfo>, AudioError> {
        let host = self.host()?;

        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let devices = host
            .input_devices()
            .map_err(|e| AudioError::DeviceEnumeration(e.to_string()))?;

        let mut infos = Vec::new();
        for (index, device) in devices.enumerate() {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Input {}", index));
            let is_default = default_name.as_ref() == Some(&name);

            infos.push(DeviceInfo {
                id: device_id(index, &device),
                name,
                is_default,
            });
        }

        Ok(infos)
    }

    fn open_device(
        &self,
        info: &DeviceInfo,
        format: StreamFormat,
        on_frames: FrameCallback,
    ) -> Result<Box<dyn CaptureDevice>, AudioError> {
        if self.released {
            return Err(AudioError::DeviceOpen("context already released".into()));
        }

        let device = self.find_device(info)?;
        let (command_tx, command_rx) = unbounded::<StreamCommand>();
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let log_sink = self.log_sink.clone();

        let thread = thread::Builder::new()
            .name("audioin-capture".into())
            .spawn(move || run_stream(device, format, on_frames, log_sink, command_rx, ready_tx))
            .map_err(|e| AudioError::DeviceOpen(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::DeviceOpen("capture thread exited".into())));
        if let Err(e) = ready {
            let _ = thread.join();
            return Err(e);
        }

        (self.log_sink)(&format!("Capture stream built on {}", info.name));

        Ok(Box::new(CpalDevice {
            commands: command_tx,
            thread: Some(thread),
        }))
    }

    fn release(&mut self) -> Result<(), AudioError> {
        if !self.released {
            self.released = true;
            (self.log_sink)("Audio host released");
        }
        Ok(())
    }
}

/// Stable identifier for an input device: its name, or its position if
/// the backend cannot name it
fn device_id(index: usize, device: &cpal::Device) -> String {
    match device.name() {
        Ok(name) => format!("input:{}", name),
        Err(_) => format!("input#{}", index),
    }
}

enum StreamCommand {
    Start(Sender<Result<(), AudioError>>),
    Stop(Sender<Result<(), AudioError>>),
    Shutdown,
}

/// Shape of one supported input config range
#[derive(Debug, Clone, Copy, PartialEq)]
struct ConfigCandidate {
    channels: u16,
    min_rate: u32,
    max_rate: u32,
    format: SampleFormat,
}

impl From<&SupportedStreamConfigRange> for ConfigCandidate {
    fn from(range: &SupportedStreamConfigRange) -> Self {
        Self {
            channels: range.channels(),
            min_rate: range.min_sample_rate().0,
            max_rate: range.max_sample_rate().0,
            format: range.sample_format(),
        }
    }
}

/// Lower is better; `None` for formats the converter cannot read
fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        SampleFormat::I32 => Some(2),
        _ => None,
    }
}

/// Pick the range that runs at the target rate with the least conversion:
/// matching channel count first, then I16 over F32 over I32
fn choose_config(candidates: &[ConfigCandidate], target: StreamFormat) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.min_rate <= target.sample_rate && target.sample_rate <= c.max_rate)
        .filter_map(|(index, c)| {
            let rank = format_rank(c.format)?;
            Some((index, (c.channels != target.channels, rank, c.channels)))
        })
        .min_by_key(|(_, key)| *key)
        .map(|(index, _)| index)
}

/// Resolve the config the stream is built with. Falls back to the device
/// default (and resampling) when no range covers the target rate.
fn negotiate_config(
    device: &cpal::Device,
    target: StreamFormat,
) -> Result<SupportedStreamConfig, AudioError> {
    let ranges: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()
        .map(|iter| iter.collect())
        .unwrap_or_else(|e| {
            tracing::debug!("Supported input configs unavailable: {}", e);
            Vec::new()
        });
    let candidates: Vec<ConfigCandidate> = ranges.iter().map(ConfigCandidate::from).collect();

    if let Some(index) = choose_config(&candidates, target) {
        return Ok(ranges[index]
            .clone()
            .with_sample_rate(SampleRate(target.sample_rate)));
    }

    device
        .default_input_config()
        .map_err(|e| AudioError::DeviceOpen(e.to_string()))
}

/// Body of the capture thread. Builds the stream, reports readiness, then
/// serves commands until shut down; the stream is dropped on exit.
fn run_stream(
    device: cpal::Device,
    format: StreamFormat,
    on_frames: FrameCallback,
    log_sink: LogSink,
    commands: Receiver<StreamCommand>,
    ready: Sender<Result<(), AudioError>>,
) {
    let supported = match negotiate_config(&device, format) {
        Ok(supported) => supported,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    log_sink(&format!(
        "Device format: {} ch, {} Hz, {:?}",
        config.channels, config.sample_rate.0, sample_format
    ));

    let mut converter = FrameConverter::new(config.channels, config.sample_rate.0, format);
    let error_sink = log_sink.clone();
    let on_error = move |err: cpal::StreamError| {
        error_sink(&format!("Capture stream error: {}", err));
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let (bytes, frames) = converter.push_f32(data);
                on_frames(bytes, frames);
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let (bytes, frames) = converter.push_i16(data);
                on_frames(bytes, frames);
            },
            on_error,
            None,
        ),
        SampleFormat::I32 => device.build_input_stream(
            &config,
            move |data: &[i32], _: &cpal::InputCallbackInfo| {
                let (bytes, frames) = converter.push_i32(data);
                on_frames(bytes, frames);
            },
            on_error,
            None,
        ),
        other => {
            let _ = ready.send(Err(AudioError::DeviceOpen(format!(
                "unsupported sample format: {:?}",
                other
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(AudioError::DeviceOpen(e.to_string())));
            return;
        }
    };

    // Some hosts start streams as soon as they are built
    if let Err(e) = stream.pause() {
        tracing::debug!("Initial pause not supported: {}", e);
    }

    if ready.send(Ok(())).is_err() {
        return;
    }

    for command in commands.iter() {
        match command {
            StreamCommand::Start(reply) => {
                let _ = reply.send(stream.play().map_err(|e| AudioError::DeviceStart(e.to_string())));
            }
            StreamCommand::Stop(reply) => {
                let _ = reply.send(stream.pause().map_err(|e| AudioError::DeviceStop(e.to_string())));
            }
            StreamCommand::Shutdown => break,
        }
    }

    drop(stream);
    log_sink("Capture stream closed");
}

struct CpalDevice {
    commands: Sender<StreamCommand>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureDevice for CpalDevice {
    fn start(&mut self) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(StreamCommand::Start(reply_tx))
            .map_err(|_| AudioError::DeviceStart("capture thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| AudioError::DeviceStart("capture thread is gone".into()))?
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(StreamCommand::Stop(reply_tx))
            .map_err(|_| AudioError::DeviceStop("capture thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| AudioError::DeviceStop("capture thread is gone".into()))?
    }

    fn release(&mut self) -> Result<(), AudioError> {
        if let Some(thread) = self.thread.take() {
            let _ = self.commands.send(StreamCommand::Shutdown);
            thread
                .join()
                .map_err(|_| AudioError::DeviceTeardown("capture thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_context_creation() {
        // Hosts without audio hardware still provide a default cpal host
        let backend = CpalBackend::new();
        let context = backend.create_context(Arc::new(|_: &str| {}));
        assert!(context.is_ok());
    }

    #[test]
    fn test_host_by_name() {
        let default_id = cpal::default_host().id();
        let backend = CpalBackend::from_host_name(&default_id.name().to_uppercase()).unwrap();
        assert_eq!(backend.host_id(), Some(default_id));
        assert!(backend.create_context(Arc::new(|_: &str| {})).is_ok());

        assert!(matches!(
            CpalBackend::from_host_name("no-such-host"),
            Err(AudioError::DeviceInit(_))
        ));
    }

    fn candidate(
        channels: u16,
        min_rate: u32,
        max_rate: u32,
        format: SampleFormat,
    ) -> ConfigCandidate {
        ConfigCandidate {
            channels,
            min_rate,
            max_rate,
            format,
        }
    }

    #[test]
    fn test_choose_config_prefers_native_format() {
        let candidates = [
            candidate(2, 8000, 96000, SampleFormat::F32),
            candidate(1, 8000, 96000, SampleFormat::F32),
            candidate(1, 8000, 96000, SampleFormat::I16),
            candidate(2, 8000, 96000, SampleFormat::I16),
        ];
        assert_eq!(choose_config(&candidates, StreamFormat::capture()), Some(2));
    }

    #[test]
    fn test_choose_config_accepts_stereo_float() {
        // Typical desktop endpoint: stereo f32 only
        let candidates = [
            candidate(2, 44100, 48000, SampleFormat::F32),
            candidate(4, 44100, 48000, SampleFormat::F32),
        ];
        assert_eq!(choose_config(&candidates, StreamFormat::capture()), Some(0));
    }

    #[test]
    fn test_choose_config_skips_unusable_ranges() {
        let candidates = [
            candidate(1, 48000, 48000, SampleFormat::I16),
            candidate(1, 8000, 96000, SampleFormat::U8),
        ];
        assert_eq!(choose_config(&candidates, StreamFormat::capture()), None);
        assert_eq!(choose_config(&[], StreamFormat::capture()), None);
    }
}
