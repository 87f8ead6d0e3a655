//! In-process capture backend
//!
//! Each opened device runs a delivery thread that emits fixed-size blocks of
//! a test tone at a fixed period while started. Failures can be injected at
//! every lifecycle step, and the shared `SimulatedStats` record what the
//! sensor did to the backend.

use crossbeam_channel::{bounded, unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::backend::{
    AudioBackend, AudioContext, CaptureDevice, DeviceInfo, FrameCallback, LogSink, StreamFormat,
};
use crate::constants::{SIMULATED_BLOCK_FRAMES, SIMULATED_PERIOD_MS};
use crate::error::AudioError;

/// Behaviour of the simulated backend
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Number of capture endpoints reported by enumeration
    pub device_count: usize,
    /// Frames per delivered block
    pub block_frames: u32,
    /// Time between deliveries while started
    pub period: Duration,
    /// Frequency of the generated tone in Hz
    pub tone_hz: f32,
    pub fail_init: bool,
    pub fail_open: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub fail_device_release: bool,
    pub fail_context_release: bool,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            block_frames: SIMULATED_BLOCK_FRAMES,
            period: Duration::from_millis(SIMULATED_PERIOD_MS),
            tone_hz: 440.0,
            fail_init: false,
            fail_open: false,
            fail_start: false,
            fail_stop: false,
            fail_device_release: false,
            fail_context_release: false,
        }
    }
}

/// Counters describing how the backend was driven
#[derive(Debug, Default)]
pub struct SimulatedStats {
    contexts: AtomicUsize,
    enumerations: AtomicUsize,
    opens: AtomicUsize,
    blocks_delivered: AtomicUsize,
    releases: Mutex<Vec<&'static str>>,
}

impl SimulatedStats {
    /// Contexts created
    pub fn contexts(&self) -> usize {
        self.contexts.load(Ordering::SeqCst)
    }

    /// Enumeration calls made
    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    /// Devices opened
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Blocks handed to frame callbacks
    pub fn blocks_delivered(&self) -> usize {
        self.blocks_delivered.load(Ordering::SeqCst)
    }

    /// Resources released, in release order ("device" or "context")
    pub fn releases(&self) -> Vec<&'static str> {
        self.releases.lock().clone()
    }

    fn record_release(&self, what: &'static str) {
        self.releases.lock().push(what);
    }
}

/// Backend producing synthetic capture devices
pub struct SimulatedBackend {
    config: SimulatedConfig,
    stats: Arc<SimulatedStats>,
}

impl SimulatedBackend {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            stats: Arc::new(SimulatedStats::default()),
        }
    }

    /// Shared counters for this backend and everything it creates
    pub fn stats(&self) -> Arc<SimulatedStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

impl AudioBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn create_context(&self, log_sink: LogSink) -> Result<Box<dyn AudioContext>, AudioError> {
        if self.config.fail_init {
            return Err(AudioError::DeviceInit("simulated init failure".into()));
        }

        self.stats.contexts.fetch_add(1, Ordering::SeqCst);
        log_sink("Simulated audio context initialized");

        Ok(Box::new(SimulatedContext {
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            log_sink,
            released: false,
        }))
    }
}

struct SimulatedContext {
    config: SimulatedConfig,
    stats: Arc<SimulatedStats>,
    log_sink: LogSink,
    released: bool,
}

impl AudioContext for SimulatedContext {
    fn enumerate_capture_devices(&self) -> Result<Vec<DeviceInfo>, AudioError> {
        self.stats.enumerations.fetch_add(1, Ordering::SeqCst);

        Ok((0..self.config.device_count)
            .map(|index| DeviceInfo {
                id: format!("sim:{}", index),
                name: format!("Simulated Microphone {}", index),
                is_default: index == 0,
            })
            .collect())
    }

    fn open_device(
        &self,
        device: &DeviceInfo,
        format: StreamFormat,
        on_frames: FrameCallback,
    ) -> Result<Box<dyn CaptureDevice>, AudioError> {
        if self.released {
            return Err(AudioError::DeviceOpen("context already released".into()));
        }
        if self.config.fail_open {
            return Err(AudioError::DeviceOpen(format!(
                "simulated open failure on {}",
                device.id
            )));
        }

        let (command_tx, command_rx) = unbounded::<Command>();
        let period = self.config.period;
        let block = ToneBlock::new(self.config.tone_hz, self.config.block_frames, format);
        let stats = Arc::clone(&self.stats);

        let thread = thread::Builder::new()
            .name(format!("simulated-capture-{}", device.id))
            .spawn(move || {
                let mut block = block;
                let mut active = false;

                loop {
                    match command_rx.recv_timeout(period) {
                        Ok(Command::Start(ack)) => {
                            active = true;
                            let _ = ack.send(());
                        }
                        Ok(Command::Stop(ack)) => {
                            // Deliveries happen on this thread, so none is in flight here.
                            active = false;
                            let _ = ack.send(());
                        }
                        Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            if active {
                                let (bytes, frames) = block.next();
                                on_frames(bytes, frames);
                                stats.blocks_delivered.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    }
                }
            })
            .map_err(|e| AudioError::DeviceOpen(e.to_string()))?;

        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        (self.log_sink)(&format!("Opened {}", device.name));

        Ok(Box::new(SimulatedDevice {
            commands: command_tx,
            thread: Some(thread),
            fail_start: self.config.fail_start,
            fail_stop: self.config.fail_stop,
            fail_release: self.config.fail_device_release,
            stats: Arc::clone(&self.stats),
        }))
    }

    fn release(&mut self) -> Result<(), AudioError> {
        if !self.released {
            self.released = true;
            if self.config.fail_context_release {
                return Err(AudioError::DeviceTeardown(
                    "simulated context release failure".into(),
                ));
            }
            self.stats.record_release("context");
            (self.log_sink)("Simulated audio context released");
        }
        Ok(())
    }
}

enum Command {
    Start(Sender<()>),
    Stop(Sender<()>),
    Shutdown,
}

struct SimulatedDevice {
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
    fail_start: bool,
    fail_stop: bool,
    fail_release: bool,
    stats: Arc<SimulatedStats>,
}

impl SimulatedDevice {
    /// Send a command and wait for the delivery thread to acknowledge it
    fn round_trip(&self, make: fn(Sender<()>) -> Command) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        self.commands.send(make(ack_tx)).is_ok() && ack_rx.recv().is_ok()
    }
}

impl CaptureDevice for SimulatedDevice {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.fail_start {
            return Err(AudioError::DeviceStart("simulated start failure".into()));
        }
        if !self.round_trip(Command::Start) {
            return Err(AudioError::DeviceStart("delivery thread is gone".into()));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        if self.fail_stop {
            return Err(AudioError::DeviceStop("simulated stop failure".into()));
        }
        if !self.round_trip(Command::Stop) {
            return Err(AudioError::DeviceStop("delivery thread is gone".into()));
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), AudioError> {
        if let Some(thread) = self.thread.take() {
            let _ = self.commands.send(Command::Shutdown);
            thread
                .join()
                .map_err(|_| AudioError::DeviceTeardown("delivery thread panicked".into()))?;
            // The thread is gone either way; only the report differs
            if self.fail_release {
                return Err(AudioError::DeviceTeardown(
                    "simulated device release failure".into(),
                ));
            }
            self.stats.record_release("device");
        }
        Ok(())
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Sine tone generator producing little-endian PCM blocks
struct ToneBlock {
    bytes: Vec<u8>,
    frames: u32,
    channels: u16,
    phase: f32,
    step: f32,
}

impl ToneBlock {
    fn new(tone_hz: f32, frames: u32, format: StreamFormat) -> Self {
        Self {
            bytes: Vec::with_capacity(frames as usize * format.bytes_per_frame() as usize),
            frames,
            channels: format.channels,
            phase: 0.0,
            step: std::f32::consts::TAU * tone_hz / format.sample_rate as f32,
        }
    }

    fn next(&mut self) -> (&[u8], u32) {
        self.bytes.clear();
        for _ in 0..self.frames {
            let sample = (self.phase.sin() * i16::MAX as f32 * 0.25) as i16;
            for _ in 0..self.channels {
                self.bytes.extend_from_slice(&sample.to_le_bytes());
            }
            self.phase = (self.phase + self.step) % std::f32::consts::TAU;
        }
        (&self.bytes, self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn log_sink() -> LogSink {
        Arc::new(|_: &str| {})
    }

    #[test]
    fn test_enumeration() {
        let backend = SimulatedBackend::new(SimulatedConfig {
            device_count: 3,
            ..SimulatedConfig::default()
        });
        let context = backend.create_context(log_sink()).unwrap();
        let devices = context.enumerate_capture_devices().unwrap();

        assert_eq!(devices.len(), 3);
        assert!(devices[0].is_default);
        assert!(!devices[1].is_default);
        assert_eq!(backend.stats().enumerations(), 1);
    }

    #[test]
    fn test_delivers_only_while_started() {
        let backend = SimulatedBackend::new(SimulatedConfig {
            period: Duration::from_millis(2),
            ..SimulatedConfig::default()
        });
        let stats = backend.stats();
        let context = backend.create_context(log_sink()).unwrap();
        let info = context.enumerate_capture_devices().unwrap().remove(0);

        let frames = Arc::new(AtomicU32::new(0));
        let callback: FrameCallback = {
            let frames = frames.clone();
            Arc::new(move |bytes: &[u8], count: u32| {
                assert_eq!(bytes.len(), count as usize * 2);
                frames.fetch_add(count, Ordering::SeqCst);
            })
        };

        let mut device = context
            .open_device(&info, StreamFormat::capture(), callback)
            .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert_eq!(frames.load(Ordering::SeqCst), 0);

        device.start().unwrap();
        thread::sleep(Duration::from_millis(40));
        device.stop().unwrap();

        let after_stop = frames.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        assert_eq!(after_stop % SIMULATED_BLOCK_FRAMES, 0);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(frames.load(Ordering::SeqCst), after_stop);

        device.release().unwrap();
        device.release().unwrap();
        assert_eq!(stats.releases(), vec!["device"]);
    }

    #[test]
    fn test_injected_failures() {
        let backend = SimulatedBackend::new(SimulatedConfig {
            fail_init: true,
            ..SimulatedConfig::default()
        });
        assert!(matches!(
            backend.create_context(log_sink()),
            Err(AudioError::DeviceInit(_))
        ));
    }

    #[test]
    fn test_tone_block_layout() {
        let mut tone = ToneBlock::new(440.0, 4, StreamFormat::capture());
        let (bytes, frames) = tone.next();
        assert_eq!(frames, 4);
        assert_eq!(bytes.len(), 8);
        // sin(0) == 0
        assert_eq!(&bytes[..2], &[0, 0]);
    }
}
