//! Audio-in sensor
//!
//! Turns the callback-driven capture device into a blocking request/response
//! reading: reset the buffer, start the device, wait, stop, snapshot. The
//! write lock is held across the whole window, so concurrent readings run
//! one after another and never share a buffer.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::audio::backend::{AudioBackend, DeviceInfo, StreamFormat};
use crate::audio::buffer::{create_shared_buffer, frame_callback, SharedCaptureBuffer};
use crate::audio::device::DeviceHandle;
use crate::config::{AudioInConfig, ComponentConfig};
use crate::constants::DEFAULT_DURATION_MS;
use crate::error::{AudioError, Error, Result};
use crate::sensor::{Extra, Readings, Sensor};

struct AudioInState {
    default_duration: Duration,
    device: Option<DeviceHandle>,
}

/// Windowed microphone capture sensor
pub struct AudioIn {
    name: String,
    backend: Arc<dyn AudioBackend>,
    format: StreamFormat,
    buffer: SharedCaptureBuffer,
    state: RwLock<AudioInState>,
}

impl AudioIn {
    /// Create an unconfigured sensor; `configure` opens the device
    pub fn new(name: impl Into<String>, backend: Arc<dyn AudioBackend>) -> Self {
        let format = StreamFormat::capture();
        Self {
            name: name.into(),
            backend,
            format,
            buffer: create_shared_buffer(format),
            state: RwLock::new(AudioInState {
                default_duration: Duration::from_millis(DEFAULT_DURATION_MS),
                device: None,
            }),
        }
    }

    /// Build a sensor from its component config and configure it
    pub fn from_config(config: &ComponentConfig, backend: Arc<dyn AudioBackend>) -> Result<Self> {
        let sensor = Self::new(&config.name, backend);
        sensor.configure(AudioInConfig::from_attributes(&config.attributes)?)?;
        Ok(sensor)
    }

    /// Store the default duration and open a device if none is open yet.
    ///
    /// An open device is kept as is; only a fresh sensor enumerates again.
    pub fn configure(&self, config: AudioInConfig) -> Result<()> {
        config.validate()?;
        let duration = config.resolved_duration();

        let mut state = self.state.write();
        state.default_duration = duration;

        if state.device.is_some() {
            tracing::debug!(
                sensor = %self.name,
                duration_ms = duration.as_millis() as u64,
                "Updated default duration"
            );
            return Ok(());
        }

        let handle = DeviceHandle::open(
            self.backend.as_ref(),
            self.format,
            frame_callback(&self.buffer),
        )
        .map_err(|e| {
            tracing::error!(sensor = %self.name, "Failed to configure capture device: {}", e);
            e
        })?;

        state.device = Some(handle);
        tracing::info!(
            sensor = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Audio-in configured"
        );
        Ok(())
    }

    /// Capture one window of `duration`
    pub fn capture(&self, duration: Duration) -> Result<Readings> {
        let mut state = self.state.write();
        let device = state
            .device
            .as_mut()
            .ok_or_else(|| AudioError::DeviceStart("no capture device configured".into()))?;

        tracing::debug!(
            sensor = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Gathering readings"
        );

        self.buffer.lock().reset();

        if let Err(e) = device.start() {
            self.buffer.lock().discard();
            tracing::error!(sensor = %self.name, "Unable to start capture device: {}", e);
            return Err(e.into());
        }

        thread::sleep(duration);

        if let Err(e) = device.stop() {
            self.buffer.lock().discard();
            tracing::error!(sensor = %self.name, "Unable to stop capture device: {}", e);
            return Err(e.into());
        }

        let snapshot = self.buffer.lock().snapshot();
        tracing::debug!(
            sensor = %self.name,
            sample_count = snapshot.sample_count,
            "Sending readings"
        );

        Ok(snapshot.into())
    }

    /// Window length for a call: a positive numeric `duration` in `extra`
    /// (milliseconds), else the configured default
    pub fn resolve_duration(&self, extra: &Extra) -> Duration {
        extra
            .get("duration")
            .and_then(Value::as_f64)
            .filter(|ms| *ms > 0.0)
            .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok())
            .unwrap_or_else(|| self.default_duration())
    }

    pub fn default_duration(&self) -> Duration {
        self.state.read().default_duration
    }

    /// Check if a capture device is open
    pub fn is_configured(&self) -> bool {
        self.state.read().device.is_some()
    }

    /// Get the endpoint the sensor captures from
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.state
            .read()
            .device
            .as_ref()
            .and_then(|device| device.info().cloned())
    }
}

impl Sensor for AudioIn {
    fn name(&self) -> &str {
        &self.name
    }

    fn readings(&self, extra: &Extra) -> Result<Readings> {
        let duration = self.resolve_duration(extra);
        self.capture(duration)
    }

    fn do_command(&self, _command: &Extra) -> Result<Extra> {
        Err(Error::NotImplemented)
    }

    fn reconfigure(&self, config: &ComponentConfig) -> Result<()> {
        self.configure(AudioInConfig::from_attributes(&config.attributes)?)
    }

    fn close(&self) -> Result<()> {
        let device = self.state.write().device.take();

        match device {
            Some(mut device) => {
                device.teardown()?;
                tracing::info!(sensor = %self.name, "Audio-in closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
