//! Capture device lifecycle
//!
//! `DeviceHandle` owns a backend context and the capture device opened from
//! it. Teardown always releases the device before the context, is safe to
//! repeat, and runs on drop, including when construction fails halfway.

use std::sync::Arc;

use crate::audio::backend::{
    AudioBackend, AudioContext, CaptureDevice, DeviceInfo, FrameCallback, LogSink, StreamFormat,
};
use crate::error::AudioError;

/// Lifecycle state of a device handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Context created, no device open yet
    Unopened,
    /// Device open and idle
    Opened,
    Started,
    Stopped,
    TornDown,
}

/// Owner of a backend context and its capture device
pub struct DeviceHandle {
    device: Option<Box<dyn CaptureDevice>>,
    context: Option<Box<dyn AudioContext>>,
    info: Option<DeviceInfo>,
    state: DeviceState,
}

impl DeviceHandle {
    /// Create a context on `backend`, select a capture endpoint and open it
    /// with `on_frames` as the delivery callback.
    pub fn open(
        backend: &dyn AudioBackend,
        format: StreamFormat,
        on_frames: FrameCallback,
    ) -> Result<Self, AudioError> {
        let context = backend.create_context(backend_log_sink(backend.name()))?;

        // From here on, an early return drops `handle`, which releases the context.
        let mut handle = Self {
            device: None,
            context: Some(context),
            info: None,
            state: DeviceState::Unopened,
        };

        let context = handle
            .context
            .as_ref()
            .ok_or_else(|| AudioError::DeviceInit("context missing".into()))?;
        let devices = context.enumerate_capture_devices()?;
        tracing::debug!(count = devices.len(), "Enumerated capture devices");

        let info = select_capture_device(devices)?;
        let device = context.open_device(&info, format, on_frames)?;

        tracing::info!(
            backend = backend.name(),
            device = %info.name,
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Opened capture device"
        );

        handle.device = Some(device);
        handle.info = Some(info);
        handle.state = DeviceState::Opened;
        Ok(handle)
    }

    /// Start capturing. Starting a running device is a no-op.
    pub fn start(&mut self) -> Result<(), AudioError> {
        match self.state {
            DeviceState::Started => Ok(()),
            DeviceState::Opened | DeviceState::Stopped => {
                let device = self
                    .device
                    .as_mut()
                    .ok_or_else(|| AudioError::DeviceStart("no device bound".into()))?;
                device.start()?;
                self.state = DeviceState::Started;
                Ok(())
            }
            DeviceState::Unopened | DeviceState::TornDown => {
                Err(AudioError::DeviceStart(format!("device is {:?}", self.state)))
            }
        }
    }

    /// Stop capturing. Stopping an idle device is a no-op.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        match self.state {
            DeviceState::Opened | DeviceState::Stopped => Ok(()),
            DeviceState::Started => {
                let device = self
                    .device
                    .as_mut()
                    .ok_or_else(|| AudioError::DeviceStop("no device bound".into()))?;
                device.stop()?;
                self.state = DeviceState::Stopped;
                Ok(())
            }
            DeviceState::Unopened | DeviceState::TornDown => {
                Err(AudioError::DeviceStop(format!("device is {:?}", self.state)))
            }
        }
    }

    /// Stop if running, release the device, then release the context.
    ///
    /// Every step is attempted; the first failure is returned. Later calls
    /// do nothing.
    pub fn teardown(&mut self) -> Result<(), AudioError> {
        if self.state == DeviceState::TornDown {
            return Ok(());
        }

        let mut first_error = None;

        if self.state == DeviceState::Started {
            if let Some(device) = self.device.as_mut() {
                if let Err(e) = device.stop() {
                    tracing::warn!("Failed to stop device during teardown: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.release() {
                tracing::warn!("Failed to release device: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(mut context) = self.context.take() {
            if let Err(e) = context.release() {
                tracing::warn!("Failed to release audio context: {}", e);
                first_error.get_or_insert(e);
            }
        }

        self.state = DeviceState::TornDown;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Get current lifecycle state
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Get the endpoint this handle is bound to
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::error!("Device teardown on drop failed: {}", e);
        }
    }
}

/// Pick the endpoint to capture from. The first enumerated device wins.
fn select_capture_device(devices: Vec<DeviceInfo>) -> Result<DeviceInfo, AudioError> {
    devices
        .into_iter()
        .next()
        .ok_or_else(|| AudioError::DeviceEnumeration("no capture devices found".into()))
}

fn backend_log_sink(backend: &str) -> LogSink {
    let backend = backend.to_string();
    Arc::new(move |message: &str| {
        tracing::info!(backend = %backend, "{}", message);
    })
}
