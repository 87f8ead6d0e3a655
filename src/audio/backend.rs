//! Seam between the sensor and the native audio subsystem
//!
//! A backend hands out contexts, a context enumerates endpoints and opens
//! capture devices, and a device delivers PCM blocks through a callback
//! running on whatever thread the backend chooses.

use std::sync::Arc;

use crate::constants::{BYTES_PER_SAMPLE, CHANNELS, SAMPLE_RATE};
use crate::error::AudioError;

/// Callback invoked with each delivered block: raw little-endian bytes and
/// the number of frames they hold.
pub type FrameCallback = Arc<dyn Fn(&[u8], u32) + Send + Sync + 'static>;

/// Destination for log messages emitted by a backend.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// PCM layout a capture device is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bytes_per_sample: u16,
}

impl StreamFormat {
    /// Mono, signed 16-bit, 44.1 kHz
    pub const fn capture() -> Self {
        Self {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            bytes_per_sample: BYTES_PER_SAMPLE,
        }
    }

    /// Bytes occupied by one frame across all channels
    pub fn bytes_per_frame(&self) -> u32 {
        self.channels as u32 * self.bytes_per_sample as u32
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::capture()
    }
}

/// A capture endpoint reported by a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Factory for backend contexts.
pub trait AudioBackend: Send + Sync {
    /// Short backend identifier used in logs.
    fn name(&self) -> &str;

    /// Initialize a new context, routing backend log output to `log_sink`.
    fn create_context(&self, log_sink: LogSink) -> Result<Box<dyn AudioContext>, AudioError>;
}

/// An initialized audio subsystem.
///
/// Every device opened from a context must be released before the context.
pub trait AudioContext: Send + Sync {
    /// List the capture endpoints currently available.
    fn enumerate_capture_devices(&self) -> Result<Vec<DeviceInfo>, AudioError>;

    /// Open a capture stream on `device`. The stream starts out stopped.
    fn open_device(
        &self,
        device: &DeviceInfo,
        format: StreamFormat,
        on_frames: FrameCallback,
    ) -> Result<Box<dyn CaptureDevice>, AudioError>;

    /// Uninitialize the context. Calling it again is a no-op.
    fn release(&mut self) -> Result<(), AudioError>;
}

/// An opened capture stream.
pub trait CaptureDevice: Send + Sync {
    /// Begin delivering frames.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop delivering frames. Must not return while a delivery is still
    /// being dispatched by the backend's own thread.
    fn stop(&mut self) -> Result<(), AudioError>;

    /// Release the stream. Calling it again is a no-op.
    fn release(&mut self) -> Result<(), AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_format() {
        let format = StreamFormat::capture();
        assert_eq!(format.channels, 1);
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.bytes_per_frame(), 2);
        assert_eq!(StreamFormat::default(), format);
    }
}
