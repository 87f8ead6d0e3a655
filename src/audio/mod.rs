//! Audio subsystem module

pub mod backend;
pub mod buffer;
pub mod convert;
pub mod device;
pub mod host;
pub mod simulated;

pub use backend::{AudioBackend, AudioContext, CaptureDevice, DeviceInfo, FrameCallback, StreamFormat};
pub use buffer::{create_shared_buffer, CaptureBuffer, CaptureSnapshot, SharedCaptureBuffer};
pub use convert::FrameConverter;
pub use device::{DeviceHandle, DeviceState};
pub use host::CpalBackend;
pub use simulated::{SimulatedBackend, SimulatedConfig, SimulatedStats};
