//! # Audio-In Sensor
//!
//! Windowed microphone capture exposed as a synchronous sensor component.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        CONTROL CONTEXT                               │
//! │   reconfigure()            readings()                  close()       │
//! │        │                       │                          │          │
//! │        ▼                       ▼                          ▼          │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │              AudioIn (sensor::audio_in) - RwLock               │  │
//! │  │   reset ──► start ──► sleep(duration) ──► stop ──► snapshot    │  │
//! │  └───────┬──────────────────────────────────────────────┬─────────┘  │
//! │          │ owns                                         │ shares     │
//! │          ▼                                              ▼            │
//! │  ┌──────────────────────────┐            ┌─────────────────────────┐ │
//! │  │ DeviceHandle             │            │ CaptureBuffer (Mutex)   │ │
//! │  │  context ─► device       │            │  samples | sample_count │ │
//! │  └───────────┬──────────────┘            └────────────▲────────────┘ │
//! └──────────────┼────────────────────────────────────────┼──────────────┘
//!                │ AudioBackend (cpal / simulated)        │ on_frames
//!                ▼                                        │
//! ┌──────────────────────────────────────────────────────┴───────────────┐
//! │                        DELIVERY CONTEXT                              │
//! │  capture thread: device format ─► FrameConverter ─► mono S16LE 44.1k │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod registry;
pub mod sensor;

pub use error::{AudioError, Error, Result};
pub use registry::{register_models, Model, Registry};
pub use sensor::{AudioIn, Readings, Sensor};

/// Application-wide constants
pub mod constants {
    /// Capture sample rate
    pub const SAMPLE_RATE: u32 = 44100;

    /// Capture channel count (mono)
    pub const CHANNELS: u16 = 1;

    /// Bytes per sample for signed 16-bit PCM
    pub const BYTES_PER_SAMPLE: u16 = 2;

    /// Capture window used when no duration is configured, in milliseconds
    pub const DEFAULT_DURATION_MS: u64 = 2000;

    /// Frames per simulated delivery block (10 ms at 44.1 kHz)
    pub const SIMULATED_BLOCK_FRAMES: u32 = 441;

    /// Delivery period of the simulated device in milliseconds
    pub const SIMULATED_PERIOD_MS: u64 = 10;

    /// Interval between readings taken by the driver binary, in milliseconds
    pub const DEFAULT_READING_INTERVAL_MS: u64 = 5000;
}
