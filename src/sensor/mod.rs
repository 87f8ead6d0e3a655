//! Sensor surface exposed to the host

pub mod audio_in;

pub use audio_in::AudioIn;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::audio::buffer::CaptureSnapshot;
use crate::config::ComponentConfig;
use crate::error::Result;

/// Per-call options or command payloads
pub type Extra = Map<String, Value>;

/// A component that produces readings on request.
pub trait Sensor: Send + Sync {
    /// Component name from its configuration
    fn name(&self) -> &str;

    /// Take one reading. `extra` may override per-call options.
    fn readings(&self, extra: &Extra) -> Result<Readings>;

    /// Model-specific commands.
    fn do_command(&self, command: &Extra) -> Result<Extra>;

    /// Apply a new configuration in place.
    fn reconfigure(&self, config: &ComponentConfig) -> Result<()>;

    /// Release every resource held by the component.
    fn close(&self) -> Result<()>;
}

/// One capture window as returned to callers
///
/// Serialized with camelCase keys: `sampleCount`, `samples`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readings {
    /// Bytes of audio captured (frames × channels × 2)
    pub sample_count: u32,
    /// Raw little-endian signed 16-bit mono PCM at 44.1 kHz
    pub samples: Vec<u8>,
}

impl Readings {
    /// Decode `samples` into signed 16-bit values
    pub fn to_pcm_samples(&self) -> Vec<i16> {
        self.samples
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }
}

impl From<CaptureSnapshot> for Readings {
    fn from(snapshot: CaptureSnapshot) -> Self {
        Self {
            sample_count: snapshot.sample_count,
            samples: snapshot.samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_readings_casing() {
        let readings = Readings {
            sample_count: 4,
            samples: vec![1, 0, 255, 255],
        };
        let value = serde_json::to_value(&readings).unwrap();
        assert_eq!(value, json!({ "sampleCount": 4, "samples": [1, 0, 255, 255] }));
    }

    #[test]
    fn test_pcm_decoding() {
        let readings = Readings {
            sample_count: 6,
            samples: vec![0x01, 0x00, 0xff, 0xff, 0x00, 0x80],
        };
        assert_eq!(readings.to_pcm_samples(), vec![1, -1, i16::MIN]);
    }
}
