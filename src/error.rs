//! Error types for the audio-in sensor

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("Invalid attributes: {0}")]
    Attributes(#[from] serde_json::Error),

    #[error("Command not implemented")]
    NotImplemented,

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Model already registered: {0}")]
    DuplicateModel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
///
/// The first three come out of `reconfigure` and leave the sensor without a
/// device; start/stop come out of `readings` and leave it configured.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Failed to initialize audio context: {0}")]
    DeviceInit(String),

    #[error("Failed to enumerate capture devices: {0}")]
    DeviceEnumeration(String),

    #[error("Failed to open capture device: {0}")]
    DeviceOpen(String),

    #[error("Failed to start capture device: {0}")]
    DeviceStart(String),

    #[error("Failed to stop capture device: {0}")]
    DeviceStop(String),

    #[error("Failed to release audio resources: {0}")]
    DeviceTeardown(String),
}

impl Error {
    /// The audio error behind this error, if any
    pub fn as_audio(&self) -> Option<&AudioError> {
        match self {
            Error::Audio(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_converts() {
        let err: Error = AudioError::DeviceEnumeration("no capture devices".into()).into();
        assert_eq!(
            err.as_audio(),
            Some(&AudioError::DeviceEnumeration("no capture devices".into()))
        );
        assert_eq!(
            err.to_string(),
            "Audio error: Failed to enumerate capture devices: no capture devices"
        );
    }

    #[test]
    fn test_non_audio_error() {
        assert!(Error::NotImplemented.as_audio().is_none());
    }
}
