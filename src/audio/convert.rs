//! Conversion from a device's native input format to the capture format
//!
//! cpal hands out whatever the endpoint supports (often stereo f32 at 48 kHz).
//! `FrameConverter` downmixes to mono by averaging channels, resamples
//! linearly when the rates differ and encodes signed 16-bit little-endian.

use crate::audio::backend::StreamFormat;

/// Stateful per-stream converter; reuses its buffers across blocks
pub struct FrameConverter {
    source_channels: u16,
    source_rate: u32,
    target_rate: u32,
    mono: Vec<f32>,
    resampled: Vec<f32>,
    bytes: Vec<u8>,
}

impl FrameConverter {
    pub fn new(source_channels: u16, source_rate: u32, target: StreamFormat) -> Self {
        Self {
            source_channels: source_channels.max(1),
            source_rate,
            target_rate: target.sample_rate,
            mono: Vec::new(),
            resampled: Vec::new(),
            bytes: Vec::new(),
        }
    }

    /// Check if blocks can be copied through without downmix or resampling
    pub fn is_passthrough(&self) -> bool {
        self.source_channels == 1 && self.source_rate == self.target_rate
    }

    /// Convert interleaved f32 samples (-1.0..1.0).
    /// Returns the encoded bytes and the number of mono frames they hold.
    pub fn push_f32(&mut self, data: &[f32]) -> (&[u8], u32) {
        let channels = self.source_channels as usize;
        self.mono.clear();
        self.mono.extend(
            data.chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
        self.finish()
    }

    /// Convert interleaved i16 samples
    pub fn push_i16(&mut self, data: &[i16]) -> (&[u8], u32) {
        if self.is_passthrough() {
            self.bytes.clear();
            self.bytes.reserve(data.len() * 2);
            for sample in data {
                self.bytes.extend_from_slice(&sample.to_le_bytes());
            }
            return (&self.bytes, data.len() as u32);
        }

        let channels = self.source_channels as usize;
        self.mono.clear();
        self.mono.extend(data.chunks_exact(channels).map(|frame| {
            frame.iter().map(|&s| s as f32 / i16::MAX as f32).sum::<f32>() / channels as f32
        }));
        self.finish()
    }

    /// Convert interleaved i32 samples
    pub fn push_i32(&mut self, data: &[i32]) -> (&[u8], u32) {
        let channels = self.source_channels as usize;
        self.mono.clear();
        self.mono.extend(data.chunks_exact(channels).map(|frame| {
            frame.iter().map(|&s| s as f32 / i32::MAX as f32).sum::<f32>() / channels as f32
        }));
        self.finish()
    }

    fn finish(&mut self) -> (&[u8], u32) {
        resample(&self.mono, self.source_rate, self.target_rate, &mut self.resampled);

        self.bytes.clear();
        self.bytes.reserve(self.resampled.len() * 2);
        for &sample in &self.resampled {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            self.bytes.extend_from_slice(&value.to_le_bytes());
        }

        (&self.bytes, self.resampled.len() as u32)
    }
}

/// Linear interpolation resampler
fn resample(samples: &[f32], source_rate: u32, target_rate: u32, output: &mut Vec<f32>) {
    output.clear();
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        output.extend_from_slice(samples);
        return;
    }
    if samples.is_empty() {
        return;
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;
    let last = samples.len() - 1;

    for i in 0..output_len {
        let position = i as f64 * ratio;
        let index = position.floor() as usize;
        if index > last {
            break;
        }
        let next = (index + 1).min(last);
        let frac = (position - index as f64) as f32;
        output.push(samples[index] * (1.0 - frac) + samples[next] * frac);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    #[test]
    fn test_i16_mono_passthrough() {
        let mut converter = FrameConverter::new(1, 44100, StreamFormat::capture());
        assert!(converter.is_passthrough());

        let (bytes, frames) = converter.push_i16(&[1, -1, i16::MIN, i16::MAX]);
        assert_eq!(frames, 4);
        assert_eq!(bytes, &[0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0xff, 0x7f]);
    }

    #[test]
    fn test_f32_stereo_downmix() {
        let mut converter = FrameConverter::new(2, 44100, StreamFormat::capture());
        assert!(!converter.is_passthrough());

        // Three stereo frames
        let (bytes, frames) = converter.push_f32(&[1.0, 1.0, 0.5, -0.5, -1.0, 0.0]);
        assert_eq!(frames, 3);
        assert_eq!(bytes.len(), 6);
        assert_eq!(decode(bytes), vec![i16::MAX, 0, -16383]);
    }

    #[test]
    fn test_out_of_range_f32_is_clamped() {
        let mut converter = FrameConverter::new(1, 44100, StreamFormat::capture());
        let (bytes, frames) = converter.push_f32(&[2.0, -3.0]);
        assert_eq!(frames, 2);
        assert_eq!(decode(bytes), vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn test_i32_stereo_downmix() {
        let mut converter = FrameConverter::new(2, 44100, StreamFormat::capture());
        let (bytes, frames) = converter.push_i32(&[i32::MAX, i32::MAX, 0, 0]);
        assert_eq!(frames, 2);
        assert_eq!(decode(bytes), vec![i16::MAX, 0]);
    }

    #[test]
    fn test_i16_stereo_converts() {
        let mut converter = FrameConverter::new(2, 44100, StreamFormat::capture());
        let (bytes, frames) = converter.push_i16(&[i16::MAX, i16::MAX, 0, 0]);
        assert_eq!(frames, 2);
        assert_eq!(decode(bytes), vec![i16::MAX, 0]);
    }

    #[test]
    fn test_resample_48k_to_44k() {
        let mut converter = FrameConverter::new(1, 48000, StreamFormat::capture());

        // 10 ms at 48 kHz becomes 441 frames at 44.1 kHz
        let block = vec![0.25f32; 480];
        let (bytes, frames) = converter.push_f32(&block);
        assert_eq!(frames, 441);
        assert_eq!(bytes.len(), 441 * 2);
        assert!(decode(bytes).iter().all(|&s| s == (0.25 * i16::MAX as f32) as i16));
    }

    #[test]
    fn test_partial_frames_ignored() {
        let mut converter = FrameConverter::new(2, 44100, StreamFormat::capture());
        let (bytes, frames) = converter.push_f32(&[0.0, 0.0, 0.5]);
        assert_eq!(frames, 1);
        assert_eq!(bytes.len(), 2);
    }

    #[test]
    fn test_empty_block() {
        let mut converter = FrameConverter::new(2, 48000, StreamFormat::capture());
        let (bytes, frames) = converter.push_f32(&[]);
        assert_eq!(frames, 0);
        assert!(bytes.is_empty());
    }
}
