//! Capture buffer filled by the frame-delivery callback
//!
//! One buffer accumulates exactly one capture window. The window is opened by
//! `reset` and closed by `snapshot` or `discard`; blocks delivered while the
//! window is closed are counted and dropped, which fences out any callback
//! that was still in flight when the device stopped.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::audio::backend::{FrameCallback, StreamFormat};

/// Contents of one completed capture window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSnapshot {
    /// Raw little-endian PCM bytes in delivery order
    pub samples: Vec<u8>,
    /// Bytes of audio delivered (frames × channels × bytes per sample)
    pub sample_count: u32,
}

/// Growable PCM byte buffer with a running sample counter
pub struct CaptureBuffer {
    samples: Vec<u8>,
    sample_count: u32,
    bytes_per_frame: u32,
    /// Whether a capture window is currently accepting deliveries
    open: bool,
    /// Blocks rejected because no window was open
    dropped_blocks: u64,
}

impl CaptureBuffer {
    /// Create an empty, closed buffer for the given stream format
    pub fn new(format: StreamFormat) -> Self {
        Self {
            samples: Vec::new(),
            sample_count: 0,
            bytes_per_frame: format.bytes_per_frame(),
            open: false,
            dropped_blocks: 0,
        }
    }

    /// Append a delivered block.
    /// Returns false if the block was dropped because no window is open.
    pub fn on_frames(&mut self, chunk: &[u8], frame_count: u32) -> bool {
        if !self.open {
            self.dropped_blocks += 1;
            return false;
        }

        self.samples.extend_from_slice(chunk);
        self.sample_count = self
            .sample_count
            .saturating_add(frame_count.saturating_mul(self.bytes_per_frame));
        true
    }

    /// Empty the buffer and open a new capture window
    pub fn reset(&mut self) {
        self.samples.clear();
        self.sample_count = 0;
        self.dropped_blocks = 0;
        self.open = true;
    }

    /// Close the window and move its contents out
    pub fn snapshot(&mut self) -> CaptureSnapshot {
        self.open = false;
        CaptureSnapshot {
            samples: std::mem::take(&mut self.samples),
            sample_count: std::mem::replace(&mut self.sample_count, 0),
        }
    }

    /// Close the window and throw away whatever it collected
    pub fn discard(&mut self) {
        self.open = false;
        self.samples.clear();
        self.sample_count = 0;
    }

    /// Check if a window is open
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Get number of buffered bytes
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get running sample count of the current window
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Get number of blocks dropped outside a window
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks
    }
}

/// Thread-safe handle to a capture buffer
pub type SharedCaptureBuffer = Arc<Mutex<CaptureBuffer>>;

/// Create a new shared capture buffer
pub fn create_shared_buffer(format: StreamFormat) -> SharedCaptureBuffer {
    Arc::new(Mutex::new(CaptureBuffer::new(format)))
}

/// Build the device callback that appends into `buffer`
pub fn frame_callback(buffer: &SharedCaptureBuffer) -> FrameCallback {
    let buffer = Arc::clone(buffer);
    Arc::new(move |chunk: &[u8], frame_count: u32| {
        buffer.lock().on_frames(chunk, frame_count);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_capture_buffer_basic() {
        let mut buffer = CaptureBuffer::new(StreamFormat::capture());
        buffer.reset();

        assert!(buffer.on_frames(&[1, 0, 2, 0], 2));
        assert!(buffer.on_frames(&[3, 0], 1));
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.sample_count(), 6);

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.samples, vec![1, 0, 2, 0, 3, 0]);
        assert_eq!(snapshot.sample_count, 6);
        assert!(!buffer.is_open());
    }

    #[test]
    fn test_closed_window_drops_blocks() {
        let mut buffer = CaptureBuffer::new(StreamFormat::capture());

        // Never opened
        assert!(!buffer.on_frames(&[9, 9], 1));

        buffer.reset();
        buffer.on_frames(&[1, 0], 1);
        let _ = buffer.snapshot();

        // Straggler after the window closed
        assert!(!buffer.on_frames(&[7, 7], 1));
        assert!(buffer.is_empty());
        assert_eq!(buffer.sample_count(), 0);
        assert_eq!(buffer.dropped_blocks(), 1);
    }

    #[test]
    fn test_reset_separates_windows() {
        let mut buffer = CaptureBuffer::new(StreamFormat::capture());

        buffer.reset();
        buffer.on_frames(&[1, 1, 1, 1], 2);
        let first = buffer.snapshot();

        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.sample_count(), 0);

        buffer.on_frames(&[2, 2], 1);
        let second = buffer.snapshot();
        assert_eq!(first.samples, vec![1, 1, 1, 1]);
        assert_eq!(second.samples, vec![2, 2]);
    }

    #[test]
    fn test_discard() {
        let mut buffer = CaptureBuffer::new(StreamFormat::capture());
        buffer.reset();
        buffer.on_frames(&[5, 5], 1);
        buffer.discard();

        assert!(buffer.is_empty());
        assert!(!buffer.is_open());
        assert_eq!(buffer.snapshot(), CaptureSnapshot::default());
    }

    #[test]
    fn test_frame_callback_writes_through() {
        let shared = create_shared_buffer(StreamFormat::capture());
        let callback = frame_callback(&shared);

        shared.lock().reset();
        let writer = {
            let callback = callback.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    callback(&[0x34, 0x12], 1);
                }
            })
        };
        writer.join().unwrap();

        let snapshot = shared.lock().snapshot();
        assert_eq!(snapshot.sample_count, 20);
        assert_eq!(snapshot.samples.len(), 20);
    }

    proptest! {
        #[test]
        fn test_snapshot_is_concatenation(
            blocks in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..64).prop_map(|mut b| {
                    b.truncate(b.len() & !1);
                    b
                }),
                0..32,
            )
        ) {
            let mut buffer = CaptureBuffer::new(StreamFormat::capture());
            buffer.reset();

            let mut expected = Vec::new();
            let mut expected_count = 0u32;
            for block in &blocks {
                let frames = (block.len() / 2) as u32;
                buffer.on_frames(block, frames);
                expected.extend_from_slice(block);
                expected_count += frames * 2;
            }

            let snapshot = buffer.snapshot();
            prop_assert_eq!(snapshot.samples, expected);
            prop_assert_eq!(snapshot.sample_count, expected_count);
        }
    }
}
