//! Output device facade.
//!
//! [`Device`] serializes all access to the single compiled-in backend
//! behind its own mutex (separate from the player's), exactly mirroring
//! the contract the player relies on: `write` may block for pacing while
//! `setup`/`drop_buffer` from another thread wait their turn.

use parking_lot::Mutex;

use super::format::{Format, Layout};
use super::frame::{Frame, FrameError};

/// Output device errors.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("audio output init failed: {0}")]
    Init(String),

    /// The backend cannot play this stream description. Logged as a
    /// warning; playback of the track is aborted.
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("audio output disconnected")]
    Disconnected,

    /// The pacing buffer did not drain in time (stalled or vanished
    /// output).
    #[error("audio output write timed out")]
    Timeout,

    #[error("device not set up")]
    NotConfigured,

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// The pluggable output backend. Exactly one implementation is compiled
/// into a build (see [`crate::audio::backend`]).
pub trait OutputBackend: Send {
    /// Prepare the device for a stream. Called once per track.
    fn setup(&mut self, format: &Format) -> Result<(), DeviceError>;

    /// Write one interleaved frame. Blocks while the device buffer is
    /// full; this backpressure paces the whole decode loop.
    fn write(&mut self, frame: &Frame, format: &Format) -> Result<(), DeviceError>;

    /// Discard whatever is buffered without tearing the device down.
    fn drop_buffer(&mut self);
}

struct Inner {
    backend: Box<dyn OutputBackend>,
    format: Option<Format>,
    scratch: Frame,
}

/// Thread-safe handle to the output backend.
pub struct Device {
    inner: Mutex<Inner>,
}

impl Device {
    pub fn new(backend: Box<dyn OutputBackend>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                backend,
                format: None,
                scratch: Frame::new(),
            }),
        }
    }

    /// Configure the backend for a new stream and remember its format.
    pub fn setup(&self, format: &Format) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();
        inner.backend.setup(format)?;
        inner.format = Some(*format);
        Ok(())
    }

    /// Write one frame, interleaving planar data first.
    pub fn write(&self, frame: &Frame) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let format = inner.format.ok_or(DeviceError::NotConfigured)?;
        if format.layout == Layout::Planar {
            frame.interleave_into(&mut inner.scratch, &format)?;
            inner.backend.write(&inner.scratch, &format)
        } else {
            inner.backend.write(frame, &format)
        }
    }

    /// Flush buffered audio (stop/skip) without destroying the device.
    pub fn drop_buffer(&self) {
        self.inner.lock().backend.drop_buffer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::{Bits, ByteOrder, Channels, SampleType};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingBackend {
        writes: Arc<AtomicUsize>,
        drops: Arc<AtomicUsize>,
        last_bytes: Arc<Mutex<Vec<u8>>>,
    }

    impl OutputBackend for RecordingBackend {
        fn setup(&mut self, _format: &Format) -> Result<(), DeviceError> {
            Ok(())
        }

        fn write(&mut self, frame: &Frame, _format: &Format) -> Result<(), DeviceError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.last_bytes.lock() = frame.plane(0).to_vec();
            Ok(())
        }

        fn drop_buffer(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn planar_stereo() -> Format {
        Format {
            bits: Bits::B8,
            byte_order: ByteOrder::LittleEndian,
            channels: Channels::Stereo,
            layout: Layout::Planar,
            sample_type: SampleType::Unsigned,
            sample_rate: 8_000,
        }
    }

    #[test]
    fn test_write_requires_setup() {
        let writes = Arc::new(AtomicUsize::new(0));
        let device = Device::new(Box::new(RecordingBackend {
            writes: writes.clone(),
            drops: Arc::new(AtomicUsize::new(0)),
            last_bytes: Arc::new(Mutex::new(Vec::new())),
        }));
        let frame = Frame::new();
        assert!(matches!(
            device.write(&frame),
            Err(DeviceError::NotConfigured)
        ));
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_write_interleaves_planar_frames() {
        let writes = Arc::new(AtomicUsize::new(0));
        let last_bytes = Arc::new(Mutex::new(Vec::new()));
        let device = Device::new(Box::new(RecordingBackend {
            writes: writes.clone(),
            drops: Arc::new(AtomicUsize::new(0)),
            last_bytes: last_bytes.clone(),
        }));
        device.setup(&planar_stereo()).unwrap();

        let mut frame = Frame::new();
        frame.reset_shape(2, 4).unwrap();
        frame.plane_mut(0).copy_from_slice(&[1, 3]);
        frame.plane_mut(1).copy_from_slice(&[2, 4]);
        device.write(&frame).unwrap();

        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(*last_bytes.lock(), vec![1, 2, 3, 4]);
    }
}
