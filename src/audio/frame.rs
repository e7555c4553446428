//! One decoded chunk of audio.

use super::format::{Channels, Format};

/// Frames never carry more than two channel planes.
pub const MAX_PLANES: usize = 2;

/// Frame shape/consistency errors.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{size} bytes not divisible into {planes} planes")]
    UnevenPlanes { size: usize, planes: usize },

    #[error("frame cannot hold {0} planes")]
    TooManyPlanes(usize),
}

/// One decoded chunk of PCM data.
///
/// Holds up to two owned plane buffers (planar stereo), or a single buffer
/// for mono/interleaved data. `size` is the total byte count across all
/// planes and is always evenly divisible by the plane count. Buffers are
/// reused across decode calls and only reallocated when the required shape
/// changes.
pub struct Frame {
    /// Position within the current track, in [0, 1].
    pub progress: f32,
    size: usize,
    samples: usize,
    planes: usize,
    data: [Vec<u8>; MAX_PLANES],
}

impl Frame {
    /// An empty frame; the first [`Frame::reset_shape`] allocates it.
    pub fn new() -> Self {
        Self {
            progress: 0.0,
            size: 0,
            samples: 0,
            planes: 0,
            data: [Vec::new(), Vec::new()],
        }
    }

    /// Total bytes across all planes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Samples per channel in this frame.
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn set_samples(&mut self, samples: usize) {
        self.samples = samples;
    }

    /// Number of plane buffers in use (1 or 2).
    pub fn planes(&self) -> usize {
        self.planes
    }

    /// Reshape the frame to `planes` buffers holding `size` bytes in total,
    /// reallocating only when the shape actually changes.
    pub fn reset_shape(&mut self, planes: usize, size: usize) -> Result<(), FrameError> {
        if planes == 0 || planes > MAX_PLANES {
            return Err(FrameError::TooManyPlanes(planes));
        }
        if size % planes != 0 {
            return Err(FrameError::UnevenPlanes { size, planes });
        }
        let per_plane = size / planes;
        for buf in self.data.iter_mut().take(planes) {
            buf.resize(per_plane, 0);
        }
        for buf in self.data.iter_mut().skip(planes) {
            buf.clear();
        }
        self.planes = planes;
        self.size = size;
        Ok(())
    }

    /// Plane `index`, `index < planes()`.
    pub fn plane(&self, index: usize) -> &[u8] {
        &self.data[index]
    }

    pub fn plane_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.data[index]
    }

    /// Interleave `self` into `dst` according to `format`.
    ///
    /// Mono input is copied through; planar stereo is merged sample by
    /// sample at the format's byte width. `dst` is reshaped to one plane of
    /// the same total size.
    pub fn interleave_into(&self, dst: &mut Frame, format: &Format) -> Result<(), FrameError> {
        if dst.size != self.size || dst.planes != 1 {
            dst.reset_shape(1, self.size)?;
        }
        dst.progress = self.progress;
        dst.samples = self.samples;

        if format.channels == Channels::Mono || self.planes == 1 {
            dst.data[0][..self.size].copy_from_slice(&self.data[0][..self.size]);
            return Ok(());
        }

        let width = format.bits.bytes();
        let out = &mut dst.data[0];
        let (left, right) = (&self.data[0], &self.data[1]);
        let pairs = self.size / (2 * width);
        for i in 0..pairs {
            let src = i * width;
            let dst_off = i * 2 * width;
            out[dst_off..dst_off + width].copy_from_slice(&left[src..src + width]);
            out[dst_off + width..dst_off + 2 * width].copy_from_slice(&right[src..src + width]);
        }
        Ok(())
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::{Bits, ByteOrder, Layout, SampleType};

    fn stereo_format(bits: Bits) -> Format {
        Format {
            bits,
            byte_order: ByteOrder::LittleEndian,
            channels: Channels::Stereo,
            layout: Layout::Planar,
            sample_type: SampleType::Signed,
            sample_rate: 44_100,
        }
    }

    #[test]
    fn test_reset_shape_validates() {
        let mut frame = Frame::new();
        assert!(frame.reset_shape(2, 7).is_err()); // uneven split
        assert!(frame.reset_shape(3, 9).is_err()); // too many planes
        assert!(frame.reset_shape(0, 0).is_err());

        frame.reset_shape(2, 8).unwrap();
        assert_eq!(frame.planes(), 2);
        assert_eq!(frame.size(), 8);
        assert_eq!(frame.plane(0).len(), 4);
        assert_eq!(frame.plane(1).len(), 4);
    }

    #[test]
    fn test_interleave_round_trip() {
        let mut src = Frame::new();
        src.reset_shape(2, 8).unwrap();
        src.plane_mut(0).copy_from_slice(&[0, 2, 4, 6]);
        src.plane_mut(1).copy_from_slice(&[1, 3, 5, 7]);

        let mut dst = Frame::new();
        src.interleave_into(&mut dst, &stereo_format(Bits::B8)).unwrap();
        assert_eq!(dst.planes(), 1);
        assert_eq!(dst.plane(0), &[0, 1, 2, 3, 4, 5, 6, 7]);

        // De-interleave check: even offsets come from plane 0, odd from 1.
        let mixed = dst.plane(0);
        for k in 0..4 {
            assert_eq!(mixed[2 * k], src.plane(0)[k]);
            assert_eq!(mixed[2 * k + 1], src.plane(1)[k]);
        }
    }

    #[test]
    fn test_interleave_16_bit_groups() {
        let mut src = Frame::new();
        src.reset_shape(2, 8).unwrap();
        src.plane_mut(0).copy_from_slice(&[0xA0, 0xA1, 0xB0, 0xB1]);
        src.plane_mut(1).copy_from_slice(&[0xC0, 0xC1, 0xD0, 0xD1]);

        let mut dst = Frame::new();
        src.interleave_into(&mut dst, &stereo_format(Bits::B16)).unwrap();
        assert_eq!(
            dst.plane(0),
            &[0xA0, 0xA1, 0xC0, 0xC1, 0xB0, 0xB1, 0xD0, 0xD1]
        );
    }

    #[test]
    fn test_interleave_mono_copies_through() {
        let mut src = Frame::new();
        src.reset_shape(1, 4).unwrap();
        src.plane_mut(0).copy_from_slice(&[9, 8, 7, 6]);

        let mut format = stereo_format(Bits::B16);
        format.channels = Channels::Mono;

        let mut dst = Frame::new();
        src.interleave_into(&mut dst, &format).unwrap();
        assert_eq!(dst.plane(0), &[9, 8, 7, 6]);
    }
}
