//! Decoder wrapper: symphonia behind the narrow [`FrameSource`] interface.
//!
//! The player only ever sees `format`/`next_frame`/`seek`. Decoded data is
//! delivered as planar little-endian byte planes in the source's native
//! sample format; conversion to the output representation happens in the
//! device backend.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::format::{Bits, ByteOrder, Channels, Format, Layout, SampleType};
use super::frame::{Frame, FrameError, MAX_PLANES};

/// Decoder errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported container or codec: {0}")]
    Unsupported(String),

    #[error("no decodable audio track")]
    NoAudioTrack,

    #[error("unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    /// Transient decode failure; the player retries these a bounded number
    /// of times.
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("seek failed: {0}")]
    Seek(String),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Outcome of one [`FrameSource::next_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    /// End of stream; the player advances to the next queued track.
    Eof,
    /// A frame of this many bytes was decoded.
    Frame(usize),
}

/// The opaque frame source the player pulls from.
pub trait FrameSource: Send {
    /// Stream description, fixed for the lifetime of the source.
    fn format(&self) -> Format;

    /// Decode the next frame into `frame`.
    fn next_frame(&mut self, frame: &mut Frame) -> Result<Read, DecodeError>;

    /// Seek to a fraction of the total duration.
    fn seek(&mut self, percentage: f32) -> Result<(), DecodeError>;
}

/// Open `path` with the default (symphonia) decoder.
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>, DecodeError> {
    Ok(Box::new(Input::open(path)?))
}

/// Symphonia-backed [`FrameSource`].
pub struct Input {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    duration_secs: f64,
    format: Format,
    /// First frame, decoded eagerly at open to pin down the concrete
    /// sample representation (and to reject undecodable files before they
    /// reach the device).
    pending: Option<Frame>,
}

impl Input {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::Unsupported("unknown sample rate".into()))?;
        let channel_count = codec_params.channels.map(|c| c.count()).unwrap_or(2);
        let channels = match channel_count {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            n => {
                return Err(DecodeError::UnsupportedSampleFormat(format!(
                    "{n} channels"
                )));
            }
        };

        let time_base = codec_params.time_base;
        let duration_secs = match (codec_params.n_frames, time_base) {
            (Some(n), Some(tb)) => {
                let time = tb.calc_time(n);
                time.seconds as f64 + time.frac
            }
            (Some(n), None) => n as f64 / sample_rate as f64,
            _ => 0.0,
        };

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut input = Self {
            reader,
            decoder,
            track_id,
            time_base,
            duration_secs,
            format: Format {
                bits: Bits::B16,
                byte_order: ByteOrder::LittleEndian,
                channels,
                layout: Layout::Planar,
                sample_type: SampleType::Signed,
                sample_rate,
            },
            pending: None,
        };

        // Decode the first frame now: it fixes bits/sample type for the
        // whole track. A file that cannot produce a single frame is
        // rejected here so the player can move on to the next one.
        let mut first = Frame::new();
        match input.decode_packet(&mut first)? {
            Read::Eof => return Err(DecodeError::NoAudioTrack),
            Read::Frame(_) => {}
        }
        input.pending = Some(first);
        Ok(input)
    }

    fn progress_at(&self, ts: u64) -> f32 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        let secs = match self.time_base {
            Some(tb) => {
                let time = tb.calc_time(ts);
                time.seconds as f64 + time.frac
            }
            None => 0.0,
        };
        (secs / self.duration_secs).clamp(0.0, 1.0) as f32
    }

    fn decode_packet(&mut self, frame: &mut Frame) -> Result<Read, DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(Read::Eof);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(DecodeError::Decode(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let progress = self.progress_at(packet.ts());
            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| DecodeError::Decode(e.to_string()))?;

            let (bits, sample_type) = fill_frame(frame, &decoded)?;
            self.format.bits = bits;
            self.format.sample_type = sample_type;
            frame.progress = progress;
            return Ok(Read::Frame(frame.size()));
        }
    }
}

impl FrameSource for Input {
    fn format(&self) -> Format {
        self.format
    }

    fn next_frame(&mut self, frame: &mut Frame) -> Result<Read, DecodeError> {
        if let Some(pending) = self.pending.take() {
            let size = pending.size();
            *frame = pending;
            return Ok(Read::Frame(size));
        }
        self.decode_packet(frame)
    }

    fn seek(&mut self, percentage: f32) -> Result<(), DecodeError> {
        if self.duration_secs <= 0.0 {
            return Ok(());
        }
        let target = self.duration_secs * percentage.clamp(0.0, 1.0) as f64;
        self.reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(target),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| DecodeError::Seek(e.to_string()))?;
        self.decoder.reset();
        self.pending = None;
        Ok(())
    }
}

/// Copy a decoded buffer into `frame` as planar little-endian bytes and
/// report the sample representation.
fn fill_frame(frame: &mut Frame, buf: &AudioBufferRef) -> Result<(Bits, SampleType), DecodeError> {
    match buf {
        AudioBufferRef::U8(buf) => {
            let (planes, samples) = shape(buf.spec().channels.count(), buf.frames());
            frame.reset_shape(planes, samples * planes)?;
            for ch in 0..planes {
                frame.plane_mut(ch).copy_from_slice(&buf.chan(ch)[..samples]);
            }
            frame.set_samples(samples);
            Ok((Bits::B8, SampleType::Unsigned))
        }
        AudioBufferRef::S16(buf) => {
            let (planes, samples) = shape(buf.spec().channels.count(), buf.frames());
            frame.reset_shape(planes, samples * 2 * planes)?;
            for ch in 0..planes {
                let plane = frame.plane_mut(ch);
                for (i, s) in buf.chan(ch).iter().enumerate() {
                    plane[i * 2..i * 2 + 2].copy_from_slice(&s.to_le_bytes());
                }
            }
            frame.set_samples(samples);
            Ok((Bits::B16, SampleType::Signed))
        }
        AudioBufferRef::S24(buf) => {
            let (planes, samples) = shape(buf.spec().channels.count(), buf.frames());
            frame.reset_shape(planes, samples * 3 * planes)?;
            for ch in 0..planes {
                let plane = frame.plane_mut(ch);
                for (i, s) in buf.chan(ch).iter().enumerate() {
                    plane[i * 3..i * 3 + 3].copy_from_slice(&s.0.to_le_bytes()[..3]);
                }
            }
            frame.set_samples(samples);
            Ok((Bits::B24, SampleType::Signed))
        }
        AudioBufferRef::S32(buf) => {
            let (planes, samples) = shape(buf.spec().channels.count(), buf.frames());
            frame.reset_shape(planes, samples * 4 * planes)?;
            for ch in 0..planes {
                let plane = frame.plane_mut(ch);
                for (i, s) in buf.chan(ch).iter().enumerate() {
                    plane[i * 4..i * 4 + 4].copy_from_slice(&s.to_le_bytes());
                }
            }
            frame.set_samples(samples);
            Ok((Bits::B32, SampleType::Signed))
        }
        AudioBufferRef::F32(buf) => {
            let (planes, samples) = shape(buf.spec().channels.count(), buf.frames());
            frame.reset_shape(planes, samples * 4 * planes)?;
            for ch in 0..planes {
                let plane = frame.plane_mut(ch);
                for (i, s) in buf.chan(ch).iter().enumerate() {
                    plane[i * 4..i * 4 + 4].copy_from_slice(&s.to_le_bytes());
                }
            }
            frame.set_samples(samples);
            Ok((Bits::B32, SampleType::Float))
        }
        AudioBufferRef::F64(buf) => {
            let (planes, samples) = shape(buf.spec().channels.count(), buf.frames());
            frame.reset_shape(planes, samples * 8 * planes)?;
            for ch in 0..planes {
                let plane = frame.plane_mut(ch);
                for (i, s) in buf.chan(ch).iter().enumerate() {
                    plane[i * 8..i * 8 + 8].copy_from_slice(&s.to_le_bytes());
                }
            }
            frame.set_samples(samples);
            Ok((Bits::B64, SampleType::Float))
        }
        AudioBufferRef::S8(_)
        | AudioBufferRef::U16(_)
        | AudioBufferRef::U24(_)
        | AudioBufferRef::U32(_) => Err(DecodeError::UnsupportedSampleFormat(
            "s8/u16/u24/u32 samples".into(),
        )),
    }
}

fn shape(channels: usize, samples: usize) -> (usize, usize) {
    (channels.min(MAX_PLANES), samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_nonexistent_file() {
        let result = Input::open(Path::new("/nonexistent/file.mp3"));
        assert!(matches!(result, Err(DecodeError::Open { .. })));
    }

    #[test]
    fn test_open_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"this is not audio").unwrap();
        assert!(Input::open(&path).is_err());
    }
}
