//! cpal output backend.
//!
//! `setup` spawns a dedicated thread that owns the cpal stream (the stream
//! handle is not `Send`, so it must live and die on one thread). Decoded
//! frames are converted to f32 and pushed through a small bounded channel;
//! the output callback drains it. A full channel blocks `write`, which is
//! what paces the whole decode loop. `drop_buffer` bumps a generation
//! counter so the callback discards everything queued before the flush;
//! this also unblocks a writer stuck on a full channel within one callback
//! period.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::audio::device::{DeviceError, OutputBackend};
use crate::audio::format::{Bits, ByteOrder, Format, SampleType};
use crate::audio::frame::Frame;

/// Chunks of decode-loop output buffered ahead of the callback.
const CHUNK_QUEUE: usize = 8;

/// A write that cannot queue its chunk within this bound means the output
/// stalled or vanished.
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

struct Chunk {
    generation: u64,
    samples: Vec<f32>,
}

/// The one output backend compiled into default builds.
pub struct CpalBackend {
    preferred: Option<String>,
    generation: Arc<AtomicU64>,
    output: Option<Output>,
}

struct Output {
    tx: Sender<Chunk>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    rate: u32,
    channels: usize,
}

impl Drop for Output {
    fn drop(&mut self) {
        // Closing the stop channel ends the stream thread.
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl CpalBackend {
    /// `preferred_device` narrows device selection by case-insensitive
    /// name match; `None` or no match falls back to the system default.
    pub fn new(preferred_device: Option<String>) -> Self {
        Self {
            preferred: preferred_device,
            generation: Arc::new(AtomicU64::new(0)),
            output: None,
        }
    }
}

impl OutputBackend for CpalBackend {
    fn setup(&mut self, format: &Format) -> Result<(), DeviceError> {
        conversion_supported(format)?;

        // Same stream parameters: keep the running stream, just flush it.
        let reusable = self
            .output
            .as_ref()
            .is_some_and(|o| o.rate == format.sample_rate && o.channels == format.channels.count());
        if reusable {
            self.drop_buffer();
            return Ok(());
        }
        self.output = None;

        let (result_tx, result_rx) = bounded(1);
        let (chunk_tx, chunk_rx) = bounded::<Chunk>(CHUNK_QUEUE);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let preferred = self.preferred.clone();
        let generation = Arc::clone(&self.generation);
        let rate = format.sample_rate;
        let channels = format.channels.count();

        let thread = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match open_stream(preferred.as_deref(), rate, channels, chunk_rx, generation)
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = result_tx.send(Err(e));
                        return;
                    }
                };
                let _ = result_tx.send(Ok(()));
                // The stream plays until this thread is told to die.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| DeviceError::Init(e.to_string()))?;

        match result_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {
                self.output = Some(Output {
                    tx: chunk_tx,
                    stop: Some(stop_tx),
                    thread: Some(thread),
                    rate,
                    channels,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(DeviceError::Init("audio output thread did not start".into())),
        }
    }

    fn write(&mut self, frame: &Frame, format: &Format) -> Result<(), DeviceError> {
        let output = self.output.as_ref().ok_or(DeviceError::NotConfigured)?;
        let samples = interleaved_to_f32(&frame.plane(0)[..frame.size()], format)?;
        let chunk = Chunk {
            generation: self.generation.load(Ordering::Relaxed),
            samples,
        };
        match output.tx.send_timeout(chunk, WRITE_TIMEOUT) {
            Ok(()) => Ok(()),
            Err(crossbeam_channel::SendTimeoutError::Timeout(_)) => Err(DeviceError::Timeout),
            Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => {
                Err(DeviceError::Disconnected)
            }
        }
    }

    fn drop_buffer(&mut self) {
        // Queued chunks carry the old generation; the callback skips them.
        self.generation.fetch_add(1, Ordering::Relaxed);
    }
}

/// Pick the output device, preferring a configured name.
fn select_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device, DeviceError> {
    if let Some(wanted) = preferred {
        let devices = host
            .output_devices()
            .map_err(|e| DeviceError::Init(e.to_string()))?;
        let wanted_lower = wanted.to_lowercase();
        for device in devices {
            if let Ok(name) = device.name() {
                tracing::debug!("Available audio device: {name}");
                if name.to_lowercase().contains(&wanted_lower) {
                    tracing::info!("Using configured audio device: {name}");
                    return Ok(device);
                }
            }
        }
        tracing::warn!("No output device matching '{wanted}'; using default.");
    }
    host.default_output_device()
        .ok_or_else(|| DeviceError::Init("no output device found".into()))
}

fn open_stream(
    preferred: Option<&str>,
    rate: u32,
    channels: usize,
    rx: Receiver<Chunk>,
    generation: Arc<AtomicU64>,
) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = select_device(&host, preferred)?;

    let supported = device
        .default_output_config()
        .map_err(|e| DeviceError::Init(e.to_string()))?;
    let config = StreamConfig {
        channels: channels as u16,
        sample_rate: SampleRate(rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => run_stream::<f32>(&device, &config, rx, generation),
        cpal::SampleFormat::I16 => run_stream::<i16>(&device, &config, rx, generation),
        other => {
            return Err(DeviceError::UnsupportedFormat(format!(
                "device sample format {other:?}"
            )));
        }
    }
    .map_err(|e| DeviceError::UnsupportedFormat(e.to_string()))?;

    stream
        .play()
        .map_err(|e| DeviceError::Init(e.to_string()))?;
    Ok(stream)
}

fn run_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    rx: Receiver<Chunk>,
    generation: Arc<AtomicU64>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    // Partially consumed chunk carried across callbacks.
    let mut pending: Option<(Chunk, usize)> = None;

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut pos = 0;
            while pos < data.len() {
                if pending.is_none() {
                    match rx.try_recv() {
                        Ok(chunk) => {
                            if chunk.generation != generation.load(Ordering::Relaxed) {
                                continue; // flushed before it played
                            }
                            pending = Some((chunk, 0));
                        }
                        Err(_) => break,
                    }
                }
                let Some((chunk, offset)) = pending.as_mut() else {
                    break;
                };
                let finished = {
                    if chunk.generation != generation.load(Ordering::Relaxed) {
                        true
                    } else {
                        while pos < data.len() && *offset < chunk.samples.len() {
                            data[pos] = T::from_sample(chunk.samples[*offset]);
                            pos += 1;
                            *offset += 1;
                        }
                        *offset >= chunk.samples.len()
                    }
                };
                if finished {
                    pending = None;
                }
            }
            // Underrun or idle: silence.
            for sample in &mut data[pos..] {
                *sample = T::from_sample(0.0f32);
            }
        },
        |err| tracing::warn!("audio stream error: {err}"),
        None,
    )
}

fn conversion_supported(format: &Format) -> Result<(), DeviceError> {
    if format.byte_order != ByteOrder::LittleEndian {
        return Err(DeviceError::UnsupportedFormat(format.to_string()));
    }
    match (format.bits, format.sample_type) {
        (Bits::B8, SampleType::Unsigned)
        | (Bits::B16, SampleType::Signed)
        | (Bits::B24, SampleType::Signed)
        | (Bits::B32, SampleType::Signed)
        | (Bits::B32, SampleType::Float)
        | (Bits::B64, SampleType::Float) => Ok(()),
        _ => Err(DeviceError::UnsupportedFormat(format.to_string())),
    }
}

/// Convert interleaved little-endian PCM bytes to f32 samples in [-1, 1].
fn interleaved_to_f32(bytes: &[u8], format: &Format) -> Result<Vec<f32>, DeviceError> {
    let samples = match (format.bits, format.sample_type) {
        (Bits::B8, SampleType::Unsigned) => bytes
            .iter()
            .map(|&b| (b as f32 - 128.0) / 128.0)
            .collect(),
        (Bits::B16, SampleType::Signed) => bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
            .collect(),
        (Bits::B24, SampleType::Signed) => bytes
            .chunks_exact(3)
            .map(|c| {
                let ext = if c[2] & 0x80 != 0 { 0xFF } else { 0 };
                i32::from_le_bytes([c[0], c[1], c[2], ext]) as f32 / 8_388_608.0
            })
            .collect(),
        (Bits::B32, SampleType::Signed) => bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / 2_147_483_648.0)
            .collect(),
        (Bits::B32, SampleType::Float) => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        (Bits::B64, SampleType::Float) => bytes
            .chunks_exact(8)
            .map(|c| {
                f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
            })
            .collect(),
        _ => return Err(DeviceError::UnsupportedFormat(format.to_string())),
    };
    Ok(samples)
}
