//! Audio pipeline building blocks: frame/format value types, the decoder
//! wrapper ([`FrameSource`]) and the output device ([`Device`] plus one
//! compiled-in [`OutputBackend`]).

pub mod backend;
pub mod device;
pub mod format;
pub mod frame;
pub mod input;

pub use device::{Device, DeviceError, OutputBackend};
pub use format::{Bits, ByteOrder, Channels, Format, Layout, SampleType};
pub use frame::{Frame, FrameError, MAX_PLANES};
pub use input::{DecodeError, FrameSource, Read, open_source};
