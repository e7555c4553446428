//! Static description of a PCM stream.

use std::fmt;

/// Sample bit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bits {
    B8,
    B16,
    B24,
    B32,
    B64,
}

impl Bits {
    /// Bits per sample.
    pub fn count(self) -> u32 {
        match self {
            Bits::B8 => 8,
            Bits::B16 => 16,
            Bits::B24 => 24,
            Bits::B32 => 32,
            Bits::B64 => 64,
        }
    }

    /// Bytes per sample as stored in a frame (24-bit samples are packed
    /// into 3 bytes).
    pub fn bytes(self) -> usize {
        match self {
            Bits::B8 => 1,
            Bits::B16 => 2,
            Bits::B24 => 3,
            Bits::B32 => 4,
            Bits::B64 => 8,
        }
    }
}

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::LittleEndian;
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::BigEndian;
}

/// Channel count (mono or stereo only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

/// Buffer layout of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One buffer per channel.
    Planar,
    /// Channels alternate sample by sample in one buffer.
    Interleaved,
}

/// Numeric interpretation of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Unsigned,
    Signed,
    Float,
}

/// Full description of a PCM stream. Populated once per track, compared
/// field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    pub bits: Bits,
    pub byte_order: ByteOrder,
    pub channels: Channels,
    pub layout: Layout,
    pub sample_type: SampleType,
    pub sample_rate: u32,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sample_type = match self.sample_type {
            SampleType::Unsigned => "uint",
            SampleType::Signed => "sint",
            SampleType::Float => "float",
        };
        let layout = match self.layout {
            Layout::Planar => "planar",
            Layout::Interleaved => "interleaved",
        };
        let byte_order = match self.byte_order {
            ByteOrder::LittleEndian => "little endian",
            ByteOrder::BigEndian => "big endian",
        };
        write!(
            f,
            "{} bit {sample_type}, {} ch, {layout}, {byte_order}, {} Hz",
            self.bits.count(),
            self.channels.count(),
            self.sample_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_display() {
        let format = Format {
            bits: Bits::B16,
            byte_order: ByteOrder::LittleEndian,
            channels: Channels::Stereo,
            layout: Layout::Planar,
            sample_type: SampleType::Signed,
            sample_rate: 44_100,
        };
        assert_eq!(
            format.to_string(),
            "16 bit sint, 2 ch, planar, little endian, 44100 Hz"
        );
    }

    #[test]
    fn test_sample_widths() {
        assert_eq!(Bits::B8.bytes(), 1);
        assert_eq!(Bits::B24.bytes(), 3);
        assert_eq!(Bits::B64.bytes(), 8);
        assert_eq!(Bits::B24.count(), 24);
    }
}
