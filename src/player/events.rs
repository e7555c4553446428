//! Player lifecycle events and their wire codec.

use crate::event::{Record, WireError};
use crate::library::FileId;

const TAG_PAUSED: u32 = 0;
const TAG_PROGRESS: u32 = 1;
const TAG_STARTED: u32 = 2;
const TAG_STOPPED: u32 = 3;
const TAG_SEEKED: u32 = 4;

/// Events the player emits towards the main loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// Pause was toggled (either direction).
    Paused,
    /// Position within the current track, throttled by the worker.
    Progress(f32),
    /// Playback of a track began.
    Started(FileId),
    /// Playback stopped (explicitly or at end of track).
    Stopped,
    /// A seek was performed to this fraction.
    Seeked(f32),
}

impl PlayerEvent {
    /// Serialize into one wire record.
    pub fn encode(&self) -> Record {
        let record = match self {
            PlayerEvent::Paused => Record::new(TAG_PAUSED, &[]),
            PlayerEvent::Progress(fraction) => {
                Record::new(TAG_PROGRESS, &fraction.to_le_bytes())
            }
            PlayerEvent::Started(file) => Record::new(TAG_STARTED, &file.to_u32().to_le_bytes()),
            PlayerEvent::Stopped => Record::new(TAG_STOPPED, &[]),
            PlayerEvent::Seeked(fraction) => Record::new(TAG_SEEKED, &fraction.to_le_bytes()),
        };
        record.expect("player event payloads fit the record")
    }

    /// Deserialize one wire record.
    pub fn decode(record: &Record) -> Result<Self, WireError> {
        let payload = record.payload();
        let le_f32 = |p: &[u8]| f32::from_le_bytes([p[0], p[1], p[2], p[3]]);
        let le_u32 = |p: &[u8]| u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
        match record.tag() {
            TAG_PAUSED => Ok(PlayerEvent::Paused),
            TAG_PROGRESS => Ok(PlayerEvent::Progress(le_f32(payload))),
            TAG_STARTED => Ok(PlayerEvent::Started(FileId::from_u32(le_u32(payload)))),
            TAG_STOPPED => Ok(PlayerEvent::Stopped),
            TAG_SEEKED => Ok(PlayerEvent::Seeked(le_f32(payload))),
            tag => Err(WireError::UnknownTag(tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_variants() {
        let events = [
            PlayerEvent::Paused,
            PlayerEvent::Progress(0.25),
            PlayerEvent::Started(FileId::from_u32(17)),
            PlayerEvent::Stopped,
            PlayerEvent::Seeked(0.75),
        ];
        for event in events {
            assert_eq!(PlayerEvent::decode(&event.encode()).unwrap(), event);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let record = Record::new(999, &[]).unwrap();
        assert!(matches!(
            PlayerEvent::decode(&record),
            Err(WireError::UnknownTag(999))
        ));
    }
}
