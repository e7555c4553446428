//! Interactive control surface.
//!
//! A small reader thread turns stdin lines into typed [`ControlEvent`]s
//! and writes them into its own event queue; the reactor picks them up on
//! the main thread. The commands mirror the player's key bindings
//! one-to-one: add (search + enqueue), pause, next, seek, restart, clear,
//! quit.

use std::io::BufRead;
use std::os::fd::RawFd;
use std::sync::Arc;

use crate::event::{EventError, EventQueue, PAYLOAD_SIZE, Record, WireError};

const TAG_SEARCH: u32 = 0;
const TAG_PAUSE: u32 = 1;
const TAG_NEXT: u32 = 2;
const TAG_SEEK: u32 = 3;
const TAG_CLEAR: u32 = 4;
const TAG_QUIT: u32 = 5;

/// Commands arriving from the user.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Search the library and append the result to the queue.
    Search(String),
    Pause,
    Next,
    /// Seek to a fraction of the current track.
    Seek(f32),
    Clear,
    Quit,
}

impl ControlEvent {
    /// Serialize into one wire record. Fails when a search string does not
    /// fit the fixed payload (the event is then dropped, like any other
    /// oversized write).
    pub fn encode(&self) -> Result<Record, EventError> {
        match self {
            ControlEvent::Search(query) => {
                let bytes = query.as_bytes();
                if bytes.len() > PAYLOAD_SIZE - 1 {
                    return Err(EventError::PayloadTooLarge(bytes.len() + 1));
                }
                let mut payload = Vec::with_capacity(bytes.len() + 1);
                payload.push(bytes.len() as u8);
                payload.extend_from_slice(bytes);
                Record::new(TAG_SEARCH, &payload)
            }
            ControlEvent::Pause => Record::new(TAG_PAUSE, &[]),
            ControlEvent::Next => Record::new(TAG_NEXT, &[]),
            ControlEvent::Seek(fraction) => Record::new(TAG_SEEK, &fraction.to_le_bytes()),
            ControlEvent::Clear => Record::new(TAG_CLEAR, &[]),
            ControlEvent::Quit => Record::new(TAG_QUIT, &[]),
        }
    }

    /// Deserialize one wire record.
    pub fn decode(record: &Record) -> Result<Self, WireError> {
        let payload = record.payload();
        match record.tag() {
            TAG_SEARCH => {
                let len = payload[0] as usize;
                let bytes = payload
                    .get(1..1 + len)
                    .ok_or(WireError::Malformed(TAG_SEARCH))?;
                let query = std::str::from_utf8(bytes)
                    .map_err(|_| WireError::Malformed(TAG_SEARCH))?;
                Ok(ControlEvent::Search(query.to_string()))
            }
            TAG_PAUSE => Ok(ControlEvent::Pause),
            TAG_NEXT => Ok(ControlEvent::Next),
            TAG_SEEK => Ok(ControlEvent::Seek(f32::from_le_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ]))),
            TAG_CLEAR => Ok(ControlEvent::Clear),
            TAG_QUIT => Ok(ControlEvent::Quit),
            tag => Err(WireError::UnknownTag(tag)),
        }
    }
}

/// Parse one input line. `None` for blank lines and unknown commands.
pub(crate) fn parse_command(line: &str) -> Option<ControlEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command {
        "add" | "a" if !rest.is_empty() => Some(ControlEvent::Search(rest.to_string())),
        "pause" | "p" => Some(ControlEvent::Pause),
        "next" | "n" => Some(ControlEvent::Next),
        "seek" | "s" => {
            let percent: f32 = rest.parse().ok()?;
            Some(ControlEvent::Seek((percent / 100.0).clamp(0.0, 1.0)))
        }
        "restart" | "r" => Some(ControlEvent::Seek(0.0)),
        "clear" | "c" => Some(ControlEvent::Clear),
        "quit" | "q" => Some(ControlEvent::Quit),
        _ => None,
    }
}

/// Handle to the stdin reader thread and its event queue.
pub struct Control {
    events: Arc<EventQueue>,
}

impl Control {
    /// Spawn the reader thread.
    ///
    /// The thread is detached: it blocks in stdin reads that cannot be
    /// interrupted portably, and simply dies with the process. Closing
    /// stdin sends a final Quit.
    pub fn spawn() -> Result<Self, EventError> {
        let events = Arc::new(EventQueue::new()?);
        let writer = Arc::clone(&events);
        std::thread::Builder::new()
            .name("control-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    match parse_command(&line) {
                        Some(event) => send(&writer, &event),
                        None => {
                            if !line.trim().is_empty() {
                                tracing::warn!("Unknown command '{}'.", line.trim());
                            }
                        }
                    }
                }
                send(&writer, &ControlEvent::Quit);
            })
            .map_err(EventError::Os)?;
        Ok(Self { events })
    }

    /// The fd the reactor watches for control events.
    pub fn event_fd(&self) -> RawFd {
        self.events.read_fd()
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }
}

fn send(queue: &EventQueue, event: &ControlEvent) {
    match event.encode() {
        Ok(record) => {
            if let Err(e) = queue.write_record(&record) {
                tracing::warn!("Control event dropped: {e}");
            }
        }
        Err(e) => tracing::warn!("Cannot send command: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("add pink floyd"),
            Some(ControlEvent::Search("pink floyd".to_string()))
        );
        assert_eq!(
            parse_command("a floyd"),
            Some(ControlEvent::Search("floyd".to_string()))
        );
        assert_eq!(parse_command("pause"), Some(ControlEvent::Pause));
        assert_eq!(parse_command("n"), Some(ControlEvent::Next));
        assert_eq!(parse_command("seek 50"), Some(ControlEvent::Seek(0.5)));
        assert_eq!(parse_command("restart"), Some(ControlEvent::Seek(0.0)));
        assert_eq!(parse_command("clear"), Some(ControlEvent::Clear));
        assert_eq!(parse_command("q"), Some(ControlEvent::Quit));
    }

    #[test]
    fn test_parse_rejects_junk() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("   "), None);
        assert_eq!(parse_command("dance"), None);
        assert_eq!(parse_command("add"), None); // search needs keywords
        assert_eq!(parse_command("seek much"), None);
    }

    #[test]
    fn test_seek_percentage_clamped() {
        assert_eq!(parse_command("seek 150"), Some(ControlEvent::Seek(1.0)));
        assert_eq!(parse_command("seek -5"), Some(ControlEvent::Seek(0.0)));
    }

    #[test]
    fn test_round_trip_all_variants() {
        let events = [
            ControlEvent::Search("miles davis".to_string()),
            ControlEvent::Pause,
            ControlEvent::Next,
            ControlEvent::Seek(0.33),
            ControlEvent::Clear,
            ControlEvent::Quit,
        ];
        for event in events {
            let record = event.encode().unwrap();
            assert_eq!(ControlEvent::decode(&record).unwrap(), event);
        }
    }

    #[test]
    fn test_oversized_search_fails_encode() {
        let event = ControlEvent::Search("x".repeat(PAYLOAD_SIZE));
        assert!(matches!(
            event.encode(),
            Err(EventError::PayloadTooLarge(_))
        ));
    }
}
