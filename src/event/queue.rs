//! Pipe-backed queue of fixed-size tagged event records.
//!
//! Each queue is one unidirectional pipe with both ends set non-blocking.
//! A record is written with a single `write(2)` call; since the record is
//! far below `PIPE_BUF`, the kernel writes it atomically and readers never
//! observe a torn record. A full pipe fails the write instead of blocking:
//! an event may be dropped under backpressure but a producer thread is
//! never stalled by a slow consumer.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use super::EventError;

/// Total size of one wire record, including the leading tag.
pub const RECORD_SIZE: usize = 64;

/// Payload bytes available after the `u32` tag.
pub const PAYLOAD_SIZE: usize = RECORD_SIZE - 4;

/// One fixed-size tagged record: `u32` little-endian tag + payload,
/// zero-padded to [`RECORD_SIZE`].
#[derive(Clone, Copy)]
pub struct Record {
    bytes: [u8; RECORD_SIZE],
}

impl Record {
    /// Build a record from a tag and a payload of at most [`PAYLOAD_SIZE`]
    /// bytes. The remainder of the record is zeroed.
    pub fn new(tag: u32, payload: &[u8]) -> Result<Self, EventError> {
        if payload.len() > PAYLOAD_SIZE {
            return Err(EventError::PayloadTooLarge(payload.len()));
        }
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[..4].copy_from_slice(&tag.to_le_bytes());
        bytes[4..4 + payload.len()].copy_from_slice(payload);
        Ok(Self { bytes })
    }

    /// The record's type tag.
    pub fn tag(&self) -> u32 {
        u32::from_le_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]])
    }

    /// The payload bytes (zero-padded).
    pub fn payload(&self) -> &[u8] {
        &self.bytes[4..]
    }
}

/// A non-blocking pipe carrying [`Record`]s.
///
/// Writing from multiple threads is safe (each record is one atomic
/// `write(2)`); reading is meant for the single reactor thread.
pub struct EventQueue {
    read: OwnedFd,
    write: OwnedFd,
}

impl EventQueue {
    /// Open the pipe and set both ends `O_NONBLOCK`.
    ///
    /// Fails when the process is out of file descriptors.
    pub fn new() -> Result<Self, EventError> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(EventError::Os(io::Error::last_os_error()));
        }
        // Wrap immediately so the fds are closed on any later error.
        let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };
        set_nonblocking(read.as_raw_fd())?;
        set_nonblocking(write.as_raw_fd())?;
        Ok(Self { read, write })
    }

    /// The fd to hand to the reactor.
    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    /// The producer-side fd (signal self-pipe registration needs it).
    pub fn write_fd(&self) -> RawFd {
        self.write.as_raw_fd()
    }

    /// Write one record with a single syscall.
    ///
    /// [`EventError::Dropped`] means the pipe was full; the caller should
    /// log the lost event and continue.
    pub fn write_record(&self, record: &Record) -> Result<(), EventError> {
        let n = unsafe {
            libc::write(
                self.write.as_raw_fd(),
                record.bytes.as_ptr() as *const libc::c_void,
                RECORD_SIZE,
            )
        };
        if n == RECORD_SIZE as isize {
            return Ok(());
        }
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(EventError::Dropped);
            }
            return Err(EventError::Os(err));
        }
        // 0 <= n < RECORD_SIZE cannot happen for a sub-PIPE_BUF write, but
        // the record would be torn, so treat it as lost.
        Err(EventError::Dropped)
    }

    /// Read exactly one record, or `None` when the queue is drained (or the
    /// write end is gone). A torn record yields [`EventError::ShortRead`];
    /// the partial bytes are already consumed, so the caller just logs it.
    pub fn read_record(&self) -> Result<Option<Record>, EventError> {
        let mut bytes = [0u8; RECORD_SIZE];
        let n = unsafe {
            libc::read(
                self.read.as_raw_fd(),
                bytes.as_mut_ptr() as *mut libc::c_void,
                RECORD_SIZE,
            )
        };
        if n == RECORD_SIZE as isize {
            return Ok(Some(Record { bytes }));
        }
        if n == 0 {
            return Ok(None);
        }
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(EventError::Os(err));
        }
        Err(EventError::ShortRead(n as usize))
    }
}

fn set_nonblocking(fd: RawFd) -> Result<(), EventError> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(EventError::Os(io::Error::last_os_error()));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(EventError::Os(io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_zero_padding() {
        let record = Record::new(7, &[1, 2, 3]).unwrap();
        assert_eq!(record.tag(), 7);
        assert_eq!(&record.payload()[..3], &[1, 2, 3]);
        assert!(record.payload()[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_record_payload_too_large() {
        let payload = [0u8; PAYLOAD_SIZE + 1];
        assert!(matches!(
            Record::new(0, &payload),
            Err(EventError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_pipe_round_trip() {
        let queue = EventQueue::new().unwrap();
        let record = Record::new(42, &0.5f32.to_le_bytes()).unwrap();
        queue.write_record(&record).unwrap();

        let read = queue.read_record().unwrap().expect("one record queued");
        assert_eq!(read.tag(), 42);
        assert_eq!(&read.payload()[..4], &0.5f32.to_le_bytes());
        // Drained now.
        assert!(queue.read_record().unwrap().is_none());
    }

    #[test]
    fn test_records_arrive_in_order() {
        let queue = EventQueue::new().unwrap();
        for tag in 0..16 {
            queue.write_record(&Record::new(tag, &[]).unwrap()).unwrap();
        }
        for tag in 0..16 {
            assert_eq!(queue.read_record().unwrap().unwrap().tag(), tag);
        }
    }

    #[test]
    fn test_full_pipe_drops_event() {
        let queue = EventQueue::new().unwrap();
        let record = Record::new(1, &[]).unwrap();
        // A pipe holds a finite number of records; writing must eventually
        // fail with Dropped instead of blocking the producer.
        let mut dropped = false;
        for _ in 0..1_000_000 {
            match queue.write_record(&record) {
                Ok(()) => {}
                Err(EventError::Dropped) => {
                    dropped = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(dropped);
        // The queue still drains normally afterwards.
        assert_eq!(queue.read_record().unwrap().unwrap().tag(), 1);
    }
}
