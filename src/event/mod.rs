//! Typed event plumbing between threads.
//!
//! Producers (player worker, control thread, signal handler) write
//! fixed-size tagged records into pipe-backed [`EventQueue`]s; the
//! single-threaded [`Reactor`] on the main thread multiplexes over all
//! read ends with `select(2)` and dispatches to registered callbacks.
//!
//! Raw records exist only at the queue boundary. Everything above it works
//! with real enums ([`crate::player::PlayerEvent`],
//! [`crate::control::ControlEvent`]) and their wire codecs.

mod queue;
mod reactor;

pub use queue::{EventQueue, PAYLOAD_SIZE, RECORD_SIZE, Record};
pub use reactor::{Callback, Reactor, ReactorCtl};

/// Errors of the event queue and reactor.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Payload does not fit the fixed record size.
    #[error("event payload of {0} bytes exceeds record capacity")]
    PayloadTooLarge(usize),

    /// The pipe was full (or a short write happened); the record is lost.
    /// Callers log this and move on; there is no built-in retry.
    #[error("event dropped: pipe full")]
    Dropped,

    /// A partial record was read. Protocol violation: log and discard.
    #[error("torn event record: read {0} of {RECORD_SIZE} bytes")]
    ShortRead(usize),

    /// Only one reactor may exist per process.
    #[error("event loop already active in this process")]
    LoopActive,

    /// The reactor's fixed handler table is full.
    #[error("event loop capacity ({0}) exhausted")]
    CapacityExhausted(usize),

    /// Underlying OS error (pipe creation, fcntl, select, signal setup).
    #[error(transparent)]
    Os(#[from] std::io::Error),
}

/// Errors decoding a wire record into a typed event.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unknown event tag {0}")]
    UnknownTag(u32),

    #[error("malformed event payload for tag {0}")]
    Malformed(u32),
}
