//! Playback engine.
//!
//! The [`Player`] owns the playback queue, its outbound event queue, the
//! output device and one worker thread. Control operations
//! (start/pause/stop/seek/next) may be called from any thread; they
//! synchronize with the worker through one mutex + condition variable.
//! The worker blocks on the condvar while there is nothing to play,
//! decodes one frame at a time under the mutex, and writes it to the
//! device *outside* the mutex: device I/O blocks for pacing and must
//! never stall a control operation.
//!
//! Shutdown is cooperative: an atomic flag checked at every loop
//! iteration, a buffer flush to unblock a pending device write, and a
//! condvar wake. The destructor joins the worker.

mod events;
mod queue;

pub use events::PlayerEvent;
pub use queue::{PlayQueue, QueueError, QueueItem};

use std::os::fd::RawFd;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::audio::device::DeviceError;
use crate::audio::input::DecodeError;
use crate::audio::{Device, Frame, FrameSource, OutputBackend, Read};
use crate::event::{EventError, EventQueue};

/// Transient decode errors are retried this many times before a track is
/// given up on.
const MAX_DECODE_RETRIES: u32 = 3;

/// Progress events go out every 128th decoded frame; anything more would
/// flood the event pipe for no visible benefit.
const PROGRESS_MASK: u32 = 0x7F;

/// Opens a path as a frame source. Injectable so tests can script decoder
/// behavior; production wires this to [`crate::audio::open_source`].
pub type SourceOpener =
    Box<dyn Fn(&Path) -> Result<Box<dyn FrameSource>, DecodeError> + Send + Sync>;

/// Player errors.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("playback queue is empty")]
    QueueEmpty,

    #[error("no queued track could be opened")]
    NoPlayableTrack,

    #[error("worker thread failed to start: {0}")]
    Spawn(String),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

struct State {
    input: Option<Box<dyn FrameSource>>,
    paused: bool,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
    queue: PlayQueue,
    events: EventQueue,
    device: Device,
    shutdown: AtomicBool,
    opener: SourceOpener,
}

/// The playback engine. One per process.
pub struct Player {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Player {
    /// Build a player around an output backend and a source opener, and
    /// spawn the worker.
    pub fn new(backend: Box<dyn OutputBackend>, opener: SourceOpener) -> Result<Self, PlayerError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                input: None,
                paused: false,
            }),
            cond: Condvar::new(),
            queue: PlayQueue::new(),
            events: EventQueue::new()?,
            device: Device::new(backend),
            shutdown: AtomicBool::new(false),
            opener,
        });

        let worker = std::thread::Builder::new()
            .name("player-worker".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || worker_loop(&shared)
            })
            .map_err(|e| PlayerError::Spawn(e.to_string()))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Production wiring: compiled-in backend + symphonia decoder.
    #[cfg(feature = "backend-cpal")]
    pub fn with_default_backend(preferred_device: Option<String>) -> Result<Self, PlayerError> {
        Self::new(
            crate::audio::backend::default_backend(preferred_device),
            Box::new(crate::audio::open_source),
        )
    }

    /// The playback queue (its own mutex; safe from any thread).
    pub fn queue(&self) -> &PlayQueue {
        &self.shared.queue
    }

    /// Outbound event queue, for draining decoded [`PlayerEvent`]s.
    pub fn events(&self) -> &EventQueue {
        &self.shared.events
    }

    /// The fd the reactor watches for player events.
    pub fn event_fd(&self) -> RawFd {
        self.shared.events.read_fd()
    }

    /// Start playback of the next queued track.
    ///
    /// No-op success when already playing. Unplayable tracks are skipped
    /// with a warning until one opens or the queue runs dry.
    pub fn start(&self) -> Result<(), PlayerError> {
        self.shared.start()
    }

    /// Toggle pause. Always emits [`PlayerEvent::Paused`]; the flag only
    /// changes while a track is open.
    pub fn pause(&self) {
        self.shared.pause()
    }

    /// Stop playback and close the input. No-op when idle.
    pub fn stop(&self) {
        self.shared.stop()
    }

    /// Seek to a fraction of the current track. No-op when idle. Queued
    /// device frames are not flushed.
    pub fn seek(&self, percentage: f32) -> Result<(), PlayerError> {
        self.shared.seek(percentage)
    }

    /// Skip to the next queued track (stop, then start).
    pub fn next(&self) -> Result<(), PlayerError> {
        self.shared.next()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        // Unblock a worker stuck in a paced device write, then wake it if
        // it sits on the condvar.
        self.shared.device.drop_buffer();
        self.shared.cond.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Shared {
    fn emit(&self, event: PlayerEvent) {
        if let Err(e) = self.events.write_record(&event.encode()) {
            tracing::warn!("Player event dropped: {e}");
        }
    }

    fn start(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        if state.input.is_some() {
            return Ok(());
        }
        if self.queue.is_empty() {
            return Err(PlayerError::QueueEmpty);
        }
        // A corrupt file must not stall the queue: keep popping until one
        // opens. Bounded by the queue length.
        while self.queue.is_filled() {
            match self.open_next(&mut state) {
                Ok(()) => {
                    self.cond.notify_one();
                    return Ok(());
                }
                Err(e) => tracing::warn!("Skipping unplayable track: {e}"),
            }
        }
        Err(PlayerError::NoPlayableTrack)
    }

    /// Pop one item and bring it up: open, read format, set up the device,
    /// announce. Called with the player mutex held; takes the queue mutex
    /// internally (this nesting is one-directional and must stay so).
    fn open_next(&self, state: &mut State) -> Result<(), PlayerError> {
        let item = self.queue.pop().ok_or(PlayerError::QueueEmpty)?;
        let source = (self.opener)(&item.path).map_err(|e| {
            tracing::warn!("Could not open '{}'.", item.path.display());
            e
        })?;
        let format = source.format();
        tracing::debug!("Detected audio format of '{}': {format}", item.name);
        self.device.setup(&format).map_err(|e| {
            tracing::warn!("Setting up device failed.");
            e
        })?;
        self.emit(PlayerEvent::Started(item.file));
        state.input = Some(source);
        state.paused = false;
        Ok(())
    }

    fn pause(&self) {
        // Emitted on both edges: the UI treats this as a toggle
        // notification, not a strict state change.
        self.emit(PlayerEvent::Paused);
        let mut state = self.state.lock();
        if state.input.is_none() {
            return;
        }
        let was_paused = state.paused;
        state.paused = !state.paused;
        if was_paused {
            self.cond.notify_one();
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if state.input.is_none() {
            return;
        }
        self.emit(PlayerEvent::Stopped);
        self.device.drop_buffer();
        // Dropping the source closes the decoder.
        state.input = None;
    }

    fn seek(&self, percentage: f32) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        let Some(input) = state.input.as_mut() else {
            return Ok(());
        };
        input.seek(percentage)?;
        self.emit(PlayerEvent::Seeked(percentage));
        Ok(())
    }

    fn next(&self) -> Result<(), PlayerError> {
        self.stop();
        self.start()
    }
}

enum DecodeOutcome {
    Frame,
    Eof,
    GiveUp,
}

/// Decode one frame with bounded retries on transient errors.
fn pull_frame(source: &mut dyn FrameSource, frame: &mut Frame, max_retries: u32) -> DecodeOutcome {
    for _ in 0..max_retries {
        match source.next_frame(frame) {
            Ok(Read::Eof) => return DecodeOutcome::Eof,
            Ok(Read::Frame(_)) => return DecodeOutcome::Frame,
            Err(e) => {
                tracing::warn!("Error while decoding frame ({e}). Trying to recover.");
            }
        }
    }
    tracing::warn!("Decoding failed {max_retries} times. Giving up on this track.");
    DecodeOutcome::GiveUp
}

fn worker_loop(shared: &Shared) {
    let mut frame = Frame::new();
    loop {
        // One track segment.
        let mut decoded: u32 = 0;
        loop {
            let mut state = shared.state.lock();
            while state.input.is_none() || state.paused {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                shared.cond.wait(&mut state);
            }
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            let Some(input) = state.input.as_mut() else {
                continue;
            };
            let outcome = pull_frame(input.as_mut(), &mut frame, MAX_DECODE_RETRIES);
            drop(state);

            match outcome {
                DecodeOutcome::Frame => {}
                DecodeOutcome::Eof | DecodeOutcome::GiveUp => break,
            }

            decoded = decoded.wrapping_add(1);
            if decoded & PROGRESS_MASK == 0 {
                shared.emit(PlayerEvent::Progress(frame.progress));
            }

            // Unlocked on purpose: the write blocks for pacing and must
            // not starve pause/stop/seek.
            if let Err(e) = shared.device.write(&frame) {
                tracing::warn!("Device write failed: {e}");
                break;
            }
        }

        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        match shared.next() {
            Ok(()) => {}
            Err(PlayerError::QueueEmpty | PlayerError::NoPlayableTrack) => {
                tracing::debug!("Queue exhausted; player idle.");
            }
            Err(e) => tracing::warn!("Advancing to next track failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{Bits, ByteOrder, Channels, Format, Layout, SampleType};
    use crate::library::FileId;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[derive(Clone, Copy)]
    enum Step {
        Frame,
        Error,
        Eof,
    }

    struct ScriptSource {
        steps: VecDeque<Step>,
    }

    impl FrameSource for ScriptSource {
        fn format(&self) -> Format {
            Format {
                bits: Bits::B8,
                byte_order: ByteOrder::LittleEndian,
                channels: Channels::Mono,
                layout: Layout::Planar,
                sample_type: SampleType::Unsigned,
                sample_rate: 8_000,
            }
        }

        fn next_frame(&mut self, frame: &mut Frame) -> Result<Read, DecodeError> {
            match self.steps.pop_front().unwrap_or(Step::Eof) {
                Step::Frame => {
                    frame.reset_shape(1, 4).unwrap();
                    frame.set_samples(4);
                    frame.progress = 0.5;
                    Ok(Read::Frame(4))
                }
                Step::Error => Err(DecodeError::Decode("scripted failure".into())),
                Step::Eof => Ok(Read::Eof),
            }
        }

        fn seek(&mut self, _percentage: f32) -> Result<(), DecodeError> {
            Ok(())
        }
    }

    struct CountingBackend {
        writes: Arc<AtomicUsize>,
    }

    impl OutputBackend for CountingBackend {
        fn setup(&mut self, _format: &Format) -> Result<(), DeviceError> {
            Ok(())
        }

        fn write(&mut self, _frame: &Frame, _format: &Format) -> Result<(), DeviceError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn drop_buffer(&mut self) {}
    }

    /// Scripts are handed out per open; `None` simulates an unopenable
    /// file.
    fn scripted_player(
        scripts: Vec<Option<Vec<Step>>>,
    ) -> (Player, Arc<AtomicUsize>) {
        let writes = Arc::new(AtomicUsize::new(0));
        let scripts = Mutex::new(VecDeque::from(scripts));
        let opener: SourceOpener = Box::new(move |_path| {
            match scripts.lock().pop_front().flatten() {
                Some(steps) => Ok(Box::new(ScriptSource {
                    steps: steps.into(),
                }) as Box<dyn FrameSource>),
                None => Err(DecodeError::NoAudioTrack),
            }
        });
        let player = Player::new(
            Box::new(CountingBackend {
                writes: writes.clone(),
            }),
            opener,
        )
        .unwrap();
        (player, writes)
    }

    fn item(id: u32) -> QueueItem {
        QueueItem {
            file: FileId::from_u32(id),
            path: PathBuf::from(format!("/fake/{id}.flac")),
            name: format!("{id}.flac"),
        }
    }

    /// Drain player events until `expected` arrived or the timeout hit.
    fn drain_events(player: &Player, expected: usize) -> Vec<PlayerEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while events.len() < expected && Instant::now() < deadline {
            match player.events().read_record() {
                Ok(Some(record)) => events.push(PlayerEvent::decode(&record).unwrap()),
                Ok(None) => std::thread::sleep(Duration::from_millis(5)),
                Err(e) => panic!("event read failed: {e}"),
            }
        }
        events
    }

    #[test]
    fn test_start_with_empty_queue_fails() {
        let (player, _) = scripted_player(vec![]);
        assert!(matches!(player.start(), Err(PlayerError::QueueEmpty)));
    }

    #[test]
    fn test_worker_recovers_from_transient_decode_errors() {
        // Two failures, then success: within the retry bound, so the track
        // plays through without advancing.
        let (player, writes) = scripted_player(vec![Some(vec![
            Step::Error,
            Step::Error,
            Step::Frame,
            Step::Frame,
            Step::Eof,
        ])]);
        player.queue().add(vec![item(0)]).unwrap();
        player.start().unwrap();

        let events = drain_events(&player, 2);
        assert_eq!(
            events,
            vec![
                PlayerEvent::Started(FileId::from_u32(0)),
                PlayerEvent::Stopped,
            ]
        );
        assert_eq!(writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retry_exhaustion_advances_to_next_track() {
        // First track always errors; trailing Frame steps prove the worker
        // gives up after exactly 3 attempts instead of asking again.
        let (player, writes) = scripted_player(vec![
            Some(vec![
                Step::Error,
                Step::Error,
                Step::Error,
                Step::Frame,
                Step::Frame,
            ]),
            Some(vec![Step::Frame, Step::Eof]),
        ]);
        player.queue().add(vec![item(0), item(1)]).unwrap();
        player.start().unwrap();

        let events = drain_events(&player, 4);
        assert_eq!(
            events,
            vec![
                PlayerEvent::Started(FileId::from_u32(0)),
                PlayerEvent::Stopped,
                PlayerEvent::Started(FileId::from_u32(1)),
                PlayerEvent::Stopped,
            ]
        );
        // Only the second track's single frame reached the device.
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unopenable_track_is_skipped() {
        let (player, _) = scripted_player(vec![None, Some(vec![Step::Frame, Step::Eof])]);
        player.queue().add(vec![item(0), item(1)]).unwrap();
        player.start().unwrap();

        let events = drain_events(&player, 1);
        assert_eq!(events, vec![PlayerEvent::Started(FileId::from_u32(1))]);
    }

    #[test]
    fn test_all_tracks_unplayable_fails() {
        let (player, _) = scripted_player(vec![None, None]);
        player.queue().add(vec![item(0), item(1)]).unwrap();
        assert!(matches!(
            player.start(),
            Err(PlayerError::NoPlayableTrack)
        ));
    }

    #[test]
    fn test_progress_throttled_to_every_128th_frame() {
        let mut steps = vec![Step::Frame; 256];
        steps.push(Step::Eof);
        let (player, writes) = scripted_player(vec![Some(steps)]);
        player.queue().add(vec![item(0)]).unwrap();
        player.start().unwrap();

        // Started + 2 progress ticks + Stopped.
        let events = drain_events(&player, 4);
        let progress = events
            .iter()
            .filter(|e| matches!(e, PlayerEvent::Progress(_)))
            .count();
        assert_eq!(progress, 2);
        assert!(matches!(events.last(), Some(PlayerEvent::Stopped)));
        assert_eq!(writes.load(Ordering::SeqCst), 256);
    }

    #[test]
    fn test_pause_always_emits_toggle_event() {
        let (player, _) = scripted_player(vec![]);
        player.pause();
        player.pause();
        let events = drain_events(&player, 2);
        assert_eq!(events, vec![PlayerEvent::Paused, PlayerEvent::Paused]);
    }

    #[test]
    fn test_stop_and_seek_are_noops_when_idle() {
        let (player, _) = scripted_player(vec![]);
        player.stop();
        player.seek(0.5).unwrap();
        assert!(player.events().read_record().unwrap().is_none());
    }
}
