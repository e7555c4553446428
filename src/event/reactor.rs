//! Single-threaded `select(2)` reactor.
//!
//! The reactor owns a fixed-capacity table of `(fd, callback)` pairs and
//! dispatches ready callbacks in registration order. One tick waits at most
//! [`TICK_SECS`] seconds so the loop stays responsive to exit requests even
//! with no fd activity. Dispatch is strictly cooperative: a callback that
//! never returns blocks the whole loop.
//!
//! Exactly one reactor may exist per process. Construction installs
//! SIGINT/SIGTERM delivery through a self-pipe that the loop watches like
//! any other fd; before a reactor exists the default disposition applies
//! and either signal terminates the process.

use std::cell::Cell;
use std::io;
use std::ops::ControlFlow;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{EventError, EventQueue};

/// Upper bound for one `select` wait.
const TICK_SECS: libc::time_t = 10;

/// Callback bound to a registered fd. Receives the caller's context and a
/// control handle for requesting loop exit.
pub type Callback<C> = Box<dyn FnMut(&mut C, &ReactorCtl)>;

static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Cloneable handle into the running reactor, handed to every callback.
#[derive(Clone)]
pub struct ReactorCtl {
    state: Rc<CtlState>,
}

struct CtlState {
    running: Cell<bool>,
    exit: Cell<bool>,
}

impl ReactorCtl {
    fn new() -> Self {
        Self {
            state: Rc::new(CtlState {
                running: Cell::new(false),
                exit: Cell::new(false),
            }),
        }
    }

    /// Ask the loop to stop after the current tick. No-op unless the loop
    /// is running, so a stray call outside `run` has no delayed effect.
    pub fn request_exit(&self) {
        if self.state.running.get() {
            self.state.exit.set(true);
        }
    }

    fn exit_requested(&self) -> bool {
        self.state.exit.get()
    }

    #[cfg(test)]
    pub(crate) fn exit_flag(&self) -> bool {
        self.state.exit.get()
    }
}

struct Handler<C> {
    fd: RawFd,
    func: Callback<C>,
}

/// The event loop. Generic over the context type passed to callbacks.
pub struct Reactor<C> {
    handlers: Vec<Handler<C>>,
    capacity: usize,
    max_fd: RawFd,
    ctl: ReactorCtl,
    _signal_pipe: EventQueue,
    signal_ids: Vec<signal_hook::SigId>,
}

impl<C> Reactor<C> {
    /// Create the process's reactor with room for `capacity` fds (the
    /// signal self-pipe does not count against it).
    ///
    /// Fails if a reactor already exists.
    pub fn new(capacity: usize) -> Result<Self, EventError> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EventError::LoopActive);
        }

        let signal_pipe = EventQueue::new().inspect_err(|_| ACTIVE.store(false, Ordering::SeqCst))?;
        let mut signal_ids = Vec::with_capacity(2);
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            match signal_hook::low_level::pipe::register_raw(signal, signal_pipe.write_fd()) {
                Ok(id) => signal_ids.push(id),
                Err(e) => {
                    for id in signal_ids {
                        signal_hook::low_level::unregister(id);
                    }
                    ACTIVE.store(false, Ordering::SeqCst);
                    return Err(EventError::Os(e));
                }
            }
        }

        let signal_fd = signal_pipe.read_fd();
        let mut reactor = Self {
            handlers: Vec::with_capacity(capacity + 1),
            capacity,
            max_fd: 0,
            ctl: ReactorCtl::new(),
            _signal_pipe: signal_pipe,
            signal_ids,
        };
        reactor.push_handler(
            signal_fd,
            Box::new(move |_ctx, ctl| {
                drain_raw(signal_fd);
                tracing::info!("Caught termination signal. Exiting main loop.");
                ctl.request_exit();
            }),
        );
        Ok(reactor)
    }

    /// Bind `callback` to `fd`. Fails once the fixed capacity is used up.
    pub fn register(&mut self, fd: RawFd, callback: Callback<C>) -> Result<(), EventError> {
        // Slot 0 is the signal pipe.
        if self.handlers.len() >= self.capacity + 1 {
            return Err(EventError::CapacityExhausted(self.capacity));
        }
        self.push_handler(fd, callback);
        Ok(())
    }

    fn push_handler(&mut self, fd: RawFd, func: Callback<C>) {
        if fd > self.max_fd {
            self.max_fd = fd;
        }
        self.handlers.push(Handler { fd, func });
    }

    /// Control handle, usable from outside a callback as well.
    pub fn ctl(&self) -> ReactorCtl {
        self.ctl.clone()
    }

    /// Run until exit is requested or `select` reports a hard error.
    pub fn run(&mut self, ctx: &mut C) {
        self.ctl.state.running.set(true);
        self.ctl.state.exit.set(false);
        loop {
            if self.tick(ctx).is_break() {
                break;
            }
        }
        self.ctl.state.running.set(false);
        self.ctl.state.exit.set(false);
    }

    fn tick(&mut self, ctx: &mut C) -> ControlFlow<()> {
        let mut rfds: libc::fd_set = unsafe { std::mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut rfds);
            for handler in &self.handlers {
                libc::FD_SET(handler.fd, &mut rfds);
            }
        }

        let mut timeout = libc::timeval {
            tv_sec: TICK_SECS,
            tv_usec: 0,
        };

        let ready = unsafe {
            libc::select(
                self.max_fd + 1,
                &mut rfds,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut timeout,
            )
        };
        if ready < 0 {
            let err = io::Error::last_os_error();
            // Signals interrupt select; that is not a reason to die.
            if err.kind() == io::ErrorKind::Interrupted {
                return ControlFlow::Continue(());
            }
            tracing::error!("select failed: {err}");
            return ControlFlow::Break(());
        }
        if ready == 0 {
            return ControlFlow::Continue(());
        }

        let ctl = self.ctl.clone();
        for handler in &mut self.handlers {
            if unsafe { libc::FD_ISSET(handler.fd, &rfds) } {
                (handler.func)(ctx, &ctl);
            }
            // Checked after every callback so a handler that requests exit
            // stops dispatch before the next one runs.
            if ctl.exit_requested() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

impl<C> Drop for Reactor<C> {
    fn drop(&mut self) {
        for id in self.signal_ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
        ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// Drain whatever bytes are pending on a raw (non-record) fd, such as the
/// signal self-pipe.
fn drain_raw(fd: RawFd) {
    let mut buf = [0u8; 64];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n <= 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Record;
    use parking_lot::Mutex;

    // The process-singleton invariant makes reactor tests mutually
    // exclusive.
    static LOCK: Mutex<()> = Mutex::new(());

    struct Counts {
        first: usize,
        second: usize,
    }

    #[test]
    fn test_single_reactor_per_process() {
        let _guard = LOCK.lock();
        let first = Reactor::<()>::new(1).unwrap();
        assert!(matches!(
            Reactor::<()>::new(1),
            Err(EventError::LoopActive)
        ));
        drop(first);
        // Dropping the reactor frees the slot again.
        assert!(Reactor::<()>::new(1).is_ok());
    }

    #[test]
    fn test_capacity_exhausted() {
        let _guard = LOCK.lock();
        let queue_a = EventQueue::new().unwrap();
        let queue_b = EventQueue::new().unwrap();
        let mut reactor = Reactor::<()>::new(1).unwrap();
        reactor
            .register(queue_a.read_fd(), Box::new(|_, _| {}))
            .unwrap();
        assert!(matches!(
            reactor.register(queue_b.read_fd(), Box::new(|_, _| {})),
            Err(EventError::CapacityExhausted(1))
        ));
    }

    #[test]
    fn test_exit_stops_dispatch_mid_tick() {
        let _guard = LOCK.lock();
        let queue_a = EventQueue::new().unwrap();
        let queue_b = EventQueue::new().unwrap();

        // Both fds are ready before the tick starts; the first callback
        // requests exit, so the second must never run.
        queue_a.write_record(&Record::new(0, &[]).unwrap()).unwrap();
        queue_b.write_record(&Record::new(0, &[]).unwrap()).unwrap();

        let mut reactor = Reactor::<Counts>::new(2).unwrap();
        reactor
            .register(
                queue_a.read_fd(),
                Box::new(|counts: &mut Counts, ctl| {
                    counts.first += 1;
                    ctl.request_exit();
                }),
            )
            .unwrap();
        reactor
            .register(
                queue_b.read_fd(),
                Box::new(|counts: &mut Counts, _| {
                    counts.second += 1;
                }),
            )
            .unwrap();

        let mut counts = Counts { first: 0, second: 0 };
        reactor.run(&mut counts);
        assert_eq!(counts.first, 1);
        assert_eq!(counts.second, 0);
    }

    #[test]
    fn test_request_exit_is_noop_when_idle() {
        let _guard = LOCK.lock();
        let reactor = Reactor::<()>::new(1).unwrap();
        let ctl = reactor.ctl();
        ctl.request_exit();
        assert!(!ctl.exit_flag());
    }
}
