use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backend::{BoundSession, CaptureBackend, FrameHandler, FrameSource};
use crate::encode::{EncodedImage, ImageEncoder};
use crate::error::{CaptureError, CaptureResult};

/// Lifecycle of a single capture attempt.
///
/// `Idle -> ItemBound -> Capturing -> {Completed | TimedOut | Failed} -> Disposed`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ItemBound,
    Capturing,
    Completed,
    TimedOut,
    Failed,
    Disposed,
}

#[derive(Debug)]
pub enum SessionOutcome {
    Completed(EncodedImage),
    TimedOut,
}

/// What the frame handler observed, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub arrivals: u64,
    pub got_frame: bool,
    pub first_frame_after: Option<Duration>,
    pub content_size: Option<(u32, u32)>,
}

type Completion = CaptureResult<EncodedImage>;

/// Single-resolution signal. Whoever takes the sender first owns the
/// outcome; every later claim gets `None`.
struct OneShot<T> {
    sender: Mutex<Option<SyncSender<T>>>,
}

impl<T> OneShot<T> {
    fn new() -> (Arc<Self>, Receiver<T>) {
        let (sender, receiver) = mpsc::sync_channel(1);
        (
            Arc::new(Self {
                sender: Mutex::new(Some(sender)),
            }),
            receiver,
        )
    }

    fn claim(&self) -> Option<SyncSender<T>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Owns the platform session; tears it down exactly once no matter how
/// many paths ask.
struct SessionLifetime<S> {
    disposed: AtomicBool,
    session: Mutex<Option<S>>,
}

impl<S: BoundSession> SessionLifetime<S> {
    fn new(session: S) -> Self {
        Self {
            disposed: AtomicBool::new(false),
            session: Mutex::new(Some(session)),
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Option<S>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` for the call that actually released the session.
    fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Taking the session also drops the frame handler it holds, which
        // breaks the handler -> lifetime reference cycle.
        let session = self.lock().take();
        if let Some(session) = session {
            session.close();
        }
        true
    }
}

#[derive(Default)]
struct ArrivalStats {
    arrivals: AtomicU64,
    started_at: OnceLock<Instant>,
    first_frame: OnceLock<(Duration, (u32, u32))>,
}

impl ArrivalStats {
    fn record_arrival(&self) -> u64 {
        self.arrivals.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn record_first_frame(&self, content_size: (u32, u32)) {
        let elapsed = self
            .started_at
            .get()
            .map(Instant::elapsed)
            .unwrap_or_default();
        let _ = self.first_frame.set((elapsed, content_size));
    }

    fn snapshot(&self) -> SessionStats {
        let first = self.first_frame.get().copied();
        SessionStats {
            arrivals: self.arrivals.load(Ordering::Acquire),
            got_frame: first.is_some(),
            first_frame_after: first.map(|(elapsed, _)| elapsed),
            content_size: first.map(|(_, size)| size),
        }
    }
}

/// One frame pool plus capture session bound to one item, raced against a
/// timeout.
///
/// The frame handler encodes the first usable frame and resolves the
/// completion; the timeout path resolves it with nothing. Either way the
/// platform session is closed once, and nothing is processed afterwards.
pub struct CaptureSession<S: BoundSession> {
    state: SessionState,
    lifetime: Arc<SessionLifetime<S>>,
    completion: Arc<OneShot<Completion>>,
    receiver: Receiver<Completion>,
    stats: Arc<ArrivalStats>,
}

impl<S: BoundSession> CaptureSession<S> {
    /// Create the frame pool and session for `item` and register the frame
    /// handler. Nothing is captured until [`start`](Self::start).
    pub fn bind<B>(
        backend: &B,
        device: &Arc<B::Device>,
        item: &B::Item,
        encoder: ImageEncoder,
    ) -> CaptureResult<Self>
    where
        B: CaptureBackend<Session = S> + ?Sized,
    {
        let session = backend.bind_session(device, item)?;
        let (completion, receiver) = OneShot::new();
        let mut this = Self {
            state: SessionState::Idle,
            lifetime: Arc::new(SessionLifetime::new(session)),
            completion,
            receiver,
            stats: Arc::new(ArrivalStats::default()),
        };

        let handler = frame_handler(
            Arc::clone(&this.lifetime),
            Arc::clone(&this.completion),
            Arc::clone(&this.stats),
            encoder,
        );
        let registered = match this.lifetime.lock().as_mut() {
            Some(session) => session.set_frame_handler(handler),
            None => Ok(()),
        };
        registered?;
        this.state = SessionState::ItemBound;
        Ok(this)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.snapshot()
    }

    pub fn start(&mut self, suppress_border: bool) -> CaptureResult<()> {
        if self.state != SessionState::ItemBound {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "cannot start a capture session in state {:?}",
                self.state
            )));
        }

        let started = {
            let guard = self.lifetime.lock();
            let Some(session) = guard.as_ref() else {
                self.state = SessionState::Disposed;
                return Err(CaptureError::Platform(anyhow::anyhow!(
                    "capture session was disposed before start"
                )));
            };
            if suppress_border && let Err(err) = session.suppress_border() {
                debug!(error = %err, "could not suppress capture border");
            }
            let _ = self.stats.started_at.set(Instant::now());
            session.start()
        };

        match started {
            Ok(()) => {
                self.state = SessionState::Capturing;
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Failed;
                self.dispose();
                Err(err)
            }
        }
    }

    /// Block until the frame handler resolves the completion or `timeout`
    /// elapses, whichever comes first. The session is disposed on return.
    pub fn wait(&mut self, timeout: Duration) -> CaptureResult<SessionOutcome> {
        if self.state != SessionState::Capturing {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "cannot wait on a capture session in state {:?}",
                self.state
            )));
        }

        let outcome = match self.receiver.recv_timeout(timeout) {
            Ok(Ok(image)) => {
                self.state = SessionState::Completed;
                info!(bytes = image.len(), "capture session completed");
                Ok(SessionOutcome::Completed(image))
            }
            Ok(Err(err)) => {
                self.state = SessionState::Failed;
                warn!(error = %err, "frame handler failed");
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => {
                // A handler that claims from here on finds nothing to resolve.
                drop(self.completion.claim());
                self.state = SessionState::TimedOut;
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    arrivals = self.stats.snapshot().arrivals,
                    "no frame completed before the capture timeout"
                );
                Ok(SessionOutcome::TimedOut)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.state = SessionState::Failed;
                Err(CaptureError::Platform(anyhow::anyhow!(
                    "frame handler dropped the completion signal"
                )))
            }
        };
        self.dispose();
        outcome
    }

    fn dispose(&mut self) {
        if self.lifetime.dispose() {
            debug!(state = ?self.state, "capture session disposed");
        }
    }

    /// Whether the platform session has been released, by this handle or
    /// by the frame handler.
    pub fn is_disposed(&self) -> bool {
        self.lifetime.is_disposed()
    }
}

impl<S: BoundSession> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        self.dispose();
        self.state = SessionState::Disposed;
    }
}

fn frame_handler<S: BoundSession>(
    lifetime: Arc<SessionLifetime<S>>,
    completion: Arc<OneShot<Completion>>,
    stats: Arc<ArrivalStats>,
    encoder: ImageEncoder,
) -> FrameHandler {
    Arc::new(move |source: &dyn FrameSource| {
        let arrival = stats.record_arrival();
        if lifetime.is_disposed() {
            return;
        }
        let Some(frame) = source.try_next_frame() else {
            debug!(arrival, "frame arrival without a buffered frame");
            return;
        };
        let Some(sender) = completion.claim() else {
            return;
        };

        let content_size = frame.content_size();
        stats.record_first_frame(content_size);
        debug!(
            arrival,
            width = content_size.0,
            height = content_size.1,
            "first frame arrived"
        );

        let result = if lifetime.is_disposed() {
            Err(CaptureError::Timeout)
        } else {
            frame
                .read_pixels()
                .and_then(|pixels| encoder.encode_while(pixels, || !lifetime.is_disposed()))
        };
        drop(frame);

        // Capacity one and a single sender: never blocks.
        let _ = sender.send(result);
        lifetime.dispose();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Arrival, MockBackend};
    use std::thread;

    fn bind(backend: &MockBackend) -> CaptureSession<crate::testing::MockSession> {
        let device = Arc::new(backend.create_device().unwrap());
        let item = backend.monitor_item().unwrap();
        CaptureSession::bind(backend, &device, &item, ImageEncoder::new(32, 80).unwrap()).unwrap()
    }

    #[test]
    fn first_frame_completes_and_disposes_once() {
        let backend = MockBackend::dual_monitor().with_arrivals(vec![
            Arrival::frame_after(Duration::from_millis(5), 64, 36),
            Arrival::frame_after(Duration::from_millis(1), 64, 36),
            Arrival::frame_after(Duration::from_millis(1), 64, 36),
        ]);
        let counters = backend.counters();
        let mut session = bind(&backend);
        assert_eq!(session.state(), SessionState::ItemBound);

        session.start(true).unwrap();
        assert_eq!(session.state(), SessionState::Capturing);
        let outcome = session.wait(Duration::from_secs(10)).unwrap();
        let SessionOutcome::Completed(image) = outcome else {
            panic!("expected a completed capture");
        };
        assert_eq!((image.width(), image.height()), (32, 18));
        assert_eq!(session.state(), SessionState::Completed);
        assert!(session.is_disposed());

        let stats = session.stats();
        assert!(stats.got_frame);
        assert_eq!(stats.content_size, Some((64, 36)));

        drop(session);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counters.sessions_closed(), 1);
        assert_eq!(counters.frames_read(), 1);
        assert_eq!(counters.borders_suppressed(), 1);
    }

    #[test]
    fn empty_arrivals_are_ignored() {
        let backend = MockBackend::dual_monitor().with_arrivals(vec![
            Arrival::empty_after(Duration::from_millis(2)),
            Arrival::empty_after(Duration::from_millis(2)),
            Arrival::frame_after(Duration::from_millis(2), 16, 9),
        ]);
        let mut session = bind(&backend);
        session.start(false).unwrap();
        let outcome = session.wait(Duration::from_secs(10)).unwrap();
        assert!(matches!(outcome, SessionOutcome::Completed(_)));
        assert_eq!(session.stats().arrivals, 3);
    }

    #[test]
    fn timeout_wins_when_no_frame_arrives() {
        let backend = MockBackend::dual_monitor().with_arrivals(Vec::new());
        let counters = backend.counters();
        let mut session = bind(&backend);
        session.start(false).unwrap();

        let started = Instant::now();
        let outcome = session.wait(Duration::from_millis(100)).unwrap();
        assert!(matches!(outcome, SessionOutcome::TimedOut));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(session.state(), SessionState::TimedOut);
        assert_eq!(counters.sessions_closed(), 1);
        assert!(!session.stats().got_frame);
    }

    #[test]
    fn late_frame_after_timeout_is_not_processed() {
        let backend = MockBackend::dual_monitor().with_arrivals(vec![Arrival::frame_after(
            Duration::from_millis(300),
            64,
            36,
        )]);
        let counters = backend.counters();
        let mut session = bind(&backend);
        session.start(false).unwrap();

        let outcome = session.wait(Duration::from_millis(100)).unwrap();
        assert!(matches!(outcome, SessionOutcome::TimedOut));
        drop(session);

        thread::sleep(Duration::from_millis(400));
        assert_eq!(counters.arrivals_delivered(), 1);
        assert_eq!(counters.frames_read(), 0);
        assert_eq!(counters.sessions_closed(), 1);
    }

    #[test]
    fn read_failure_resolves_as_error() {
        let backend = MockBackend::dual_monitor()
            .with_arrivals(vec![Arrival::corrupt_after(Duration::from_millis(2))]);
        let mut session = bind(&backend);
        session.start(false).unwrap();
        let err = session.wait(Duration::from_secs(10)).unwrap_err();
        assert!(err.to_string().contains("surface copy failed"));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn failed_start_disposes_session() {
        let backend = MockBackend::dual_monitor().with_failing_start();
        let counters = backend.counters();
        let mut session = bind(&backend);
        assert!(session.start(false).is_err());
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.is_disposed());
        assert_eq!(counters.sessions_closed(), 1);
        assert!(session.wait(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn dropping_an_unstarted_session_closes_it() {
        let backend = MockBackend::dual_monitor();
        let counters = backend.counters();
        let session = bind(&backend);
        drop(session);
        assert_eq!(counters.sessions_closed(), 1);
    }

    #[test]
    fn one_shot_resolves_for_first_claimer_only() {
        let (one_shot, receiver) = OneShot::<u32>::new();
        let first = one_shot.claim().unwrap();
        assert!(one_shot.claim().is_none());
        first.send(7).unwrap();
        assert_eq!(receiver.recv().unwrap(), 7);
    }
}
