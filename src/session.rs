//! # Stream Session Supervision
//!
//! A [`PipelineSupervisor`] owns one [`StreamSession`] at a time: one run of
//! the receive/decode pipeline from `start` to its terminal state.
//!
//! ## Lifecycle
//!
//! ```text
//! IDLE ──start──▶ PLAYING ──EOS──────▶ STOPPING ──▶ STOPPED
//!                    │ ───error──────▶ STOPPING ──▶ ERROR
//!                    └────stop()─────▶ STOPPING ──▶ STOPPED
//! ```
//!
//! The pipeline's status events are consumed on a dedicated thread, never
//! on the caller's. That thread waits on the pipeline with a bounded
//! timeout and re-checks a stop flag between waits, so `stop()` from any
//! thread is observed within one poll interval.
//!
//! State and the pipeline handle live behind one mutex that both the status
//! thread and `stop()` use. Whoever moves the session out of PLAYING takes
//! the handle and releases it (state NULL); the other side finds the handle
//! gone and does nothing. The lock is never held while the framework is
//! called.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;

use crate::core::{Frame, FrameCache};
use crate::error::{LinkError, LinkResult};
use crate::media::{FrameSink, MediaBackend, MediaPipeline, PipelineState, StatusEvent};

/// State of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Playing,
    Stopping,
    Stopped,
    Error,
}

impl SessionState {
    /// STOPPED and ERROR end a session for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }

    /// Terminal state a status event leads to, `None` when it is ignored.
    ///
    /// Only a playing session reacts; events arriving while the session is
    /// already winding down are dropped.
    pub fn on_event(self, event: &StatusEvent) -> Option<Self> {
        match (self, event) {
            (Self::Playing, StatusEvent::EndOfStream) => Some(Self::Stopped),
            (Self::Playing, StatusEvent::Error { .. }) => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::Playing => "PLAYING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
        })
    }
}

/// Error recorded when a session ends in ERROR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub kind: String,
    pub message: String,
}

impl From<SessionError> for LinkError {
    fn from(err: SessionError) -> Self {
        LinkError::Runtime {
            kind: err.kind,
            message: err.message,
        }
    }
}

struct SessionInner {
    state: SessionState,
    pipeline: Option<Arc<dyn MediaPipeline>>,
    last_error: Option<SessionError>,
}

/// One run of the pipeline. Never restarted; a new `start` builds a new one.
pub struct StreamSession {
    id: u64,
    inner: Mutex<SessionInner>,
    stop_requested: AtomicBool,
}

impl StreamSession {
    fn new(id: u64, pipeline: Arc<dyn MediaPipeline>) -> Self {
        Self {
            id,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                pipeline: Some(pipeline),
                last_error: None,
            }),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.inner.lock().last_error.clone()
    }

    fn mark_playing(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Idle {
            inner.state = SessionState::Playing;
            tracing::info!(session = self.id, "pipeline PLAYING");
        }
    }

    /// PLAYING → STOPPING → `target`, recording `error` on the way.
    fn finish(&self, target: SessionState, error: Option<SessionError>) {
        let pipeline = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Playing {
                return;
            }
            inner.state = SessionState::Stopping;
            if error.is_some() {
                inner.last_error = error;
            }
            inner.pipeline.take()
        };
        release(self.id, pipeline);
        self.settle(target);
    }

    /// Ask the status loop to exit and release the pipeline.
    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        let pipeline = {
            let mut inner = self.inner.lock();
            match inner.state {
                SessionState::Idle | SessionState::Playing => {
                    inner.state = SessionState::Stopping;
                    inner.pipeline.take()
                }
                // Already winding down or finished.
                SessionState::Stopping | SessionState::Stopped | SessionState::Error => return,
            }
        };
        release(self.id, pipeline);
        self.settle(SessionState::Stopped);
    }

    fn settle(&self, target: SessionState) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Stopping {
            inner.state = target;
            tracing::info!(session = self.id, "pipeline {target}");
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("last_error", &inner.last_error)
            .finish()
    }
}

fn release(session: u64, pipeline: Option<Arc<dyn MediaPipeline>>) {
    if let Some(pipeline) = pipeline {
        if let Err(e) = pipeline.set_state(PipelineState::Null) {
            tracing::warn!(session, "failed to release pipeline: {e}");
        }
    }
}

/// Lives on the status thread. Dropping it disconnects the exit channel;
/// during a panic it also moves the session out of PLAYING.
struct LoopGuard {
    session: Arc<StreamSession>,
    _exited: Sender<()>,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.session.finish(
                SessionState::Error,
                Some(SessionError {
                    kind: "supervisor".into(),
                    message: "status loop panicked".into(),
                }),
            );
        }
    }
}

fn status_loop(guard: LoopGuard, pipeline: Arc<dyn MediaPipeline>, poll: Duration) {
    let session = &guard.session;
    while !session.stop_requested() {
        let Some(event) = pipeline.next_event(poll) else {
            continue;
        };
        match session.state().on_event(&event) {
            Some(target) => {
                let error = match event {
                    StatusEvent::Error { kind, message } => {
                        tracing::error!(session = session.id, kind, "pipeline error: {message}");
                        Some(SessionError { kind, message })
                    }
                    _ => {
                        tracing::info!(session = session.id, "end of stream");
                        None
                    }
                };
                session.finish(target, error);
                break;
            }
            None => tracing::trace!(session = session.id, %event, "status event ignored"),
        }
    }
    tracing::debug!(session = session.id, "status loop exited");
}

struct Running {
    session: Arc<StreamSession>,
    worker: Option<JoinHandle<()>>,
    exited: Receiver<()>,
}

/// Starts, watches and stops the pipeline.
pub struct PipelineSupervisor {
    backend: Arc<dyn MediaBackend>,
    status_poll: Duration,
    current: Mutex<Option<Running>>,
    next_id: AtomicU64,
}

impl PipelineSupervisor {
    /// `status_poll` bounds each wait on the pipeline's status events and
    /// therefore how long `stop()` takes to reach the status thread.
    pub fn new(backend: Arc<dyn MediaBackend>, status_poll: Duration) -> Self {
        Self {
            backend,
            status_poll,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Build the pipeline from `description` and start playing it.
    ///
    /// Construction failures are reported here and leave no session behind.
    pub fn start(&self, description: &str) -> LinkResult<()> {
        self.launch(description, None)
    }

    /// Like [`start`](Self::start), also routing frames from the appsink
    /// named `element` into `cache`.
    pub fn start_with_frames(
        &self,
        description: &str,
        element: &str,
        cache: Arc<FrameCache>,
    ) -> LinkResult<()> {
        self.launch(description, Some((element, cache)))
    }

    fn launch(&self, description: &str, tap: Option<(&str, Arc<FrameCache>)>) -> LinkResult<()> {
        let mut current = self.current.lock();
        if let Some(running) = current.as_ref() {
            let state = running.session.state();
            if !state.is_terminal() {
                return Err(LinkError::State {
                    current: state.to_string(),
                    attempted: "start",
                });
            }
        }

        self.backend
            .init()
            .map_err(|e| LinkError::Construction(e.to_string()))?;
        let pipeline = self.backend.launch(description)?;

        if let Some((element, cache)) = tap {
            let sink: FrameSink = Box::new(move |frame: Frame| {
                cache.publish(frame);
            });
            if let Err(e) = pipeline.attach_frame_sink(element, sink) {
                release(0, Some(pipeline));
                return Err(e);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = pipeline.set_state(PipelineState::Playing) {
            release(id, Some(pipeline));
            return Err(LinkError::Construction(format!("pipeline refused to play: {e}")));
        }

        let session = Arc::new(StreamSession::new(id, Arc::clone(&pipeline)));
        session.mark_playing();

        let (exited_tx, exited_rx) = bounded::<()>(0);
        let guard = LoopGuard {
            session: Arc::clone(&session),
            _exited: exited_tx,
        };
        let poll = self.status_poll;
        let worker = thread::Builder::new()
            .name(format!("pipeline-status-{id}"))
            .spawn(move || status_loop(guard, pipeline, poll))
            .map_err(|e| {
                session.request_stop();
                LinkError::Construction(format!("failed to spawn status thread: {e}"))
            })?;

        if let Some(previous) = current.replace(Running {
            session,
            worker: Some(worker),
            exited: exited_rx,
        }) {
            tracing::debug!(session = previous.session.id, "replaced finished session");
        }
        Ok(())
    }

    /// Stop the current session. Safe from any thread, any state, any
    /// number of times.
    pub fn stop(&self) {
        let session = self
            .current
            .lock()
            .as_ref()
            .map(|running| Arc::clone(&running.session));
        if let Some(session) = session {
            session.request_stop();
        }
    }

    /// Wait up to `timeout` for the status thread to exit.
    ///
    /// Returns `true` once it has exited (or when nothing was started).
    pub fn join(&self, timeout: Duration) -> bool {
        let (id, exited) = match self.current.lock().as_ref() {
            Some(running) => (running.session.id, running.exited.clone()),
            None => return true,
        };
        match exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let worker = self
                    .current
                    .lock()
                    .as_mut()
                    .filter(|running| running.session.id == id)
                    .and_then(|running| running.worker.take());
                if let Some(worker) = worker {
                    if worker.join().is_err() {
                        tracing::error!(session = id, "status thread panicked");
                    }
                }
                true
            }
        }
    }

    /// State of the current session; IDLE before the first start.
    pub fn state(&self) -> SessionState {
        self.current
            .lock()
            .as_ref()
            .map_or(SessionState::Idle, |running| running.session.state())
    }

    /// Error recorded by the current session, if it ended in ERROR.
    pub fn last_error(&self) -> Option<SessionError> {
        self.current
            .lock()
            .as_ref()
            .and_then(|running| running.session.last_error())
    }

    /// Identifier of the current session.
    pub fn session_id(&self) -> Option<u64> {
        self.current.lock().as_ref().map(|running| running.session.id)
    }
}

impl Drop for PipelineSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
