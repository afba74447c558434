//! Scripted media backend for unit tests.
//!
//! Tests push status events and frames through a [`MockControl`]; the
//! pipeline records every requested state change.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::core::Frame;
use crate::error::{LinkError, LinkResult};
use crate::media::{FrameSink, MediaBackend, MediaPipeline, PipelineState, StatusEvent};

/// Description that `MockBackend::launch` refuses.
pub const BROKEN_DESCRIPTION: &str = "no-such-element ! fakesink";

pub struct MockPipeline {
    events: Receiver<StatusEvent>,
    states: Mutex<Vec<PipelineState>>,
    sink: Mutex<Option<FrameSink>>,
    fail_playing: bool,
}

impl MediaPipeline for MockPipeline {
    fn set_state(&self, state: PipelineState) -> LinkResult<()> {
        self.states.lock().push(state);
        if self.fail_playing && state == PipelineState::Playing {
            return Err(LinkError::Runtime {
                kind: "state-change".into(),
                message: "refused".into(),
            });
        }
        Ok(())
    }

    fn next_event(&self, timeout: Duration) -> Option<StatusEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    fn attach_frame_sink(&self, element: &str, sink: FrameSink) -> LinkResult<()> {
        if element != "framesink" {
            return Err(LinkError::Construction(format!("no element named `{element}`")));
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }
}

/// Test-side handle to the most recently launched pipeline.
#[derive(Clone)]
pub struct MockControl {
    events: Sender<StatusEvent>,
    pipeline: Arc<Mutex<Option<Arc<MockPipeline>>>>,
}

impl MockControl {
    pub fn emit(&self, event: StatusEvent) {
        let _ = self.events.send(event);
    }

    /// Feed a frame through the attached sink, as a streaming thread would.
    pub fn push_frame(&self, frame: Frame) -> bool {
        let Some(pipeline) = self.pipeline.lock().clone() else {
            return false;
        };
        let sink = pipeline.sink.lock();
        match sink.as_ref() {
            Some(sink) => {
                sink(frame);
                true
            }
            None => false,
        }
    }

    /// State changes requested on the last launched pipeline.
    pub fn states(&self) -> Vec<PipelineState> {
        self.pipeline
            .lock()
            .as_ref()
            .map(|p| p.states.lock().clone())
            .unwrap_or_default()
    }

    pub fn launched(&self) -> bool {
        self.pipeline.lock().is_some()
    }
}

pub struct MockBackend {
    // Keeps the event channel connected after the test drops its control.
    _events_tx: Sender<StatusEvent>,
    events_rx: Receiver<StatusEvent>,
    last: Arc<Mutex<Option<Arc<MockPipeline>>>>,
    fail_playing: bool,
}

impl MockBackend {
    pub fn new() -> (Self, MockControl) {
        let (events_tx, events_rx) = unbounded();
        let last = Arc::new(Mutex::new(None));
        let control = MockControl {
            events: events_tx.clone(),
            pipeline: Arc::clone(&last),
        };
        (
            Self {
                _events_tx: events_tx,
                events_rx,
                last,
                fail_playing: false,
            },
            control,
        )
    }

    /// Pipelines from this backend refuse to reach PLAYING.
    pub fn refusing_playback() -> (Self, MockControl) {
        let (mut backend, control) = Self::new();
        backend.fail_playing = true;
        (backend, control)
    }
}

impl MediaBackend for MockBackend {
    fn init(&self) -> LinkResult<()> {
        Ok(())
    }

    fn launch(&self, description: &str) -> LinkResult<Arc<dyn MediaPipeline>> {
        if description == BROKEN_DESCRIPTION {
            return Err(LinkError::Construction(
                "no element \"no-such-element\"".into(),
            ));
        }
        // Drop events addressed to an earlier pipeline.
        while self.events_rx.try_recv().is_ok() {}

        let pipeline = Arc::new(MockPipeline {
            events: self.events_rx.clone(),
            states: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            fail_playing: self.fail_playing,
        });
        *self.last.lock() = Some(Arc::clone(&pipeline));
        Ok(pipeline)
    }

    fn has_element(&self, name: &str) -> bool {
        name == "autovideosink"
    }
}
