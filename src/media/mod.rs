//! # Media Framework Interface
//!
//! The decode pipeline itself belongs to an external multimedia framework.
//! This module is the narrow seam the supervisor talks through:
//!
//! - [`MediaBackend`] turns a textual pipeline description into a pipeline
//!   and performs the framework's one-time initialization.
//! - [`MediaPipeline`] exposes state changes, a bounded wait on the
//!   pipeline's status events and named-element frame taps.
//!
//! With the `gstreamer` feature, [`gst::GstBackend`] implements both on top
//! of GStreamer.

pub mod description;
#[cfg(feature = "gstreamer")]
pub mod gst;
#[cfg(test)]
pub mod mock;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::Frame;
use crate::error::LinkResult;

/// Target state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// All resources released
    Null,
    Paused,
    Playing,
}

/// Asynchronous notification from a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    EndOfStream,
    Error { kind: String, message: String },
    /// Anything else the framework reports; ignored by the supervisor
    Other(String),
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => f.write_str("end of stream"),
            Self::Error { kind, message } => write!(f, "error ({kind}): {message}"),
            Self::Other(what) => f.write_str(what),
        }
    }
}

/// Callback receiving every decoded frame. Runs on a framework thread.
pub type FrameSink = Box<dyn Fn(Frame) + Send + Sync + 'static>;

/// Opaque handle to a constructed pipeline.
pub trait MediaPipeline: Send + Sync {
    /// Request a state change.
    fn set_state(&self, state: PipelineState) -> LinkResult<()>;

    /// Wait up to `timeout` for the next status event.
    fn next_event(&self, timeout: Duration) -> Option<StatusEvent>;

    /// Route decoded frames from the element called `element` to `sink`.
    fn attach_frame_sink(&self, element: &str, sink: FrameSink) -> LinkResult<()>;
}

/// Factory for pipelines.
pub trait MediaBackend: Send + Sync {
    /// One-time framework initialization. Calling it again is a no-op that
    /// reports the first outcome.
    fn init(&self) -> LinkResult<()>;

    /// Build a pipeline from a declarative description.
    ///
    /// Fails with `LinkError::Construction` when the description cannot be
    /// realized; nothing is left allocated in that case.
    fn launch(&self, description: &str) -> LinkResult<Arc<dyn MediaPipeline>>;

    /// Whether the framework knows an element by this name.
    fn has_element(&self, name: &str) -> bool;
}
