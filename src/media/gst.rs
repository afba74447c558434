//! GStreamer implementation of the media interface.
//!
//! Pipelines are built with `gst::parse::launch` from a description string.
//! Status events are read from the pipeline bus with a bounded
//! `timed_pop`, so the supervisor's loop never blocks indefinitely inside
//! the framework. Frames are tapped from a named `appsink`.

use std::sync::Arc;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use once_cell::sync::OnceCell;

use crate::core::{Frame, PixelFormat};
use crate::error::{LinkError, LinkResult};
use crate::media::{FrameSink, MediaBackend, MediaPipeline, PipelineState, StatusEvent};

/// Outcome of the first `gst::init`, replayed on later calls.
static GST_INIT: OnceCell<Result<(), String>> = OnceCell::new();

/// Initialize GStreamer once per process.
///
/// Idempotent: later calls return the first outcome without re-running
/// initialization. GStreamer is released when the process exits.
pub fn init_media_runtime() -> LinkResult<()> {
    GST_INIT
        .get_or_init(|| {
            let result = gst::init().map_err(|e| e.to_string());
            if result.is_ok() {
                tracing::info!(version = %gst::version_string(), "GStreamer initialized");
            }
            result
        })
        .clone()
        .map_err(|reason| LinkError::ResourceUnavailable {
            facility: "GStreamer".into(),
            reason,
        })
}

/// Media backend on top of GStreamer.
#[derive(Debug, Default, Clone, Copy)]
pub struct GstBackend;

impl MediaBackend for GstBackend {
    fn init(&self) -> LinkResult<()> {
        init_media_runtime()
    }

    fn launch(&self, description: &str) -> LinkResult<Arc<dyn MediaPipeline>> {
        self.init()
            .map_err(|e| LinkError::Construction(e.to_string()))?;

        let element = gst::parse::launch(description)
            .map_err(|e| LinkError::Construction(format!("{e} (description: {description})")))?;

        // A single-element description comes back bare; give it a pipeline
        // so it has a bus and a clock.
        let pipeline = match element.downcast::<gst::Pipeline>() {
            Ok(pipeline) => pipeline,
            Err(element) => {
                let pipeline = gst::Pipeline::new();
                pipeline
                    .add(&element)
                    .map_err(|e| LinkError::Construction(e.to_string()))?;
                pipeline
            }
        };
        let bus = pipeline
            .bus()
            .ok_or_else(|| LinkError::Construction("pipeline has no bus".into()))?;

        tracing::debug!(description, "pipeline constructed");
        Ok(Arc::new(GstPipeline { pipeline, bus }))
    }

    fn has_element(&self, name: &str) -> bool {
        self.init().is_ok() && gst::ElementFactory::find(name).is_some()
    }
}

struct GstPipeline {
    pipeline: gst::Pipeline,
    bus: gst::Bus,
}

impl MediaPipeline for GstPipeline {
    fn set_state(&self, state: PipelineState) -> LinkResult<()> {
        let target = match state {
            PipelineState::Null => gst::State::Null,
            PipelineState::Paused => gst::State::Paused,
            PipelineState::Playing => gst::State::Playing,
        };
        self.pipeline
            .set_state(target)
            .map(|_| ())
            .map_err(|e| LinkError::Runtime {
                kind: "state-change".into(),
                message: format!("failed to set pipeline to {target:?}: {e}"),
            })
    }

    fn next_event(&self, timeout: Duration) -> Option<StatusEvent> {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let msg = self.bus.timed_pop(gst::ClockTime::from_mseconds(millis))?;

        let event = match msg.view() {
            gst::MessageView::Eos(..) => StatusEvent::EndOfStream,
            gst::MessageView::Error(err) => {
                let source = msg
                    .src()
                    .map(|s| s.path_string().to_string())
                    .unwrap_or_else(|| "pipeline".into());
                let message = match err.debug() {
                    Some(debug) => format!("{} from {source} ({debug})", err.error()),
                    None => format!("{} from {source}", err.error()),
                };
                StatusEvent::Error {
                    kind: err.error().domain().as_str().to_string(),
                    message,
                }
            }
            gst::MessageView::Warning(warn) => {
                tracing::warn!("GStreamer warning: {}", warn.error());
                StatusEvent::Other(format!("warning: {}", warn.error()))
            }
            gst::MessageView::StateChanged(change) => StatusEvent::Other(format!(
                "state changed {:?} -> {:?}",
                change.old(),
                change.current()
            )),
            _ => StatusEvent::Other(format!("{:?}", msg.type_())),
        };
        Some(event)
    }

    fn attach_frame_sink(&self, element: &str, sink: FrameSink) -> LinkResult<()> {
        let appsink = self
            .pipeline
            .by_name(element)
            .ok_or_else(|| LinkError::Construction(format!("no element named `{element}`")))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| LinkError::Construction(format!("element `{element}` is not an appsink")))?;

        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    match frame_from_sample(&sample) {
                        Some(frame) => sink(frame),
                        None => tracing::trace!("sample without usable video caps skipped"),
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
        Ok(())
    }
}

impl Drop for GstPipeline {
    fn drop(&mut self) {
        // Always reach NULL before the last reference goes away.
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn frame_from_sample(sample: &gst::Sample) -> Option<Frame> {
    let info = gst_video::VideoInfo::from_caps(sample.caps()?).ok()?;
    let buffer = sample.buffer()?;
    let map = buffer.map_readable().ok()?;
    let stride = info
        .stride()
        .first()
        .and_then(|&s| usize::try_from(s).ok())?;
    Some(Frame {
        data: map.as_slice().to_vec(),
        width: info.width(),
        height: info.height(),
        format: pixel_format(info.format()),
        stride,
    })
}

fn pixel_format(format: gst_video::VideoFormat) -> PixelFormat {
    match format {
        gst_video::VideoFormat::Bgr => PixelFormat::Bgr,
        gst_video::VideoFormat::Rgb => PixelFormat::Rgb,
        gst_video::VideoFormat::Bgra => PixelFormat::Bgra,
        gst_video::VideoFormat::Rgba => PixelFormat::Rgba,
        gst_video::VideoFormat::Gray8 => PixelFormat::Gray8,
        other => PixelFormat::Other(other.to_str().to_string()),
    }
}
