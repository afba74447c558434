//! # Core Infrastructure Module
//!
//! Frame hand-off between the pipeline's streaming thread and consumers:
//! the single-slot latest-frame cache and the PNG snapshot writer.

pub mod frame_cache;
pub mod snapshot;

pub use frame_cache::{Frame, FrameCache, FrameSlot, PixelFormat};
