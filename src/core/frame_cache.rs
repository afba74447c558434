//! # Frame Cache
//!
//! Single-slot, overwrite-on-write store for the most recently decoded
//! picture. It sits between the pipeline's producer callback (one call per
//! decoded frame, on a streaming thread) and any number of consumers that
//! poll for the latest picture.
//!
//! ```text
//! appsink callback ──publish()──▶ [ slot ] ──latest()──▶ display / snapshot
//! ```
//!
//! The policy is drop-oldest: an unread frame is silently replaced. Each
//! publish is stamped with a sequence number so a consumer can detect that
//! it has already seen a frame.
//!
//! The critical section only covers moving the frame into the slot and
//! cloning the slot out. Pixel data is shared as an immutable
//! `Arc<Vec<u8>>`, so a reader never observes a buffer the producer can
//! still write to.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Pixel layout of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelFormat {
    Bgr,
    Rgb,
    Bgra,
    Rgba,
    Gray8,
    /// Any other framework format, by name
    Other(String),
}

impl PixelFormat {
    /// Bytes per pixel for packed formats.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::Bgr | Self::Rgb => Some(3),
            Self::Bgra | Self::Rgba => Some(4),
            Self::Gray8 => Some(1),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bgr => f.write_str("BGR"),
            Self::Rgb => f.write_str("RGB"),
            Self::Bgra => f.write_str("BGRA"),
            Self::Rgba => f.write_str("RGBA"),
            Self::Gray8 => f.write_str("GRAY8"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// A decoded picture as handed over by the producer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes per row (may exceed `width * bytes_per_pixel`)
    pub stride: usize,
}

impl Frame {
    /// Tightly packed frame.
    pub fn packed(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel().unwrap_or(1);
        Self {
            data,
            width,
            height,
            format,
            stride,
        }
    }
}

/// The cached picture plus its sequence number.
#[derive(Debug, Clone)]
pub struct FrameSlot {
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub stride: usize,
    /// Starts at 1, increases by one per publish
    pub sequence: u64,
}

struct Slot {
    current: Option<FrameSlot>,
    next_sequence: u64,
}

/// Thread-safe latest-frame cache.
pub struct FrameCache {
    slot: Mutex<Slot>,
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCache {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                current: None,
                next_sequence: 1,
            }),
        }
    }

    /// Replace the cached frame. Returns the sequence number assigned.
    ///
    /// Never waits for consumers; an unread frame is dropped.
    pub fn publish(&self, frame: Frame) -> u64 {
        let Frame {
            data,
            width,
            height,
            format,
            stride,
        } = frame;
        // Allocate the Arc before taking the lock.
        let data = Arc::new(data);

        let mut slot = self.slot.lock();
        let sequence = slot.next_sequence;
        slot.next_sequence += 1;
        slot.current = Some(FrameSlot {
            data,
            width,
            height,
            format,
            stride,
            sequence,
        });
        sequence
    }

    /// Copy of the most recent frame, `None` before the first publish.
    pub fn latest(&self) -> Option<FrameSlot> {
        self.slot.lock().current.clone()
    }

    /// Latest frame only if it is newer than `seen`.
    pub fn newer_than(&self, seen: u64) -> Option<FrameSlot> {
        let slot = self.slot.lock();
        slot.current
            .as_ref()
            .filter(|frame| frame.sequence > seen)
            .cloned()
    }

    /// Last sequence number assigned, 0 if nothing was published.
    pub fn sequence(&self) -> u64 {
        self.slot.lock().next_sequence - 1
    }
}

impl fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCache")
            .field("sequence", &self.sequence())
            .finish()
    }
}
