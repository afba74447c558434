//! Save the cached frame to disk as PNG.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::{GrayImage, RgbImage, RgbaImage};

use crate::core::frame_cache::{FrameSlot, PixelFormat};
use crate::error::{LinkError, LinkResult};

/// `frame_<unix seconds>.png`
pub fn default_file_name() -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    PathBuf::from(format!("frame_{secs}.png"))
}

/// Write `frame` as a PNG file.
pub fn save_png(frame: &FrameSlot, path: &Path) -> LinkResult<()> {
    let Some(bpp) = frame.format.bytes_per_pixel() else {
        return Err(LinkError::Snapshot(format!(
            "unsupported pixel format {}",
            frame.format
        )));
    };
    let packed = pack_rows(frame, bpp)?;
    let (w, h) = (frame.width, frame.height);

    let result = match frame.format {
        PixelFormat::Rgb => RgbImage::from_raw(w, h, packed).map(|img| img.save(path)),
        PixelFormat::Bgr => {
            let rgb = swap_red_blue(packed, 3);
            RgbImage::from_raw(w, h, rgb).map(|img| img.save(path))
        }
        PixelFormat::Rgba => RgbaImage::from_raw(w, h, packed).map(|img| img.save(path)),
        PixelFormat::Bgra => {
            let rgba = swap_red_blue(packed, 4);
            RgbaImage::from_raw(w, h, rgba).map(|img| img.save(path))
        }
        PixelFormat::Gray8 => GrayImage::from_raw(w, h, packed).map(|img| img.save(path)),
        PixelFormat::Other(_) => None,
    };

    match result {
        Some(Ok(())) => {
            tracing::info!(path = %path.display(), sequence = frame.sequence, "frame saved");
            Ok(())
        }
        Some(Err(e)) => Err(LinkError::Snapshot(format!("{}: {e}", path.display()))),
        None => Err(LinkError::Snapshot("frame buffer does not match its dimensions".into())),
    }
}

/// Drop row padding so rows are exactly `width * bpp` bytes.
fn pack_rows(frame: &FrameSlot, bpp: usize) -> LinkResult<Vec<u8>> {
    let row = frame.width as usize * bpp;
    let rows = frame.height as usize;
    if frame.stride < row {
        return Err(LinkError::Snapshot(format!(
            "stride {} shorter than row of {row} bytes",
            frame.stride
        )));
    }
    let needed = frame.stride * rows.saturating_sub(1) + row;
    if rows > 0 && frame.data.len() < needed {
        return Err(LinkError::Snapshot(format!(
            "buffer holds {} bytes, {needed} needed",
            frame.data.len()
        )));
    }
    if frame.stride == row {
        return Ok(frame.data[..row * rows].to_vec());
    }
    let mut packed = Vec::with_capacity(row * rows);
    for y in 0..rows {
        let start = y * frame.stride;
        packed.extend_from_slice(&frame.data[start..start + row]);
    }
    Ok(packed)
}

fn swap_red_blue(mut pixels: Vec<u8>, bpp: usize) -> Vec<u8> {
    for px in pixels.chunks_exact_mut(bpp) {
        px.swap(0, 2);
    }
    pixels
}
