//! Screen capture: PNG dump from the device decoded into a pixel buffer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::RgbImage;
use parking_lot::Mutex;

use crate::adb::AdbTransport;
use crate::error::{DriverError, Result};

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// One decoded screen capture. Immutable once produced; owned by the
/// caller that requested it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Captures frames through the transport and caches the last-known
/// resolution. Nothing but resolution metadata is cached between calls.
pub struct CaptureEngine {
    adb: Arc<Mutex<AdbTransport>>,
    resolution: Option<(u32, u32)>,
}

impl CaptureEngine {
    pub fn new(adb: Arc<Mutex<AdbTransport>>) -> Self {
        Self {
            adb,
            resolution: None,
        }
    }

    /// Capture a full frame. The decoded dimensions become the cached
    /// resolution; they are authoritative over `wm size`, since they
    /// reflect what was actually captured.
    pub fn capture(&mut self) -> Result<Frame> {
        let raw = self.adb.lock().capture_raw(CAPTURE_TIMEOUT)?;
        let image = image::load_from_memory(&raw)?;
        let pixels = image.to_rgb8();

        self.resolution = Some((pixels.width(), pixels.height()));
        tracing::debug!(
            width = pixels.width(),
            height = pixels.height(),
            "frame captured"
        );

        Ok(Frame {
            pixels,
            captured_at: Utc::now(),
        })
    }

    /// Capture a clipped region. The requested rectangle is clamped to the
    /// frame bounds; only a zero-area result after clamping is an error.
    pub fn capture_region(&mut self, x: i64, y: i64, width: u32, height: u32) -> Result<Frame> {
        let frame = self.capture()?;
        let (fw, fh) = (frame.width() as i64, frame.height() as i64);

        let x0 = x.clamp(0, fw);
        let y0 = y.clamp(0, fh);
        let x1 = (x + width as i64).clamp(0, fw);
        let y1 = (y + height as i64).clamp(0, fh);

        if x1 <= x0 || y1 <= y0 {
            return Err(DriverError::InvalidRegion);
        }

        let cropped = image::imageops::crop_imm(
            &frame.pixels,
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        )
        .to_image();

        Ok(Frame {
            pixels: cropped,
            captured_at: frame.captured_at,
        })
    }

    /// Last-known resolution, falling back to the transport's display
    /// metrics (cached afterwards).
    pub fn resolution(&mut self) -> Result<(u32, u32)> {
        if let Some(res) = self.resolution {
            return Ok(res);
        }
        let res = self.adb.lock().query_display_metrics()?;
        self.resolution = Some(res);
        Ok(res)
    }

    /// Capture and write a PNG to disk.
    pub fn save_screenshot(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let frame = self.capture()?;
        frame.pixels.save(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "screenshot saved");
        Ok(())
    }
}
