//! Screen capture against the primary display.

use image::RgbaImage;
use xcap::Monitor;

use slotscope_core::{ScreenCapturer, ScreenshotError};

/// Captures raw frames from the first available monitor.
pub struct DisplayCapturer;

impl ScreenCapturer for DisplayCapturer {
    fn capture_frame(&self) -> Result<RgbaImage, ScreenshotError> {
        let monitors =
            Monitor::all().map_err(|e| ScreenshotError::Capture(e.to_string()))?;
        let monitor = monitors
            .into_iter()
            .next()
            .ok_or_else(|| ScreenshotError::Capture("no monitor available".into()))?;
        monitor
            .capture_image()
            .map_err(|e| ScreenshotError::Capture(e.to_string()))
    }
}
