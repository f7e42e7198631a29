//! Throttled, validated screen capture with per-session file naming.
//!
//! Capture failures are common (permission races, black frames during
//! page transitions) and must never interrupt the network correlation
//! that owns the record, so `capture()` swallows and logs every
//! failure and only ever returns an optional path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use image::{ImageFormat, RgbaImage};
use parking_lot::Mutex;

use crate::error::ScreenshotError;

/// Minimum frame dimensions accepted by validation.
const MIN_DIMENSION: u32 = 100;

/// Screen-pixel-capture collaborator. Produces a raw frame; may fail
/// on a permissions or display error.
pub trait ScreenCapturer: Send + Sync {
    fn capture_frame(&self) -> Result<RgbaImage, ScreenshotError>;
}

struct ShotState {
    active: bool,
    /// Monotonic reading of the last successful capture. `None` until
    /// the first capture so the first call always fires.
    last_capture: Option<Instant>,
}

/// Manages screenshot captures for one session.
pub struct ScreenshotManager {
    session_dir: PathBuf,
    throttle: Duration,
    capturer: Arc<dyn ScreenCapturer>,
    state: Mutex<ShotState>,
}

impl ScreenshotManager {
    /// Creates a manager writing under `<screenshot_root>/<session_id>/`.
    pub fn new(
        screenshot_root: impl AsRef<Path>,
        session_id: &str,
        throttle: Duration,
        capturer: Arc<dyn ScreenCapturer>,
    ) -> Self {
        Self {
            session_dir: screenshot_root.as_ref().join(session_id),
            throttle,
            capturer,
            state: Mutex::new(ShotState {
                active: false,
                last_capture: None,
            }),
        }
    }

    /// Directory screenshots are written to.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Creates the session directory and marks the manager active.
    ///
    /// Calling `start()` twice without an intervening `stop()` is a
    /// programming error and fails with `AlreadyActive`.
    pub fn start(&self) -> Result<(), ScreenshotError> {
        let mut state = self.state.lock();
        if state.active {
            return Err(ScreenshotError::AlreadyActive);
        }
        std::fs::create_dir_all(&self.session_dir)?;
        state.active = true;
        tracing::info!(dir = %self.session_dir.display(), "screenshot manager started");
        Ok(())
    }

    /// Marks the manager inactive. Idempotent.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.active {
            state.active = false;
            tracing::info!("screenshot manager stopped");
        }
    }

    /// Captures a screenshot if active and not throttled.
    ///
    /// Returns `None` when inactive, throttled, or when the frame
    /// fails validation or cannot be written. Throttling is a rate
    /// limit, not an error. The throttle window is claimed under the
    /// state lock and the grab/encode/write runs without it, so a
    /// slow capture never stalls concurrent handler calls; a failed
    /// capture releases the claim.
    pub fn capture(&self) -> Option<PathBuf> {
        let claim = Instant::now();
        let previous = {
            let mut state = self.state.lock();
            if !state.active {
                return None;
            }
            if let Some(last) = state.last_capture {
                if last.elapsed() < self.throttle {
                    tracing::trace!("screenshot throttled");
                    return None;
                }
            }
            let previous = state.last_capture;
            state.last_capture = Some(claim);
            previous
        };

        let path = self.grab_and_write();
        if path.is_none() {
            // Release the claim so the failure does not consume the
            // throttle window, unless another capture claimed it since.
            let mut state = self.state.lock();
            if state.last_capture == Some(claim) {
                state.last_capture = previous;
            }
        }
        path
    }

    fn grab_and_write(&self) -> Option<PathBuf> {
        let frame = match self.capturer.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "screen capture failed, skipping");
                return None;
            }
        };

        if !validate_frame(&frame) {
            tracing::warn!(
                width = frame.width(),
                height = frame.height(),
                "invalid screenshot captured, skipping"
            );
            return None;
        }

        let filename = format!("capture_{}.png", Utc::now().format("%Y%m%d-%H%M%S-%6f"));
        let path = self.session_dir.join(filename);
        if let Err(e) = frame.save_with_format(&path, ImageFormat::Png) {
            tracing::warn!(error = %e, path = %path.display(), "failed to write screenshot");
            return None;
        }

        tracing::debug!(path = %path.display(), "screenshot captured");
        Some(path)
    }
}

/// Rejects undersized frames and frames of a single solid color
/// (luminance extrema equal), which show up as transient black or
/// white frames during page transitions.
fn validate_frame(frame: &RgbaImage) -> bool {
    if frame.width() < MIN_DIMENSION || frame.height() < MIN_DIMENSION {
        return false;
    }

    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for pixel in frame.pixels() {
        let [r, g, b, _] = pixel.0;
        let luma =
            (0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)).round() as u8;
        min = min.min(luma);
        max = max.max(luma);
        if min != max {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        })
    }

    struct FixedCapturer(RgbaImage);

    impl ScreenCapturer for FixedCapturer {
        fn capture_frame(&self) -> Result<RgbaImage, ScreenshotError> {
            Ok(self.0.clone())
        }
    }

    struct FailingCapturer;

    impl ScreenCapturer for FailingCapturer {
        fn capture_frame(&self) -> Result<RgbaImage, ScreenshotError> {
            Err(ScreenshotError::Capture("no display".into()))
        }
    }

    fn manager(dir: &TempDir, throttle_ms: u64, frame: RgbaImage) -> ScreenshotManager {
        ScreenshotManager::new(
            dir.path(),
            "test-session",
            Duration::from_millis(throttle_ms),
            Arc::new(FixedCapturer(frame)),
        )
    }

    #[test]
    fn capture_while_inactive_returns_none() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, 0, gradient(200, 200));
        assert!(mgr.capture().is_none());
    }

    #[test]
    fn start_twice_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, 0, gradient(200, 200));
        mgr.start().unwrap();
        assert!(matches!(mgr.start(), Err(ScreenshotError::AlreadyActive)));
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, 0, gradient(200, 200));
        mgr.stop();
        mgr.start().unwrap();
        mgr.stop();
        mgr.stop();
        // Can start again after stop.
        mgr.start().unwrap();
    }

    #[test]
    fn throttle_skips_second_capture_then_recovers() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, 50, gradient(200, 200));
        mgr.start().unwrap();

        let first = mgr.capture();
        assert!(first.is_some());
        assert!(first.unwrap().exists());

        // Within the throttle window: silent skip.
        assert!(mgr.capture().is_none());

        std::thread::sleep(Duration::from_millis(60));
        assert!(mgr.capture().is_some());
    }

    #[test]
    fn solid_frame_is_rejected_regardless_of_size() {
        let dir = TempDir::new().unwrap();
        let black = RgbaImage::from_pixel(500, 500, Rgba([0, 0, 0, 255]));
        let mgr = manager(&dir, 0, black);
        mgr.start().unwrap();
        assert!(mgr.capture().is_none());

        let white = RgbaImage::from_pixel(500, 500, Rgba([255, 255, 255, 255]));
        let mgr = manager(&dir, 0, white);
        mgr.start().unwrap();
        assert!(mgr.capture().is_none());
    }

    #[test]
    fn undersized_frame_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, 0, gradient(50, 50));
        mgr.start().unwrap();
        assert!(mgr.capture().is_none());
    }

    #[test]
    fn failed_capture_releases_the_throttle_window() {
        struct FlakyCapturer {
            failed_once: AtomicBool,
            frame: RgbaImage,
        }

        impl ScreenCapturer for FlakyCapturer {
            fn capture_frame(&self) -> Result<RgbaImage, ScreenshotError> {
                if !self.failed_once.swap(true, Ordering::SeqCst) {
                    return Err(ScreenshotError::Capture("transient".into()));
                }
                Ok(self.frame.clone())
            }
        }

        let dir = TempDir::new().unwrap();
        let mgr = ScreenshotManager::new(
            dir.path(),
            "test-session",
            Duration::from_secs(3600),
            Arc::new(FlakyCapturer {
                failed_once: AtomicBool::new(false),
                frame: gradient(200, 200),
            }),
        );
        mgr.start().unwrap();

        assert!(mgr.capture().is_none());
        // The failure did not consume the window; the retry fires at
        // once. The success then claims it.
        assert!(mgr.capture().is_some());
        assert!(mgr.capture().is_none());
    }

    #[test]
    fn slow_capture_does_not_block_concurrent_callers() {
        struct GateCapturer {
            entered: Arc<AtomicBool>,
            release: Arc<AtomicBool>,
            frame: RgbaImage,
        }

        impl ScreenCapturer for GateCapturer {
            fn capture_frame(&self) -> Result<RgbaImage, ScreenshotError> {
                self.entered.store(true, Ordering::SeqCst);
                while !self.release.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(self.frame.clone())
            }
        }

        let dir = TempDir::new().unwrap();
        let entered = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        let mgr = Arc::new(ScreenshotManager::new(
            dir.path(),
            "test-session",
            Duration::from_secs(3600),
            Arc::new(GateCapturer {
                entered: entered.clone(),
                release: release.clone(),
                frame: gradient(200, 200),
            }),
        ));
        mgr.start().unwrap();

        let worker = {
            let mgr = mgr.clone();
            std::thread::spawn(move || mgr.capture())
        };
        while !entered.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }

        // The worker is mid-grab; a second caller sees the claimed
        // window and returns instead of waiting for the grab.
        assert!(mgr.capture().is_none());

        release.store(true, Ordering::SeqCst);
        assert!(worker.join().unwrap().is_some());
    }

    #[test]
    fn capturer_failure_yields_none_not_error() {
        let dir = TempDir::new().unwrap();
        let mgr = ScreenshotManager::new(
            dir.path(),
            "test-session",
            Duration::ZERO,
            Arc::new(FailingCapturer),
        );
        mgr.start().unwrap();
        assert!(mgr.capture().is_none());
    }

    #[test]
    fn files_land_in_session_directory() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, 0, gradient(200, 200));
        mgr.start().unwrap();

        let path = mgr.capture().unwrap();
        assert!(path.starts_with(dir.path().join("test-session")));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("capture_"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn validate_frame_accepts_real_content() {
        assert!(validate_frame(&gradient(100, 100)));
        assert!(!validate_frame(&gradient(99, 100)));
    }
}
