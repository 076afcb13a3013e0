//! Violation snapshots

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// JPEG quality used for violation snapshots
pub const SNAPSHOT_JPEG_QUALITY: u8 = 70;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("no frame source")]
    NoSource,

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}

/// Source of the current camera frame
pub trait SnapshotProvider: Send + Sync {
    fn capture_frame(&self) -> Result<RgbImage, SnapshotError>;
}

/// Provider used when no camera frames are available
pub struct NoSnapshots;

impl SnapshotProvider for NoSnapshots {
    fn capture_frame(&self) -> Result<RgbImage, SnapshotError> {
        Err(SnapshotError::NoSource)
    }
}

/// Holds the most recent camera frame pushed by the frame source.
/// Captures copy it; before the first frame arrives there is no source.
#[derive(Default)]
pub struct LatestFrame {
    frame: Mutex<Option<RgbImage>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, frame: RgbImage) -> Result<(), SnapshotError> {
        let mut guard = self
            .frame
            .lock()
            .map_err(|_| SnapshotError::Capture("frame lock poisoned".into()))?;
        *guard = Some(frame);
        Ok(())
    }

    /// Decode an encoded image (JPEG, PNG) and keep it as the latest frame.
    /// Returns the frame dimensions.
    pub fn update_encoded(&self, bytes: &[u8]) -> Result<(u32, u32), SnapshotError> {
        let frame = image::load_from_memory(bytes)?.to_rgb8();
        let dimensions = frame.dimensions();
        debug!(width = dimensions.0, height = dimensions.1, "Camera frame updated");
        self.update(frame)?;
        Ok(dimensions)
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.frame.lock() {
            *guard = None;
        }
    }

    pub fn has_frame(&self) -> bool {
        self.frame.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

impl SnapshotProvider for LatestFrame {
    fn capture_frame(&self) -> Result<RgbImage, SnapshotError> {
        let guard = self
            .frame
            .lock()
            .map_err(|_| SnapshotError::Capture("frame lock poisoned".into()))?;
        guard.clone().ok_or(SnapshotError::NoSource)
    }
}

/// Encode a frame as JPEG
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, SnapshotError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(frame)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_jpeg() {
        let frame = RgbImage::from_pixel(32, 24, image::Rgb([200, 120, 40]));
        let jpeg = encode_jpeg(&frame, SNAPSHOT_JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_no_snapshots() {
        assert!(matches!(NoSnapshots.capture_frame(), Err(SnapshotError::NoSource)));
    }

    #[test]
    fn test_latest_frame() {
        let latest = LatestFrame::new();
        assert!(matches!(latest.capture_frame(), Err(SnapshotError::NoSource)));

        let jpeg = encode_jpeg(&RgbImage::from_pixel(16, 8, image::Rgb([10, 20, 30])), 90).unwrap();
        assert_eq!(latest.update_encoded(&jpeg).unwrap(), (16, 8));
        assert!(latest.has_frame());
        assert_eq!(latest.capture_frame().unwrap().dimensions(), (16, 8));

        latest
            .update(RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0])))
            .unwrap();
        assert_eq!(latest.capture_frame().unwrap().dimensions(), (4, 4));

        latest.clear();
        assert!(!latest.has_frame());
    }

    #[test]
    fn test_garbage_bytes_keep_previous_frame() {
        let latest = LatestFrame::new();
        latest
            .update(RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0])))
            .unwrap();
        assert!(matches!(
            latest.update_encoded(b"not an image"),
            Err(SnapshotError::Image(_))
        ));
        assert_eq!(latest.capture_frame().unwrap().dimensions(), (4, 4));
    }
}
