use crate::error::FrameError;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A decoded 8-bit RGB frame and the moment it was captured
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data (height x width x 3)
    pub image: RgbImage,
    /// Capture timestamp
    pub captured_at: SystemTime,
}

impl Frame {
    /// Wrap an image captured now
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: SystemTime::now(),
        }
    }

    /// Build a frame from tightly packed RGB bytes
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let actual = data.len();
        let image = RgbImage::from_raw(width, height, data).ok_or(FrameError::BufferSize {
            width,
            height,
            actual,
        })?;
        Ok(Self::new(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Capture metadata as published next to each raw frame
    pub fn meta(&self) -> CaptureMeta {
        CaptureMeta {
            ts: unix_seconds(self.captured_at),
            w: self.width(),
            h: self.height(),
        }
    }

    /// Encode the frame as JPEG at the given quality (1-100)
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        encode_jpeg(&self.image, quality)
    }

    /// Decode a JPEG payload into a frame stamped with the current time
    pub fn decode_jpeg(data: &[u8]) -> Result<Self, FrameError> {
        let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(|e| FrameError::Decode {
                details: e.to_string(),
            })?
            .to_rgb8();
        Ok(Self::new(image))
    }
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::with_capacity(image.len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder
        .encode_image(image)
        .map_err(|e| FrameError::Encode {
            details: e.to_string(),
        })?;
    Ok(buf)
}

/// Width/height/timestamp of the last frame a stream published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMeta {
    pub ts: i64,
    pub w: u32,
    pub h: u32,
}

/// Seconds since the Unix epoch, saturating at zero for pre-epoch clocks
pub fn unix_seconds(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i64
}
