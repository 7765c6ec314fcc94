use crate::error::{Result, StreamError, ThreatcamError};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Rgb24 => 3,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Per-source frame sequence number
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Wrap an already decoded image
    pub fn from_rgb(id: u64, timestamp: SystemTime, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(
            id,
            timestamp,
            image.into_raw(),
            width,
            height,
            FrameFormat::Rgb24,
        )
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => true,
        }
    }

    /// Decode the frame into an RGB image for detection and annotation
    pub fn to_rgb(&self) -> Result<RgbImage> {
        match self.format {
            FrameFormat::Mjpeg => {
                let img = image::load_from_memory_with_format(&self.data, ImageFormat::Jpeg)?;
                Ok(img.to_rgb8())
            }
            FrameFormat::Rgb24 => {
                if !self.validate_size() {
                    return Err(ThreatcamError::component(
                        "frame".to_string(),
                        format!(
                            "RGB frame {} has {} bytes, expected {:?}",
                            self.id,
                            self.data.len(),
                            self.expected_size()
                        ),
                    ));
                }
                RgbImage::from_raw(self.width, self.height, self.data.as_ref().clone()).ok_or_else(
                    || ThreatcamError::component("frame", "RGB buffer does not match dimensions"),
                )
            }
        }
    }
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ColorType::Rgb8,
        )
        .map_err(|e| StreamError::Encoding {
            details: e.to_string(),
        })?;
    Ok(buf)
}
