use crate::detection::{BoundingBox, Detection};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const ALERT_RED: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: i32 = 2;

/// Draws detection boxes, labels and placeholder text onto frames.
///
/// Text rendering needs a TrueType font; when the configured font cannot be
/// loaded only boxes and solid backgrounds are drawn.
#[derive(Clone)]
pub struct Annotator {
    font: Option<Arc<Font<'static>>>,
    font_size: f32,
}

impl Annotator {
    pub fn new(font: Option<Font<'static>>, font_size: f32) -> Self {
        Self {
            font: font.map(Arc::new),
            font_size,
        }
    }

    /// Load the label font from disk, falling back to box-only annotation
    pub fn from_font_path<P: AsRef<Path>>(path: P, font_size: f32) -> Self {
        let path = path.as_ref();
        let font = match std::fs::read(path) {
            Ok(data) => {
                let font = Font::try_from_vec(data);
                if font.is_none() {
                    warn!("Failed to parse font file '{}'", path.display());
                }
                font
            }
            Err(e) => {
                warn!(
                    "Failed to read font file '{}': {} - labels will not be drawn",
                    path.display(),
                    e
                );
                None
            }
        };

        Self::new(font, font_size)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Live-view annotation: every detection gets a box and a `"{class} {p}%"` label
    pub fn annotate_live(&self, img: &mut RgbImage, detections: &[Detection]) {
        for detection in detections {
            let label = format!("{} {}%", detection.class_name, detection.probability());
            self.draw_detection(img, &detection.bbox, &label);
        }
    }

    /// Snapshot annotation for a single recorded incident
    pub fn annotate_snapshot(&self, img: &mut RgbImage, detection: &Detection) {
        let label = format!(
            "Probability {}% this {}",
            detection.probability(),
            detection.class_name
        );
        self.draw_detection(img, &detection.bbox, &label);
    }

    /// Draw one bounding box with its label just above the top-left corner
    pub fn draw_detection(&self, img: &mut RgbImage, bbox: &BoundingBox, label: &str) {
        let Some(clamped) = bbox.clamp_to(img.width(), img.height()) else {
            debug!("Skipping detection box {:?} outside frame", bbox);
            return;
        };

        for inset in 0..BOX_THICKNESS {
            let width = clamped.width() - 2 * inset;
            let height = clamped.height() - 2 * inset;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(clamped.x1 + inset, clamped.y1 + inset)
                .of_size(width as u32, height as u32);
            draw_hollow_rect_mut(img, rect, ALERT_RED);
        }

        if let Some(font) = self.font.as_deref() {
            let scale = Scale::uniform(self.font_size);
            let (_, text_height) = text_size(scale, font, label);
            let y = (clamped.y1 - text_height - 4).max(0);
            draw_text_mut(img, ALERT_RED, clamped.x1, y, scale, font, label);
        }
    }

    /// Solid black frame with a status message roughly centred vertically
    pub fn placeholder(&self, width: u32, height: u32, message: &str) -> RgbImage {
        let mut img = RgbImage::new(width, height);

        if let Some(font) = self.font.as_deref() {
            let scale = Scale::uniform(self.font_size * 1.6);
            let x = (width / 12) as i32;
            let y = (height / 2) as i32;
            draw_text_mut(&mut img, ALERT_RED, x, y, scale, font, message);
        }

        img
    }
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("has_font", &self.font.is_some())
            .field("font_size", &self.font_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection::new("tank", 0.9, BoundingBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn test_box_is_drawn_in_red() {
        let annotator = Annotator::new(None, 16.0);
        let mut img = RgbImage::new(64, 64);
        annotator.annotate_live(&mut img, &[detection(10, 10, 40, 40)]);

        assert_eq!(*img.get_pixel(10, 10), ALERT_RED);
        assert_eq!(*img.get_pixel(11, 20), ALERT_RED);
        assert_eq!(*img.get_pixel(25, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_box_outside_frame_is_ignored() {
        let annotator = Annotator::new(None, 16.0);
        let mut img = RgbImage::new(32, 32);
        annotator.annotate_live(&mut img, &[detection(100, 100, 200, 200)]);
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_box_partially_outside_is_clamped() {
        let annotator = Annotator::new(None, 16.0);
        let mut img = RgbImage::new(32, 32);
        annotator.annotate_live(&mut img, &[detection(-5, -5, 100, 100)]);
        assert_eq!(*img.get_pixel(0, 0), ALERT_RED);
        assert_eq!(*img.get_pixel(31, 31), ALERT_RED);
    }

    #[test]
    fn test_placeholder_without_font_is_black() {
        let annotator = Annotator::from_font_path("/nonexistent/font.ttf", 16.0);
        assert!(!annotator.has_font());
        let img = annotator.placeholder(640, 480, "Connecting...");
        assert_eq!(img.dimensions(), (640, 480));
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
