use crate::error::DetectionError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Axis-aligned box in pixel coordinates, `x2`/`y2` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Restrict the box to a `width` x `height` frame; `None` if nothing is left
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let (w, h) = (width as i32, height as i32);
        let clamped = BoundingBox {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        };

        if clamped.x2 <= clamped.x1 || clamped.y2 <= clamped.y1 {
            None
        } else {
            Some(clamped)
        }
    }
}

/// One object found in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    /// Model confidence in `0.0..=1.0`
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new<S: Into<String>>(class_name: S, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }

    /// Confidence scaled to a percentage, rounded to two decimals
    pub fn probability(&self) -> f64 {
        (self.confidence as f64 * 10_000.0).round() / 100.0
    }
}

/// Object detection model boundary.
///
/// Implementations are synchronous and may block for the duration of one
/// inference; callers run them on the blocking thread pool.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>, DetectionError>;

    fn name(&self) -> &str {
        "detector"
    }
}

/// Stand-in used when no model is loaded: never reports anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Runs a [`Detector`] with a time budget and degrades every failure to
/// "no detections this frame".
#[derive(Clone)]
pub struct DetectionStage {
    detector: Arc<dyn Detector>,
    budget: Duration,
}

impl DetectionStage {
    pub fn new(detector: Arc<dyn Detector>, budget: Duration) -> Self {
        Self { detector, budget }
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Run inference on one frame, propagating failures
    pub async fn try_run(&self, frame: Arc<RgbImage>) -> Result<Vec<Detection>, DetectionError> {
        let detector = Arc::clone(&self.detector);
        let task = tokio::task::spawn_blocking(move || detector.detect(&frame));

        // A timed-out inference keeps running on the blocking pool; its result is discarded
        let detections = match tokio::time::timeout(self.budget, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                return Err(DetectionError::Panicked {
                    details: join_err.to_string(),
                })
            }
            Err(_) => {
                return Err(DetectionError::Timeout {
                    budget: self.budget,
                })
            }
        };

        Ok(detections
            .into_iter()
            .filter(|d| d.confidence.is_finite() && (0.0..=1.0).contains(&d.confidence))
            .collect())
    }

    /// Run inference on one frame; any failure yields an empty list
    pub async fn run(&self, frame: Arc<RgbImage>) -> Vec<Detection> {
        match self.try_run(frame).await {
            Ok(detections) => {
                debug!(
                    "Detector '{}' returned {} detections",
                    self.detector.name(),
                    detections.len()
                );
                detections
            }
            Err(e) => {
                warn!(
                    "Detector '{}' failed, treating frame as empty: {}",
                    self.detector.name(),
                    e
                );
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for DetectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionStage")
            .field("detector", &self.detector.name())
            .field("budget", &self.budget)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector(Vec<Detection>);

    impl Detector for FixedDetector {
        fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
            Err(DetectionError::Inference {
                details: "model not loaded".to_string(),
            })
        }
    }

    struct SlowDetector;

    impl Detector for SlowDetector {
        fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![Detection::new("tank", 0.9, BoundingBox::new(0, 0, 1, 1))])
        }
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
            panic!("inference crashed");
        }
    }

    fn frame() -> Arc<RgbImage> {
        Arc::new(RgbImage::new(8, 8))
    }

    #[test]
    fn test_probability_scaling() {
        let d = Detection::new("tank", 0.91234, BoundingBox::new(0, 0, 1, 1));
        assert_eq!(d.probability(), 91.23);
        let d = Detection::new("tank", 0.35, BoundingBox::new(0, 0, 1, 1));
        assert_eq!(d.probability(), 35.0);
    }

    #[test]
    fn test_bounding_box_clamp() {
        let b = BoundingBox::new(-10, 5, 50, 500);
        assert_eq!(b.clamp_to(40, 100), Some(BoundingBox::new(0, 5, 40, 100)));
        assert_eq!(BoundingBox::new(50, 50, 60, 60).clamp_to(40, 40), None);
        assert_eq!(BoundingBox::new(10, 10, 10, 20).clamp_to(40, 40), None);
    }

    #[tokio::test]
    async fn test_stage_passes_detections_through() {
        let stage = DetectionStage::new(
            Arc::new(FixedDetector(vec![
                Detection::new("tank", 0.9, BoundingBox::new(0, 0, 4, 4)),
                Detection::new("bogus", f32::NAN, BoundingBox::new(0, 0, 4, 4)),
                Detection::new("bogus", 1.5, BoundingBox::new(0, 0, 4, 4)),
            ])),
            Duration::from_secs(1),
        );

        let detections = stage.run(frame()).await;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_name, "tank");
    }

    #[tokio::test]
    async fn test_stage_failure_yields_no_detections() {
        let stage = DetectionStage::new(Arc::new(FailingDetector), Duration::from_secs(1));
        assert!(stage.try_run(frame()).await.is_err());
        assert!(stage.run(frame()).await.is_empty());
    }

    #[tokio::test]
    async fn test_stage_timeout_yields_no_detections() {
        let stage = DetectionStage::new(Arc::new(SlowDetector), Duration::from_millis(20));
        match stage.try_run(frame()).await {
            Err(DetectionError::Timeout { budget }) => {
                assert_eq!(budget, Duration::from_millis(20))
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(stage.run(frame()).await.is_empty());
    }

    #[tokio::test]
    async fn test_stage_panic_yields_no_detections() {
        let stage = DetectionStage::new(Arc::new(PanickingDetector), Duration::from_secs(1));
        assert!(matches!(
            stage.try_run(frame()).await,
            Err(DetectionError::Panicked { .. })
        ));
        assert!(stage.run(frame()).await.is_empty());
    }

    #[tokio::test]
    async fn test_null_detector() {
        let stage = DetectionStage::new(Arc::new(NullDetector), Duration::from_secs(1));
        assert_eq!(stage.detector_name(), "null");
        assert!(stage.run(frame()).await.is_empty());
    }
}
