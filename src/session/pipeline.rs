use crate::alerts::AlertBroadcaster;
use crate::camera::PlaceholderFrames;
use crate::config::{SourceConfig, ThreatcamConfig};
use crate::detection::{DetectionStage, Detector};
use crate::error::Result;
use crate::incident::{CooldownTracker, IncidentRecorder, SnapshotStore};
use crate::overlay::Annotator;
use crate::store::IncidentStore;
use std::sync::Arc;
use std::time::Duration;

/// Shared per-process handles every camera session runs frames through.
///
/// Cloning is cheap; the cooldown table, alert queue and store are shared by
/// all clones.
#[derive(Clone)]
pub struct Pipeline {
    detection: DetectionStage,
    recorder: IncidentRecorder,
    annotator: Annotator,
    placeholders: PlaceholderFrames,
    source: SourceConfig,
    viewer_buffer: usize,
}

impl Pipeline {
    /// Placeholder frames are rendered here once and shared by every session
    pub fn new(
        detection: DetectionStage,
        recorder: IncidentRecorder,
        annotator: Annotator,
        source: SourceConfig,
        viewer_buffer: usize,
    ) -> Result<Self> {
        let placeholders = PlaceholderFrames::render(&annotator, &source)?;

        Ok(Self {
            detection,
            recorder,
            annotator,
            placeholders,
            source,
            viewer_buffer: viewer_buffer.max(1),
        })
    }

    pub fn from_config(
        config: &ThreatcamConfig,
        store: Arc<dyn IncidentStore>,
        alerts: AlertBroadcaster,
        detector: Arc<dyn Detector>,
    ) -> Result<Self> {
        let annotator =
            Annotator::from_font_path(&config.incident.font_path, config.incident.font_size);

        let recorder = IncidentRecorder::new(
            store,
            SnapshotStore::new(
                &config.incident.capture_path,
                &config.incident.timestamp_timezone,
            ),
            Arc::new(CooldownTracker::new(Duration::from_secs(
                config.incident.cooldown_seconds,
            ))),
            alerts,
            annotator.clone(),
            config.source.jpeg_quality,
        );

        let detection = DetectionStage::new(
            detector,
            Duration::from_millis(config.detection.timeout_ms),
        );

        Self::new(
            detection,
            recorder,
            annotator,
            config.source.clone(),
            config.stream.viewer_buffer,
        )
    }

    pub fn detection(&self) -> &DetectionStage {
        &self.detection
    }

    pub fn recorder(&self) -> &IncidentRecorder {
        &self.recorder
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    pub fn placeholders(&self) -> &PlaceholderFrames {
        &self.placeholders
    }

    pub fn source_config(&self) -> &SourceConfig {
        &self.source
    }

    pub fn viewer_buffer(&self) -> usize {
        self.viewer_buffer
    }
}
