use super::{CooldownTracker, IncidentStatus, SnapshotStore};
use crate::alerts::{AlertBroadcaster, AlertEvent};
use crate::detection::Detection;
use crate::error::Result;
use crate::frame::encode_jpeg;
use crate::overlay::Annotator;
use crate::store::{CameraId, Incident, IncidentStore, NewIncident};
use chrono::Utc;
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// What happened to the detections of one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub accepted: usize,
    pub suppressed: usize,
    pub failed: usize,
    pub alerted: usize,
}

impl RecordOutcome {
    pub fn is_empty(&self) -> bool {
        self.accepted == 0 && self.suppressed == 0 && self.failed == 0
    }
}

/// Turns detections that pass the cooldown into persisted incidents and alerts
#[derive(Clone)]
pub struct IncidentRecorder {
    store: Arc<dyn IncidentStore>,
    snapshots: SnapshotStore,
    cooldown: Arc<CooldownTracker>,
    alerts: AlertBroadcaster,
    annotator: Annotator,
    jpeg_quality: u8,
}

impl IncidentRecorder {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        snapshots: SnapshotStore,
        cooldown: Arc<CooldownTracker>,
        alerts: AlertBroadcaster,
        annotator: Annotator,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            store,
            snapshots,
            cooldown,
            alerts,
            annotator,
            jpeg_quality,
        }
    }

    pub fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    /// Record every detection of one frame that is outside its cooldown window.
    ///
    /// Storage and snapshot failures are logged and counted, never returned.
    pub async fn process(
        &self,
        camera_id: CameraId,
        frame: &RgbImage,
        detections: &[Detection],
        now: Instant,
    ) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();

        for detection in detections {
            if !self
                .cooldown
                .try_accept(camera_id, &detection.class_name, now)
            {
                outcome.suppressed += 1;
                continue;
            }

            match self.record(camera_id, frame, detection).await {
                Ok(incident) => {
                    outcome.accepted += 1;
                    if self.announce(&incident) {
                        outcome.alerted += 1;
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    error!(
                        "Failed to record '{}' incident for camera {}: {}",
                        detection.class_name, camera_id, e
                    );
                }
            }
        }

        if !outcome.is_empty() {
            debug!("Camera {} frame outcome: {:?}", camera_id, outcome);
        }

        outcome
    }

    async fn record(
        &self,
        camera_id: CameraId,
        frame: &RgbImage,
        detection: &Detection,
    ) -> Result<Incident> {
        let mut snapshot = frame.clone();
        self.annotator.annotate_snapshot(&mut snapshot, detection);
        let jpeg = encode_jpeg(&snapshot, self.jpeg_quality)?;

        let image_path = self
            .snapshots
            .save(camera_id, &detection.class_name, Utc::now(), &jpeg)
            .await?;

        let probability = detection.probability();
        let incident = self
            .store
            .create_incident(NewIncident {
                camera_id,
                class_name: detection.class_name.clone(),
                probability,
                image_path,
                status: IncidentStatus::classify(probability),
            })
            .await?;

        info!(
            "Incident {} recorded: {} {}% on camera {} ({})",
            incident.id, incident.class_name, incident.probability, camera_id, incident.status
        );

        Ok(incident)
    }

    fn announce(&self, incident: &Incident) -> bool {
        let Some(event) = AlertEvent::for_incident(incident) else {
            return false;
        };

        match self.alerts.publish(event) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to publish alert for incident {}: {}", incident.id, e);
                false
            }
        }
    }
}
