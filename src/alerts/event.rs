use crate::incident::IncidentStatus;
use crate::store::{CameraId, Incident, IncidentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    NewIncident,
}

/// Notification pushed to subscribers for each new non-trash incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub incident_id: IncidentId,
    pub camera_id: CameraId,
    pub class_name: String,
    pub probability: f64,
    pub image_path: String,
    pub status: IncidentStatus,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    /// Build the alert for a just-created incident; `None` for trash
    pub fn for_incident(incident: &Incident) -> Option<Self> {
        incident.status.is_alertable().then(|| Self {
            kind: AlertKind::NewIncident,
            incident_id: incident.id,
            camera_id: incident.camera_id,
            class_name: incident.class_name.clone(),
            probability: incident.probability,
            image_path: incident.image_path.clone(),
            status: incident.status,
            timestamp: incident.timestamp,
        })
    }

    pub fn description(&self) -> String {
        format!(
            "{} on camera {} ({}%, {})",
            self.class_name, self.camera_id, self.probability, self.status
        )
    }
}
