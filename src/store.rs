use crate::config::CameraSeed;
use crate::error::StoreError;
use crate::incident::IncidentStatus;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub type CameraId = i64;
pub type IncidentId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: CameraId,
    pub name: String,
    pub url: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCamera {
    pub name: String,
    pub url: String,
    #[serde(default = "unknown_location")]
    pub location: String,
}

fn unknown_location() -> String {
    "Unknown".to_string()
}

impl From<CameraSeed> for NewCamera {
    fn from(seed: CameraSeed) -> Self {
        Self {
            name: seed.name,
            url: seed.url,
            location: seed.location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub camera_id: CameraId,
    pub class_name: String,
    pub probability: f64,
    pub image_path: String,
    pub status: IncidentStatus,
    pub timestamp: DateTime<Utc>,
}

/// Fields supplied by the recorder; id and timestamp come from the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewIncident {
    pub camera_id: CameraId,
    pub class_name: String,
    pub probability: f64,
    pub image_path: String,
    pub status: IncidentStatus,
}

/// Incident listing query, newest first
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub camera_id: Option<CameraId>,
    #[serde(default, deserialize_with = "deserialize_filter_time")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_filter_time")]
    pub end_date: Option<DateTime<Utc>>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl IncidentFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn matches(&self, incident: &Incident) -> bool {
        self.status.map_or(true, |s| incident.status == s)
            && self.camera_id.map_or(true, |c| incident.camera_id == c)
            && self.start_date.map_or(true, |t| incident.timestamp >= t)
            && self.end_date.map_or(true, |t| incident.timestamp <= t)
    }
}

/// Parse a filter bound: RFC 3339, or a zone-less date/datetime taken as UTC
pub fn parse_filter_time(value: &str) -> Result<DateTime<Utc>, StoreError> {
    let value = value.trim();

    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| StoreError::InvalidUpdate {
            details: format!("Invalid date filter '{}'", value),
        })
}

fn deserialize_filter_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_filter_time(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

/// Persistence collaborator for cameras and incidents.
///
/// The detection pipeline only needs `get_camera` and `create_incident`; the
/// rest backs the HTTP surface.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn get_camera(&self, id: CameraId) -> Result<Option<Camera>, StoreError>;

    async fn list_cameras(&self, skip: usize, limit: usize) -> Result<Vec<Camera>, StoreError>;

    async fn create_camera(&self, camera: NewCamera) -> Result<Camera, StoreError>;

    /// Returns the removed camera, `None` if it did not exist
    async fn delete_camera(&self, id: CameraId) -> Result<Option<Camera>, StoreError>;

    async fn create_incident(&self, incident: NewIncident) -> Result<Incident, StoreError>;

    async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>, StoreError>;

    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, StoreError>;

    /// Reviewer reclassification; `new_class` optionally renames the detected class
    async fn update_incident_status(
        &self,
        id: IncidentId,
        status: IncidentStatus,
        new_class: Option<String>,
    ) -> Result<Incident, StoreError>;

    async fn delete_incident(&self, id: IncidentId) -> Result<Option<Incident>, StoreError>;
}

#[derive(Debug, Default)]
struct StoreInner {
    cameras: BTreeMap<CameraId, Camera>,
    incidents: BTreeMap<IncidentId, Incident>,
    next_camera_id: CameraId,
    next_incident_id: IncidentId,
}

/// Process-local store; contents are lost on restart
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with configured cameras
    pub fn with_cameras(seeds: Vec<CameraSeed>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for seed in seeds {
                let camera = Self::insert_camera(&mut inner, seed.into());
                info!(
                    "Registered camera {} '{}' ({})",
                    camera.id, camera.name, camera.location
                );
            }
        }
        store
    }

    pub fn camera_count(&self) -> usize {
        self.inner.read().cameras.len()
    }

    pub fn incident_count(&self) -> usize {
        self.inner.read().incidents.len()
    }

    fn insert_camera(inner: &mut StoreInner, camera: NewCamera) -> Camera {
        inner.next_camera_id += 1;
        let camera = Camera {
            id: inner.next_camera_id,
            name: camera.name,
            url: camera.url,
            location: camera.location,
        };
        inner.cameras.insert(camera.id, camera.clone());
        camera
    }
}

#[async_trait]
impl IncidentStore for InMemoryStore {
    async fn get_camera(&self, id: CameraId) -> Result<Option<Camera>, StoreError> {
        Ok(self.inner.read().cameras.get(&id).cloned())
    }

    async fn list_cameras(&self, skip: usize, limit: usize) -> Result<Vec<Camera>, StoreError> {
        Ok(self
            .inner
            .read()
            .cameras
            .values()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_camera(&self, camera: NewCamera) -> Result<Camera, StoreError> {
        if camera.url.trim().is_empty() {
            return Err(StoreError::InvalidUpdate {
                details: "camera url must not be empty".to_string(),
            });
        }
        let camera = Self::insert_camera(&mut self.inner.write(), camera);
        debug!("Created camera {}", camera.id);
        Ok(camera)
    }

    async fn delete_camera(&self, id: CameraId) -> Result<Option<Camera>, StoreError> {
        Ok(self.inner.write().cameras.remove(&id))
    }

    async fn create_incident(&self, incident: NewIncident) -> Result<Incident, StoreError> {
        let mut inner = self.inner.write();
        inner.next_incident_id += 1;
        let incident = Incident {
            id: inner.next_incident_id,
            camera_id: incident.camera_id,
            class_name: incident.class_name,
            probability: incident.probability,
            image_path: incident.image_path,
            status: incident.status,
            timestamp: Utc::now(),
        };
        inner.incidents.insert(incident.id, incident.clone());
        Ok(incident)
    }

    async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>, StoreError> {
        Ok(self.inner.read().incidents.get(&id).cloned())
    }

    async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, StoreError> {
        let inner = self.inner.read();
        let mut incidents: Vec<Incident> = inner
            .incidents
            .values()
            .filter(|incident| filter.matches(incident))
            .cloned()
            .collect();

        incidents.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        Ok(incidents
            .into_iter()
            .skip(filter.skip.unwrap_or(0))
            .take(filter.limit.unwrap_or(IncidentFilter::DEFAULT_LIMIT))
            .collect())
    }

    async fn update_incident_status(
        &self,
        id: IncidentId,
        status: IncidentStatus,
        new_class: Option<String>,
    ) -> Result<Incident, StoreError> {
        let new_class = match new_class {
            Some(class) if class.trim().is_empty() => {
                return Err(StoreError::InvalidUpdate {
                    details: "new_class must not be empty".to_string(),
                })
            }
            other => other,
        };

        let mut inner = self.inner.write();
        let incident = inner
            .incidents
            .get_mut(&id)
            .ok_or(StoreError::IncidentNotFound { id })?;

        incident.status.validate_transition(status)?;
        incident.status = status;
        if let Some(class) = new_class {
            incident.class_name = class;
        }

        Ok(incident.clone())
    }

    async fn delete_incident(&self, id: IncidentId) -> Result<Option<Incident>, StoreError> {
        Ok(self.inner.write().incidents.remove(&id))
    }
}
