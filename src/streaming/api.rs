use crate::error::{StoreError, ThreatcamError};
use crate::incident::IncidentStatus;
use crate::store::{Camera, CameraId, Incident, IncidentFilter, IncidentId, NewCamera};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::server::AppState;

/// Error returned by HTTP handlers, rendered as `{"error", "code"}` JSON
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CameraNotFound { .. } | StoreError::IncidentNotFound { .. } => {
                ApiError::NotFound(e.to_string())
            }
            StoreError::InvalidStatus { .. } | StoreError::InvalidUpdate { .. } => {
                ApiError::BadRequest(e.to_string())
            }
            StoreError::Unavailable { .. } => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ThreatcamError> for ApiError {
    fn from(e: ThreatcamError) -> Self {
        match e {
            ThreatcamError::Store(store) => store.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    pub new_class: Option<String>,
}

pub async fn list_cameras(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Camera>>> {
    let cameras = state
        .store
        .list_cameras(
            page.skip.unwrap_or(0),
            page.limit.unwrap_or(IncidentFilter::DEFAULT_LIMIT),
        )
        .await?;
    Ok(Json(cameras))
}

pub async fn create_camera(
    State(state): State<AppState>,
    Json(camera): Json<NewCamera>,
) -> ApiResult<Json<Camera>> {
    let camera = state.store.create_camera(camera).await?;
    info!(
        "Camera {} '{}' added at {}",
        camera.id, camera.name, camera.location
    );
    Ok(Json(camera))
}

pub async fn get_camera(
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
) -> ApiResult<Json<Camera>> {
    state
        .store
        .get_camera(id)
        .await?
        .map(Json)
        .ok_or(StoreError::CameraNotFound { id }.into())
}

/// Remove a camera and stop its live session
pub async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<CameraId>,
) -> ApiResult<Json<Camera>> {
    let camera = state
        .store
        .delete_camera(id)
        .await?
        .ok_or(StoreError::CameraNotFound { id })?;

    state.sessions.stop(id).await;
    info!("Camera {} '{}' deleted", camera.id, camera.name);
    Ok(Json(camera))
}

pub async fn list_incidents(
    State(state): State<AppState>,
    filter: Result<Query<IncidentFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<Incident>>> {
    let Query(filter) = filter.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(state.store.list_incidents(&filter).await?))
}

pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<IncidentId>,
) -> ApiResult<Json<Incident>> {
    state
        .store
        .get_incident(id)
        .await?
        .map(Json)
        .ok_or(StoreError::IncidentNotFound { id }.into())
}

/// Reviewer reclassification: `?status=confirmed&new_class=truck`
pub async fn update_incident_status(
    State(state): State<AppState>,
    Path(id): Path<IncidentId>,
    Query(update): Query<StatusUpdate>,
) -> ApiResult<Json<Incident>> {
    let status: IncidentStatus = update.status.parse()?;
    let incident = state
        .store
        .update_incident_status(id, status, update.new_class)
        .await?;

    info!(
        "Incident {} marked {} ({})",
        incident.id, incident.status, incident.class_name
    );
    Ok(Json(incident))
}

/// Delete an incident together with its snapshot file
pub async fn delete_incident(
    State(state): State<AppState>,
    Path(id): Path<IncidentId>,
) -> ApiResult<Json<serde_json::Value>> {
    let incident = state
        .store
        .delete_incident(id)
        .await?
        .ok_or(StoreError::IncidentNotFound { id })?;

    if let Err(e) = state.snapshots.remove(&incident.image_path).await {
        warn!(
            "Incident {} deleted but snapshot {} could not be removed: {}",
            id, incident.image_path, e
        );
    }

    info!("Incident {} deleted", id);
    Ok(Json(json!({ "message": "Incident deleted", "id": id })))
}
