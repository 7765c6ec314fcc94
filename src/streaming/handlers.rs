use crate::alerts::{AlertBroadcaster, AlertEvent};
use crate::error::AlertError;
use crate::store::CameraId;
use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, trace, warn};

use super::api::ApiError;
use super::server::AppState;

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// Live annotated MJPEG feed for one camera
pub async fn video_feed_handler(
    Path(camera_id): Path<CameraId>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let camera = state
        .store
        .get_camera(camera_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Camera {} not found", camera_id)))?;

    let mut viewer = state.sessions.attach(&camera);
    info!("New MJPEG viewer for camera {}", camera_id);

    let stream = async_stream::stream! {
        let mut frames_streamed = 0u64;

        while let Some(jpeg) = viewer.next_frame().await {
            frames_streamed += 1;
            trace!(
                "Streaming frame {} ({} bytes) for camera {}",
                frames_streamed,
                jpeg.len(),
                camera_id
            );

            yield Ok::<_, std::io::Error>(Bytes::from_static(PART_HEADER));
            yield Ok(jpeg);
            yield Ok(Bytes::from_static(PART_TRAILER));
        }

        debug!(
            "MJPEG stream for camera {} ended after {} frames",
            camera_id, frames_streamed
        );
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )
        .header(header::CACHE_CONTROL, "no-cache, private")
        .header(header::PRAGMA, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Upgrade to a WebSocket that receives every new alert as JSON
pub async fn alerts_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_alert_socket(socket, state.alerts))
}

pub(crate) fn alert_message(event: &AlertEvent) -> Result<Message, AlertError> {
    serde_json::to_string(event)
        .map(Message::Text)
        .map_err(|e| AlertError::Serialization {
            details: e.to_string(),
        })
}

async fn handle_alert_socket(socket: WebSocket, alerts: AlertBroadcaster) {
    let conn_id = uuid::Uuid::new_v4();
    let mut subscription = alerts.subscribe();
    info!(
        "Alert socket {} connected (subscriber {})",
        conn_id,
        subscription.id()
    );

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let message = match alert_message(&event) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping alert {}: {}", event.incident_id, e);
                    continue;
                }
            };

            if sink.send(message).await.is_err() {
                debug!("Alert socket {} closed while sending", conn_id);
                break;
            }
        }
    });

    // Inbound payloads only keep the connection alive
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => trace!("Ignoring inbound message on alert socket {}", conn_id),
            Err(e) => {
                debug!("Alert socket {} receive error: {}", conn_id, e);
                break;
            }
        }
    }

    send_task.abort();
    info!("Alert socket {} disconnected", conn_id);
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.alerts.stats();
    let cameras = match state.store.list_cameras(0, usize::MAX).await {
        Ok(cameras) => Some(cameras.len()),
        Err(e) => {
            warn!("Health check could not list cameras: {}", e);
            None
        }
    };

    let status = if cameras.is_some() { "healthy" } else { "degraded" };

    let health_info = serde_json::json!({
        "status": status,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "cameras": cameras,
        "active_sessions": state.sessions.active_count(),
        "detector": state.sessions.pipeline().detection().detector_name(),
        "alerts": {
            "subscribers": state.alerts.subscriber_count(),
            "published": stats.published,
            "delivered": stats.delivered,
            "dropped_subscribers": stats.dropped_subscribers,
        },
    });

    (StatusCode::OK, Json(health_info))
}
