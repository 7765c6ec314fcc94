use crate::{
    alerts::AlertBroadcaster,
    config::ServerConfig,
    error::{Result, StreamError},
    incident::{SnapshotStore, CAPTURES_URL_PREFIX},
    session::SessionRegistry,
    store::IncidentStore,
};
use axum::{
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;

use super::api::{
    create_camera, delete_camera, delete_incident, get_camera, get_incident, list_cameras,
    list_incidents, update_incident_status,
};
use super::handlers::{alerts_ws_handler, health_handler, video_feed_handler};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct AppState {
    pub(crate) store: Arc<dyn IncidentStore>,
    pub(crate) sessions: SessionRegistry,
    pub(crate) alerts: AlertBroadcaster,
    pub(crate) snapshots: SnapshotStore,
    pub(crate) started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        sessions: SessionRegistry,
        alerts: AlertBroadcaster,
        snapshots: SnapshotStore,
    ) -> Self {
        Self {
            store,
            sessions,
            alerts,
            snapshots,
            started_at: Instant::now(),
        }
    }
}

/// All HTTP and WebSocket routes
pub fn build_router(state: AppState) -> Router {
    let captures = ServeDir::new(state.snapshots.root());

    Router::new()
        .route("/health", get(health_handler))
        .route("/cameras", get(list_cameras).post(create_camera))
        .route("/cameras/:id", get(get_camera).delete(delete_camera))
        .route("/video/:camera_id", get(video_feed_handler))
        .route("/incidents", get(list_incidents))
        .route("/incidents/:id", get(get_incident).delete(delete_incident))
        .route("/incidents/:id/status", put(update_incident_status))
        .route("/ws", get(alerts_ws_handler))
        .nest_service(CAPTURES_URL_PREFIX, captures)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP front end: live video, alert socket and incident review
pub struct StreamServer {
    config: ServerConfig,
    state: AppState,
}

impl StreamServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    /// Bind the listening socket; fails fast on a taken port
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.address();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| StreamError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        info!("HTTP server listening on {}", addr);
        Ok(listener)
    }

    /// Serve until `shutdown` fires
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let app = build_router(self.state);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("HTTP server stopped");
        Ok(())
    }
}
