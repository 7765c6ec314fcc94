use super::types::{ALERTS, SESSIONS, STREAMING};
use super::{ComponentState, ThreatcamOrchestrator};
use crate::alerts::AlertBroadcaster;
use crate::error::Result;
use crate::incident::SnapshotStore;
use crate::session::{Pipeline, SessionRegistry};
use crate::streaming::{AppState, StreamServer};
use std::sync::Arc;
use tracing::{error, info, warn};

impl ThreatcamOrchestrator {
    /// Register all components and prepare the capture directory
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing threatcam components");

        let mut states = self.component_states.lock().await;
        states.insert(ALERTS.to_string(), ComponentState::Stopped);
        states.insert(SESSIONS.to_string(), ComponentState::Stopped);
        states.insert(STREAMING.to_string(), ComponentState::Stopped);
        drop(states);

        tokio::fs::create_dir_all(&self.config.incident.capture_path)
            .await
            .map_err(|e| {
                error!(
                    "Cannot create capture directory {}: {}",
                    self.config.incident.capture_path, e
                );
                e
            })?;

        if self.config.cameras.is_empty() {
            warn!("No cameras configured; add them through POST /cameras");
        }

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start the alert dispatcher, the session registry and the HTTP server
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting threatcam");

        // Alert dispatcher first so the first incident already has somewhere to go
        self.set_component_state(ALERTS, ComponentState::Starting)
            .await;
        let (alerts, alert_task) = AlertBroadcaster::start(self.cancellation_token.child_token());
        self.alerts = Some(alerts.clone());
        self.alert_task = Some(alert_task);
        self.set_component_state(ALERTS, ComponentState::Running)
            .await;
        info!("Alert dispatcher started");

        // Sessions are created lazily per camera when a viewer attaches
        self.set_component_state(SESSIONS, ComponentState::Starting)
            .await;
        let pipeline = Pipeline::from_config(
            &self.config,
            Arc::clone(&self.store),
            alerts.clone(),
            Arc::clone(&self.detector),
        )?;
        let sessions = SessionRegistry::new(
            pipeline,
            Arc::clone(&self.sources),
            self.cancellation_token.child_token(),
        );
        self.sessions = Some(sessions.clone());
        self.set_component_state(SESSIONS, ComponentState::Running)
            .await;
        info!("Session registry ready");

        self.set_component_state(STREAMING, ComponentState::Starting)
            .await;
        let snapshots = SnapshotStore::new(
            &self.config.incident.capture_path,
            &self.config.incident.timestamp_timezone,
        );
        let state = AppState::new(Arc::clone(&self.store), sessions, alerts, snapshots);
        let server = StreamServer::new(self.config.server.clone(), state);

        let listener = match server.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                self.set_component_state(STREAMING, ComponentState::Failed)
                    .await;
                error!("Failed to start HTTP server: {}", e);
                return Err(e);
            }
        };
        self.local_addr = listener.local_addr().ok();

        let shutdown = self.cancellation_token.child_token();
        self.server_task = Some(tokio::spawn(async move {
            server.serve(listener, shutdown).await
        }));
        self.set_component_state(STREAMING, ComponentState::Running)
            .await;

        info!(
            "Threatcam started, serving on {}",
            self.local_addr
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| self.config.server.ip.clone())
        );
        Ok(())
    }
}
