use super::types::{ComponentState, ShutdownReason};
use crate::alerts::AlertBroadcaster;
use crate::camera::{DefaultSourceFactory, SourceFactory};
use crate::config::ThreatcamConfig;
use crate::detection::{Detector, NullDetector};
use crate::error::Result;
use crate::session::SessionRegistry;
use crate::store::{InMemoryStore, IncidentStore};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns every long-running part of the service and their lifecycle
pub struct ThreatcamOrchestrator {
    pub(super) config: ThreatcamConfig,
    pub(super) store: Arc<dyn IncidentStore>,
    pub(super) detector: Arc<dyn Detector>,
    pub(super) sources: Arc<dyn SourceFactory>,

    // Running components, populated by `start`
    pub(super) alerts: Option<AlertBroadcaster>,
    pub(super) alert_task: Option<JoinHandle<()>>,
    pub(super) sessions: Option<SessionRegistry>,
    pub(super) server_task: Option<JoinHandle<Result<()>>>,
    pub(super) local_addr: Option<SocketAddr>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl ThreatcamOrchestrator {
    /// Create an orchestrator with the in-memory store seeded from `config.cameras`
    pub async fn new(config: ThreatcamConfig) -> Result<Self> {
        let store: Arc<dyn IncidentStore> =
            Arc::new(InMemoryStore::with_cameras(config.cameras.clone()));
        let sources: Arc<dyn SourceFactory> =
            Arc::new(DefaultSourceFactory::new(config.source.jpeg_quality));

        Ok(Self::with_components(
            config,
            store,
            Arc::new(NullDetector),
            sources,
        ))
    }

    /// Create an orchestrator around caller-supplied store, detector and camera backend
    pub fn with_components(
        config: ThreatcamConfig,
        store: Arc<dyn IncidentStore>,
        detector: Arc<dyn Detector>,
        sources: Arc<dyn SourceFactory>,
    ) -> Self {
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        info!(
            "Orchestrator created with detector '{}' and {} seeded cameras",
            detector.name(),
            config.cameras.len()
        );

        Self {
            config,
            store,
            detector,
            sources,
            alerts: None,
            alert_task: None,
            sessions: None,
            server_task: None,
            local_addr: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ThreatcamConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn IncidentStore> {
        Arc::clone(&self.store)
    }

    /// Session registry, available once started
    pub fn sessions(&self) -> Option<&SessionRegistry> {
        self.sessions.as_ref()
    }

    /// Alert broadcaster, available once started
    pub fn alerts(&self) -> Option<&AlertBroadcaster> {
        self.alerts.as_ref()
    }

    /// Address the HTTP server actually bound to
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
