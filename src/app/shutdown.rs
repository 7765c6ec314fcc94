use super::types::{ALERTS, SESSIONS, STREAMING};
use super::{ComponentState, ThreatcamOrchestrator};
use crate::error::{Result, ThreatcamError};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const COMPONENT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl ThreatcamOrchestrator {
    /// Stop every component; returns 0 when all stopped cleanly
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Ends viewer streams, the accept loop and the alert dispatcher together
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        let server = self.server_task.take();
        let stopped = self
            .stop_component(STREAMING, server.is_some(), async move {
                match server {
                    Some(server) => server.await.map_err(|e| {
                        ThreatcamError::system(format!("HTTP server task failed: {}", e))
                    })?,
                    None => Ok(()),
                }
            })
            .await;
        if let Err(e) = stopped {
            error!("Error stopping streaming: {}", e);
            exit_code = 1;
        }

        let sessions = self.sessions.clone();
        let stopped = self
            .stop_component(SESSIONS, sessions.is_some(), async move {
                if let Some(sessions) = sessions {
                    sessions.stop_all().await;
                }
                Ok(())
            })
            .await;
        if let Err(e) = stopped {
            error!("Error stopping sessions: {}", e);
            exit_code = 1;
        }

        let alert_task = self.alert_task.take();
        let stopped = self
            .stop_component(ALERTS, alert_task.is_some(), async move {
                if let Some(task) = alert_task {
                    task.await.map_err(|e| {
                        ThreatcamError::system(format!("Alert dispatcher task failed: {}", e))
                    })?;
                }
                Ok(())
            })
            .await;
        if let Err(e) = stopped {
            error!("Error stopping alerts: {}", e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component<F>(&self, component: &str, started: bool, stopping: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        if !started {
            self.set_component_state(component, ComponentState::Stopped)
                .await;
            return Ok(());
        }

        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(COMPONENT_STOP_TIMEOUT, stopping).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Error stopping {} component: {}", component, e);
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", component);
                Err(ThreatcamError::component(
                    component.to_string(),
                    "stop timeout".to_string(),
                ))
            }
        }
    }
}
