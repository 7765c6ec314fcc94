use super::{ShutdownReason, ThreatcamOrchestrator};
use crate::error::{Result, ThreatcamError};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

impl ThreatcamOrchestrator {
    /// Run until a signal arrives or the HTTP server dies, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Threatcam is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| ThreatcamError::system("Shutdown sender already taken"))?;

        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| ThreatcamError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender).await;

        let shutdown_reason = match self.server_task.take() {
            Some(mut server) => {
                let reason = tokio::select! {
                    reason = &mut shutdown_receiver => reason.map_err(|_| {
                        ThreatcamError::system("Shutdown channel closed unexpectedly")
                    }),
                    outcome = &mut server => {
                        let message = match outcome {
                            Ok(Ok(())) => "HTTP server exited".to_string(),
                            Ok(Err(e)) => format!("HTTP server failed: {}", e),
                            Err(e) => format!("HTTP server task panicked: {}", e),
                        };
                        error!("{}", message);
                        Ok(ShutdownReason::Error(message))
                    }
                };

                // A completed handle must not be awaited again during shutdown
                if !server.is_finished() {
                    self.server_task = Some(server);
                }
                reason?
            }
            None => shutdown_receiver
                .await
                .map_err(|_| ThreatcamError::system("Shutdown channel closed unexpectedly"))?,
        };

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let shutdown_code = self.shutdown().await?;
        let exit_code = shutdown_code.max(shutdown_reason.exit_code());

        info!("Threatcam shutdown complete");
        Ok(exit_code)
    }

    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            warn!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };

                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
