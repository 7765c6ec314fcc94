use super::{Pipeline, SessionState};
use crate::camera::{FrameKind, FrameSource};
use crate::error::Result;
use crate::frame::{encode_jpeg, FrameData, FrameFormat};
use crate::store::CameraId;
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Drives one camera: read, detect, record, annotate, encode, fan out
pub(crate) struct SessionSupervisor {
    pub camera_id: CameraId,
    pub source: FrameSource,
    pub pipeline: Pipeline,
    pub frames: broadcast::Sender<Bytes>,
    pub state: Arc<RwLock<SessionState>>,
    pub cancel: CancellationToken,
}

impl SessionSupervisor {
    pub async fn run(mut self) {
        info!(
            "Stream session for camera {} started ({})",
            self.camera_id,
            self.source.url()
        );

        loop {
            if !self.source.is_open() {
                self.set_state(SessionState::Connecting);
            }

            let Some(frame) = self.source.next_frame(&self.cancel).await else {
                break;
            };

            match frame.kind {
                FrameKind::Live => {
                    self.set_state(SessionState::Streaming);
                    if let Err(e) = self.process_live(frame.frame).await {
                        warn!("Camera {} dropped a frame: {}", self.camera_id, e);
                    }

                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.pipeline.source_config().frame_interval()) => {}
                    }
                }
                FrameKind::Connecting => {
                    self.set_state(SessionState::Connecting);
                    self.emit(frame.frame);
                }
                FrameKind::StreamLost => {
                    self.set_state(SessionState::ReadError);
                    self.emit(frame.frame);
                }
            }
        }

        self.source.release().await;
        self.set_state(SessionState::Stopped);

        let stats = self.source.stats();
        info!(
            "Stream session for camera {} stopped ({} frames, {} connect failures, {} read failures)",
            self.camera_id, stats.frames_read, stats.connect_failures, stats.read_failures
        );
    }

    async fn process_live(&self, frame: FrameData) -> Result<()> {
        let image = Arc::new(frame.to_rgb()?);

        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let detections = self.pipeline.detection().run(Arc::clone(&image)).await;

        // Nothing is recorded once the session has been told to stop
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        if detections.is_empty() {
            if frame.format == FrameFormat::Mjpeg {
                self.emit(frame);
            } else {
                let jpeg = encode_jpeg(&image, self.pipeline.source_config().jpeg_quality)?;
                self.send(Bytes::from(jpeg));
            }
            return Ok(());
        }

        let outcome = self
            .pipeline
            .recorder()
            .process(self.camera_id, &image, &detections, Instant::now())
            .await;
        if outcome.accepted > 0 {
            debug!(
                "Camera {} recorded {} incidents ({} alerted)",
                self.camera_id, outcome.accepted, outcome.alerted
            );
        }

        let mut annotated = Arc::unwrap_or_clone(image);
        self.pipeline
            .annotator()
            .annotate_live(&mut annotated, &detections);
        let jpeg = encode_jpeg(&annotated, self.pipeline.source_config().jpeg_quality)?;
        self.send(Bytes::from(jpeg));

        Ok(())
    }

    fn emit(&self, frame: FrameData) {
        let data = Arc::try_unwrap(frame.data).unwrap_or_else(|shared| shared.as_ref().clone());
        self.send(Bytes::from(data));
    }

    fn send(&self, jpeg: Bytes) {
        if self.frames.send(jpeg).is_err() {
            trace!("Camera {} frame produced with no viewers", self.camera_id);
        }
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.write();
        if *state != next {
            debug!("Camera {} session {} -> {}", self.camera_id, *state, next);
            *state = next;
        }
    }
}
