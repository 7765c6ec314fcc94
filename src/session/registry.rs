use super::supervisor::SessionSupervisor;
use super::{Pipeline, SessionState};
use crate::camera::{FrameSource, SourceFactory};
use crate::store::{Camera, CameraId};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Runtime state of one camera's pipeline
pub struct StreamSession {
    camera_id: CameraId,
    frames: broadcast::Sender<Bytes>,
    state: Arc<RwLock<SessionState>>,
    cancel: CancellationToken,
    viewers: AtomicUsize,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Signal the supervisor to stop; true only for the call that did it
    fn stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            match tokio::time::timeout(STOP_TIMEOUT, task).await {
                Ok(Ok(())) => debug!("Session task for camera {} completed", self.camera_id),
                Ok(Err(e)) => error!(
                    "Session task for camera {} failed: {}",
                    self.camera_id, e
                ),
                Err(_) => warn!(
                    "Session task for camera {} did not stop within {:?}",
                    self.camera_id, STOP_TIMEOUT
                ),
            }
        }
    }
}

struct RegistryInner {
    sessions: Mutex<HashMap<CameraId, Arc<StreamSession>>>,
    pipeline: Pipeline,
    factory: Arc<dyn SourceFactory>,
    shutdown: CancellationToken,
}

impl RegistryInner {
    /// Drop one viewer; the last one out stops the session
    fn detach(&self, session: &Arc<StreamSession>) {
        let mut sessions = self.sessions.lock();
        let remaining = session
            .viewers
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        debug!(
            "Viewer left camera {} ({} remaining)",
            session.camera_id, remaining
        );

        if remaining > 0 {
            return;
        }

        if let Some(current) = sessions.get(&session.camera_id) {
            if Arc::ptr_eq(current, session) {
                sessions.remove(&session.camera_id);
            }
        }

        if session.stop() {
            info!(
                "Last viewer left camera {}, stopping session",
                session.camera_id
            );
        }
    }
}

/// At most one running pipeline per camera, shared by all of its viewers
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(
        pipeline: Pipeline,
        factory: Arc<dyn SourceFactory>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                pipeline,
                factory,
                shutdown,
            }),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Join the camera's session, starting it if nobody is watching yet
    pub fn attach(&self, camera: &Camera) -> Viewer {
        let mut sessions = self.inner.sessions.lock();

        if let Some(session) = sessions.get(&camera.id).filter(|s| s.is_active()) {
            session.viewers.fetch_add(1, Ordering::SeqCst);
            debug!(
                "Viewer joined camera {} ({} watching)",
                camera.id,
                session.viewer_count()
            );
            return self.viewer(Arc::clone(session));
        }

        let session = self.start_session(camera);
        sessions.insert(camera.id, Arc::clone(&session));
        self.viewer(session)
    }

    fn start_session(&self, camera: &Camera) -> Arc<StreamSession> {
        let pipeline = self.inner.pipeline.clone();
        let source = FrameSource::new(
            &camera.url,
            self.inner.factory.create(camera),
            pipeline.source_config().clone(),
            pipeline.placeholders().clone(),
        );

        let (frames, _) = broadcast::channel(pipeline.viewer_buffer());
        let state = Arc::new(RwLock::new(SessionState::Idle));
        let cancel = self.inner.shutdown.child_token();

        let session = Arc::new(StreamSession {
            camera_id: camera.id,
            frames: frames.clone(),
            state: Arc::clone(&state),
            cancel: cancel.clone(),
            viewers: AtomicUsize::new(1),
            task: Mutex::new(None),
        });

        let supervisor = SessionSupervisor {
            camera_id: camera.id,
            source,
            pipeline,
            frames,
            state,
            cancel,
        };
        *session.task.lock() = Some(tokio::spawn(supervisor.run()));

        info!("Started stream session for camera {} '{}'", camera.id, camera.name);
        session
    }

    fn viewer(&self, session: Arc<StreamSession>) -> Viewer {
        Viewer {
            frames: session.frames.subscribe(),
            session,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Stop a camera's session and wait for its source to be released.
    ///
    /// Returns false when no session was running; repeated calls are harmless.
    pub async fn stop(&self, camera_id: CameraId) -> bool {
        let session = self.inner.sessions.lock().remove(&camera_id);
        let Some(session) = session else {
            return false;
        };

        let stopped = session.stop();
        session.join().await;
        if stopped {
            info!("Stopped stream session for camera {}", camera_id);
        }
        stopped
    }

    pub async fn stop_all(&self) {
        let sessions: Vec<_> = self
            .inner
            .sessions
            .lock()
            .drain()
            .map(|(_, session)| session)
            .collect();

        if !sessions.is_empty() {
            info!("Stopping {} stream sessions", sessions.len());
        }

        for session in &sessions {
            session.stop();
        }
        for session in &sessions {
            session.join().await;
        }
    }

    pub fn state(&self, camera_id: CameraId) -> Option<SessionState> {
        self.inner
            .sessions
            .lock()
            .get(&camera_id)
            .map(|session| session.state())
    }

    pub fn viewer_count(&self, camera_id: CameraId) -> usize {
        self.inner
            .sessions
            .lock()
            .get(&camera_id)
            .map_or(0, |session| session.viewer_count())
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .sessions
            .lock()
            .values()
            .filter(|session| session.is_active())
            .count()
    }
}

/// One consumer of a camera's annotated JPEG frames; dropping it detaches
pub struct Viewer {
    session: Arc<StreamSession>,
    frames: broadcast::Receiver<Bytes>,
    registry: Weak<RegistryInner>,
}

impl Viewer {
    pub fn camera_id(&self) -> CameraId {
        self.session.camera_id
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Next frame; `None` once the session stops. Slow viewers skip frames.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            tokio::select! {
                biased;
                _ = self.session.cancel.cancelled() => return None,
                received = self.frames.recv() => match received {
                    Ok(frame) => return Some(frame),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(
                            "Viewer of camera {} skipped {} frames",
                            self.session.camera_id, skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(&self.session);
        }
    }
}
