use super::*;
use crate::alerts::AlertBroadcaster;
use crate::camera::testing::{ScriptedFactory, Step};
use crate::config::ThreatcamConfig;
use crate::detection::{BoundingBox, Detection, DetectionStage, Detector};
use crate::error::DetectionError;
use crate::incident::{CooldownTracker, IncidentRecorder, SnapshotStore};
use crate::overlay::Annotator;
use crate::store::{Camera, IncidentFilter, IncidentStore, InMemoryStore};
use image::RgbImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

struct TankDetector {
    calls: AtomicUsize,
}

impl Detector for TankDetector {
    fn detect(&self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Detection::new(
            "tank",
            0.9,
            BoundingBox::new(2, 2, 20, 16),
        )])
    }

    fn name(&self) -> &str {
        "tank"
    }
}

struct Harness {
    registry: SessionRegistry,
    factory: Arc<ScriptedFactory>,
    detector: Arc<TankDetector>,
    store: Arc<InMemoryStore>,
    alerts: AlertBroadcaster,
    shutdown: CancellationToken,
    _dir: TempDir,
}

fn harness(script: Vec<Step>, connect_retry_ms: u64) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let shutdown = CancellationToken::new();
    let (alerts, _task) = AlertBroadcaster::start(shutdown.clone());
    let store = Arc::new(InMemoryStore::new());
    let detector = Arc::new(TankDetector {
        calls: AtomicUsize::new(0),
    });
    let annotator = Annotator::new(None, 18.0);

    let mut source = ThreatcamConfig::default().source;
    source.connect_timeout_ms = 100;
    source.read_timeout_ms = 100;
    source.connect_retry_ms = connect_retry_ms;
    source.reconnect_delay_ms = 1;
    source.frame_interval_ms = 1;
    source.placeholder_resolution = (32, 24);

    let recorder = IncidentRecorder::new(
        store.clone(),
        SnapshotStore::new(dir.path(), "UTC"),
        Arc::new(CooldownTracker::new(Duration::from_secs(5))),
        alerts.clone(),
        annotator.clone(),
        80,
    );
    let pipeline = Pipeline::new(
        DetectionStage::new(detector.clone(), Duration::from_secs(2)),
        recorder,
        annotator,
        source,
        8,
    )
    .unwrap();

    let factory = Arc::new(ScriptedFactory::new(script));
    let registry = SessionRegistry::new(pipeline, factory.clone(), shutdown.clone());

    Harness {
        registry,
        factory,
        detector,
        store,
        alerts,
        shutdown,
        _dir: dir,
    }
}

fn camera(id: i64) -> Camera {
    Camera {
        id,
        name: format!("cam-{}", id),
        url: format!("rtsp://10.0.0.{}/live", id),
        location: "gate".to_string(),
    }
}

async fn frame(viewer: &mut Viewer) -> bytes::Bytes {
    timeout(Duration::from_secs(2), viewer.next_frame())
        .await
        .expect("no frame within timeout")
        .expect("session ended")
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_viewer_receives_annotated_jpegs_and_incident_recorded_once() {
    let h = harness(Vec::new(), 1);
    let mut viewer = h.registry.attach(&camera(1));

    for _ in 0..3 {
        let jpeg = frame(&mut viewer).await;
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
    assert_eq!(viewer.state(), SessionState::Streaming);

    let incidents = h
        .store
        .list_incidents(&IncidentFilter::default())
        .await
        .unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].camera_id, 1);
    assert_eq!(h.alerts.stats().published, 1);

    h.shutdown.cancel();
}

#[tokio::test]
async fn test_viewers_share_one_session_per_camera() {
    let h = harness(Vec::new(), 1);
    let mut first = h.registry.attach(&camera(1));
    let mut second = h.registry.attach(&camera(1));

    frame(&mut first).await;
    frame(&mut second).await;

    assert_eq!(h.factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(h.registry.viewer_count(1), 2);
    assert_eq!(h.registry.active_count(), 1);

    drop(first);
    assert_eq!(h.registry.viewer_count(1), 1);
    assert_eq!(h.registry.active_count(), 1);

    drop(second);
    assert_eq!(h.registry.active_count(), 0);
    assert!(h.registry.state(1).is_none());

    let counters = Arc::clone(&h.factory.counters);
    wait_for(|| counters.releases.load(Ordering::SeqCst) >= 1).await;

    h.shutdown.cancel();
}

#[tokio::test]
async fn test_session_restarts_after_last_viewer_leaves() {
    let h = harness(Vec::new(), 1);

    let mut viewer = h.registry.attach(&camera(2));
    frame(&mut viewer).await;
    drop(viewer);

    let mut viewer = h.registry.attach(&camera(2));
    frame(&mut viewer).await;

    assert_eq!(h.factory.created.load(Ordering::SeqCst), 2);
    h.shutdown.cancel();
}

#[tokio::test]
async fn test_stop_is_idempotent_and_ends_viewers() {
    let h = harness(Vec::new(), 1);
    let mut viewer = h.registry.attach(&camera(3));
    frame(&mut viewer).await;

    assert!(h.registry.stop(3).await);
    assert!(!h.registry.stop(3).await);
    assert_eq!(viewer.state(), SessionState::Stopped);
    assert!(viewer.next_frame().await.is_none());

    let recorded = h.store.incident_count();
    let calls = h.detector.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.store.incident_count(), recorded);
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), calls);

    h.shutdown.cancel();
}

#[tokio::test]
async fn test_placeholder_frames_skip_detection() {
    let h = harness(vec![Step::OpenFails], 300);
    let mut viewer = h.registry.attach(&camera(4));

    let placeholder = frame(&mut viewer).await;
    assert_eq!(&placeholder[..2], &[0xFF, 0xD8]);
    assert_eq!(viewer.state(), SessionState::Connecting);
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);

    frame(&mut viewer).await;
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 1);

    h.shutdown.cancel();
}

#[tokio::test]
async fn test_stop_all_on_shutdown() {
    let h = harness(Vec::new(), 1);
    let mut a = h.registry.attach(&camera(1));
    let mut b = h.registry.attach(&camera(2));
    frame(&mut a).await;
    frame(&mut b).await;
    assert_eq!(h.registry.active_count(), 2);

    h.registry.stop_all().await;

    assert_eq!(h.registry.active_count(), 0);
    assert_eq!(a.state(), SessionState::Stopped);
    assert_eq!(b.state(), SessionState::Stopped);
    h.shutdown.cancel();
}

#[tokio::test]
async fn test_sessions_reuse_pipeline_placeholders() {
    let h = harness(vec![Step::OpenFails], 1_000);
    let pipeline = h.registry.pipeline().clone();

    assert!(Arc::ptr_eq(
        pipeline.placeholders().connecting(),
        h.registry.pipeline().placeholders().connecting()
    ));
    assert_eq!(pipeline.placeholders().dimensions(), (32, 24));

    // The first frame of a failing camera is the pipeline's pre-rendered placeholder
    let mut viewer = h.registry.attach(&camera(5));
    let placeholder = frame(&mut viewer).await;
    assert_eq!(&placeholder[..], &pipeline.placeholders().connecting()[..]);
}
