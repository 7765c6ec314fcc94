use super::testing::{ScriptedSource, Step};
use super::*;
use crate::config::{SourceConfig, ThreatcamConfig};
use crate::overlay::Annotator;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_config() -> SourceConfig {
    SourceConfig {
        connect_timeout_ms: 50,
        read_timeout_ms: 50,
        connect_retry_ms: 1,
        reconnect_delay_ms: 1,
        frame_interval_ms: 1,
        placeholder_resolution: (64, 48),
        jpeg_quality: 80,
    }
}

fn placeholders(config: &SourceConfig) -> PlaceholderFrames {
    PlaceholderFrames::render(&Annotator::new(None, 18.0), config).unwrap()
}

fn frame_source(script: Vec<Step>, config: SourceConfig) -> FrameSource {
    FrameSource::new(
        "rtsp://camera.local/stream",
        Box::new(ScriptedSource::new(script)),
        config.clone(),
        placeholders(&config),
    )
}

async fn kinds(source: &mut FrameSource, n: usize) -> Vec<FrameKind> {
    let cancel = CancellationToken::new();
    let mut kinds = Vec::new();
    for _ in 0..n {
        let frame = tokio::time::timeout(Duration::from_secs(2), source.next_frame(&cancel))
            .await
            .expect("source stalled")
            .expect("source cancelled");
        kinds.push(frame.kind);
    }
    kinds
}

#[tokio::test]
async fn test_connect_failures_yield_one_placeholder_each() {
    let mut source = frame_source(
        vec![Step::OpenFails, Step::OpenFails, Step::OpenFails],
        fast_config(),
    );

    let kinds = kinds(&mut source, 5).await;

    assert_eq!(
        kinds,
        vec![
            FrameKind::Connecting,
            FrameKind::Connecting,
            FrameKind::Connecting,
            FrameKind::Live,
            FrameKind::Live,
        ]
    );
    assert_eq!(source.stats().connect_failures, 3);
    assert_eq!(source.stats().frames_read, 2);
    assert!(source.is_open());
}

#[tokio::test]
async fn test_read_failure_emits_stream_lost_then_reconnects() {
    let mut source = frame_source(vec![Step::Frame, Step::ReadFails], fast_config());

    let kinds = kinds(&mut source, 3).await;

    assert_eq!(
        kinds,
        vec![FrameKind::Live, FrameKind::StreamLost, FrameKind::Live]
    );
    assert_eq!(source.stats().read_failures, 1);
    assert_eq!(source.stats().connect_attempts, 2);
}

#[tokio::test]
async fn test_hung_connect_times_out() {
    let mut source = frame_source(vec![Step::OpenHangs], fast_config());

    let kinds = kinds(&mut source, 2).await;

    assert_eq!(kinds, vec![FrameKind::Connecting, FrameKind::Live]);
    assert_eq!(source.stats().connect_failures, 1);
}

#[tokio::test]
async fn test_hung_read_times_out() {
    let mut source = frame_source(vec![Step::ReadHangs], fast_config());

    let kinds = kinds(&mut source, 2).await;

    assert_eq!(kinds, vec![FrameKind::StreamLost, FrameKind::Live]);
}

#[tokio::test]
async fn test_cancel_interrupts_backoff() {
    let mut config = fast_config();
    config.connect_retry_ms = 60_000;
    let mut source = frame_source(vec![Step::OpenFails], config);
    let cancel = CancellationToken::new();

    let first = source.next_frame(&cancel).await.unwrap();
    assert_eq!(first.kind, FrameKind::Connecting);

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let next = tokio::time::timeout(Duration::from_secs(2), source.next_frame(&cancel))
        .await
        .expect("backoff was not interrupted");
    assert!(next.is_none());
}

#[tokio::test]
async fn test_release_is_repeatable() {
    let backend = ScriptedSource::new(Vec::new());
    let counters = backend.counters();
    let mut source = FrameSource::new(
        "rtsp://camera.local/stream",
        Box::new(backend),
        fast_config(),
        placeholders(&fast_config()),
    );

    kinds(&mut source, 1).await;
    assert!(source.is_open());

    source.release().await;
    source.release().await;
    assert!(!source.is_open());
    assert_eq!(counters.releases.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_placeholders_are_decodable_jpegs() {
    let mut source = frame_source(vec![Step::OpenFails], fast_config());
    let cancel = CancellationToken::new();

    let frame = source.next_frame(&cancel).await.unwrap();
    assert!(frame.is_placeholder());
    assert_eq!(frame.frame.format, crate::frame::FrameFormat::Mjpeg);

    let image = frame.frame.to_rgb().unwrap();
    assert_eq!(image.dimensions(), (64, 48));
}

#[tokio::test]
async fn test_sources_share_one_placeholder_render() {
    let shared = placeholders(&fast_config());
    let cancel = CancellationToken::new();

    let mut first = FrameSource::new(
        "rtsp://gate.local/stream",
        Box::new(ScriptedSource::new(vec![Step::OpenFails])),
        fast_config(),
        shared.clone(),
    );
    let mut second = FrameSource::new(
        "rtsp://dock.local/stream",
        Box::new(ScriptedSource::new(vec![Step::OpenFails])),
        fast_config(),
        shared.clone(),
    );

    let a = first.next_frame(&cancel).await.unwrap();
    let b = second.next_frame(&cancel).await.unwrap();
    assert_eq!(a.kind, FrameKind::Connecting);
    assert!(Arc::ptr_eq(&a.frame.data, shared.connecting()));
    assert!(Arc::ptr_eq(&a.frame.data, &b.frame.data));
}

#[tokio::test]
async fn test_unsupported_source_never_connects() {
    let mut source = FrameSource::new(
        "0",
        Box::new(UnsupportedSource),
        fast_config(),
        placeholders(&fast_config()),
    );

    let kinds = kinds(&mut source, 2).await;
    assert_eq!(kinds, vec![FrameKind::Connecting, FrameKind::Connecting]);
}

#[test]
fn test_normalize_ip_webcam_url() {
    assert_eq!(
        normalize_source_url("http://192.168.1.20:8080"),
        "http://192.168.1.20:8080/video"
    );
    assert_eq!(
        normalize_source_url("http://192.168.1.20:8080/"),
        "http://192.168.1.20:8080/video"
    );
    assert_eq!(
        normalize_source_url("http://192.168.1.20:8080/video"),
        "http://192.168.1.20:8080/video"
    );
    assert_eq!(
        normalize_source_url("rtsp://10.0.0.5:554/live"),
        "rtsp://10.0.0.5:554/live"
    );
}

#[test]
fn test_default_source_config_matches_documented_backoffs() {
    let config = ThreatcamConfig::default().source;
    assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.read_timeout(), Duration::from_secs(5));
    assert_eq!(config.connect_retry(), Duration::from_secs(5));
    assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
    assert_eq!(config.frame_interval(), Duration::from_millis(50));
}
