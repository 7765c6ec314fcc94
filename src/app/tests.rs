use super::*;
use crate::camera::testing::ScriptedFactory;
use crate::config::{CameraSeed, ThreatcamConfig};
use crate::detection::NullDetector;
use crate::store::InMemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn create_test_config(dir: &TempDir) -> ThreatcamConfig {
    let mut config = ThreatcamConfig::default();
    config.server.ip = "127.0.0.1".to_string();
    config.server.port = 0;
    config.incident.capture_path = dir.path().join("captures").to_string_lossy().to_string();
    config.incident.font_path = dir.path().join("missing.ttf").to_string_lossy().to_string();
    config.source.frame_interval_ms = 1;
    config.source.placeholder_resolution = (32, 24);
    config.cameras = vec![CameraSeed {
        name: "gate".to_string(),
        url: "rtsp://10.0.0.5/live".to_string(),
        location: "north fence".to_string(),
    }];
    config
}

fn scripted_orchestrator(config: ThreatcamConfig) -> ThreatcamOrchestrator {
    let store = Arc::new(InMemoryStore::with_cameras(config.cameras.clone()));
    ThreatcamOrchestrator::with_components(
        config,
        store,
        Arc::new(NullDetector),
        Arc::new(ScriptedFactory::default()),
    )
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response timed out")
        .unwrap();
    String::from_utf8_lossy(&response).to_string()
}

#[tokio::test]
async fn test_orchestrator_creation_seeds_store() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = ThreatcamOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();

    let cameras = orchestrator.store().list_cameras(0, 10).await.unwrap();
    assert_eq!(cameras.len(), 1);
    assert_eq!(cameras[0].name, "gate");

    // No components registered until initialize
    assert!(orchestrator.get_all_component_states().await.is_empty());
    assert!(orchestrator.sessions().is_none());
    assert!(orchestrator.local_addr().is_none());
}

#[tokio::test]
async fn test_initialize_registers_components() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&dir);
    let capture_path = config.incident.capture_path.clone();
    let mut orchestrator = scripted_orchestrator(config);

    orchestrator.initialize().await.unwrap();

    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 3);
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
    assert!(std::path::Path::new(&capture_path).is_dir());
}

#[tokio::test]
async fn test_start_serves_http_and_shutdown_stops_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = scripted_orchestrator(create_test_config(&dir));

    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    for component in ["alerts", "sessions", "streaming"] {
        assert_eq!(
            orchestrator.get_component_state(component).await,
            Some(ComponentState::Running)
        );
    }

    let addr = orchestrator.local_addr().unwrap();
    assert_ne!(addr.port(), 0);

    let response = http_get(addr, "/health").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"healthy\""));

    let exit_code = orchestrator.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);

    let states = orchestrator.get_all_component_states().await;
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
}

#[tokio::test]
async fn test_shutdown_ends_live_viewers() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = scripted_orchestrator(create_test_config(&dir));

    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let camera = orchestrator.store().get_camera(1).await.unwrap().unwrap();
    let mut viewer = orchestrator.sessions().unwrap().attach(&camera);
    assert!(viewer.next_frame().await.is_some());

    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
    assert_eq!(orchestrator.sessions().unwrap().active_count(), 0);

    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        while viewer.next_frame().await.is_some() {}
    })
    .await;
    assert!(ended.is_ok());
}

#[tokio::test]
async fn test_shutdown_without_start() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = scripted_orchestrator(create_test_config(&dir));
    orchestrator.initialize().await.unwrap();

    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
    let states = orchestrator.get_all_component_states().await;
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
}

#[tokio::test]
async fn test_start_fails_on_taken_port() {
    let dir = tempfile::tempdir().unwrap();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

    let mut config = create_test_config(&dir);
    config.server.port = taken.local_addr().unwrap().port();
    let mut orchestrator = scripted_orchestrator(config);

    orchestrator.initialize().await.unwrap();
    let result = orchestrator.start().await;

    assert!(matches!(
        result,
        Err(crate::error::ThreatcamError::Stream(
            crate::error::StreamError::BindFailed { .. }
        ))
    ));
    assert_eq!(
        orchestrator.get_component_state("streaming").await,
        Some(ComponentState::Failed)
    );

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_component_state_management() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Arc::new(scripted_orchestrator(create_test_config(&dir)));

    assert_eq!(orchestrator.get_component_state("alerts").await, None);

    let mut handles = Vec::new();
    for i in 0..10 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            let name = format!("component_{}", i);
            orchestrator
                .set_component_state(&name, ComponentState::Starting)
                .await;
            orchestrator
                .set_component_state(&name, ComponentState::Running)
                .await;
            orchestrator.get_component_state(&name).await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Some(ComponentState::Running));
    }
    assert_eq!(orchestrator.get_all_component_states().await.len(), 10);
}

#[test]
fn test_shutdown_reason_exit_codes() {
    assert_eq!(ShutdownReason::Signal("SIGTERM".to_string()).exit_code(), 0);
    assert_eq!(
        ShutdownReason::Error("HTTP server failed".to_string()).exit_code(),
        1
    );
}
