pub mod alerts;
pub mod app;
pub mod camera;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod incident;
pub mod overlay;
pub mod session;
pub mod store;
pub mod streaming;

pub use alerts::{AlertBroadcaster, AlertEvent, AlertKind, AlertStats, AlertSubscription};
pub use app::{ComponentState, ShutdownReason, ThreatcamOrchestrator};
pub use camera::{DefaultSourceFactory, FrameSource, SourceFactory, VideoSource};
pub use config::ThreatcamConfig;
pub use detection::{BoundingBox, Detection, DetectionStage, Detector, NullDetector};
pub use error::{Result, ThreatcamError};
pub use frame::{FrameData, FrameFormat};
pub use incident::{CooldownTracker, IncidentRecorder, IncidentStatus, SnapshotStore};
pub use overlay::Annotator;
pub use session::{Pipeline, SessionRegistry, SessionState, Viewer};
pub use store::{Camera, InMemoryStore, Incident, IncidentFilter, IncidentStore};
pub use streaming::{build_router, AppState, StreamServer};
