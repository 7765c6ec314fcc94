use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThreatcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ThreatcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether the owning loop should keep going after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            ThreatcamError::Config(_) => false,
            ThreatcamError::Stream(StreamError::BindFailed { .. }) => false,
            ThreatcamError::System { .. } => false,
            _ => true,
        }
    }
}

/// Camera connection and frame retrieval failures
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("Failed to open source {url}: {details}")]
    Open { url: String, details: String },

    #[error("Timed out connecting to {url} after {timeout:?}")]
    ConnectTimeout { url: String, timeout: Duration },

    #[error("No frame received within {timeout:?}")]
    FrameTimeout { timeout: Duration },

    #[error("Stream ended")]
    EndOfStream,

    #[error("Source is not open")]
    NotOpen,

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },

    #[error("Source configuration error: {details}")]
    Configuration { details: String },
}

#[derive(Error, Debug, Clone)]
pub enum DetectionError {
    #[error("Inference failed: {details}")]
    Inference { details: String },

    #[error("Inference exceeded time budget of {budget:?}")]
    Timeout { budget: Duration },

    #[error("Detector task panicked: {details}")]
    Panicked { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Camera {id} not found")]
    CameraNotFound { id: i64 },

    #[error("Incident {id} not found")]
    IncidentNotFound { id: i64 },

    #[error("Invalid incident status '{value}'")]
    InvalidStatus { value: String },

    #[error("Invalid update: {details}")]
    InvalidUpdate { details: String },

    #[error("Store unavailable: {details}")]
    Unavailable { details: String },
}

#[derive(Error, Debug, Clone)]
pub enum AlertError {
    #[error("Alert dispatcher is not running")]
    DispatcherClosed,

    #[error("Failed to serialize alert: {details}")]
    Serialization { details: String },
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },

    #[error("Frame encoding failed: {details}")]
    Encoding { details: String },
}

pub type Result<T> = std::result::Result<T, ThreatcamError>;
