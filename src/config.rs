use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ThreatcamConfig {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub detection: DetectionConfig,
    pub incident: IncidentConfig,
    pub stream: StreamConfig,
    /// Cameras registered with the store at startup
    #[serde(default)]
    pub cameras: Vec<CameraSeed>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    /// Upper bound on a single connection attempt
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound on waiting for one frame from an open source
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Delay before retrying a failed connection attempt
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,

    /// Delay after a mid-stream read failure before reconnecting
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Pause after each processed frame
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Placeholder frame resolution (width, height)
    #[serde(default = "default_placeholder_resolution")]
    pub placeholder_resolution: (u32, u32),

    /// JPEG quality for frames sent to viewers
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    /// Time budget for one inference call
    #[serde(default = "default_detection_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IncidentConfig {
    /// Minimum spacing between two incidents of one class on one camera
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Directory receiving annotated incident snapshots
    #[serde(default = "default_capture_path")]
    pub capture_path: String,

    /// Path to TrueType font used for labels and placeholder text
    #[serde(default = "default_font_path")]
    pub font_path: String,

    /// Label font size in pixels
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// Timezone used when naming snapshot files
    #[serde(default = "default_timestamp_timezone")]
    pub timestamp_timezone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    /// Annotated frames buffered per camera for slow viewers
    #[serde(default = "default_viewer_buffer")]
    pub viewer_buffer: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraSeed {
    pub name: String,
    pub url: String,
    #[serde(default = "default_camera_location")]
    pub location: String,
}

impl SourceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl ThreatcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("threatcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port())?
            .set_default("source.connect_timeout_ms", default_connect_timeout_ms())?
            .set_default("source.read_timeout_ms", default_read_timeout_ms())?
            .set_default("source.connect_retry_ms", default_connect_retry_ms())?
            .set_default("source.reconnect_delay_ms", default_reconnect_delay_ms())?
            .set_default("source.frame_interval_ms", default_frame_interval_ms())?
            .set_default(
                "source.placeholder_resolution",
                vec![
                    default_placeholder_resolution().0,
                    default_placeholder_resolution().1,
                ],
            )?
            .set_default("source.jpeg_quality", default_jpeg_quality())?
            .set_default("detection.timeout_ms", default_detection_timeout_ms())?
            .set_default("incident.cooldown_seconds", default_cooldown_seconds())?
            .set_default("incident.capture_path", default_capture_path())?
            .set_default("incident.font_path", default_font_path())?
            .set_default("incident.font_size", default_font_size() as f64)?
            .set_default("incident.timestamp_timezone", default_timestamp_timezone())?
            .set_default("stream.viewer_buffer", default_viewer_buffer() as i64)?
            .add_source(File::with_name(&path_str).required(false))
            // THREATCAM_SOURCE__CONNECT_TIMEOUT_MS=1000
            .add_source(
                Environment::with_prefix("THREATCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ThreatcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.source.connect_timeout_ms == 0 || self.source.read_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Source timeouts must be greater than 0".to_string(),
            ));
        }

        if self.source.placeholder_resolution.0 == 0 || self.source.placeholder_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Placeholder resolution must be greater than 0".to_string(),
            ));
        }

        if self.source.jpeg_quality == 0 || self.source.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if self.detection.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Detection timeout must be greater than 0".to_string(),
            ));
        }

        if self.incident.cooldown_seconds == 0 {
            return Err(ConfigError::Message(
                "Incident cooldown_seconds must be greater than 0".to_string(),
            ));
        }

        if self.stream.viewer_buffer == 0 {
            return Err(ConfigError::Message(
                "Stream viewer_buffer must be greater than 0".to_string(),
            ));
        }

        for camera in &self.cameras {
            if camera.url.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "Camera '{}' has an empty url",
                    camera.name
                )));
            }
        }

        Ok(())
    }
}

impl Default for ThreatcamConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                ip: default_server_ip(),
                port: default_server_port(),
            },
            source: SourceConfig {
                connect_timeout_ms: default_connect_timeout_ms(),
                read_timeout_ms: default_read_timeout_ms(),
                connect_retry_ms: default_connect_retry_ms(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
                frame_interval_ms: default_frame_interval_ms(),
                placeholder_resolution: default_placeholder_resolution(),
                jpeg_quality: default_jpeg_quality(),
            },
            detection: DetectionConfig {
                timeout_ms: default_detection_timeout_ms(),
            },
            incident: IncidentConfig {
                cooldown_seconds: default_cooldown_seconds(),
                capture_path: default_capture_path(),
                font_path: default_font_path(),
                font_size: default_font_size(),
                timestamp_timezone: default_timestamp_timezone(),
            },
            stream: StreamConfig {
                viewer_buffer: default_viewer_buffer(),
            },
            cameras: Vec::new(),
        }
    }
}

// Default value functions
fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_read_timeout_ms() -> u64 {
    5000
}
fn default_connect_retry_ms() -> u64 {
    5000
}
fn default_reconnect_delay_ms() -> u64 {
    2000
}
fn default_frame_interval_ms() -> u64 {
    50
}
fn default_placeholder_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_jpeg_quality() -> u8 {
    85
}

fn default_detection_timeout_ms() -> u64 {
    2000
}

fn default_cooldown_seconds() -> u64 {
    5
}
fn default_capture_path() -> String {
    "./captures".to_string()
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_font_size() -> f32 {
    18.0
}
fn default_timestamp_timezone() -> String {
    "UTC".to_string()
}

fn default_viewer_buffer() -> usize {
    4
}

fn default_camera_location() -> String {
    "Unknown".to_string()
}
