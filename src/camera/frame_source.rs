use super::VideoSource;
use crate::config::SourceConfig;
use crate::error::{Result, SourceError};
use crate::frame::{encode_jpeg, FrameData, FrameFormat};
use crate::overlay::Annotator;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub const CONNECTING_MESSAGE: &str = "Connecting...";
pub const STREAM_LOST_MESSAGE: &str = "Stream Lost. Reconnecting...";

/// Rewrite IP-Webcam style addresses (`host:8080`) to their MJPEG endpoint
pub fn normalize_source_url(url: &str) -> String {
    let url = url.trim();
    if url.contains(":8080") && !url.ends_with("/video") {
        format!("{}/video", url.trim_end_matches('/'))
    } else {
        url.to_string()
    }
}

/// Where a frame handed out by [`FrameSource`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Live,
    Connecting,
    StreamLost,
}

#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub kind: FrameKind,
    pub frame: FrameData,
}

impl SourceFrame {
    pub fn is_placeholder(&self) -> bool {
        self.kind != FrameKind::Live
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub read_failures: u64,
}

/// "Connecting..." and "Stream Lost" frames, encoded once and shared by every source
#[derive(Debug, Clone)]
pub struct PlaceholderFrames {
    connecting: Arc<Vec<u8>>,
    stream_lost: Arc<Vec<u8>>,
    width: u32,
    height: u32,
}

impl PlaceholderFrames {
    pub fn render(annotator: &Annotator, config: &SourceConfig) -> Result<Self> {
        let (width, height) = config.placeholder_resolution;
        let connecting = annotator.placeholder(width, height, CONNECTING_MESSAGE);
        let stream_lost = annotator.placeholder(width, height, STREAM_LOST_MESSAGE);

        Ok(Self {
            connecting: Arc::new(encode_jpeg(&connecting, config.jpeg_quality)?),
            stream_lost: Arc::new(encode_jpeg(&stream_lost, config.jpeg_quality)?),
            width,
            height,
        })
    }

    pub fn connecting(&self) -> &Arc<Vec<u8>> {
        &self.connecting
    }

    pub fn stream_lost(&self) -> &Arc<Vec<u8>> {
        &self.stream_lost
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Keeps one camera producing frames across connection failures.
///
/// Never returns an error to the caller: a failed connect yields a
/// "Connecting..." placeholder and a failed read yields one "Stream Lost"
/// placeholder, each followed by a backoff before the next attempt. Backoffs
/// end early when the cancellation token fires.
pub struct FrameSource {
    url: String,
    backend: Box<dyn VideoSource>,
    config: SourceConfig,
    placeholders: PlaceholderFrames,
    pending_delay: Option<Duration>,
    sequence: u64,
    stats: SourceStats,
}

impl FrameSource {
    pub fn new(
        url: &str,
        backend: Box<dyn VideoSource>,
        config: SourceConfig,
        placeholders: PlaceholderFrames,
    ) -> Self {
        Self {
            url: normalize_source_url(url),
            backend,
            config,
            placeholders,
            pending_delay: None,
            sequence: 0,
            stats: SourceStats::default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_open()
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    /// Next live or placeholder frame; `None` once `cancel` fires
    pub async fn next_frame(&mut self, cancel: &CancellationToken) -> Option<SourceFrame> {
        if let Some(delay) = self.pending_delay.take() {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if cancel.is_cancelled() {
            return None;
        }

        if !self.backend.is_open() {
            if let Err(e) = self.connect().await {
                warn!("Camera source {} unavailable: {}", self.url, e);
                self.stats.connect_failures += 1;
                self.backend.release().await;
                self.pending_delay = Some(self.config.connect_retry());
                return Some(self.placeholder(FrameKind::Connecting));
            }
            info!("Connected to camera source {}", self.url);
        }

        match self.read().await {
            Ok(mut frame) => {
                self.stats.frames_read += 1;
                self.sequence += 1;
                frame.id = self.sequence;
                trace!("Read frame {} from {}", frame.id, self.url);
                Some(SourceFrame {
                    kind: FrameKind::Live,
                    frame,
                })
            }
            Err(e) => {
                warn!("Lost camera source {}: {}", self.url, e);
                self.stats.read_failures += 1;
                self.backend.release().await;
                self.pending_delay = Some(self.config.reconnect_delay());
                Some(self.placeholder(FrameKind::StreamLost))
            }
        }
    }

    /// Close the connection; safe to call repeatedly
    pub async fn release(&mut self) {
        if self.backend.is_open() {
            debug!("Releasing camera source {}", self.url);
        }
        self.backend.release().await;
        self.pending_delay = None;
    }

    async fn connect(&mut self) -> std::result::Result<(), SourceError> {
        self.stats.connect_attempts += 1;
        let timeout = self.config.connect_timeout();

        match tokio::time::timeout(timeout, self.backend.open(&self.url)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::ConnectTimeout {
                url: self.url.clone(),
                timeout,
            }),
        }
    }

    async fn read(&mut self) -> std::result::Result<FrameData, SourceError> {
        let timeout = self.config.read_timeout();

        match tokio::time::timeout(timeout, self.backend.read()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::FrameTimeout { timeout }),
        }
    }

    fn placeholder(&mut self, kind: FrameKind) -> SourceFrame {
        let data = match kind {
            FrameKind::StreamLost => Arc::clone(&self.placeholders.stream_lost),
            _ => Arc::clone(&self.placeholders.connecting),
        };

        self.sequence += 1;
        SourceFrame {
            kind,
            frame: FrameData {
                id: self.sequence,
                timestamp: SystemTime::now(),
                data,
                width: self.placeholders.width,
                height: self.placeholders.height,
                format: FrameFormat::Mjpeg,
            },
        }
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("url", &self.url)
            .field("open", &self.backend.is_open())
            .field("stats", &self.stats)
            .finish()
    }
}
