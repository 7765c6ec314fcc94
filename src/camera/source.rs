use crate::error::SourceError;
use crate::frame::FrameData;
use crate::store::Camera;
use async_trait::async_trait;

/// One camera connection.
///
/// `open` and `read` may wait on the network; [`FrameSource`](super::FrameSource)
/// bounds both with timeouts and owns the reconnect policy.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn open(&mut self, url: &str) -> Result<(), SourceError>;

    async fn read(&mut self) -> Result<FrameData, SourceError>;

    /// Drop the connection; calling it on a closed source is a no-op
    async fn release(&mut self);

    fn is_open(&self) -> bool;
}

/// Creates the backend used by one camera session
pub trait SourceFactory: Send + Sync {
    fn create(&self, camera: &Camera) -> Box<dyn VideoSource>;
}

/// Picks the GStreamer backend when compiled with the `camera` feature
#[derive(Debug, Clone)]
pub struct DefaultSourceFactory {
    jpeg_quality: u8,
}

impl DefaultSourceFactory {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

impl SourceFactory for DefaultSourceFactory {
    #[cfg(all(feature = "camera", target_os = "linux"))]
    fn create(&self, _camera: &Camera) -> Box<dyn VideoSource> {
        Box::new(super::GstVideoSource::new(self.jpeg_quality))
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    fn create(&self, camera: &Camera) -> Box<dyn VideoSource> {
        tracing::warn!(
            "Camera {} requested but video capture is not compiled in (quality {})",
            camera.id, self.jpeg_quality
        );
        Box::new(UnsupportedSource)
    }
}

/// Backend that never connects; sessions show the connecting placeholder
#[derive(Debug, Default)]
pub struct UnsupportedSource;

#[async_trait]
impl VideoSource for UnsupportedSource {
    async fn open(&mut self, url: &str) -> Result<(), SourceError> {
        Err(SourceError::Open {
            url: url.to_string(),
            details: "built without the `camera` feature".to_string(),
        })
    }

    async fn read(&mut self) -> Result<FrameData, SourceError> {
        Err(SourceError::NotOpen)
    }

    async fn release(&mut self) {}

    fn is_open(&self) -> bool {
        false
    }
}
