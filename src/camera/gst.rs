use super::latest::{latest, LatestReceiver};
use super::VideoSource;
use crate::error::SourceError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::{MessageView, Pipeline};
use gstreamer_app::{AppSink, AppSinkCallbacks};
use std::time::SystemTime;
use tracing::{debug, error, info, trace};

/// Only the newest sample is kept; older unread ones are dropped
#[derive(Clone)]
enum SinkMessage {
    Sample(gstreamer::Sample),
    Eos,
}

/// GStreamer capture producing JPEG frames from a URI or a V4L2 device index
pub struct GstVideoSource {
    jpeg_quality: u8,
    pipeline: Option<Pipeline>,
    samples: Option<LatestReceiver<SinkMessage>>,
    first_frame: Option<FrameData>,
}

impl GstVideoSource {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality,
            pipeline: None,
            samples: None,
            first_frame: None,
        }
    }

    /// `0`, `1`, ... select a local V4L2 device; anything else goes through `uridecodebin`
    fn build_pipeline_string(&self, url: &str) -> String {
        let input = match url.parse::<u32>() {
            Ok(index) => format!("v4l2src device=/dev/video{} do-timestamp=true", index),
            Err(_) => format!("uridecodebin uri=\"{}\"", url),
        };

        format!(
            "{} ! videoconvert ! video/x-raw,format=I420 ! \
             jpegenc quality={} ! \
             appsink name=sink sync=false max-buffers=2 drop=true emit-signals=false",
            input, self.jpeg_quality
        )
    }

    fn sample_to_frame(sample: &gstreamer::Sample) -> Result<FrameData, SourceError> {
        let buffer = sample.buffer().ok_or_else(|| SourceError::CaptureStream {
            details: "No buffer in sample".to_string(),
        })?;

        let caps = sample.caps().ok_or_else(|| SourceError::CaptureStream {
            details: "No caps in sample".to_string(),
        })?;

        let structure = caps.structure(0).ok_or_else(|| SourceError::CaptureStream {
            details: "Empty caps in sample".to_string(),
        })?;
        let width = structure.get::<i32>("width").unwrap_or(0).max(0) as u32;
        let height = structure.get::<i32>("height").unwrap_or(0).max(0) as u32;

        let map = buffer
            .map_readable()
            .map_err(|e| SourceError::CaptureStream {
                details: format!("Failed to map buffer: {}", e),
            })?;

        trace!("Captured JPEG frame ({}x{}, {} bytes)", width, height, map.len());

        Ok(FrameData::new(
            0,
            SystemTime::now(),
            map.as_slice().to_vec(),
            width,
            height,
            FrameFormat::Mjpeg,
        ))
    }

    /// Surface pipeline errors posted on the bus since the last read
    fn check_bus(&self) -> Result<(), SourceError> {
        let Some(bus) = self.pipeline.as_ref().and_then(|p| p.bus()) else {
            return Ok(());
        };

        while let Some(message) =
            bus.pop_filtered(&[gstreamer::MessageType::Error, gstreamer::MessageType::Eos])
        {
            match message.view() {
                MessageView::Error(err) => {
                    return Err(SourceError::CaptureStream {
                        details: format!("{} ({:?})", err.error(), err.debug()),
                    })
                }
                MessageView::Eos(_) => return Err(SourceError::EndOfStream),
                _ => {}
            }
        }

        Ok(())
    }

    async fn next_sample(&mut self) -> Result<FrameData, SourceError> {
        self.check_bus()?;

        let samples = self.samples.as_mut().ok_or(SourceError::NotOpen)?;
        match samples.recv().await {
            Some(SinkMessage::Sample(sample)) => Self::sample_to_frame(&sample),
            Some(SinkMessage::Eos) | None => Err(SourceError::EndOfStream),
        }
    }
}

#[async_trait]
impl VideoSource for GstVideoSource {
    async fn open(&mut self, url: &str) -> Result<(), SourceError> {
        self.release().await;

        gstreamer::init().map_err(|e| SourceError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = self.build_pipeline_string(url);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| SourceError::Open {
                url: url.to_string(),
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| SourceError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|sink| sink.downcast::<AppSink>().ok())
            .ok_or_else(|| SourceError::Configuration {
                details: "Pipeline has no appsink".to_string(),
            })?;

        let (tx, rx) = latest();
        let eos_tx = tx.clone();
        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    if tx.publish(SinkMessage::Sample(sample)) {
                        Ok(gstreamer::FlowSuccess::Ok)
                    } else {
                        Err(gstreamer::FlowError::Flushing)
                    }
                })
                .eos(move |_| {
                    eos_tx.publish(SinkMessage::Eos);
                })
                .build(),
        );

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| SourceError::Open {
                url: url.to_string(),
                details: format!("Failed to start pipeline: {}", e),
            })?;

        self.pipeline = Some(pipeline);
        self.samples = Some(rx);

        // The pipeline only counts as connected once it delivers a frame
        let frame = self.next_sample().await.map_err(|e| SourceError::Open {
            url: url.to_string(),
            details: e.to_string(),
        })?;
        self.first_frame = Some(frame);

        debug!("GStreamer pipeline for {} is playing", url);
        Ok(())
    }

    async fn read(&mut self) -> Result<FrameData, SourceError> {
        if let Some(frame) = self.first_frame.take() {
            return Ok(frame);
        }
        self.next_sample().await
    }

    async fn release(&mut self) {
        self.samples = None;
        self.first_frame = None;

        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                error!("Failed to stop GStreamer pipeline: {}", e);
            }
            debug!("GStreamer pipeline released");
        }
    }

    fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }
}

impl Drop for GstVideoSource {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gstreamer::State::Null);
        }
    }
}
