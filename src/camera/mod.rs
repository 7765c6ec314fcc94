mod frame_source;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
#[cfg_attr(not(all(feature = "camera", target_os = "linux")), allow(dead_code))]
mod latest;
mod source;
#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;

pub use frame_source::{
    normalize_source_url, FrameKind, FrameSource, PlaceholderFrames, SourceFrame, SourceStats,
    CONNECTING_MESSAGE, STREAM_LOST_MESSAGE,
};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstVideoSource;
pub use source::{DefaultSourceFactory, SourceFactory, UnsupportedSource, VideoSource};
