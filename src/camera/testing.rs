use super::{SourceFactory, VideoSource};
use crate::error::SourceError;
use crate::frame::FrameData;
use crate::store::Camera;
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Scripted outcome of one backend call
#[derive(Debug, Clone)]
pub enum Step {
    OpenFails,
    OpenHangs,
    Frame,
    ReadFails,
    ReadHangs,
}

#[derive(Debug, Default)]
pub struct SourceCounters {
    pub opens: AtomicUsize,
    pub reads: AtomicUsize,
    pub releases: AtomicUsize,
}

/// In-memory backend that follows a fixed script, then keeps producing frames
pub struct ScriptedSource {
    script: VecDeque<Step>,
    open: bool,
    counters: Arc<SourceCounters>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Step>) -> Self {
        Self::with_counters(script, Arc::new(SourceCounters::default()))
    }

    pub fn with_counters(script: Vec<Step>, counters: Arc<SourceCounters>) -> Self {
        Self {
            script: script.into(),
            open: false,
            counters,
        }
    }

    pub fn counters(&self) -> Arc<SourceCounters> {
        Arc::clone(&self.counters)
    }
}

pub fn test_frame() -> FrameData {
    let image = RgbImage::from_pixel(32, 24, Rgb([40, 80, 120]));
    FrameData::from_rgb(0, SystemTime::now(), image)
}

#[async_trait]
impl VideoSource for ScriptedSource {
    async fn open(&mut self, url: &str) -> Result<(), SourceError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        match self.script.front() {
            Some(Step::OpenFails) => {
                self.script.pop_front();
                Err(SourceError::Open {
                    url: url.to_string(),
                    details: "connection refused".to_string(),
                })
            }
            Some(Step::OpenHangs) => {
                self.script.pop_front();
                std::future::pending::<()>().await;
                Ok(())
            }
            _ => {
                self.open = true;
                Ok(())
            }
        }
    }

    async fn read(&mut self) -> Result<FrameData, SourceError> {
        if !self.open {
            return Err(SourceError::NotOpen);
        }
        self.counters.reads.fetch_add(1, Ordering::SeqCst);

        match self.script.pop_front() {
            Some(Step::ReadFails) => Err(SourceError::EndOfStream),
            Some(Step::ReadHangs) => {
                std::future::pending::<()>().await;
                Err(SourceError::EndOfStream)
            }
            _ => Ok(test_frame()),
        }
    }

    async fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Hands out scripted sources and remembers how many it created
#[derive(Default)]
pub struct ScriptedFactory {
    script: Mutex<Vec<Step>>,
    pub created: AtomicUsize,
    pub counters: Arc<SourceCounters>,
}

impl ScriptedFactory {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script),
            ..Default::default()
        }
    }
}

impl SourceFactory for ScriptedFactory {
    fn create(&self, _camera: &Camera) -> Box<dyn VideoSource> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let script = std::mem::take(&mut *self.script.lock());
        Box::new(ScriptedSource::with_counters(
            script,
            Arc::clone(&self.counters),
        ))
    }
}
