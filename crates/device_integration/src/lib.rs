use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use shared::domain::ScreenSize;
use thiserror::Error;
use tokio::sync::oneshot;

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// A captured camera frame. The underlying buffer is handed back to the source when the frame
/// is dropped.
pub struct Frame {
    pub sequence: u64,
    pub captured_at: Instant,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn new(sequence: u64, captured_at: Instant, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            sequence,
            captured_at,
            width,
            height,
            data,
            release: None,
        }
    }

    /// `Sync` keeps `&Frame` sendable across the classifier's await points.
    pub fn with_release(mut self, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadPose {
    Face { pitch_degrees: f32 },
    NoFace,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("no compatible camera available")]
    NoCompatibleCamera,
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("frame source backend error: {0}")]
    Backend(String),
}

/// Receiving end of a frame source binding.
pub trait FrameSink: Send + Sync {
    /// Offers a frame to the pipeline. Returns `false` when the frame was dropped.
    fn push_frame(&self, frame: Frame) -> bool;
    fn disconnected(&self, reason: String);
}

#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn bind(&self, sink: Arc<dyn FrameSink>) -> Result<(), BindError>;
    async fn unbind_all(&self);
}

#[async_trait]
pub trait GazeClassifier: Send + Sync {
    async fn classify(&self, frame: &Frame) -> anyhow::Result<HeadPose>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeGesture {
    pub start: ScreenPoint,
    pub end: ScreenPoint,
    pub duration: Duration,
}

impl StrokeGesture {
    pub fn displacement(&self) -> f32 {
        self.end.y - self.start.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    Accepted,
    Rejected,
}

pub trait GestureActuator: Send + Sync {
    fn screen_size(&self) -> ScreenSize;
    /// Attempts to inject the gesture. Completion is reported through `completion`; a rejected
    /// gesture drops the sender without reporting.
    fn dispatch(
        &self,
        gesture: StrokeGesture,
        completion: oneshot::Sender<GestureOutcome>,
    ) -> DispatchResult;
}

pub struct MissingFrameSource;

#[async_trait]
impl FrameSource for MissingFrameSource {
    async fn bind(&self, _sink: Arc<dyn FrameSink>) -> Result<(), BindError> {
        Err(BindError::NoCompatibleCamera)
    }

    async fn unbind_all(&self) {}
}

pub struct MissingGestureActuator {
    pub screen: ScreenSize,
}

impl GestureActuator for MissingGestureActuator {
    fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    fn dispatch(
        &self,
        _gesture: StrokeGesture,
        _completion: oneshot::Sender<GestureOutcome>,
    ) -> DispatchResult {
        DispatchResult::Rejected
    }
}
