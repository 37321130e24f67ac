//! Replays a recorded gaze session through the real control loop.
//!
//! Frames carry the recorded head pitch as little-endian `f32` bytes; the replay classifier
//! reads it back. Time is driven by a manual clock advanced by each step's `after_ms`.

use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use control_core::{
    ControlDependencies, ControlHandle, ControlService, ManualClock, SessionStats, StatusSnapshot,
};
use device_integration::{
    BindError, DispatchResult, Frame, FrameSink, FrameSource, GazeClassifier, GestureActuator,
    GestureOutcome, HeadPose, StrokeGesture,
};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{CameraState, ScreenSize},
    protocol::Command,
};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::config::Settings;

const SETTLE_MARGIN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayStep {
    /// Milliseconds between the previous step and this one.
    #[serde(default)]
    pub after_ms: u64,
    #[serde(flatten)]
    pub action: ReplayAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayAction {
    Pose {
        pitch_degrees: f32,
    },
    NoFace,
    ClassifierError,
    Command {
        command: Command,
    },
    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
}

pub fn load_script(path: &Path) -> anyhow::Result<Vec<ReplayStep>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read replay script '{}'", path.display()))?;
    parse_script(&raw).with_context(|| format!("invalid replay script '{}'", path.display()))
}

pub fn parse_script(raw: &str) -> anyhow::Result<Vec<ReplayStep>> {
    Ok(serde_json::from_str(raw)?)
}

#[derive(Default)]
pub struct ReplayFrameSource {
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    next_sequence: AtomicU64,
}

impl ReplayFrameSource {
    fn current_sink(&self) -> Option<Arc<dyn FrameSink>> {
        self.sink.lock().ok().and_then(|sink| sink.clone())
    }

    fn emit(&self, data: Vec<u8>) -> bool {
        let Some(sink) = self.current_sink() else {
            return false;
        };
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        sink.push_frame(Frame::new(sequence, Instant::now(), 1, 1, data))
    }

    fn disconnect(&self, reason: String) -> bool {
        let sink = self.sink.lock().ok().and_then(|mut sink| sink.take());
        match sink {
            Some(sink) => {
                sink.disconnected(reason);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl FrameSource for ReplayFrameSource {
    async fn bind(&self, sink: Arc<dyn FrameSink>) -> Result<(), BindError> {
        let mut slot = self
            .sink
            .lock()
            .map_err(|_| BindError::Backend("replay source poisoned".into()))?;
        *slot = Some(sink);
        Ok(())
    }

    async fn unbind_all(&self) {
        if let Ok(mut slot) = self.sink.lock() {
            slot.take();
        }
    }
}

/// Reads back the pitch written into each frame; `NaN` encodes a frame without a face.
pub struct RecordedPoseClassifier;

#[async_trait]
impl GazeClassifier for RecordedPoseClassifier {
    async fn classify(&self, frame: &Frame) -> anyhow::Result<HeadPose> {
        let bytes: [u8; 4] = frame
            .data
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("recorded frame {} has no pose", frame.sequence))?;
        let pitch_degrees = f32::from_le_bytes(bytes);
        if pitch_degrees.is_nan() {
            Ok(HeadPose::NoFace)
        } else {
            Ok(HeadPose::Face { pitch_degrees })
        }
    }
}

#[derive(Debug, Serialize)]
struct StrokeRecord {
    event: &'static str,
    x: f32,
    start_y: f32,
    end_y: f32,
    displacement: f32,
    duration_ms: u64,
}

/// Prints every accepted stroke as a JSON line and completes it immediately.
pub struct StdoutActuator {
    pub screen: ScreenSize,
}

impl GestureActuator for StdoutActuator {
    fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    fn dispatch(
        &self,
        gesture: StrokeGesture,
        completion: oneshot::Sender<GestureOutcome>,
    ) -> DispatchResult {
        let record = StrokeRecord {
            event: "scroll",
            x: gesture.start.x,
            start_y: gesture.start.y,
            end_y: gesture.end.y,
            displacement: gesture.displacement(),
            duration_ms: gesture.duration.as_millis() as u64,
        };
        match serde_json::to_string(&record) {
            Ok(line) => println!("{line}"),
            Err(error) => {
                warn!(%error, "failed to encode stroke");
                return DispatchResult::Rejected;
            }
        }
        let _ = completion.send(GestureOutcome::Completed);
        DispatchResult::Accepted
    }
}

pub async fn run(settings: &Settings, script: Vec<ReplayStep>) -> anyhow::Result<SessionStats> {
    let source = Arc::new(ReplayFrameSource::default());
    let clock = Arc::new(ManualClock::new());
    let service = ControlService::spawn(
        settings.control_config(),
        ControlDependencies {
            frame_source: source.clone(),
            classifier: Arc::new(RecordedPoseClassifier),
            actuator: Arc::new(StdoutActuator {
                screen: settings.screen(),
            }),
            clock: clock.clone(),
        },
    );
    let handle = service.handle();
    let printer = tokio::spawn(print_notifications(handle.subscribe()));
    let wait = Duration::from_millis(settings.classification_timeout_ms) + SETTLE_MARGIN;

    info!(steps = script.len(), "replaying gaze session");
    for (index, step) in script.into_iter().enumerate() {
        clock.advance(Duration::from_millis(step.after_ms));
        debug!(index, action = ?step.action, "replay step");
        match step.action {
            ReplayAction::Pose { pitch_degrees } => {
                replay_frame(&handle, &source, pitch_degrees.to_le_bytes().to_vec(), wait).await?
            }
            ReplayAction::NoFace => {
                replay_frame(&handle, &source, f32::NAN.to_le_bytes().to_vec(), wait).await?
            }
            ReplayAction::ClassifierError => {
                replay_frame(&handle, &source, Vec::new(), wait).await?
            }
            ReplayAction::Command { command } => {
                let handled = handle.status().stats.commands_handled;
                if let Err(error) = handle.send(command).await {
                    warn!(index, %error, "replayed command rejected");
                    println!("{}", serde_json::to_string(&error.failure())?);
                    continue;
                }
                settle(&handle, wait, |status| {
                    status.stats.commands_handled > handled && !status.camera.is_transitioning()
                })
                .await?;
            }
            ReplayAction::Disconnect { reason } => {
                let reason = reason.unwrap_or_else(|| "replayed disconnect".into());
                if source.disconnect(reason) {
                    settle(&handle, wait, |status| status.camera == CameraState::Stopped).await?;
                } else {
                    debug!(index, "no active binding to disconnect");
                }
            }
        }
    }

    let status = service.shutdown().await?;
    drop(handle);
    printer.await?;
    info!(stats = ?status.stats, "replay finished");
    Ok(status.stats)
}

async fn replay_frame(
    handle: &ControlHandle,
    source: &ReplayFrameSource,
    data: Vec<u8>,
    wait: Duration,
) -> anyhow::Result<()> {
    let before = handle.status().stats;
    if !source.emit(data) {
        debug!("camera not running; recorded frame skipped");
        return Ok(());
    }
    settle(handle, wait, |status| {
        status.stats.samples > before.samples || status.stats.frames_dropped > before.frames_dropped
    })
    .await?;
    Ok(())
}

async fn settle(
    handle: &ControlHandle,
    wait: Duration,
    predicate: impl FnMut(&StatusSnapshot) -> bool,
) -> anyhow::Result<StatusSnapshot> {
    let status = tokio::time::timeout(wait, handle.wait_for_status(predicate))
        .await
        .context("timed out waiting for the control loop")??;
    Ok(status)
}

async fn print_notifications(mut notifications: broadcast::Receiver<shared::protocol::Notification>) {
    loop {
        match notifications.recv().await {
            Ok(notification) => match serde_json::to_string(&notification) {
                Ok(line) => println!("{line}"),
                Err(error) => warn!(%error, "failed to encode notification"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "notification printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[path = "tests/replay_tests.rs"]
mod tests;
