//! Adapter around the external gaze classifier.
//!
//! Every outcome is normalized to a [`GazeSample`]; failures, timeouts and missing faces all
//! collapse to `Center` so a classifier outage can never keep a scroll going.

use std::{sync::Arc, time::Duration};

use device_integration::{Frame, GazeClassifier, HeadPose};
use shared::domain::{GazeDirection, GazeSample};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::{clock::Clock, control::ControlEvent};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassificationOutcome {
    Face { pitch_degrees: f32 },
    NoFace,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifiedFrame {
    pub sequence: u64,
    pub sample: GazeSample,
    pub outcome: ClassificationOutcome,
}

/// Maps head pitch onto a direction. Looking up yields a negative pitch.
pub fn direction_for_pitch(pitch_degrees: f32, sensitivity_degrees: f32) -> GazeDirection {
    if pitch_degrees < -sensitivity_degrees {
        GazeDirection::Up
    } else if pitch_degrees > sensitivity_degrees {
        GazeDirection::Down
    } else {
        GazeDirection::Center
    }
}

pub struct ClassifierAdapter {
    classifier: Arc<dyn GazeClassifier>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl ClassifierAdapter {
    pub fn new(classifier: Arc<dyn GazeClassifier>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            classifier,
            clock,
            timeout,
        }
    }

    /// Classifies one frame and releases it before returning, whatever the outcome.
    pub async fn on_frame(&self, frame: Frame, sensitivity_degrees: f32) -> ClassifiedFrame {
        let sequence = frame.sequence;
        let outcome = match tokio::time::timeout(self.timeout, self.classifier.classify(&frame)).await
        {
            Ok(Ok(HeadPose::Face { pitch_degrees })) if pitch_degrees.is_finite() => {
                ClassificationOutcome::Face { pitch_degrees }
            }
            Ok(Ok(HeadPose::Face { pitch_degrees })) => {
                warn!(sequence, pitch_degrees, "classifier returned a non-finite pitch");
                ClassificationOutcome::Failed
            }
            Ok(Ok(HeadPose::NoFace)) => ClassificationOutcome::NoFace,
            Ok(Err(error)) => {
                warn!(sequence, %error, "face detection failed");
                ClassificationOutcome::Failed
            }
            Err(_) => {
                warn!(
                    sequence,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "face detection timed out"
                );
                ClassificationOutcome::TimedOut
            }
        };
        drop(frame);

        let direction = match outcome {
            ClassificationOutcome::Face { pitch_degrees } => {
                direction_for_pitch(pitch_degrees, sensitivity_degrees)
            }
            _ => GazeDirection::Center,
        };

        ClassifiedFrame {
            sequence,
            sample: GazeSample::new(direction, self.clock.now()),
            outcome,
        }
    }
}

pub(crate) struct ClassificationJob {
    pub(crate) generation: u64,
    pub(crate) frame: Frame,
    pub(crate) sensitivity_degrees: f32,
}

/// Runs classifications one at a time on a dedicated task, posting results back onto the
/// control queue in the order the jobs were accepted.
pub(crate) fn spawn_classifier_worker(
    adapter: ClassifierAdapter,
    events: mpsc::WeakSender<ControlEvent>,
) -> (mpsc::Sender<ClassificationJob>, JoinHandle<()>) {
    let (jobs_tx, mut jobs_rx) = mpsc::channel::<ClassificationJob>(1);
    let task = tokio::spawn(async move {
        while let Some(job) = jobs_rx.recv().await {
            let classified = adapter.on_frame(job.frame, job.sensitivity_degrees).await;
            debug!(
                generation = job.generation,
                sequence = classified.sequence,
                direction = ?classified.sample.direction,
                "frame classified"
            );
            let event = ControlEvent::ClassificationFinished {
                generation: job.generation,
                classified,
            };
            let Some(events) = events.upgrade() else {
                break;
            };
            if events.send(event).await.is_err() {
                break;
            }
        }
    });
    (jobs_tx, task)
}

#[cfg(test)]
#[path = "tests/classifier_tests.rs"]
mod tests;
