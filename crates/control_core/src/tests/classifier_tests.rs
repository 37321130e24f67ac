use super::*;
use crate::clock::ManualClock;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Instant,
};

struct FixedClassifier {
    result: Mutex<Option<Result<HeadPose>>>,
    delay: Option<Duration>,
}

impl FixedClassifier {
    fn returning(result: Result<HeadPose>) -> Self {
        Self {
            result: Mutex::new(Some(result)),
            delay: None,
        }
    }

    fn stalled(delay: Duration) -> Self {
        Self {
            result: Mutex::new(Some(Ok(HeadPose::Face {
                pitch_degrees: -30.0,
            }))),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl GazeClassifier for FixedClassifier {
    async fn classify(&self, _frame: &Frame) -> Result<HeadPose> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result
            .lock()
            .expect("classifier result lock")
            .take()
            .unwrap_or(Ok(HeadPose::NoFace))
    }
}

fn tracked_frame(released: &Arc<AtomicUsize>) -> Frame {
    let counter = released.clone();
    Frame::new(3, Instant::now(), 4, 4, vec![0; 16]).with_release(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

fn adapter(classifier: FixedClassifier, timeout: Duration) -> ClassifierAdapter {
    ClassifierAdapter::new(Arc::new(classifier), Arc::new(ManualClock::new()), timeout)
}

#[test]
fn pitch_thresholds_are_strict() {
    assert_eq!(direction_for_pitch(-10.5, 10.0), GazeDirection::Up);
    assert_eq!(direction_for_pitch(12.0, 10.0), GazeDirection::Down);
    assert_eq!(direction_for_pitch(-10.0, 10.0), GazeDirection::Center);
    assert_eq!(direction_for_pitch(10.0, 10.0), GazeDirection::Center);
    assert_eq!(direction_for_pitch(0.0, 10.0), GazeDirection::Center);
}

#[tokio::test]
async fn face_pose_maps_through_sensitivity() {
    let released = Arc::new(AtomicUsize::new(0));
    let adapter = adapter(
        FixedClassifier::returning(Ok(HeadPose::Face { pitch_degrees: 14.0 })),
        Duration::from_millis(200),
    );

    let classified = adapter.on_frame(tracked_frame(&released), 10.0).await;
    assert_eq!(classified.sample.direction, GazeDirection::Down);
    assert_eq!(classified.sequence, 3);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failure_falls_back_to_center_and_releases_frame() {
    let released = Arc::new(AtomicUsize::new(0));
    let adapter = adapter(
        FixedClassifier::returning(Err(anyhow!("detector crashed"))),
        Duration::from_millis(200),
    );

    let classified = adapter.on_frame(tracked_frame(&released), 10.0).await;
    assert_eq!(classified.sample.direction, GazeDirection::Center);
    assert_eq!(classified.outcome, ClassificationOutcome::Failed);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_face_is_center() {
    let released = Arc::new(AtomicUsize::new(0));
    let adapter = adapter(
        FixedClassifier::returning(Ok(HeadPose::NoFace)),
        Duration::from_millis(200),
    );

    let classified = adapter.on_frame(tracked_frame(&released), 10.0).await;
    assert_eq!(classified.outcome, ClassificationOutcome::NoFace);
    assert_eq!(classified.sample.direction, GazeDirection::Center);
}

#[tokio::test]
async fn non_finite_pitch_counts_as_failure() {
    let released = Arc::new(AtomicUsize::new(0));
    let adapter = adapter(
        FixedClassifier::returning(Ok(HeadPose::Face {
            pitch_degrees: f32::NAN,
        })),
        Duration::from_millis(200),
    );

    let classified = adapter.on_frame(tracked_frame(&released), 10.0).await;
    assert_eq!(classified.outcome, ClassificationOutcome::Failed);
    assert_eq!(classified.sample.direction, GazeDirection::Center);
}

#[tokio::test]
async fn slow_classifier_times_out_to_center() {
    let released = Arc::new(AtomicUsize::new(0));
    let adapter = adapter(
        FixedClassifier::stalled(Duration::from_secs(5)),
        Duration::from_millis(20),
    );

    let classified = adapter.on_frame(tracked_frame(&released), 10.0).await;
    assert_eq!(classified.outcome, ClassificationOutcome::TimedOut);
    assert_eq!(classified.sample.direction, GazeDirection::Center);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}
