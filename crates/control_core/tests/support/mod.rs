#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use control_core::{
    ControlConfig, ControlDependencies, ControlHandle, ControlService, ManualClock, StatusSnapshot,
};
use device_integration::{
    BindError, DispatchResult, Frame, FrameSink, FrameSource, GazeClassifier, GestureActuator,
    GestureOutcome, HeadPose, StrokeGesture,
};
use shared::{domain::ScreenSize, protocol::Notification};
use tokio::sync::{broadcast, oneshot, Semaphore};

pub const WAIT: Duration = Duration::from_secs(2);
pub const SCREEN: ScreenSize = ScreenSize {
    width: 1080,
    height: 1000,
};
pub const LOOK_UP: f32 = -30.0;
pub const LOOK_DOWN: f32 = 30.0;

/// Frame source whose frames carry the head pitch as little-endian `f32` bytes.
#[derive(Default)]
pub struct MockFrameSource {
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    bind_results: Mutex<VecDeque<Result<(), BindError>>>,
    bind_gate: Option<Arc<Semaphore>>,
    next_sequence: AtomicU64,
    pub binds: AtomicUsize,
    pub unbinds: AtomicUsize,
    active_binds: AtomicUsize,
    pub max_concurrent_binds: AtomicUsize,
    pub released: Arc<AtomicUsize>,
}

impl MockFrameSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Each bind waits for one permit on the returned semaphore.
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let source = Self {
            bind_gate: Some(gate.clone()),
            ..Self::default()
        };
        (Arc::new(source), gate)
    }

    pub fn fail_next_bind(&self, error: BindError) {
        self.bind_results
            .lock()
            .expect("bind results lock")
            .push_back(Err(error));
    }

    pub fn is_bound(&self) -> bool {
        self.sink.lock().expect("sink lock").is_some()
    }

    pub fn push_pitch(&self, pitch_degrees: f32) -> bool {
        self.push_data(pitch_degrees.to_le_bytes().to_vec())
    }

    pub fn push_no_face(&self) -> bool {
        self.push_pitch(f32::NAN)
    }

    /// A frame the classifier cannot decode.
    pub fn push_garbage(&self) -> bool {
        self.push_data(Vec::new())
    }

    pub fn disconnect(&self, reason: &str) {
        let sink = self.sink.lock().expect("sink lock").take();
        if let Some(sink) = sink {
            sink.disconnected(reason.to_string());
        }
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn push_data(&self, data: Vec<u8>) -> bool {
        let Some(sink) = self.sink.lock().expect("sink lock").clone() else {
            return false;
        };
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let released = self.released.clone();
        let frame = Frame::new(sequence, Instant::now(), 2, 2, data).with_release(move || {
            released.fetch_add(1, Ordering::SeqCst);
        });
        sink.push_frame(frame)
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn bind(&self, sink: Arc<dyn FrameSink>) -> Result<(), BindError> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        let active = self.active_binds.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_binds.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.bind_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let result = self
            .bind_results
            .lock()
            .expect("bind results lock")
            .pop_front()
            .unwrap_or(Ok(()));
        if result.is_ok() {
            *self.sink.lock().expect("sink lock") = Some(sink);
        }
        self.active_binds.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn unbind_all(&self) {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().expect("sink lock").take();
    }
}

/// Decodes the pitch written by [`MockFrameSource`]. `NaN` means no face.
#[derive(Default)]
pub struct PitchClassifier {
    gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
}

impl PitchClassifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Each classification waits for one permit on the returned semaphore.
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let classifier = Self {
            gate: Some(gate.clone()),
            calls: AtomicUsize::new(0),
        };
        (Arc::new(classifier), gate)
    }
}

#[async_trait]
impl GazeClassifier for PitchClassifier {
    async fn classify(&self, frame: &Frame) -> Result<HeadPose> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        let bytes: [u8; 4] = frame
            .data
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("detector could not read frame"))?;
        let pitch_degrees = f32::from_le_bytes(bytes);
        if pitch_degrees.is_nan() {
            Ok(HeadPose::NoFace)
        } else {
            Ok(HeadPose::Face { pitch_degrees })
        }
    }
}

pub struct RecordingActuator {
    screen: ScreenSize,
    accept: AtomicBool,
    pub strokes: Mutex<Vec<StrokeGesture>>,
}

impl RecordingActuator {
    pub fn new() -> Arc<Self> {
        Self::with_screen(SCREEN)
    }

    pub fn with_screen(screen: ScreenSize) -> Arc<Self> {
        Arc::new(Self {
            screen,
            accept: AtomicBool::new(true),
            strokes: Mutex::new(Vec::new()),
        })
    }

    pub fn reject_all(&self) {
        self.accept.store(false, Ordering::SeqCst);
    }

    pub fn displacements(&self) -> Vec<f32> {
        self.strokes
            .lock()
            .expect("strokes lock")
            .iter()
            .map(StrokeGesture::displacement)
            .collect()
    }
}

impl GestureActuator for RecordingActuator {
    fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    fn dispatch(
        &self,
        gesture: StrokeGesture,
        completion: oneshot::Sender<GestureOutcome>,
    ) -> DispatchResult {
        if !self.accept.load(Ordering::SeqCst) {
            return DispatchResult::Rejected;
        }
        self.strokes.lock().expect("strokes lock").push(gesture);
        let _ = completion.send(GestureOutcome::Completed);
        DispatchResult::Accepted
    }
}

pub struct Harness {
    pub service: ControlService,
    pub handle: ControlHandle,
    pub source: Arc<MockFrameSource>,
    pub classifier: Arc<PitchClassifier>,
    pub actuator: Arc<RecordingActuator>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn start(config: ControlConfig) -> Self {
        Self::start_with(
            config,
            MockFrameSource::new(),
            PitchClassifier::new(),
            RecordingActuator::new(),
        )
    }

    pub fn start_with(
        config: ControlConfig,
        source: Arc<MockFrameSource>,
        classifier: Arc<PitchClassifier>,
        actuator: Arc<RecordingActuator>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new());
        let service = ControlService::spawn(
            config,
            ControlDependencies {
                frame_source: source.clone(),
                classifier: classifier.clone(),
                actuator: actuator.clone(),
                clock: clock.clone(),
            },
        );
        let handle = service.handle();
        Self {
            service,
            handle,
            source,
            classifier,
            actuator,
            clock,
        }
    }

    pub async fn wait_for(&self, predicate: impl FnMut(&StatusSnapshot) -> bool) -> StatusSnapshot {
        tokio::time::timeout(WAIT, self.handle.wait_for_status(predicate))
            .await
            .expect("timed out waiting for status")
            .expect("control loop closed")
    }

    /// Pushes a frame and waits until its classification has been handled.
    pub async fn classify_pitch(&self, pitch_degrees: f32) -> StatusSnapshot {
        let samples = self.handle.status().stats.samples;
        assert!(self.source.push_pitch(pitch_degrees), "frame was dropped");
        self.wait_for(|status| status.stats.samples > samples).await
    }
}

pub fn enabled_config() -> ControlConfig {
    ControlConfig {
        service_enabled: true,
        classification_timeout: Duration::from_secs(5),
        ..ControlConfig::default()
    }
}

pub async fn next_notification(rx: &mut broadcast::Receiver<Notification>) -> Notification {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}
