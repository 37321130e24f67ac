//! The gaze-to-scroll control loop and its command surface.
//!
//! Every external callback (frames, bind results, classifier results, gesture completions,
//! commands) is posted as a [`ControlEvent`] onto one ordered queue. A single task owns all
//! mutable state and consumes that queue, so mode, service and camera state have exactly one
//! writer.
//!
//! Internal tasks only hold weak senders. Once every [`ControlHandle`] and the
//! [`ControlService`] are dropped the loop unbinds the camera and exits.

use std::{sync::Arc, time::Instant};

use device_integration::{
    BindError, DispatchResult, Frame, FrameSink, FrameSource, GazeClassifier, GestureActuator,
    GestureOutcome,
};
use serde::Serialize;
use shared::{
    domain::{CameraState, GazeDirection, ScrollMode, ScrollSettings, ServiceState},
    protocol::{Command, Notification},
};
use tokio::{
    runtime::Handle,
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    actuator::ScrollActuator,
    classifier::{spawn_classifier_worker, ClassificationJob, ClassifiedFrame, ClassifierAdapter},
    clock::Clock,
    config::ControlConfig,
    error::ControlError,
    lifecycle::{CameraLifecycle, LifecycleEffect, LifecycleRequest},
    policy,
};

pub struct ControlDependencies {
    pub frame_source: Arc<dyn FrameSource>,
    pub classifier: Arc<dyn GazeClassifier>,
    pub actuator: Arc<dyn GestureActuator>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub commands_handled: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub samples: u64,
    pub commands_dispatched: u64,
    pub commands_rejected: u64,
    pub throttled: u64,
    pub suppressed: u64,
    pub gestures_completed: u64,
    pub gestures_cancelled: u64,
    pub bind_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub service: ServiceState,
    pub camera: CameraState,
    pub settings: ScrollSettings,
    pub stats: SessionStats,
}

pub(crate) enum ControlEvent {
    CommandReceived(Command),
    Interrupted,
    Shutdown,
    FrameReady {
        generation: u64,
        frame: Frame,
    },
    Disconnected {
        generation: u64,
        reason: String,
    },
    BindSucceeded {
        generation: u64,
    },
    BindFailed {
        generation: u64,
        error: BindError,
    },
    UnbindCompleted {
        generation: u64,
    },
    ClassificationFinished {
        generation: u64,
        classified: ClassifiedFrame,
    },
    GestureFinished {
        gesture_id: u64,
        outcome: Option<GestureOutcome>,
    },
}

/// Sink handed to the frame source for one binding generation.
struct BindingSink {
    generation: u64,
    events: mpsc::WeakSender<ControlEvent>,
    runtime: Handle,
}

impl FrameSink for BindingSink {
    fn push_frame(&self, frame: Frame) -> bool {
        // A full or closed queue hands the event back and dropping it releases the frame.
        let Some(events) = self.events.upgrade() else {
            return false;
        };
        events
            .try_send(ControlEvent::FrameReady {
                generation: self.generation,
                frame,
            })
            .is_ok()
    }

    fn disconnected(&self, reason: String) {
        let events = self.events.clone();
        let generation = self.generation;
        self.runtime.spawn(async move {
            if let Some(events) = events.upgrade() {
                let _ = events
                    .send(ControlEvent::Disconnected { generation, reason })
                    .await;
            }
        });
    }
}

/// Cloneable command surface for a running control loop.
#[derive(Clone)]
pub struct ControlHandle {
    events: mpsc::Sender<ControlEvent>,
    notifications: broadcast::Sender<Notification>,
    status: watch::Receiver<StatusSnapshot>,
}

impl ControlHandle {
    pub async fn send(&self, command: Command) -> Result<(), ControlError> {
        command.validate()?;
        self.events
            .send(ControlEvent::CommandReceived(command))
            .await
            .map_err(|_| ControlError::LoopClosed)
    }

    pub fn try_send(&self, command: Command) -> Result<(), ControlError> {
        command.validate()?;
        self.events
            .try_send(ControlEvent::CommandReceived(command))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => ControlError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => ControlError::LoopClosed,
            })
    }

    /// Parses a wire command and queues it.
    pub async fn send_json(&self, raw: &str) -> Result<Command, ControlError> {
        let command = Command::from_json(raw)?;
        self.send(command.clone()).await?;
        Ok(command)
    }

    /// External interruption of the hosting service; stops the camera.
    pub async fn interrupt(&self) -> Result<(), ControlError> {
        self.events
            .send(ControlEvent::Interrupted)
            .await
            .map_err(|_| ControlError::LoopClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn status(&self) -> StatusSnapshot {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    pub async fn wait_for_status(
        &self,
        predicate: impl FnMut(&StatusSnapshot) -> bool,
    ) -> Result<StatusSnapshot, ControlError> {
        let mut status = self.status.clone();
        let snapshot = status
            .wait_for(predicate)
            .await
            .map_err(|_| ControlError::LoopClosed)?;
        Ok(*snapshot)
    }
}

pub struct ControlService {
    handle: ControlHandle,
    task: JoinHandle<()>,
}

impl ControlService {
    /// Starts the control loop and its classification worker on the current tokio runtime.
    pub fn spawn(config: ControlConfig, deps: ControlDependencies) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));

        let settings = config.initial_settings;
        let service = ServiceState::from_enabled(config.service_enabled);
        let (status_tx, status_rx) = watch::channel(StatusSnapshot {
            service,
            camera: CameraState::Stopped,
            settings,
            stats: SessionStats::default(),
        });

        let adapter =
            ClassifierAdapter::new(deps.classifier, deps.clock, config.classification_timeout);
        let (classifier_jobs, classifier_task) =
            spawn_classifier_worker(adapter, events_tx.downgrade());

        let control = ControlLoop {
            settings,
            service,
            lifecycle: CameraLifecycle::new(),
            last_scroll: None,
            classification_in_flight: false,
            next_gesture_id: 0,
            stats: SessionStats::default(),
            frame_source: deps.frame_source,
            actuator: ScrollActuator::new(deps.actuator),
            classifier_jobs,
            classifier_task,
            events_tx: events_tx.downgrade(),
            events_rx,
            notifications: notifications.clone(),
            status: status_tx,
        };
        let task = tokio::spawn(control.run());

        Self {
            handle: ControlHandle {
                events: events_tx,
                notifications,
                status: status_rx,
            },
            task,
        }
    }

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Stops the camera (announcing `running=false` if it was running) and waits for the loop
    /// to exit. Returns the final status.
    ///
    /// Dropping the service and all handles instead unbinds the camera without announcing.
    pub async fn shutdown(self) -> Result<StatusSnapshot, ControlError> {
        self.handle
            .events
            .send(ControlEvent::Shutdown)
            .await
            .map_err(|_| ControlError::LoopClosed)?;
        self.task.await.map_err(|_| ControlError::LoopClosed)?;
        Ok(self.handle.status())
    }
}

struct ControlLoop {
    settings: ScrollSettings,
    service: ServiceState,
    lifecycle: CameraLifecycle,
    last_scroll: Option<Instant>,
    classification_in_flight: bool,
    next_gesture_id: u64,
    stats: SessionStats,
    frame_source: Arc<dyn FrameSource>,
    actuator: ScrollActuator,
    classifier_jobs: mpsc::Sender<ClassificationJob>,
    classifier_task: JoinHandle<()>,
    events_tx: mpsc::WeakSender<ControlEvent>,
    events_rx: mpsc::Receiver<ControlEvent>,
    notifications: broadcast::Sender<Notification>,
    status: watch::Sender<StatusSnapshot>,
}

impl ControlLoop {
    async fn run(mut self) {
        info!(
            service = ?self.service,
            mode = ?self.settings.mode,
            skip_distance = self.settings.skip_distance,
            "gaze scroll control loop started"
        );

        loop {
            let Some(event) = self.events_rx.recv().await else {
                self.abandon();
                break;
            };
            self.handle_event(event);
            self.publish_status();
            if self.lifecycle.is_closing() && self.lifecycle.is_idle() {
                break;
            }
        }

        self.classifier_task.abort();
        info!(stats = ?self.stats, "gaze scroll control loop stopped");
    }

    /// Every external sender is gone, so no stop request can arrive any more.
    fn abandon(&self) {
        if self.lifecycle.state() == CameraState::Stopped {
            return;
        }
        warn!(
            state = self.lifecycle.state().as_str(),
            "control handles dropped without shutdown; unbinding camera"
        );
        let source = Arc::clone(&self.frame_source);
        tokio::spawn(async move {
            source.unbind_all().await;
        });
    }

    fn handle_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::CommandReceived(command) => self.handle_command(command),
            ControlEvent::Interrupted => {
                warn!("service interrupted");
                self.request_camera(LifecycleRequest::Stop);
            }
            ControlEvent::Shutdown => {
                info!("shutdown requested");
                let effects = self.lifecycle.shutdown(self.service);
                self.apply_effects(effects);
            }
            ControlEvent::FrameReady { generation, frame } => self.handle_frame(generation, frame),
            ControlEvent::Disconnected { generation, reason } => {
                warn!(generation, %reason, "frame source disconnected");
                let effects = self.lifecycle.disconnected(generation);
                self.apply_effects(effects);
            }
            ControlEvent::BindSucceeded { generation } => {
                let effects = self.lifecycle.bind_succeeded(generation, self.service);
                self.apply_effects(effects);
            }
            ControlEvent::BindFailed { generation, error } => {
                self.stats.bind_failures += 1;
                error!(generation, %error, "failed to start camera");
                let effects = self.lifecycle.bind_failed(generation, self.service);
                self.apply_effects(effects);
            }
            ControlEvent::UnbindCompleted { generation } => {
                let effects = self.lifecycle.unbind_completed(generation, self.service);
                self.apply_effects(effects);
            }
            ControlEvent::ClassificationFinished {
                generation,
                classified,
            } => self.handle_classification(generation, classified),
            ControlEvent::GestureFinished {
                gesture_id,
                outcome,
            } => match outcome {
                Some(GestureOutcome::Completed) => {
                    self.stats.gestures_completed += 1;
                    debug!(gesture_id, "scroll completed");
                }
                Some(GestureOutcome::Cancelled) => {
                    self.stats.gestures_cancelled += 1;
                    warn!(gesture_id, "scroll was cancelled");
                }
                None => debug!(gesture_id, "actuator dropped gesture completion"),
            },
        }
    }

    fn handle_command(&mut self, command: Command) {
        self.stats.commands_handled += 1;
        debug!(command = command.name(), "command received");
        match command {
            Command::SetServiceEnabled { enabled } => self.set_service_enabled(enabled, false),
            Command::ToggleService => {
                let enabled = !self.service.is_enabled();
                self.set_service_enabled(enabled, true);
            }
            Command::ToggleCamera => self.request_camera(LifecycleRequest::Toggle),
            Command::StartCamera => self.request_camera(LifecycleRequest::Start),
            Command::StopCamera => self.request_camera(LifecycleRequest::Stop),
            Command::UpdateDelay { delay_seconds } => {
                self.settings.mode = ScrollMode::from_delay_seconds(delay_seconds);
                info!(
                    delay_seconds,
                    mode = ?self.settings.mode,
                    "scroll mode updated"
                );
            }
            Command::UpdateSkipDistance { multiplier } => {
                if !multiplier.is_finite() {
                    warn!(multiplier, "ignoring non-finite skip distance");
                    return;
                }
                // Applied as given; range checks live with the settings surface.
                self.settings.skip_distance = multiplier;
                info!(
                    skip_distance = self.settings.skip_distance,
                    "skip distance multiplier updated"
                );
            }
            Command::UpdateSensitivity { degrees } => {
                if !degrees.is_finite() || degrees < 0.0 {
                    warn!(degrees, "ignoring invalid sensitivity");
                    return;
                }
                self.settings.sensitivity_degrees = degrees;
                info!(degrees, "sensitivity updated");
            }
        }
    }

    fn set_service_enabled(&mut self, enabled: bool, start_when_enabled: bool) {
        self.service = ServiceState::from_enabled(enabled);
        info!(enabled, "service state updated");
        if !enabled {
            self.request_camera(LifecycleRequest::Stop);
        } else if start_when_enabled {
            self.request_camera(LifecycleRequest::Start);
        }
    }

    fn request_camera(&mut self, request: LifecycleRequest) {
        let effects = self.lifecycle.request(request, self.service);
        self.apply_effects(effects);
    }

    fn handle_frame(&mut self, generation: u64, frame: Frame) {
        self.stats.frames_received += 1;
        if !self.lifecycle.is_live(generation) || !self.service.is_enabled() {
            self.stats.frames_dropped += 1;
            debug!(generation, sequence = frame.sequence, "dropping frame for inactive binding");
            return;
        }
        if self.classification_in_flight {
            self.stats.frames_dropped += 1;
            debug!(sequence = frame.sequence, "classification in flight; dropping frame");
            return;
        }

        let job = ClassificationJob {
            generation,
            frame,
            sensitivity_degrees: self.settings.sensitivity_degrees,
        };
        match self.classifier_jobs.try_send(job) {
            Ok(()) => self.classification_in_flight = true,
            Err(err) => {
                self.stats.frames_dropped += 1;
                error!(%err, "classifier worker unavailable; dropping frame");
            }
        }
    }

    fn handle_classification(&mut self, generation: u64, classified: ClassifiedFrame) {
        self.classification_in_flight = false;
        self.stats.samples += 1;
        if !self.lifecycle.is_live(generation) || !self.service.is_enabled() {
            debug!(
                generation,
                sequence = classified.sequence,
                "ignoring classification that finished after the camera stopped"
            );
            return;
        }

        let sample = classified.sample;
        let now = sample.timestamp;
        let Some(command) = policy::decide(&sample, &self.settings, self.last_scroll, now) else {
            if sample.direction != GazeDirection::Center {
                self.stats.throttled += 1;
            }
            return;
        };

        let stroke = match self.actuator.plan(&command) {
            Ok(stroke) => stroke,
            Err(error) => {
                self.stats.suppressed += 1;
                warn!(%error, "skipping scroll gesture");
                return;
            }
        };

        // Throttling advances on the decision, before the actuator has a say.
        self.last_scroll = Some(now);
        let gesture_id = self.next_gesture_id;
        self.next_gesture_id += 1;
        let (completion_tx, completion_rx) = oneshot::channel();
        debug!(
            gesture_id,
            direction = ?command.direction,
            distance_fraction = command.distance_fraction,
            "performing scroll"
        );

        match self.actuator.dispatch(stroke, completion_tx) {
            DispatchResult::Accepted => {
                self.stats.commands_dispatched += 1;
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let outcome = completion_rx.await.ok();
                    post(
                        &events,
                        ControlEvent::GestureFinished {
                            gesture_id,
                            outcome,
                        },
                    )
                    .await;
                });
            }
            DispatchResult::Rejected => self.stats.commands_rejected += 1,
        }
    }

    fn apply_effects(&mut self, effects: Vec<LifecycleEffect>) {
        for effect in effects {
            match effect {
                LifecycleEffect::Bind { generation } => self.spawn_bind(generation),
                LifecycleEffect::Unbind { generation } => self.spawn_unbind(generation),
                LifecycleEffect::Notify { running } => {
                    info!(running, "camera state changed");
                    let _ = self
                        .notifications
                        .send(Notification::CameraStateChanged { running });
                }
            }
        }
    }

    fn spawn_bind(&self, generation: u64) {
        let source = Arc::clone(&self.frame_source);
        let events = self.events_tx.clone();
        let sink: Arc<dyn FrameSink> = Arc::new(BindingSink {
            generation,
            events: events.clone(),
            runtime: Handle::current(),
        });

        tokio::spawn(async move {
            source.unbind_all().await;
            match source.bind(sink).await {
                Ok(()) => {
                    if !post(&events, ControlEvent::BindSucceeded { generation }).await {
                        // Nobody is left to stop this binding.
                        source.unbind_all().await;
                    }
                }
                Err(error) => {
                    source.unbind_all().await;
                    post(&events, ControlEvent::BindFailed { generation, error }).await;
                }
            }
        });
    }

    fn spawn_unbind(&self, generation: u64) {
        let source = Arc::clone(&self.frame_source);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            source.unbind_all().await;
            post(&events, ControlEvent::UnbindCompleted { generation }).await;
        });
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            service: self.service,
            camera: self.lifecycle.state(),
            settings: self.settings,
            stats: self.stats,
        }
    }

    fn publish_status(&self) {
        self.status.send_replace(self.snapshot());
    }
}

/// Posts `event` if the loop can still receive it.
async fn post(events: &mpsc::WeakSender<ControlEvent>, event: ControlEvent) -> bool {
    match events.upgrade() {
        Some(events) => events.send(event).await.is_ok(),
        None => false,
    }
}
