//! Camera lifecycle state machine.
//!
//! The machine is synchronous: every input returns the effects the control loop has to carry
//! out (bind, unbind, notify). Requests that arrive while a transition is in flight are queued
//! and replayed once it settles, so two binds can never overlap.

use std::collections::VecDeque;

use shared::domain::{CameraState, ServiceState};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRequest {
    Start,
    Stop,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEffect {
    /// Unbind everything, then bind a fresh pipeline tagged with `generation`.
    Bind { generation: u64 },
    Unbind { generation: u64 },
    Notify { running: bool },
}

#[derive(Debug, Default)]
pub struct CameraLifecycle {
    state: CameraState,
    generation: u64,
    announced_running: bool,
    closing: bool,
    queued: VecDeque<LifecycleRequest>,
}

impl CameraLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn queued_requests(&self) -> usize {
        self.queued.len()
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// True when frames and results tagged with `generation` belong to the active binding.
    pub fn is_live(&self, generation: u64) -> bool {
        self.state == CameraState::Running && self.generation == generation
    }

    /// Settled in `Stopped` with nothing left to replay.
    pub fn is_idle(&self) -> bool {
        self.state == CameraState::Stopped && self.queued.is_empty()
    }

    pub fn request(
        &mut self,
        request: LifecycleRequest,
        service: ServiceState,
    ) -> Vec<LifecycleEffect> {
        if self.state.is_transitioning() {
            debug!(
                ?request,
                state = self.state.as_str(),
                "camera transition in flight; queueing request"
            );
            self.queued.push_back(request);
            return Vec::new();
        }
        self.apply(request, service)
    }

    pub fn bind_succeeded(&mut self, generation: u64, service: ServiceState) -> Vec<LifecycleEffect> {
        if self.state != CameraState::Starting || generation != self.generation {
            warn!(
                generation,
                current = self.generation,
                state = self.state.as_str(),
                "ignoring bind result for a superseded start"
            );
            return Vec::new();
        }

        if !service.is_enabled() || self.closing {
            warn!(generation, "service disabled or closing while starting camera; unwinding");
            self.state = CameraState::Stopping;
            return vec![LifecycleEffect::Unbind { generation }];
        }

        info!(generation, "camera started");
        self.state = CameraState::Running;
        self.announced_running = true;
        let mut effects = vec![LifecycleEffect::Notify { running: true }];
        effects.extend(self.drain(service));
        effects
    }

    pub fn bind_failed(&mut self, generation: u64, service: ServiceState) -> Vec<LifecycleEffect> {
        if self.state != CameraState::Starting || generation != self.generation {
            return Vec::new();
        }
        self.state = CameraState::Stopped;
        self.drain(service)
    }

    pub fn unbind_completed(
        &mut self,
        generation: u64,
        service: ServiceState,
    ) -> Vec<LifecycleEffect> {
        if self.state != CameraState::Stopping || generation != self.generation {
            return Vec::new();
        }

        info!(generation, "camera stopped");
        self.state = CameraState::Stopped;
        let mut effects = Vec::new();
        if self.announced_running {
            self.announced_running = false;
            effects.push(LifecycleEffect::Notify { running: false });
        }
        effects.extend(self.drain(service));
        effects
    }

    /// The frame source dropped the binding on its own; unwind exactly like `stop()`.
    pub fn disconnected(&mut self, generation: u64) -> Vec<LifecycleEffect> {
        if !self.is_live(generation) {
            return Vec::new();
        }
        self.state = CameraState::Stopping;
        vec![LifecycleEffect::Unbind { generation }]
    }

    /// Drops pending requests and winds the camera down. Further starts are refused.
    pub fn shutdown(&mut self, service: ServiceState) -> Vec<LifecycleEffect> {
        self.closing = true;
        self.queued.clear();
        self.request(LifecycleRequest::Stop, service)
    }

    fn apply(&mut self, request: LifecycleRequest, service: ServiceState) -> Vec<LifecycleEffect> {
        let request = match request {
            LifecycleRequest::Toggle if self.state == CameraState::Running => LifecycleRequest::Stop,
            LifecycleRequest::Toggle => LifecycleRequest::Start,
            other => other,
        };

        match (request, self.state) {
            (LifecycleRequest::Start, CameraState::Stopped) => {
                if self.closing {
                    warn!("control loop closing; refusing to start camera");
                    return Vec::new();
                }
                if !service.is_enabled() {
                    warn!("service not enabled, cannot start camera");
                    return Vec::new();
                }
                self.generation += 1;
                self.state = CameraState::Starting;
                info!(generation = self.generation, "starting camera");
                vec![LifecycleEffect::Bind {
                    generation: self.generation,
                }]
            }
            (LifecycleRequest::Start, CameraState::Running) => {
                debug!("camera is already running");
                Vec::new()
            }
            (LifecycleRequest::Stop, CameraState::Running) => {
                info!(generation = self.generation, "stopping camera");
                self.state = CameraState::Stopping;
                vec![LifecycleEffect::Unbind {
                    generation: self.generation,
                }]
            }
            (LifecycleRequest::Stop, CameraState::Stopped) => {
                debug!("camera is already stopped");
                Vec::new()
            }
            (request, state) => {
                // Transitional states are intercepted by `request` before reaching here.
                self.queued.push_back(request);
                debug!(?request, state = state.as_str(), "deferring request");
                Vec::new()
            }
        }
    }

    fn drain(&mut self, service: ServiceState) -> Vec<LifecycleEffect> {
        let mut effects = Vec::new();
        while !self.state.is_transitioning() {
            let Some(request) = self.queued.pop_front() else {
                break;
            };
            effects.extend(self.apply(request, service));
        }
        effects
    }
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
