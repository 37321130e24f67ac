//! Turns scroll commands into single-stroke gestures against the external actuator.

use std::{sync::Arc, time::Duration};

use device_integration::{
    DispatchResult, GestureActuator, GestureOutcome, ScreenPoint, StrokeGesture,
};
use shared::domain::{ScreenSize, ScrollCommand};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error};

const START_FRACTION: f32 = 0.5;
const MIN_END_FRACTION: f32 = 0.1;
const MAX_END_FRACTION: f32 = 0.9;
const MIN_DISPLACEMENT_PX: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum StrokePlanError {
    #[error("invalid screen size {width}x{height}")]
    InvalidScreen { width: u32, height: u32 },
    #[error("scroll distance too small ({displacement:.2}px)")]
    TooSmall { displacement: f32 },
}

/// Builds the vertical stroke for `command`, starting mid-screen and clamped to the central
/// 10%-90% band.
pub fn plan_stroke(
    command: &ScrollCommand,
    screen: ScreenSize,
) -> Result<StrokeGesture, StrokePlanError> {
    if !screen.is_valid() {
        return Err(StrokePlanError::InvalidScreen {
            width: screen.width,
            height: screen.height,
        });
    }

    let height = screen.height as f32;
    let x = screen.width as f32 / 2.0;
    let start_y = height * START_FRACTION;
    let distance = height * command.distance_fraction;
    let end_y = (start_y + command.direction.sign() * distance)
        .clamp(height * MIN_END_FRACTION, height * MAX_END_FRACTION);

    let displacement = end_y - start_y;
    if displacement.abs() < MIN_DISPLACEMENT_PX {
        return Err(StrokePlanError::TooSmall { displacement });
    }

    Ok(StrokeGesture {
        start: ScreenPoint { x, y: start_y },
        end: ScreenPoint { x, y: end_y },
        duration: Duration::from_millis(u64::from(command.duration_ms)),
    })
}

pub struct ScrollActuator {
    actuator: Arc<dyn GestureActuator>,
}

impl ScrollActuator {
    pub fn new(actuator: Arc<dyn GestureActuator>) -> Self {
        Self { actuator }
    }

    pub fn screen_size(&self) -> ScreenSize {
        self.actuator.screen_size()
    }

    pub fn plan(&self, command: &ScrollCommand) -> Result<StrokeGesture, StrokePlanError> {
        plan_stroke(command, self.screen_size())
    }

    /// Hands the stroke to the actuator. Never retries; a rejection is only logged.
    pub fn dispatch(
        &self,
        stroke: StrokeGesture,
        completion: oneshot::Sender<GestureOutcome>,
    ) -> DispatchResult {
        let result = self.actuator.dispatch(stroke, completion);
        match result {
            DispatchResult::Accepted => debug!(
                displacement = stroke.displacement(),
                duration_ms = stroke.duration.as_millis() as u64,
                "scroll gesture dispatched"
            ),
            DispatchResult::Rejected => error!(
                displacement = stroke.displacement(),
                "actuator declined scroll gesture"
            ),
        }
        result
    }
}

#[cfg(test)]
#[path = "tests/actuator_tests.rs"]
mod tests;
