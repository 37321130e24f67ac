//! Gaze-driven scroll control: turns classified head pose into rate-limited scroll gestures
//! while managing the camera lifecycle and the user's settings.

pub mod actuator;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod lifecycle;
pub mod policy;

pub use actuator::{plan_stroke, ScrollActuator, StrokePlanError};
pub use classifier::{direction_for_pitch, ClassificationOutcome, ClassifiedFrame, ClassifierAdapter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ControlConfig;
pub use control::{ControlDependencies, ControlHandle, ControlService, SessionStats, StatusSnapshot};
pub use error::ControlError;
pub use lifecycle::{CameraLifecycle, LifecycleEffect, LifecycleRequest};
