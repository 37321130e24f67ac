use std::time::Instant;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DELAY_SECONDS: u32 = 1;
pub const DEFAULT_SKIP_DISTANCE: f32 = 0.09;
pub const MIN_SKIP_DISTANCE: f32 = 0.03;
pub const MAX_SKIP_DISTANCE: f32 = 0.15;
pub const DEFAULT_SENSITIVITY_DEGREES: f32 = 10.0;

/// Classified head pose for a single processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeDirection {
    Up,
    Down,
    Center,
}

impl GazeDirection {
    pub fn scroll_direction(self) -> Option<ScrollDirection> {
        match self {
            Self::Up => Some(ScrollDirection::Up),
            Self::Down => Some(ScrollDirection::Down),
            Self::Center => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GazeSample {
    pub direction: GazeDirection,
    pub timestamp: Instant,
}

impl GazeSample {
    pub fn new(direction: GazeDirection, timestamp: Instant) -> Self {
        Self {
            direction,
            timestamp,
        }
    }

    /// Fail-safe sample used when classification fails or finds no face.
    pub fn center(timestamp: Instant) -> Self {
        Self::new(GazeDirection::Center, timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    /// Sign of the Y displacement in screen space (Y grows downwards).
    pub fn sign(self) -> f32 {
        match self {
            Self::Up => -1.0,
            Self::Down => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "seconds", rename_all = "snake_case")]
pub enum ScrollMode {
    Continuous,
    Skip,
    Delayed(u32),
}

impl ScrollMode {
    /// Maps the user-facing delay value onto a mode. Negative input is coerced to zero.
    pub fn from_delay_seconds(delay_seconds: i64) -> Self {
        match delay_seconds.max(0) {
            0 => Self::Continuous,
            1 => Self::Skip,
            seconds => Self::Delayed(u32::try_from(seconds).unwrap_or(u32::MAX)),
        }
    }

    pub fn delay_seconds(self) -> u32 {
        match self {
            Self::Continuous => 0,
            Self::Skip => 1,
            Self::Delayed(seconds) => seconds,
        }
    }
}

impl Default for ScrollMode {
    fn default() -> Self {
        Self::from_delay_seconds(i64::from(DEFAULT_DELAY_SECONDS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Disabled,
    Enabled,
}

impl ServiceState {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }

    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl CameraState {
    pub fn is_transitioning(self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

/// Discrete scroll request produced by the throttle policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollCommand {
    pub direction: ScrollDirection,
    pub distance_fraction: f32,
    pub duration_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// User-adjustable scroll parameters owned by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollSettings {
    pub mode: ScrollMode,
    pub skip_distance: f32,
    pub sensitivity_degrees: f32,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            mode: ScrollMode::default(),
            skip_distance: DEFAULT_SKIP_DISTANCE,
            sensitivity_degrees: DEFAULT_SENSITIVITY_DEGREES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_seconds_map_to_modes() {
        assert_eq!(ScrollMode::from_delay_seconds(0), ScrollMode::Continuous);
        assert_eq!(ScrollMode::from_delay_seconds(1), ScrollMode::Skip);
        assert_eq!(ScrollMode::from_delay_seconds(4), ScrollMode::Delayed(4));
    }

    #[test]
    fn negative_delay_is_coerced_to_continuous() {
        assert_eq!(ScrollMode::from_delay_seconds(-3), ScrollMode::Continuous);
    }

    #[test]
    fn default_settings_use_skip_mode() {
        let settings = ScrollSettings::default();
        assert_eq!(settings.mode, ScrollMode::Skip);
        assert_eq!(settings.skip_distance, DEFAULT_SKIP_DISTANCE);
        assert_eq!(settings.sensitivity_degrees, DEFAULT_SENSITIVITY_DEGREES);
    }

    #[test]
    fn center_has_no_scroll_direction() {
        assert_eq!(GazeDirection::Center.scroll_direction(), None);
        assert_eq!(GazeDirection::Up.scroll_direction(), Some(ScrollDirection::Up));
        assert_eq!(ScrollDirection::Up.sign(), -1.0);
    }
}
