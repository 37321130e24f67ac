use serde::{Deserialize, Serialize};

use crate::{
    domain::{MAX_SKIP_DISTANCE, MIN_SKIP_DISTANCE},
    error::CommandError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Command {
    SetServiceEnabled { enabled: bool },
    ToggleService,
    ToggleCamera,
    StartCamera,
    StopCamera,
    UpdateDelay { delay_seconds: i64 },
    UpdateSkipDistance { multiplier: f32 },
    UpdateSensitivity { degrees: f32 },
}

impl Command {
    /// Parses and validates a command received from an external transport.
    pub fn from_json(raw: &str) -> Result<Self, CommandError> {
        let command: Command = serde_json::from_str(raw)?;
        command.validate()?;
        Ok(command)
    }

    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Self::UpdateSkipDistance { multiplier } if !multiplier.is_finite() => {
                Err(CommandError::InvalidValue {
                    field: "multiplier",
                    reason: format!("expected a number in [{MIN_SKIP_DISTANCE}, {MAX_SKIP_DISTANCE}]"),
                })
            }
            Self::UpdateSensitivity { degrees } if !degrees.is_finite() || *degrees < 0.0 => {
                Err(CommandError::InvalidValue {
                    field: "degrees",
                    reason: format!("sensitivity must be a non-negative angle, got {degrees}"),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetServiceEnabled { .. } => "set_service_enabled",
            Self::ToggleService => "toggle_service",
            Self::ToggleCamera => "toggle_camera",
            Self::StartCamera => "start_camera",
            Self::StopCamera => "stop_camera",
            Self::UpdateDelay { .. } => "update_delay",
            Self::UpdateSkipDistance { .. } => "update_skip_distance",
            Self::UpdateSensitivity { .. } => "update_sensitivity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notification {
    CameraStateChanged { running: bool },
}
