use shared::error::{CommandError, CommandFailure, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("command rejected: {0}")]
    InvalidCommand(#[from] CommandError),
    #[error("control loop is not running")]
    LoopClosed,
    #[error("control queue is full")]
    QueueFull,
}

impl ControlError {
    /// Wire-facing form of the rejection.
    pub fn failure(&self) -> CommandFailure {
        match self {
            Self::InvalidCommand(error) => CommandFailure::new(error.code(), error.to_string()),
            Self::LoopClosed | Self::QueueFull => {
                CommandFailure::new(ErrorCode::Unavailable, self.to_string())
            }
        }
    }
}
