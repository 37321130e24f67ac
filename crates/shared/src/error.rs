use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Malformed,
    Validation,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl CommandFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Rejection of a command at the surface boundary, before it reaches the control loop.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed command payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl CommandError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed(_) => ErrorCode::Malformed,
            Self::InvalidValue { .. } => ErrorCode::Validation,
        }
    }
}

impl From<CommandError> for CommandFailure {
    fn from(value: CommandError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}
