use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    ServiceUnavailable,
    RequestFailed,
    Application,
    Transport,
}

/// User-visible failures of a detection session. Each one is terminal only for
/// its own async category.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    /// Reported locally, never sent over the network.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    /// Non-2xx or otherwise unusable response; carries a generic message.
    #[error("{message}")]
    RequestFailed {
        status: Option<u16>,
        message: String,
    },
    /// 2xx response with an explicit `error` field, surfaced verbatim.
    #[error("{0}")]
    Application(String),
    #[error("{0}")]
    Transport(String),
}

impl DetectionError {
    pub fn request_failed(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::RequestFailed { .. } => ErrorKind::RequestFailed,
            Self::Application(_) => ErrorKind::Application,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message)
            | Self::ServiceUnavailable(message)
            | Self::Application(message)
            | Self::Transport(message) => message,
            Self::RequestFailed { message, .. } => message,
        }
    }
}
