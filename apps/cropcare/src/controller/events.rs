//! Backend-to-UI events and error modeling for the interactive session.

use client_core::SessionSnapshot;
use shared::error::{DetectionError, ErrorKind};

pub enum UiEvent {
    Info(String),
    SessionChanged(SessionSnapshot),
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Validation,
    Service,
    Application,
    Transport,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    SelectImage,
    Diagnose,
    General,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_detection(context: UiErrorContext, err: &DetectionError) -> Self {
        let category = match err.kind() {
            ErrorKind::Validation => UiErrorCategory::Validation,
            ErrorKind::ServiceUnavailable | ErrorKind::RequestFailed => UiErrorCategory::Service,
            ErrorKind::Application => UiErrorCategory::Application,
            ErrorKind::Transport => UiErrorCategory::Transport,
        };
        Self {
            category,
            context,
            message: err.message().to_string(),
        }
    }

    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let category = if lower.contains("no such file")
            || lower.contains("not found")
            || lower.contains("invalid")
            || lower.contains("permission denied")
        {
            UiErrorCategory::Validation
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("dns")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_errors_map_to_categories() {
        let err = UiError::from_detection(
            UiErrorContext::Diagnose,
            &DetectionError::Application("unsupported image".into()),
        );
        assert_eq!(err.category(), UiErrorCategory::Application);
        assert_eq!(err.context(), UiErrorContext::Diagnose);
        assert_eq!(err.message(), "unsupported image");

        let err = UiError::from_detection(
            UiErrorContext::Diagnose,
            &DetectionError::request_failed(Some(502), "Error occurred during prediction"),
        );
        assert_eq!(err.category(), UiErrorCategory::Service);
    }

    #[test]
    fn free_text_errors_are_classified() {
        let err = UiError::from_message(
            UiErrorContext::SelectImage,
            "failed to read image 'x.png': No such file or directory (os error 2)",
        );
        assert_eq!(err.category(), UiErrorCategory::Validation);

        let err = UiError::from_message(UiErrorContext::General, "operation timed out");
        assert_eq!(err.category(), UiErrorCategory::Transport);

        let err = UiError::from_message(UiErrorContext::General, "something odd");
        assert_eq!(err.category(), UiErrorCategory::Unknown);
    }
}
