//! User-visible generic texts. Server-provided error strings bypass this catalog.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    StatusSuccess,
    StatusGenericError,
    StatusFailed,
    NoImageSelected,
    SubmissionInProgress,
    PredictionError,
    PredictionIncomplete,
    TreatmentErrorPrefix,
    TreatmentIncomplete,
}

pub trait MessageCatalog: Send + Sync {
    fn text(&self, key: MessageKey) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishCatalog;

impl MessageCatalog for EnglishCatalog {
    fn text(&self, key: MessageKey) -> String {
        match key {
            MessageKey::StatusSuccess => "AI service is online and ready",
            MessageKey::StatusGenericError => "AI service reported a problem",
            MessageKey::StatusFailed => "Could not reach the AI service",
            MessageKey::NoImageSelected => "Please select an image first",
            MessageKey::SubmissionInProgress => "An analysis is already in progress",
            MessageKey::PredictionError => "Error occurred during prediction",
            MessageKey::PredictionIncomplete => "The service returned an incomplete prediction",
            MessageKey::TreatmentErrorPrefix => "Error",
            MessageKey::TreatmentIncomplete => "The service returned no treatment",
        }
        .to_string()
    }
}
