use serde::{Deserialize, Serialize};

use crate::domain::LanguageName;

pub const HEALTH_PATH: &str = "api/test-ai";
pub const PREDICT_PATH: &str = "api/predict";
pub const TREATMENT_PATH: &str = "api/treatment-solution";

pub const HEALTH_STATUS_SUCCESS: &str = "success";

pub const PREDICT_IMAGE_FIELD: &str = "image";
pub const PREDICT_LANGUAGE_FIELD: &str = "language";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl HealthResponse {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(HEALTH_STATUS_SUCCESS)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentRequest {
    pub disease_name: String,
    pub language: LanguageName,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreatmentResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,
}

/// Empty error strings are treated as absent, matching how the service's web client reads them.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
