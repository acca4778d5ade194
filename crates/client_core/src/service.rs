//! Network contracts of the inference service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{
    domain::{ImageFile, LanguageName},
    protocol::{
        HealthResponse, PredictResponse, TreatmentRequest, TreatmentResponse, HEALTH_PATH,
        PREDICT_IMAGE_FIELD, PREDICT_LANGUAGE_FIELD, PREDICT_PATH, TREATMENT_PATH,
    },
};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service responded with HTTP {status}")]
    Status { status: u16 },
    #[error("malformed response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Health probe outcome. The body is decoded even for non-2xx responses.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub http_status: u16,
    pub body: HealthResponse,
}

impl HealthReport {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status) && self.body.is_success()
    }
}

#[async_trait]
pub trait DetectionService: Send + Sync {
    async fn check_health(&self) -> Result<HealthReport, ServiceError>;
    async fn predict(
        &self,
        image: &ImageFile,
        language: LanguageName,
    ) -> Result<PredictResponse, ServiceError>;
    async fn treatment_solution(
        &self,
        request: &TreatmentRequest,
    ) -> Result<TreatmentResponse, ServiceError>;
}

pub struct HttpDetectionService {
    http: Client,
    health_url: Url,
    predict_url: Url,
    treatment_url: Url,
}

impl HttpDetectionService {
    /// `base_url` should end with `/` so the endpoint paths join beneath it.
    pub fn new(base_url: &Url, timeout: Option<Duration>) -> Result<Self, ServiceError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| ServiceError::Transport(err.to_string()))?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: Client, base_url: &Url) -> Result<Self, ServiceError> {
        let join = |path: &str| {
            base_url
                .join(path)
                .map_err(|err| ServiceError::Transport(format!("invalid endpoint {path}: {err}")))
        };
        Ok(Self {
            health_url: join(HEALTH_PATH)?,
            predict_url: join(PREDICT_PATH)?,
            treatment_url: join(TREATMENT_PATH)?,
            http,
        })
    }
}

#[async_trait]
impl DetectionService for HttpDetectionService {
    async fn check_health(&self) -> Result<HealthReport, ServiceError> {
        let response = self.http.get(self.health_url.clone()).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        match serde_json::from_slice::<HealthResponse>(&bytes) {
            Ok(body) => Ok(HealthReport {
                http_status: status.as_u16(),
                body,
            }),
            Err(_) if !status.is_success() => Err(ServiceError::Status {
                status: status.as_u16(),
            }),
            Err(err) => Err(ServiceError::Decode(err.to_string())),
        }
    }

    async fn predict(
        &self,
        image: &ImageFile,
        language: LanguageName,
    ) -> Result<PredictResponse, ServiceError> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(image.mime_or_default())?;
        let form = Form::new()
            .part(PREDICT_IMAGE_FIELD, part)
            .text(PREDICT_LANGUAGE_FIELD, language.as_str());

        info!(
            file = %image.file_name,
            bytes = image.bytes.len(),
            %language,
            "submitting image for diagnosis"
        );
        let response = self
            .http
            .post(self.predict_url.clone())
            .multipart(form)
            .send()
            .await?;
        decode_json(response).await
    }

    async fn treatment_solution(
        &self,
        request: &TreatmentRequest,
    ) -> Result<TreatmentResponse, ServiceError> {
        info!(
            disease = %request.disease_name,
            language = %request.language,
            "requesting treatment solution"
        );
        let response = self
            .http
            .post(self.treatment_url.clone())
            .json(request)
            .send()
            .await?;
        decode_json(response).await
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        warn!(status = status.as_u16(), url = %response.url(), "service request failed");
        return Err(ServiceError::Status {
            status: status.as_u16(),
        });
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| ServiceError::Decode(err.to_string()))
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
