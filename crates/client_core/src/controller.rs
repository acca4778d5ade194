//! Detection session controller: drives the three service calls against the
//! session without holding the session lock across a network await.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use shared::{
    domain::{Diagnosis, ImageFile},
    error::DetectionError,
    protocol::{non_empty, PredictResponse, TreatmentResponse},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    locale::DEFAULT_LOCALE,
    messages::{EnglishCatalog, MessageCatalog, MessageKey},
    preview::PreviewRegistry,
    service::{DetectionService, HealthReport, ServiceError},
    session::{Applied, ServiceStatus, Session, SessionSnapshot},
};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

pub struct DetectionController {
    service: Arc<dyn DetectionService>,
    messages: Arc<dyn MessageCatalog>,
    previews: PreviewRegistry,
    session: Mutex<Session>,
    initialized: AtomicBool,
    events: broadcast::Sender<SessionSnapshot>,
}

impl DetectionController {
    pub fn new(service: Arc<dyn DetectionService>) -> Arc<Self> {
        Self::new_with_dependencies(
            service,
            Arc::new(EnglishCatalog),
            PreviewRegistry::new(),
            DEFAULT_LOCALE,
        )
    }

    pub fn new_with_dependencies(
        service: Arc<dyn DetectionService>,
        messages: Arc<dyn MessageCatalog>,
        previews: PreviewRegistry,
        locale: impl Into<String>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Arc::new(Self {
            service,
            messages,
            previews,
            session: Mutex::new(Session::new(locale)),
            initialized: AtomicBool::new(false),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.events.subscribe()
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Session start: probes the service once. Later calls return `false`
    /// without touching the network.
    pub async fn initialize(&self) -> bool {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.check_service_status().await;
        true
    }

    pub async fn check_service_status(&self) {
        let ticket = {
            let mut session = self.session.lock().await;
            let Some(ticket) = session.begin_status_check() else {
                debug!("status check already in flight");
                return;
            };
            self.publish(&session);
            ticket
        };

        let result = self.service.check_health().await;
        let status = status_from_health(result, self.messages.as_ref());

        let mut session = self.session.lock().await;
        match session.apply_status(ticket, status) {
            Applied::Yes => self.publish(&session),
            Applied::Stale => debug!(epoch = ticket.epoch(), "dropped stale status result"),
        }
    }

    /// `None` models a picker that was dismissed without a file.
    pub async fn select_image(&self, image: Option<ImageFile>) {
        let Some(image) = image else {
            return;
        };
        let mut session = self.session.lock().await;
        info!(file = %image.file_name, bytes = image.bytes.len(), "image selected");
        session.select_image(image, &self.previews);
        self.publish(&session);
    }

    pub async fn select_image_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let image = load_image(path.as_ref()).await?;
        self.select_image(Some(image)).await;
        Ok(())
    }

    pub async fn clear_image(&self) {
        let mut session = self.session.lock().await;
        session.clear_image();
        self.publish(&session);
    }

    pub async fn set_locale(&self, locale: impl Into<String>) {
        let mut session = self.session.lock().await;
        session.set_locale(locale);
        self.publish(&session);
    }

    /// Returns the validation error when the precondition fails; otherwise
    /// whether the settled result was applied or dropped as stale.
    pub async fn submit_for_diagnosis(&self) -> Result<Applied, DetectionError> {
        let pending = {
            let mut session = self.session.lock().await;
            let pending = session.begin_submission(self.messages.as_ref());
            self.publish(&session);
            pending?
        };

        let result = self
            .service
            .predict(&pending.image, pending.language)
            .await;
        let outcome = diagnosis_from_prediction(result, self.messages.as_ref());
        if let Err(err) = &outcome {
            warn!(epoch = pending.ticket.epoch(), error = %err, "diagnosis failed");
        }

        let mut session = self.session.lock().await;
        let applied = session.apply_submission(pending.ticket, outcome);
        match applied {
            Applied::Yes => self.publish(&session),
            Applied::Stale => debug!(
                epoch = pending.ticket.epoch(),
                "dropped stale diagnosis result"
            ),
        }
        Ok(applied)
    }

    /// No-op (returns `None`) unless a diagnosis is present and no treatment
    /// request is outstanding.
    pub async fn request_treatment(&self) -> Option<Applied> {
        let pending = {
            let mut session = self.session.lock().await;
            let pending = session.begin_treatment()?;
            self.publish(&session);
            pending
        };

        let result = self.service.treatment_solution(&pending.request).await;
        let outcome = treatment_from_response(result, self.messages.as_ref());
        if let Err(err) = &outcome {
            warn!(epoch = pending.ticket.epoch(), error = %err, "treatment request failed");
        }

        let mut session = self.session.lock().await;
        let applied = session.apply_treatment(pending.ticket, outcome);
        match applied {
            Applied::Yes => self.publish(&session),
            Applied::Stale => debug!(
                epoch = pending.ticket.epoch(),
                "dropped stale treatment result"
            ),
        }
        Some(applied)
    }

    fn publish(&self, session: &Session) {
        // No subscribers is fine; the snapshot stays readable via `snapshot()`.
        let _ = self.events.send(session.snapshot());
    }
}

pub async fn load_image(path: &Path) -> Result<ImageFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image '{}'", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mime_type = mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string());
    Ok(ImageFile::new(file_name, mime_type, bytes))
}

pub fn status_from_health(
    result: Result<HealthReport, ServiceError>,
    messages: &dyn MessageCatalog,
) -> ServiceStatus {
    match result {
        Ok(report) if report.is_success() => {
            ServiceStatus::Available(messages.text(MessageKey::StatusSuccess))
        }
        Ok(report) => ServiceStatus::Unavailable(
            non_empty(report.body.message.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| messages.text(MessageKey::StatusGenericError)),
        ),
        Err(ServiceError::Status { status }) => {
            warn!(status, "health probe returned an unreadable error response");
            ServiceStatus::Unavailable(messages.text(MessageKey::StatusGenericError))
        }
        Err(err) => {
            warn!(error = %err, "health probe failed");
            ServiceStatus::Unavailable(messages.text(MessageKey::StatusFailed))
        }
    }
}

pub fn diagnosis_from_prediction(
    result: Result<PredictResponse, ServiceError>,
    messages: &dyn MessageCatalog,
) -> Result<Diagnosis, DetectionError> {
    let response = result.map_err(|err| {
        let status = match err {
            ServiceError::Status { status } => Some(status),
            _ => None,
        };
        DetectionError::request_failed(status, messages.text(MessageKey::PredictionError))
    })?;

    if let Some(message) = non_empty(response.error.as_deref()) {
        return Err(DetectionError::Application(message.to_string()));
    }

    match (response.disease, response.confidence) {
        (Some(disease), Some(confidence))
            if !disease.trim().is_empty() && (0.0..=100.0).contains(&confidence) =>
        {
            Ok(Diagnosis::new(disease, confidence))
        }
        _ => Err(DetectionError::request_failed(
            None,
            messages.text(MessageKey::PredictionIncomplete),
        )),
    }
}

pub fn treatment_from_response(
    result: Result<TreatmentResponse, ServiceError>,
    messages: &dyn MessageCatalog,
) -> Result<String, DetectionError> {
    let prefix = messages.text(MessageKey::TreatmentErrorPrefix);
    let response = result.map_err(|err| match err {
        ServiceError::Status { status } => {
            DetectionError::request_failed(Some(status), format!("{prefix}: {err}"))
        }
        other => DetectionError::Transport(format!("{prefix}: {other}")),
    })?;

    if let Some(message) = non_empty(response.error.as_deref()) {
        return Err(DetectionError::Application(message.to_string()));
    }

    response.treatment.ok_or_else(|| {
        DetectionError::request_failed(None, messages.text(MessageKey::TreatmentIncomplete))
    })
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
