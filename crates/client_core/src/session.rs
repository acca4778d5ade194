//! Session state and its pure transitions.
//!
//! Every async category (status probe, diagnosis, treatment) carries an epoch.
//! `begin_*` hands out a ticket stamped with the current epoch, and `apply_*`
//! only lands a result whose ticket still matches. Selecting or clearing an
//! image bumps the diagnosis and treatment epochs, which is what keeps a late
//! response from overwriting newer state.
//!
//! The displayed state and the network are tracked apart: a cleared session
//! shows `Idle`, but the superseded request is still outstanding until its
//! `apply_*` runs, and no second request of that category starts before then.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::{Diagnosis, ImageFile, LanguageName},
    error::DetectionError,
    protocol::TreatmentRequest,
};

use crate::{
    locale::{language_name, DEFAULT_LOCALE},
    messages::{MessageCatalog, MessageKey},
    preview::{PreviewHandle, PreviewRegistry},
};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Checking,
    Available(String),
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting,
    Succeeded(Diagnosis),
    Failed(DetectionError),
}

impl SubmissionState {
    pub fn diagnosis(&self) -> Option<&Diagnosis> {
        match self {
            Self::Succeeded(diagnosis) => Some(diagnosis),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TreatmentState {
    #[default]
    NotRequested,
    Loading,
    Available(String),
    Failed(DetectionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreatmentTicket(u64);

macro_rules! ticket_epoch {
    ($name:ident) => {
        impl $name {
            pub fn epoch(self) -> u64 {
                self.0
            }
        }
    };
}

ticket_epoch!(StatusTicket);
ticket_epoch!(SubmissionTicket);
ticket_epoch!(TreatmentTicket);

/// Whether a completion was applied or dropped as stale.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Yes,
    Stale,
}

#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub ticket: SubmissionTicket,
    pub image: Arc<ImageFile>,
    pub language: LanguageName,
}

#[derive(Debug, Clone)]
pub struct PendingTreatment {
    pub ticket: TreatmentTicket,
    pub request: TreatmentRequest,
}

/// Render-ready copy of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub selected_file: Option<String>,
    pub preview_url: Option<String>,
    pub service_status: ServiceStatus,
    pub submission: SubmissionState,
    pub treatment: TreatmentState,
    pub validation_error: Option<DetectionError>,
    pub locale: String,
    pub language: LanguageName,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Session {
    selected_image: Option<Arc<ImageFile>>,
    preview: Option<PreviewHandle>,
    service_status: ServiceStatus,
    submission: SubmissionState,
    treatment: TreatmentState,
    validation_error: Option<DetectionError>,
    locale: String,
    status_epoch: u64,
    submission_epoch: u64,
    treatment_epoch: u64,
    submission_in_flight: Option<u64>,
    treatment_in_flight: Option<u64>,
    updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_LOCALE)
    }
}

impl Session {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            selected_image: None,
            preview: None,
            service_status: ServiceStatus::Unknown,
            submission: SubmissionState::Idle,
            treatment: TreatmentState::NotRequested,
            validation_error: None,
            locale: locale.into(),
            status_epoch: 0,
            submission_epoch: 0,
            treatment_epoch: 0,
            submission_in_flight: None,
            treatment_in_flight: None,
            updated_at: Utc::now(),
        }
    }

    pub fn selected_image(&self) -> Option<&ImageFile> {
        self.selected_image.as_deref()
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.preview.as_ref().map(PreviewHandle::url)
    }

    pub fn service_status(&self) -> &ServiceStatus {
        &self.service_status
    }

    pub fn submission(&self) -> &SubmissionState {
        &self.submission
    }

    pub fn treatment(&self) -> &TreatmentState {
        &self.treatment
    }

    pub fn validation_error(&self) -> Option<&DetectionError> {
        self.validation_error.as_ref()
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn language(&self) -> LanguageName {
        language_name(&self.locale)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            selected_file: self
                .selected_image
                .as_ref()
                .map(|image| image.file_name.clone()),
            preview_url: self.preview_url().map(str::to_string),
            service_status: self.service_status.clone(),
            submission: self.submission.clone(),
            treatment: self.treatment.clone(),
            validation_error: self.validation_error.clone(),
            locale: self.locale.clone(),
            language: self.language(),
            updated_at: self.updated_at,
        }
    }

    pub fn submission_in_flight(&self) -> bool {
        self.submission_in_flight.is_some()
    }

    pub fn treatment_in_flight(&self) -> bool {
        self.treatment_in_flight.is_some()
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = locale.into();
        self.touch();
    }

    /// Returns `None` while a probe is already in flight.
    pub fn begin_status_check(&mut self) -> Option<StatusTicket> {
        if self.service_status == ServiceStatus::Checking {
            return None;
        }
        self.status_epoch += 1;
        self.service_status = ServiceStatus::Checking;
        self.touch();
        Some(StatusTicket(self.status_epoch))
    }

    pub fn apply_status(&mut self, ticket: StatusTicket, status: ServiceStatus) -> Applied {
        if ticket.0 != self.status_epoch || self.service_status != ServiceStatus::Checking {
            return Applied::Stale;
        }
        self.service_status = status;
        self.touch();
        Applied::Yes
    }

    /// Replaces the image. The previous preview is released before the new one
    /// is created.
    pub fn select_image(&mut self, image: ImageFile, previews: &PreviewRegistry) {
        self.preview = None;
        self.preview = Some(previews.create(&image));
        self.selected_image = Some(Arc::new(image));
        self.reset_results();
    }

    pub fn clear_image(&mut self) {
        self.preview = None;
        self.selected_image = None;
        self.reset_results();
    }

    fn reset_results(&mut self) {
        self.submission = SubmissionState::Idle;
        self.treatment = TreatmentState::NotRequested;
        self.validation_error = None;
        self.submission_epoch += 1;
        self.treatment_epoch += 1;
        self.touch();
    }

    /// Fails with a validation error, recorded on the session, when no image
    /// is selected or a predict request is still outstanding, including one
    /// whose image has since been cleared or replaced.
    pub fn begin_submission(
        &mut self,
        messages: &dyn MessageCatalog,
    ) -> Result<PendingSubmission, DetectionError> {
        let image = match &self.selected_image {
            None => Err(DetectionError::Validation(
                messages.text(MessageKey::NoImageSelected),
            )),
            Some(_) if self.submission_in_flight.is_some() => Err(DetectionError::Validation(
                messages.text(MessageKey::SubmissionInProgress),
            )),
            Some(image) => Ok(Arc::clone(image)),
        };
        let image = match image {
            Ok(image) => image,
            Err(err) => {
                self.validation_error = Some(err.clone());
                self.touch();
                return Err(err);
            }
        };

        self.submission_epoch += 1;
        self.treatment_epoch += 1;
        self.submission_in_flight = Some(self.submission_epoch);
        self.submission = SubmissionState::Submitting;
        self.treatment = TreatmentState::NotRequested;
        self.validation_error = None;
        self.touch();

        Ok(PendingSubmission {
            ticket: SubmissionTicket(self.submission_epoch),
            image,
            language: self.language(),
        })
    }

    pub fn apply_submission(
        &mut self,
        ticket: SubmissionTicket,
        outcome: Result<Diagnosis, DetectionError>,
    ) -> Applied {
        if self.submission_in_flight == Some(ticket.0) {
            self.submission_in_flight = None;
        }
        if ticket.0 != self.submission_epoch || self.submission != SubmissionState::Submitting {
            return Applied::Stale;
        }
        self.submission = match outcome {
            Ok(diagnosis) => SubmissionState::Succeeded(diagnosis),
            Err(err) => SubmissionState::Failed(err),
        };
        self.validation_error = None;
        self.touch();
        Applied::Yes
    }

    /// Returns `None` unless a diagnosis is present and no treatment request
    /// is outstanding.
    pub fn begin_treatment(&mut self) -> Option<PendingTreatment> {
        if self.treatment_in_flight.is_some() {
            return None;
        }
        let disease_name = self.submission.diagnosis()?.disease_label.clone();

        self.treatment_epoch += 1;
        self.treatment_in_flight = Some(self.treatment_epoch);
        self.treatment = TreatmentState::Loading;
        self.touch();

        Some(PendingTreatment {
            ticket: TreatmentTicket(self.treatment_epoch),
            request: TreatmentRequest {
                disease_name,
                language: self.language(),
            },
        })
    }

    pub fn apply_treatment(
        &mut self,
        ticket: TreatmentTicket,
        outcome: Result<String, DetectionError>,
    ) -> Applied {
        if self.treatment_in_flight == Some(ticket.0) {
            self.treatment_in_flight = None;
        }
        if ticket.0 != self.treatment_epoch
            || self.treatment != TreatmentState::Loading
            || self.submission.diagnosis().is_none()
        {
            return Applied::Stale;
        }
        self.treatment = match outcome {
            Ok(text) => TreatmentState::Available(text),
            Err(err) => TreatmentState::Failed(err),
        };
        self.touch();
        Applied::Yes
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
