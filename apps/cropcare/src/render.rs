//! Plain-text rendering of session snapshots and UI events.

use client_core::{ServiceStatus, SessionSnapshot, SubmissionState, TreatmentState};

use crate::controller::events::{UiErrorContext, UiEvent};

pub fn render_status(status: &ServiceStatus) -> String {
    match status {
        ServiceStatus::Unknown => "service: unknown".to_string(),
        ServiceStatus::Checking => "service: checking...".to_string(),
        ServiceStatus::Available(message) => format!("service: online ({message})"),
        ServiceStatus::Unavailable(message) => format!("service: unavailable ({message})"),
    }
}

pub fn render_snapshot(snapshot: &SessionSnapshot) -> String {
    let mut lines = vec![render_status(&snapshot.service_status)];

    match &snapshot.selected_file {
        Some(file) => lines.push(format!(
            "image: {file} (preview {})",
            snapshot.preview_url.as_deref().unwrap_or("-")
        )),
        None => lines.push("image: none selected".to_string()),
    }

    if let Some(err) = &snapshot.validation_error {
        lines.push(format!("notice: {err}"));
    }

    match &snapshot.submission {
        SubmissionState::Idle => {}
        SubmissionState::Submitting => lines.push("diagnosis: analyzing...".to_string()),
        SubmissionState::Succeeded(diagnosis) => lines.push(format!(
            "diagnosis: {} ({:.1}% confidence)",
            diagnosis.disease_label, diagnosis.confidence_percent
        )),
        SubmissionState::Failed(err) => lines.push(format!("diagnosis failed: {err}")),
    }

    match &snapshot.treatment {
        TreatmentState::NotRequested => {}
        TreatmentState::Loading => lines.push("treatment: loading...".to_string()),
        TreatmentState::Available(text) => lines.push(format!("treatment: {text}")),
        TreatmentState::Failed(err) => lines.push(format!("treatment failed: {err}")),
    }

    lines.push(format!(
        "language: {} [{}] at {}",
        snapshot.language,
        snapshot.locale,
        snapshot.updated_at.format("%H:%M:%S")
    ));
    lines.join("\n")
}

pub fn render_event(event: &UiEvent) -> String {
    match event {
        UiEvent::Info(message) => format!("> {message}"),
        UiEvent::SessionChanged(snapshot) => render_snapshot(snapshot),
        UiEvent::Error(err) => {
            let context = match err.context() {
                UiErrorContext::BackendStartup => "startup",
                UiErrorContext::SelectImage => "select",
                UiErrorContext::Diagnose => "diagnose",
                UiErrorContext::General => "error",
            };
            format!("! {context} ({:?}): {}", err.category(), err.message())
        }
    }
}
