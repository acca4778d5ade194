use super::*;
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use shared::{
    domain::LanguageName,
    protocol::{HealthResponse, TreatmentRequest},
};
use tokio::sync::oneshot;

use crate::session::{SubmissionState, TreatmentState};

enum Reply<T> {
    Now(Result<T, ServiceError>),
    Gated(oneshot::Receiver<Result<T, ServiceError>>),
}

impl<T> Reply<T> {
    async fn resolve(self) -> Result<T, ServiceError> {
        match self {
            Self::Now(result) => result,
            Self::Gated(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ServiceError::Transport("gate dropped".into()))),
        }
    }
}

#[derive(Default)]
struct ScriptedService {
    health: Mutex<VecDeque<Reply<HealthReport>>>,
    predictions: Mutex<VecDeque<Reply<PredictResponse>>>,
    treatments: Mutex<VecDeque<Reply<TreatmentResponse>>>,
    health_calls: AtomicUsize,
    predict_calls: Mutex<Vec<(String, LanguageName)>>,
    treatment_calls: Mutex<Vec<TreatmentRequest>>,
}

impl ScriptedService {
    async fn push_health(&self, reply: Reply<HealthReport>) {
        self.health.lock().await.push_back(reply);
    }

    async fn push_prediction(&self, reply: Reply<PredictResponse>) {
        self.predictions.lock().await.push_back(reply);
    }

    async fn push_treatment(&self, reply: Reply<TreatmentResponse>) {
        self.treatments.lock().await.push_back(reply);
    }

    async fn gate_prediction(&self) -> oneshot::Sender<Result<PredictResponse, ServiceError>> {
        let (tx, rx) = oneshot::channel();
        self.push_prediction(Reply::Gated(rx)).await;
        tx
    }

    async fn gate_treatment(&self) -> oneshot::Sender<Result<TreatmentResponse, ServiceError>> {
        let (tx, rx) = oneshot::channel();
        self.push_treatment(Reply::Gated(rx)).await;
        tx
    }
}

#[async_trait]
impl DetectionService for ScriptedService {
    async fn check_health(&self) -> Result<HealthReport, ServiceError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.health.lock().await.pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(ServiceError::Transport("no scripted health reply".into())),
        }
    }

    async fn predict(
        &self,
        image: &ImageFile,
        language: LanguageName,
    ) -> Result<PredictResponse, ServiceError> {
        self.predict_calls
            .lock()
            .await
            .push((image.file_name.clone(), language));
        let reply = self.predictions.lock().await.pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(ServiceError::Transport("no scripted prediction".into())),
        }
    }

    async fn treatment_solution(
        &self,
        request: &TreatmentRequest,
    ) -> Result<TreatmentResponse, ServiceError> {
        self.treatment_calls.lock().await.push(request.clone());
        let reply = self.treatments.lock().await.pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(ServiceError::Transport("no scripted treatment".into())),
        }
    }
}

fn healthy() -> Reply<HealthReport> {
    Reply::Now(Ok(HealthReport {
        http_status: 200,
        body: HealthResponse {
            status: Some("success".into()),
            message: None,
        },
    }))
}

fn leaf_blight() -> Reply<PredictResponse> {
    Reply::Now(Ok(PredictResponse {
        error: None,
        disease: Some("Leaf Blight".into()),
        confidence: Some(92.5),
    }))
}

fn image(name: &str) -> Option<ImageFile> {
    Some(ImageFile::new(name, Some("image/png".into()), vec![1, 2, 3]))
}

fn controller_with(service: &Arc<ScriptedService>, locale: &str) -> Arc<DetectionController> {
    DetectionController::new_with_dependencies(
        service.clone(),
        Arc::new(EnglishCatalog),
        PreviewRegistry::new(),
        locale,
    )
}

async fn wait_for_predict_calls(service: &ScriptedService, count: usize) {
    for _ in 0..1_000 {
        if service.predict_calls.lock().await.len() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("predict was not called {count} time(s)");
}

async fn wait_for_treatment_calls(service: &ScriptedService, count: usize) {
    for _ in 0..1_000 {
        if service.treatment_calls.lock().await.len() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("treatment was not called {count} time(s)");
}

#[tokio::test]
async fn initialize_marks_service_available() {
    let service = Arc::new(ScriptedService::default());
    service.push_health(healthy()).await;
    let controller = DetectionController::new(service.clone());

    assert!(controller.initialize().await);
    assert_eq!(
        controller.snapshot().await.service_status,
        ServiceStatus::Available(EnglishCatalog.text(MessageKey::StatusSuccess))
    );
}

#[tokio::test]
async fn initialize_runs_probe_only_once() {
    let service = Arc::new(ScriptedService::default());
    service.push_health(healthy()).await;
    let controller = controller_with(&service, "en");

    assert!(controller.initialize().await);
    assert!(!controller.initialize().await);
    assert_eq!(service.health_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_probe_marks_service_unavailable_with_generic_message() {
    let service = Arc::new(ScriptedService::default());
    service
        .push_health(Reply::Now(Err(ServiceError::Transport(
            "connection refused".into(),
        ))))
        .await;
    let controller = controller_with(&service, "en");

    controller.check_service_status().await;
    assert_eq!(
        controller.snapshot().await.service_status,
        ServiceStatus::Unavailable(EnglishCatalog.text(MessageKey::StatusFailed))
    );
}

#[tokio::test]
async fn status_check_publishes_checking_then_result() {
    let service = Arc::new(ScriptedService::default());
    let (tx, rx) = oneshot::channel();
    service.push_health(Reply::Gated(rx)).await;
    let controller = controller_with(&service, "en");
    let mut events = controller.subscribe();

    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.check_service_status().await }
    });

    let first = events.recv().await.expect("checking snapshot");
    assert_eq!(first.service_status, ServiceStatus::Checking);

    // A second probe while one is outstanding is a no-op.
    controller.check_service_status().await;

    tx.send(Ok(HealthReport {
        http_status: 200,
        body: HealthResponse {
            status: Some("degraded".into()),
            message: Some("GPU offline".into()),
        },
    }))
    .expect("deliver health");
    task.await.expect("join");

    let second = events.recv().await.expect("result snapshot");
    assert_eq!(
        second.service_status,
        ServiceStatus::Unavailable("GPU offline".into())
    );
    assert_eq!(service.health_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn submit_without_image_never_calls_network() {
    let service = Arc::new(ScriptedService::default());
    let controller = controller_with(&service, "en");

    let err = controller
        .submit_for_diagnosis()
        .await
        .expect_err("validation error");
    assert!(matches!(err, DetectionError::Validation(_)));
    assert!(service.predict_calls.lock().await.is_empty());

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.submission, SubmissionState::Idle);
    assert_eq!(snapshot.validation_error, Some(err));
}

#[tokio::test]
async fn select_none_leaves_state_unchanged() {
    let service = Arc::new(ScriptedService::default());
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;
    let before = controller.snapshot().await;

    controller.select_image(None).await;
    let after = controller.snapshot().await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn successful_submission_yields_diagnosis() {
    let service = Arc::new(ScriptedService::default());
    service.push_prediction(leaf_blight()).await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;

    let applied = controller.submit_for_diagnosis().await.expect("submitted");
    assert_eq!(applied, Applied::Yes);
    assert_eq!(
        controller.snapshot().await.submission,
        SubmissionState::Succeeded(Diagnosis::new("Leaf Blight", 92.5))
    );
    assert_eq!(
        service.predict_calls.lock().await.as_slice(),
        &[("leaf.png".to_string(), LanguageName::English)]
    );
}

#[tokio::test]
async fn application_error_is_surfaced_verbatim() {
    let service = Arc::new(ScriptedService::default());
    service
        .push_prediction(Reply::Now(Ok(PredictResponse {
            error: Some("unsupported image".into()),
            disease: None,
            confidence: None,
        })))
        .await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;

    let _ = controller.submit_for_diagnosis().await.expect("submitted");
    assert_eq!(
        controller.snapshot().await.submission,
        SubmissionState::Failed(DetectionError::Application("unsupported image".into()))
    );
}

#[tokio::test]
async fn every_settled_submission_is_succeeded_or_failed() {
    let replies = vec![
        leaf_blight(),
        Reply::Now(Err(ServiceError::Status { status: 500 })),
        Reply::Now(Err(ServiceError::Transport("reset".into()))),
        Reply::Now(Err(ServiceError::Decode("eof".into()))),
        Reply::Now(Ok(PredictResponse::default())),
        Reply::Now(Ok(PredictResponse {
            error: Some("blurry".into()),
            disease: None,
            confidence: None,
        })),
    ];

    for reply in replies {
        let service = Arc::new(ScriptedService::default());
        service.push_prediction(reply).await;
        let controller = controller_with(&service, "en");
        controller.select_image(image("leaf.png")).await;

        let _ = controller.submit_for_diagnosis().await.expect("submitted");
        let submission = controller.snapshot().await.submission;
        assert!(
            matches!(
                submission,
                SubmissionState::Succeeded(_) | SubmissionState::Failed(_)
            ),
            "left in {submission:?}"
        );
    }
}

#[tokio::test]
async fn late_diagnosis_after_clear_is_suppressed() {
    let service = Arc::new(ScriptedService::default());
    let gate = service.gate_prediction().await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;

    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit_for_diagnosis().await }
    });
    wait_for_predict_calls(&service, 1).await;
    assert_eq!(
        controller.snapshot().await.submission,
        SubmissionState::Submitting
    );

    controller.clear_image().await;
    gate.send(Ok(PredictResponse {
        error: None,
        disease: Some("Leaf Blight".into()),
        confidence: Some(92.5),
    }))
    .expect("deliver prediction");

    let applied = task.await.expect("join").expect("submitted");
    assert_eq!(applied, Applied::Stale);
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.submission, SubmissionState::Idle);
    assert!(snapshot.preview_url.is_none());
}

#[tokio::test]
async fn late_diagnosis_for_replaced_image_is_suppressed() {
    let service = Arc::new(ScriptedService::default());
    let gate = service.gate_prediction().await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("first.png")).await;

    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit_for_diagnosis().await }
    });
    wait_for_predict_calls(&service, 1).await;

    controller.select_image(image("second.png")).await;
    gate.send(Ok(PredictResponse {
        error: None,
        disease: Some("Old Result".into()),
        confidence: Some(10.0),
    }))
    .expect("deliver prediction");

    assert_eq!(task.await.expect("join").expect("submitted"), Applied::Stale);
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.selected_file.as_deref(), Some("second.png"));
    assert_eq!(snapshot.submission, SubmissionState::Idle);
    assert_eq!(controller.previews().live_count(), 1);
}

#[tokio::test]
async fn second_submit_while_submitting_is_rejected_locally() {
    let service = Arc::new(ScriptedService::default());
    let gate = service.gate_prediction().await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;

    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit_for_diagnosis().await }
    });
    wait_for_predict_calls(&service, 1).await;

    let err = controller
        .submit_for_diagnosis()
        .await
        .expect_err("in progress");
    assert!(matches!(err, DetectionError::Validation(_)));

    gate.send(Err(ServiceError::Status { status: 503 }))
        .expect("deliver prediction");
    assert_eq!(task.await.expect("join").expect("submitted"), Applied::Yes);
    assert_eq!(service.predict_calls.lock().await.len(), 1);
    assert!(matches!(
        controller.snapshot().await.submission,
        SubmissionState::Failed(DetectionError::RequestFailed {
            status: Some(503),
            ..
        })
    ));
}

#[tokio::test]
async fn resubmit_after_replacing_image_waits_for_outstanding_predict() {
    let service = Arc::new(ScriptedService::default());
    let gate = service.gate_prediction().await;
    service.push_prediction(leaf_blight()).await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("first.png")).await;

    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit_for_diagnosis().await }
    });
    wait_for_predict_calls(&service, 1).await;

    controller.clear_image().await;
    controller.select_image(image("second.png")).await;
    let err = controller
        .submit_for_diagnosis()
        .await
        .expect_err("first predict still outstanding");
    assert!(matches!(err, DetectionError::Validation(_)));
    assert_eq!(service.predict_calls.lock().await.len(), 1);

    gate.send(Ok(PredictResponse {
        error: None,
        disease: Some("Old Result".into()),
        confidence: Some(10.0),
    }))
    .expect("deliver prediction");
    assert_eq!(task.await.expect("join").expect("submitted"), Applied::Stale);

    assert_eq!(
        controller.submit_for_diagnosis().await.expect("submitted"),
        Applied::Yes
    );
    let calls = service.predict_calls.lock().await.clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].0, "second.png");
    assert_eq!(
        controller.snapshot().await.submission,
        SubmissionState::Succeeded(Diagnosis::new("Leaf Blight", 92.5))
    );
}

#[tokio::test]
async fn treatment_after_resubmit_waits_for_outstanding_treatment() {
    let service = Arc::new(ScriptedService::default());
    service.push_prediction(leaf_blight()).await;
    service.push_prediction(leaf_blight()).await;
    let gate = service.gate_treatment().await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;
    let _ = controller.submit_for_diagnosis().await.expect("submitted");

    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.request_treatment().await }
    });
    wait_for_treatment_calls(&service, 1).await;

    controller.clear_image().await;
    controller.select_image(image("leaf.png")).await;
    let _ = controller.submit_for_diagnosis().await.expect("resubmitted");
    assert!(controller.request_treatment().await.is_none());
    assert_eq!(service.treatment_calls.lock().await.len(), 1);

    gate.send(Ok(TreatmentResponse {
        error: None,
        treatment: Some("late advice".into()),
    }))
    .expect("deliver treatment");
    assert_eq!(task.await.expect("join"), Some(Applied::Stale));
    assert_eq!(
        controller.snapshot().await.treatment,
        TreatmentState::NotRequested
    );
}

#[tokio::test]
async fn treatment_is_noop_without_diagnosis() {
    let service = Arc::new(ScriptedService::default());
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;

    assert!(controller.request_treatment().await.is_none());
    assert!(service.treatment_calls.lock().await.is_empty());
    assert_eq!(
        controller.snapshot().await.treatment,
        TreatmentState::NotRequested
    );
}

#[tokio::test]
async fn treatment_uses_diagnosis_and_resolved_language() {
    let service = Arc::new(ScriptedService::default());
    service.push_prediction(leaf_blight()).await;
    service
        .push_treatment(Reply::Now(Ok(TreatmentResponse {
            error: None,
            treatment: Some("Remove infected leaves".into()),
        })))
        .await;
    let controller = controller_with(&service, "hi");
    controller.select_image(image("leaf.png")).await;
    let _ = controller.submit_for_diagnosis().await.expect("submitted");

    assert_eq!(controller.request_treatment().await, Some(Applied::Yes));
    assert_eq!(
        service.treatment_calls.lock().await.as_slice(),
        &[TreatmentRequest {
            disease_name: "Leaf Blight".into(),
            language: LanguageName::Hindi,
        }]
    );
    assert_eq!(
        controller.snapshot().await.treatment,
        TreatmentState::Available("Remove infected leaves".into())
    );
}

#[tokio::test]
async fn treatment_transport_failure_embeds_error_text() {
    let service = Arc::new(ScriptedService::default());
    service.push_prediction(leaf_blight()).await;
    service
        .push_treatment(Reply::Now(Err(ServiceError::Transport(
            "connection reset".into(),
        ))))
        .await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;
    let _ = controller.submit_for_diagnosis().await.expect("submitted");

    assert_eq!(controller.request_treatment().await, Some(Applied::Yes));
    match controller.snapshot().await.treatment {
        TreatmentState::Failed(DetectionError::Transport(message)) => {
            assert!(message.starts_with("Error: "), "{message}");
            assert!(message.contains("connection reset"), "{message}");
        }
        other => panic!("unexpected treatment state: {other:?}"),
    }
}

#[tokio::test]
async fn treatment_error_status_is_request_failed() {
    let service = Arc::new(ScriptedService::default());
    service.push_prediction(leaf_blight()).await;
    service
        .push_treatment(Reply::Now(Err(ServiceError::Status { status: 500 })))
        .await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;
    let _ = controller.submit_for_diagnosis().await.expect("submitted");

    assert_eq!(controller.request_treatment().await, Some(Applied::Yes));
    match controller.snapshot().await.treatment {
        TreatmentState::Failed(DetectionError::RequestFailed {
            status: Some(500),
            message,
        }) => assert_eq!(message, "Error: service responded with HTTP 500"),
        other => panic!("unexpected treatment state: {other:?}"),
    }
}

#[tokio::test]
async fn late_treatment_after_clear_is_suppressed() {
    let service = Arc::new(ScriptedService::default());
    service.push_prediction(leaf_blight()).await;
    let gate = service.gate_treatment().await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;
    let _ = controller.submit_for_diagnosis().await.expect("submitted");

    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.request_treatment().await }
    });
    wait_for_treatment_calls(&service, 1).await;
    assert_eq!(controller.snapshot().await.treatment, TreatmentState::Loading);

    controller.clear_image().await;
    gate.send(Ok(TreatmentResponse {
        error: None,
        treatment: Some("late advice".into()),
    }))
    .expect("deliver treatment");

    assert_eq!(task.await.expect("join"), Some(Applied::Stale));
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.treatment, TreatmentState::NotRequested);
    assert_eq!(snapshot.submission, SubmissionState::Idle);
}

#[tokio::test]
async fn clear_after_results_resets_session() {
    let service = Arc::new(ScriptedService::default());
    service.push_prediction(leaf_blight()).await;
    service
        .push_treatment(Reply::Now(Ok(TreatmentResponse {
            error: None,
            treatment: Some("advice".into()),
        })))
        .await;
    let controller = controller_with(&service, "en");
    controller.select_image(image("leaf.png")).await;
    let _ = controller.submit_for_diagnosis().await.expect("submitted");
    let _ = controller.request_treatment().await;

    controller.clear_image().await;
    let snapshot = controller.snapshot().await;
    assert!(snapshot.selected_file.is_none());
    assert!(snapshot.preview_url.is_none());
    assert_eq!(snapshot.submission, SubmissionState::Idle);
    assert_eq!(snapshot.treatment, TreatmentState::NotRequested);
    assert_eq!(controller.previews().live_count(), 0);
}

#[tokio::test]
async fn locale_change_applies_to_next_request() {
    let service = Arc::new(ScriptedService::default());
    service.push_prediction(leaf_blight()).await;
    let controller = controller_with(&service, "en");
    controller.set_locale("te").await;
    controller.select_image(image("leaf.png")).await;
    let _ = controller.submit_for_diagnosis().await.expect("submitted");

    assert_eq!(
        service.predict_calls.lock().await[0].1,
        LanguageName::Telugu
    );
}

#[tokio::test]
async fn select_image_path_reads_file_and_guesses_mime() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("leaf.jpeg");
    std::fs::write(&path, [0xff, 0xd8, 0xff]).expect("write image");

    let service = Arc::new(ScriptedService::default());
    let controller = controller_with(&service, "en");
    controller.select_image_path(&path).await.expect("select");

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.selected_file.as_deref(), Some("leaf.jpeg"));
    let preview = snapshot.preview_url.expect("preview");
    assert!(controller
        .previews()
        .data_url(&preview)
        .expect("live preview")
        .starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn select_missing_path_fails_without_touching_session() {
    let service = Arc::new(ScriptedService::default());
    let controller = controller_with(&service, "en");
    let before = controller.snapshot().await;

    let err = controller
        .select_image_path("/definitely/not/here.png")
        .await
        .expect_err("missing file");
    assert!(err.to_string().contains("failed to read image"));
    assert_eq!(controller.snapshot().await, before);
}

#[test]
fn health_classification_prefers_server_message() {
    let status = status_from_health(
        Ok(HealthReport {
            http_status: 500,
            body: HealthResponse {
                status: Some("success".into()),
                message: Some("overloaded".into()),
            },
        }),
        &EnglishCatalog,
    );
    // A success body on a non-2xx response is still unavailable.
    assert_eq!(status, ServiceStatus::Unavailable("overloaded".into()));

    let status = status_from_health(
        Ok(HealthReport {
            http_status: 200,
            body: HealthResponse {
                status: Some("error".into()),
                message: Some(String::new()),
            },
        }),
        &EnglishCatalog,
    );
    assert_eq!(
        status,
        ServiceStatus::Unavailable(EnglishCatalog.text(MessageKey::StatusGenericError))
    );
}

#[test]
fn prediction_missing_fields_is_request_failed() {
    let err = diagnosis_from_prediction(
        Ok(PredictResponse {
            error: None,
            disease: Some("Leaf Blight".into()),
            confidence: None,
        }),
        &EnglishCatalog,
    )
    .expect_err("incomplete");
    assert!(matches!(err, DetectionError::RequestFailed { status: None, .. }));
}

#[test]
fn treatment_application_error_is_verbatim() {
    let err = treatment_from_response(
        Ok(TreatmentResponse {
            error: Some("unknown disease".into()),
            treatment: None,
        }),
        &EnglishCatalog,
    )
    .expect_err("application error");
    assert_eq!(err, DetectionError::Application("unknown disease".into()));
}

#[test]
fn prediction_confidence_outside_percent_range_is_request_failed() {
    for confidence in [150.0, -3.0, f64::NAN, f64::INFINITY] {
        let err = diagnosis_from_prediction(
            Ok(PredictResponse {
                error: None,
                disease: Some("Leaf Blight".into()),
                confidence: Some(confidence),
            }),
            &EnglishCatalog,
        )
        .expect_err("out of range");
        assert_eq!(
            err,
            DetectionError::request_failed(None, EnglishCatalog.text(MessageKey::PredictionIncomplete)),
            "confidence {confidence}"
        );
    }

    let diagnosis = diagnosis_from_prediction(
        Ok(PredictResponse {
            error: None,
            disease: Some("Healthy".into()),
            confidence: Some(100.0),
        }),
        &EnglishCatalog,
    )
    .expect("upper bound is valid");
    assert_eq!(diagnosis.confidence_percent, 100.0);
}
