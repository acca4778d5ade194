//! Backend worker: owns the tokio runtime and the detection controller,
//! runs each queued command as its own task, and forwards session snapshots
//! to the UI event queue.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use client_core::{Applied, DetectionController};
use crossbeam_channel::{Receiver, Sender};
use tokio::sync::broadcast::error::RecvError;

use crate::backend_bridge::commands::SessionCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

pub type ControllerFactory = Box<dyn FnOnce() -> anyhow::Result<Arc<DetectionController>> + Send>;

pub fn launch(
    make_controller: ControllerFactory,
    cmd_rx: Receiver<SessionCommand>,
    ui_tx: Sender<UiEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let controller = match make_controller() {
                Ok(controller) => controller,
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        format!("backend worker startup failure: {err:#}"),
                    )));
                    tracing::error!("failed to create detection controller: {err:#}");
                    return;
                }
            };

            let forwarder = tokio::spawn(forward_snapshots(controller.clone(), ui_tx.clone()));
            let _ = ui_tx.try_send(UiEvent::Info("Backend worker ready".to_string()));

            tokio::spawn({
                let controller = controller.clone();
                async move {
                    controller.initialize().await;
                }
            });

            while let Ok(cmd) = cmd_rx.recv() {
                if cmd == SessionCommand::Quit {
                    break;
                }
                tokio::spawn(handle_command(controller.clone(), cmd, ui_tx.clone()));
            }

            forwarder.abort();
        });
    })
}

async fn forward_snapshots(controller: Arc<DetectionController>, ui_tx: Sender<UiEvent>) {
    let mut events = controller.subscribe();
    loop {
        match events.recv().await {
            Ok(snapshot) => {
                if ui_tx.try_send(UiEvent::SessionChanged(snapshot)).is_err() {
                    tracing::warn!("ui event queue full or closed; dropped session snapshot");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "session snapshot subscriber lagged");
                let snapshot = controller.snapshot().await;
                let _ = ui_tx.try_send(UiEvent::SessionChanged(snapshot));
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn handle_command(
    controller: Arc<DetectionController>,
    cmd: SessionCommand,
    ui_tx: Sender<UiEvent>,
) {
    match cmd {
        SessionCommand::SelectImage { path } => {
            if let Err(err) = controller.select_image_path(&path).await {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::SelectImage,
                    format!("{err:#}"),
                )));
            }
        }
        SessionCommand::ClearImage => controller.clear_image().await,
        SessionCommand::Submit => match controller.submit_for_diagnosis().await {
            Ok(Applied::Yes) => {}
            Ok(Applied::Stale) => {
                let _ = ui_tx.try_send(UiEvent::Info(
                    "Discarded a diagnosis for an image that is no longer selected".to_string(),
                ));
            }
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_detection(
                    UiErrorContext::Diagnose,
                    &err,
                )));
            }
        },
        SessionCommand::RequestTreatment => match controller.request_treatment().await {
            Some(Applied::Yes) => {}
            Some(Applied::Stale) => {
                let _ = ui_tx.try_send(UiEvent::Info(
                    "Discarded treatment advice for a diagnosis that is no longer current"
                        .to_string(),
                ));
            }
            None => {
                let _ = ui_tx.try_send(UiEvent::Info(
                    "Treatment needs a successful diagnosis and no request in flight".to_string(),
                ));
            }
        },
        SessionCommand::CheckStatus => controller.check_service_status().await,
        SessionCommand::SetLocale { locale } => controller.set_locale(locale).await,
        SessionCommand::Show => {
            let snapshot = controller.snapshot().await;
            let _ = ui_tx.try_send(UiEvent::SessionChanged(snapshot));
        }
        SessionCommand::Quit => {}
    }
}
