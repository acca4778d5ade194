use std::{
    io::{self, BufRead},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    thread,
};

mod backend_bridge;
mod config;
mod controller;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    DetectionController, EnglishCatalog, HttpDetectionService, PreviewRegistry, ServiceStatus,
    SubmissionState,
};
use crossbeam_channel::bounded;
use tracing_subscriber::EnvFilter;

use crate::{
    backend_bridge::commands::{SessionCommand, HELP},
    config::{load_settings, normalize_base_url, Settings},
    controller::{
        events::{UiError, UiErrorContext, UiEvent},
        orchestration::dispatch_session_command,
    },
    render::{render_event, render_snapshot, render_status},
};

#[derive(Parser, Debug)]
#[command(name = "cropcare", about = "Plant disease detection client", version)]
struct Args {
    /// Base URL of the inference service.
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Locale code used for service responses (en, hi, te).
    #[arg(long, global = true)]
    locale: Option<String>,
    /// Path to a TOML settings file (defaults to ./cropcare.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the inference service.
    Status,
    /// Diagnose one image and optionally fetch treatment advice.
    Diagnose {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        treatment: bool,
    },
    /// Interactive session driven by typed commands.
    Session,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(api_url) = args.api_url {
        settings.api_base_url = api_url;
    }
    if let Some(locale) = args.locale {
        settings.locale = locale;
    }

    match args.command {
        Command::Status => block_on(run_status(settings)),
        Command::Diagnose { image, treatment } => {
            block_on(run_diagnose(settings, image, treatment))
        }
        Command::Session => run_session(settings),
    }
}

fn block_on<F: std::future::Future<Output = Result<ExitCode>>>(future: F) -> Result<ExitCode> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(future)
}

fn build_controller(settings: &Settings) -> Result<Arc<DetectionController>> {
    let base_url = normalize_base_url(&settings.api_base_url)?;
    let service = HttpDetectionService::new(&base_url, settings.request_timeout())
        .context("failed to build HTTP client")?;
    tracing::info!(%base_url, locale = %settings.locale, "detection client configured");
    Ok(DetectionController::new_with_dependencies(
        Arc::new(service),
        Arc::new(EnglishCatalog),
        PreviewRegistry::new(),
        settings.locale.clone(),
    ))
}

async fn run_status(settings: Settings) -> Result<ExitCode> {
    let controller = build_controller(&settings)?;
    controller.initialize().await;
    let snapshot = controller.snapshot().await;
    println!("{}", render_status(&snapshot.service_status));
    Ok(match snapshot.service_status {
        ServiceStatus::Available(_) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

async fn run_diagnose(settings: Settings, image: PathBuf, treatment: bool) -> Result<ExitCode> {
    let controller = build_controller(&settings)?;
    controller.initialize().await;
    println!(
        "{}",
        render_status(&controller.snapshot().await.service_status)
    );

    controller.select_image_path(&image).await?;
    if let Err(err) = controller.submit_for_diagnosis().await {
        anyhow::bail!("cannot submit image: {err}");
    }

    let snapshot = controller.snapshot().await;
    if matches!(snapshot.submission, SubmissionState::Succeeded(_)) && treatment {
        let _ = controller.request_treatment().await;
    }

    let snapshot = controller.snapshot().await;
    println!("{}", render_snapshot(&snapshot));
    Ok(match snapshot.submission {
        SubmissionState::Succeeded(_) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn run_session(settings: Settings) -> Result<ExitCode> {
    let (cmd_tx, cmd_rx) = bounded::<SessionCommand>(64);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(256);

    let worker = backend_bridge::runtime::launch(
        Box::new(move || build_controller(&settings)),
        cmd_rx,
        ui_tx,
    );
    let printer = thread::spawn(move || {
        while let Ok(event) = ui_rx.recv() {
            println!("{}\n", render_event(&event));
        }
    });

    println!("commands: {HELP}");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let cmd = match SessionCommand::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(message) => {
                let event = UiEvent::Error(UiError::from_message(UiErrorContext::General, message));
                println!("{}", render_event(&event));
                continue;
            }
        };

        let quit = cmd == SessionCommand::Quit;
        let mut status = String::new();
        dispatch_session_command(&cmd_tx, cmd, &mut status);
        if !status.is_empty() {
            println!("! {status}");
        }
        if quit {
            break;
        }
    }

    drop(cmd_tx);
    if worker.join().is_err() {
        tracing::error!("backend worker panicked");
    }
    if printer.join().is_err() {
        tracing::error!("event printer panicked");
    }
    Ok(ExitCode::SUCCESS)
}
